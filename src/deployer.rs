use crate::{
    config::SiteSource,
    deploy::{Collaborators, DeploymentUnit, WorkingCopyLocks},
    listener::NotificationListener,
};
use log::LevelFilter;
use std::sync::Arc;

/// Builds the deployment units of one listening port.
///
/// Every unit shares the notification listener and the working copy locks,
/// so two sites deploying from the same working copy never interleave.
#[derive(Clone)]
pub struct Deployer {
    listener: Arc<NotificationListener>,
    locks: WorkingCopyLocks,
}

impl Deployer {
    /// Creates a deployer listening on a port (e.g. "8000") or an address (e.g. "127.0.0.1:8000").
    pub fn new(port: &str) -> Self {
        Deployer {
            listener: Arc::new(NotificationListener::new(port)),
            locks: WorkingCopyLocks::new(),
        }
    }

    /// Creates a deployer without an HTTP server, for manual deployments.
    pub fn detached() -> Self {
        Deployer {
            listener: Arc::new(NotificationListener::detached()),
            locks: WorkingCopyLocks::new(),
        }
    }

    pub fn listener(&self) -> Arc<NotificationListener> {
        self.listener.clone()
    }

    /// Creates a unit of a site, from a configuration file or an in-memory configuration.
    pub fn site(&self, source: impl Into<SiteSource>) -> DeploymentUnit {
        self.site_with(source, Collaborators::local(self.locks.clone()))
    }

    /// Creates a unit of a site with the given collaborators.
    pub fn site_with(
        &self,
        source: impl Into<SiteSource>,
        collaborators: Collaborators,
    ) -> DeploymentUnit {
        DeploymentUnit::with_collaborators(source, self.listener.clone(), collaborators)
    }

    /// Show or hide the debug output, e.g. the output of the hooks.
    ///
    /// Only changes the global max level: the installed logger has to let
    /// the debug level through itself.
    pub fn verbose(&self, verbose: bool) {
        log::set_max_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ConfigError,
        deploy::DeployError,
        files::MockFileStore,
        git::{GitUpdate, MockGitSync},
        hooks::HookChain,
        tree::MockTreeSync,
    };
    use log::Level;
    use serde_json::json;

    #[test]
    fn it_should_toggle_the_debug_output() {
        testing_logger::setup();
        let deployer = Deployer::detached();

        deployer.verbose(true);
        assert_eq!(LevelFilter::Debug, log::max_level());
        assert!(log::log_enabled!(Level::Debug));

        deployer.verbose(false);
        assert_eq!(LevelFilter::Info, log::max_level());
        assert!(!log::log_enabled!(Level::Debug));
        assert!(log::log_enabled!(Level::Info));

        log::set_max_level(LevelFilter::Trace);
    }

    #[test]
    fn it_should_use_ports_as_every_address() {
        let deployer = Deployer::new("8000");

        assert_eq!(Some("0.0.0.0:8000"), deployer.listener().address());
    }

    #[tokio::test]
    async fn it_should_build_units_sharing_the_listener() -> Result<(), DeployError> {
        let deployer = Deployer::detached();

        let mut git = MockGitSync::new();
        git.expect_update().times(1).returning(|_, request, remote| {
            Ok(GitUpdate {
                target: request.checkout_target(remote),
                commit_sha: String::from("abc123"),
            })
        });
        let mut tree = MockTreeSync::new();
        tree.expect_sync().times(1).returning(|_, _| Ok(()));

        let unit = deployer.site_with(
            json!({ "git": "repo/", "deploy": "out/", "repo": "octocat/site" }),
            Collaborators {
                files: Arc::new(MockFileStore::new()),
                git: Arc::new(git),
                tree: Arc::new(tree),
                hooks: HookChain::default(),
                locks: WorkingCopyLocks::new(),
            },
        );
        unit.start_listening().await?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        unit.set_callback(move |notification| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(notification.branch_name.clone());
            }
        });

        let delivered = deployer
            .listener()
            .payload(&json!({
                "ref": "refs/heads/feature",
                "repository": { "full_name": "octocat/site" }
            }))
            .map_err(DeployError::Listener)?;
        assert_eq!(1, delivered);
        assert_eq!(Ok(String::from("feature")), rx.await);

        Ok(())
    }

    #[tokio::test]
    async fn it_should_fail_to_build_without_configuration() {
        let deployer = Deployer::detached();
        let unit = deployer.site("");

        assert_eq!(Err(ConfigError::Missing), unit.ready().await);
    }
}
