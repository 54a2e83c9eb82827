use crate::{
    config::{ConfigError, SiteConfig, SiteSource},
    files::{FileStore, LocalFiles},
    git::{shorthash, Git2Sync, GitSync},
    hooks::{ChainPolicy, HookChain, HookContext, HookRegistry, StepOutcome},
    listener::{ListenerError, ListenerHandle, NotificationListener, PushNotification},
    process::{ProcessRunner, ShellRunner},
    request::{DeploymentRequest, Outcome},
    tree::{RsyncTree, TreeSync},
};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

mod lock;
mod plan;
mod report;

pub use lock::WorkingCopyLocks;
pub use plan::{plan, DeploymentPlan};
pub use report::{DeploymentReport, Flow};

/// A custom error describing why a deployment cannot start.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The site configuration is missing, unreadable or incomplete.
    #[error("{0}")]
    Configuration(#[from] ConfigError),
    /// The branch name cannot be used as a directory under the staging root.
    #[error("branch {0:?} cannot be deployed to a staging directory")]
    InvalidBranch(String),
    /// The notification listener cannot be started.
    #[error("cannot listen for notifications: {0}")]
    Listener(#[from] ListenerError),
}

/// Called with the notification after every deployment it triggered finished.
pub type NotificationCallback = Arc<dyn Fn(&PushNotification) + Send + Sync>;

/// The collaborators a deployment unit runs the pipeline with.
pub struct Collaborators {
    pub files: Arc<dyn FileStore>,
    pub git: Arc<dyn GitSync>,
    pub tree: Arc<dyn TreeSync>,
    pub hooks: HookChain,
    pub locks: WorkingCopyLocks,
}

impl Collaborators {
    /// The local filesystem, libgit2, rsync and the built-in hooks, locking with the given locks.
    pub fn local(locks: WorkingCopyLocks) -> Self {
        let files: Arc<dyn FileStore> = Arc::new(LocalFiles);
        let runner: Arc<dyn ProcessRunner> = Arc::new(ShellRunner);

        Collaborators {
            tree: Arc::new(RsyncTree::new(files.clone(), runner.clone())),
            hooks: HookChain::new(HookRegistry::with_builtins(runner)),
            git: Arc::new(Git2Sync),
            files,
            locks,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Collaborators::local(WorkingCopyLocks::new())
    }
}

/// The results of the deployments a notification triggered.
#[derive(Debug)]
pub struct NotificationOutcome {
    /// None if the notification did not trigger a live deployment.
    pub live: Option<Result<DeploymentReport, DeployError>>,
    pub stage: Result<DeploymentReport, DeployError>,
}

/// The staging directory of the branch, branches can't point outside of the root.
fn stage_directory(root: &Path, branch_name: &str) -> Result<PathBuf, DeployError> {
    let branch = Path::new(branch_name);
    let is_valid = !branch_name.is_empty()
        && branch
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if is_valid {
        Ok(root.join(branch))
    } else {
        Err(DeployError::InvalidBranch(branch_name.to_string()))
    }
}

struct Inner {
    source: Mutex<Option<SiteSource>>,
    ready: OnceCell<Result<(), ConfigError>>,
    config: RwLock<Option<SiteConfig>>,
    callback: RwLock<Option<NotificationCallback>>,
    collaborators: Collaborators,
    listener: Arc<NotificationListener>,
    subscription: AsyncMutex<Option<ListenerHandle>>,
}

/// One deployed site: updates its working copy, runs the hooks and publishes
/// the result to the live or a staging directory.
///
/// The configuration is resolved once, on first use; every operation waits
/// for it. Cloning the unit is cheap, the clones share the same site.
#[derive(Clone)]
pub struct DeploymentUnit {
    inner: Arc<Inner>,
}

impl DeploymentUnit {
    /// Creates a unit deploying with the local filesystem, libgit2, rsync and the built-in hooks.
    pub fn new(source: impl Into<SiteSource>, listener: Arc<NotificationListener>) -> Self {
        DeploymentUnit::with_collaborators(source, listener, Collaborators::default())
    }

    pub fn with_collaborators(
        source: impl Into<SiteSource>,
        listener: Arc<NotificationListener>,
        collaborators: Collaborators,
    ) -> Self {
        DeploymentUnit {
            inner: Arc::new(Inner {
                source: Mutex::new(Some(source.into())),
                ready: OnceCell::new(),
                config: RwLock::new(None),
                callback: RwLock::new(None),
                collaborators,
                listener,
                subscription: AsyncMutex::new(None),
            }),
        }
    }

    fn source(&self) -> Option<SiteSource> {
        self.inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // The source is only dropped after it resolved, a cancelled caller leaves it for the next one.
    async fn resolve(&self) -> Result<(), ConfigError> {
        let result = match self.source() {
            Some(source) => source.resolve(self.inner.collaborators.files.as_ref()).await,
            None => Err(ConfigError::Missing),
        };
        self.inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match result {
            Ok(config) => {
                debug!("Site configuration of {} loaded.", config.git.display());
                *self
                    .inner
                    .config
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(config);
                Ok(())
            }
            Err(err) => {
                error!("{err}.");
                Err(err)
            }
        }
    }

    /// Wait until the configuration is resolved. A failed configuration stays failed.
    pub async fn ready(&self) -> Result<(), ConfigError> {
        self.inner
            .ready
            .get_or_init(|| self.resolve())
            .await
            .clone()
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> Result<SiteConfig, ConfigError> {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ConfigError::NotReady)
    }

    /// Read a configuration value by its key (e.g. `liveBranch`).
    /// Returns `None` if it is not set or the configuration is not loaded yet.
    pub fn get_attribute(&self, name: &str) -> Option<Value> {
        self.config().ok()?.attribute(name)
    }

    /// Change a configuration value by its key. The new configuration is validated,
    /// and used by every deployment started afterwards.
    pub fn set_attribute(&self, name: &str, value: Value) -> Result<(), ConfigError> {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let updated = config
            .as_ref()
            .ok_or(ConfigError::NotReady)?
            .with_attribute(name, value)?;
        *config = Some(updated);

        Ok(())
    }

    /// Set the function to call after the deployments of a notification finished.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&PushNotification) + Send + Sync + 'static,
    {
        *self
            .inner
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self
            .inner
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn callback(&self) -> Option<NotificationCallback> {
        self.inner
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deploy the branch (the live branch by default) or an exact revision of it
    /// to the live directory.
    pub async fn deploy_live(
        &self,
        branch_name: Option<&str>,
        exact_revision: Option<&str>,
    ) -> Result<DeploymentReport, DeployError> {
        self.ready().await?;
        let config = self.config()?;
        let target = config.live_root()?.to_path_buf();

        let request = DeploymentRequest {
            branch_name: branch_name.unwrap_or(&config.live_branch).to_string(),
            exact_revision: exact_revision.map(String::from),
        };

        Ok(self.run_pipeline(Flow::Live, &config, request, target).await)
    }

    /// Deploy the branch or an exact revision of it to its directory under the staging root.
    pub async fn deploy_stage(
        &self,
        branch_name: &str,
        exact_revision: Option<&str>,
    ) -> Result<DeploymentReport, DeployError> {
        self.ready().await?;
        let config = self.config()?;
        let target = stage_directory(config.stage_root()?, branch_name)?;

        let request = DeploymentRequest {
            branch_name: branch_name.to_string(),
            exact_revision: exact_revision.map(String::from),
        };

        Ok(self.run_pipeline(Flow::Stage, &config, request, target).await)
    }

    /// Update the working copy, run the hooks, then sync to the target.
    ///
    /// Every stage starts after the previous one finished, failed or not, unless the
    /// site halts on failures. The working copy is locked for the whole run.
    async fn run_pipeline(
        &self,
        flow: Flow,
        config: &SiteConfig,
        request: DeploymentRequest,
        target: PathBuf,
    ) -> DeploymentReport {
        let Collaborators {
            git,
            tree,
            hooks,
            locks,
            ..
        } = &self.inner.collaborators;

        let _guard = locks.acquire(&config.git).await;
        info!(
            "Starting {flow} deployment of {request} to {}.",
            target.display()
        );

        let git_outcome = match git.update(&config.git, &request, &config.remote).await {
            Ok(update) => {
                info!(
                    "Updated contents from remote git repository to {} ({}).",
                    update.target,
                    shorthash(&update.commit_sha)
                );
                Outcome::Succeeded
            }
            Err(err) => {
                error!("Updating contents from remote git repository failed: {err}.");
                Outcome::Failed(err)
            }
        };

        let halt = config.halt_on_failure;
        let hook_outcomes: Vec<StepOutcome> = if halt && git_outcome.is_failed() {
            warn!("Skipping hooks, the git update failed.");
            config.hooks.iter().map(StepOutcome::skipped).collect()
        } else {
            let context = HookContext {
                working_copy: config.git.clone(),
            };
            let policy = if halt {
                ChainPolicy::HaltOnFailure
            } else {
                ChainPolicy::BestEffort
            };
            hooks.run(&context, &config.hooks, policy).await
        };

        let has_failed =
            git_outcome.is_failed() || hook_outcomes.iter().any(|step| step.outcome.is_failed());
        let sync_outcome = if halt && has_failed {
            warn!("Not syncing to {}, an earlier stage failed.", target.display());
            Outcome::Skipped
        } else {
            Outcome::from(tree.sync(&config.git, &target).await)
        };

        let report = DeploymentReport {
            flow,
            request,
            target,
            git: git_outcome,
            hooks: hook_outcomes,
            sync: sync_outcome,
        };
        if report.is_success() {
            info!("{report}.");
        } else {
            error!("{report}.");
        }

        report
    }

    /// Run the deployments the notification triggers: live for the live branch
    /// (only for tags if the site deploys on tags) and staging for every branch.
    /// The callback is called after both finished.
    pub async fn on_notification(
        &self,
        notification: PushNotification,
    ) -> Result<NotificationOutcome, DeployError> {
        self.ready().await?;
        let config = self.config()?;
        debug!(
            "Received push on {} (tag: {:?}, revision: {:?}).",
            notification.branch_name, notification.tag_name, notification.exact_revision
        );

        let plan = plan(&config, &notification);
        if plan.live.is_none() && notification.branch_name == config.live_branch {
            info!(
                "Push on {} is not tagged, skipping live deployment.",
                notification.branch_name
            );
        }

        let live = async {
            match &plan.live {
                Some(request) => Some(
                    self.deploy_live(
                        Some(&request.branch_name),
                        request.exact_revision.as_deref(),
                    )
                    .await,
                ),
                None => None,
            }
        };
        let stage = self.deploy_stage(
            &plan.stage.branch_name,
            plan.stage.exact_revision.as_deref(),
        );
        let (live, stage) = tokio::join!(live, stage);

        if let Some(callback) = self.callback() {
            callback(&notification);
        }

        Ok(NotificationOutcome { live, stage })
    }

    /// Subscribe to the notifications of the configured repository and deploy on
    /// every one of them. Only the first call subscribes, later calls return the
    /// same handle.
    pub async fn start_listening(&self) -> Result<ListenerHandle, DeployError> {
        self.ready().await?;

        let mut subscription = self.inner.subscription.lock().await;
        if let Some(handle) = subscription.as_ref() {
            return Ok(handle.clone());
        }

        let repo = self.config()?.repo;
        let mut notifications = self.inner.listener.create(repo)?;
        let handle = notifications.handle();

        let unit = self.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                let unit = unit.clone();
                tokio::spawn(async move {
                    if let Err(err) = unit.on_notification(notification).await {
                        error!("Cannot deploy notification: {err}.");
                    }
                });
            }
            debug!("Notification listener closed.");
        });

        *subscription = Some(handle.clone());
        Ok(handle)
    }
}
