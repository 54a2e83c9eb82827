use crate::{
    process::{Output, ProcessError, ProcessRunner},
    request::Outcome,
};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{self, Display},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;

/// The built-in hooks: dependency install, build tools and shell scripts.
pub mod builtin;

use builtin::{BuildTool, InstallDependencies, ScriptHook};

/// A custom error describing the error cases for a hook step.
#[derive(Debug, Error)]
pub enum HookError {
    /// There is no hook registered under this name.
    #[error("unknown hook {0:?}")]
    UnknownHook(String),
    /// The command of the hook failed to start or returned a non-zero exit code.
    #[error("{0}")]
    CommandFailed(#[from] ProcessError),
    /// The argument of the hook cannot be interpreted.
    #[error("invalid hook argument {0:?}")]
    InvalidArgument(String),
}

/// A hook as configured: the name of the hook with an optional argument,
/// written as `name` or `name|argument`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HookSpec {
    pub name: String,
    pub argument: String,
}

impl HookSpec {
    pub fn new(name: &str, argument: &str) -> Self {
        HookSpec {
            name: name.to_string(),
            argument: argument.to_string(),
        }
    }
}

impl FromStr for HookSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, argument) = s.split_once('|').unwrap_or((s, ""));
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("cannot parse hook {s:?}, the name is empty"));
        }

        Ok(HookSpec::new(name, argument))
    }
}

impl TryFrom<String> for HookSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HookSpec> for String {
    fn from(value: HookSpec) -> Self {
        value.to_string()
    }
}

impl Display for HookSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.argument.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}|{}", self.name, self.argument)
        }
    }
}

/// Data every hook step gets about the deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookContext {
    /// The updated working copy, the hooks run inside it.
    pub working_copy: PathBuf,
}

/// A named, configurable post-update action.
#[automock]
#[async_trait]
pub trait Hook: Send + Sync {
    /// Run the hook against the working copy with the argument from its [HookSpec].
    async fn run(&self, context: &HookContext, argument: &str) -> Result<Output, HookError>;
}

/// The hooks a chain can invoke by name.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Creates a registry without any hooks.
    pub fn new() -> Self {
        HookRegistry::default()
    }

    /// Creates a registry with the built-in hooks running their commands with the runner.
    ///
    /// - `installDependencies` and `npm` run `npm install`,
    /// - `build` and `grunt` run `grunt --no-color` with the argument as tasks,
    /// - `bbb` runs `bbb --no-color` with the argument as tasks,
    /// - `script` runs the argument as a shell line.
    pub fn with_builtins(runner: Arc<dyn ProcessRunner>) -> Self {
        let install: Arc<dyn Hook> = Arc::new(InstallDependencies::new(runner.clone()));
        let grunt: Arc<dyn Hook> = Arc::new(BuildTool::new(runner.clone(), "grunt"));

        let mut registry = HookRegistry::new();
        registry.register("installDependencies", install.clone());
        registry.register("npm", install);
        registry.register("build", grunt.clone());
        registry.register("grunt", grunt);
        registry.register("bbb", Arc::new(BuildTool::new(runner.clone(), "bbb")));
        registry.register("script", Arc::new(ScriptHook::new(runner)));
        registry
    }

    /// Register a hook under the name, replacing the previous one with the same name.
    pub fn register(&mut self, name: &str, hook: Arc<dyn Hook>) {
        self.hooks.insert(name.to_string(), hook);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }
}

/// What to do with the rest of the chain after a step fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChainPolicy {
    /// Report the failure and run the next step anyway.
    #[default]
    BestEffort,
    /// Skip every step after the first failure.
    HaltOnFailure,
}

/// The outcome of one step of the chain.
#[derive(Debug)]
pub struct StepOutcome {
    pub spec: HookSpec,
    pub outcome: Outcome<HookError>,
}

impl StepOutcome {
    pub fn skipped(spec: &HookSpec) -> Self {
        StepOutcome {
            spec: spec.clone(),
            outcome: Outcome::Skipped,
        }
    }
}

/// Runs the configured hooks in order against the working copy.
///
/// Every step gets a result in the returned list, so failures in the middle
/// of the chain are visible to the caller, not only the last one.
#[derive(Clone, Default)]
pub struct HookChain {
    registry: HookRegistry,
}

impl HookChain {
    pub fn new(registry: HookRegistry) -> Self {
        HookChain { registry }
    }

    /// Run the hooks strictly in order, each one after the previous completed.
    pub async fn run(
        &self,
        context: &HookContext,
        specs: &[HookSpec],
        policy: ChainPolicy,
    ) -> Vec<StepOutcome> {
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(specs.len());
        let mut halted = false;

        for spec in specs {
            if halted {
                warn!("Skipping hook {spec}, an earlier hook failed.");
                outcomes.push(StepOutcome::skipped(spec));
                continue;
            }

            let result = match self.registry.get(&spec.name) {
                Some(hook) => {
                    debug!(
                        "Running hook {spec} in {}.",
                        context.working_copy.display()
                    );
                    hook.run(context, &spec.argument).await
                }
                None => Err(HookError::UnknownHook(spec.name.clone())),
            };

            match &result {
                Ok(output) => {
                    info!("Hook {spec} completed.");
                    output.lines().for_each(|line| debug!("{line}"));
                }
                Err(err) => {
                    error!("Hook {spec} failed: {err}.");
                    if let HookError::CommandFailed(process_error) = err {
                        if let Some(output) = process_error.output() {
                            output.lines().for_each(|line| debug!("{line}"));
                        }
                    }
                    halted = policy == ChainPolicy::HaltOnFailure;
                }
            }

            outcomes.push(StepOutcome {
                spec: spec.clone(),
                outcome: result.into(),
            });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn context() -> HookContext {
        HookContext {
            working_copy: PathBuf::from("repo/"),
        }
    }

    fn specs(specs: &[&str]) -> Vec<HookSpec> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn failing_hook() -> MockHook {
        let mut hook = MockHook::new();
        hook.expect_run().times(1).returning(|_, _| {
            Err(HookError::CommandFailed(ProcessError::NonZeroExitcode {
                code: 1,
                stdout: String::new(),
                stderr: String::from("failed"),
            }))
        });
        hook
    }

    #[test]
    fn it_should_parse_hook_specs() {
        assert_eq!(HookSpec::new("npm", ""), "npm".parse().unwrap());
        assert_eq!(
            HookSpec::new("build", "taskA taskB"),
            "build|taskA taskB".parse().unwrap()
        );
        assert_eq!(
            HookSpec::new("script", "a | b"),
            "script|a | b".parse().unwrap()
        );
        assert!("".parse::<HookSpec>().is_err());
        assert!("|task".parse::<HookSpec>().is_err());
    }

    #[test]
    fn it_should_display_hook_specs_as_configured() {
        assert_eq!("npm", HookSpec::new("npm", "").to_string());
        assert_eq!("grunt|a b", HookSpec::new("grunt", "a b").to_string());
    }

    #[test]
    fn it_should_register_the_builtin_hooks() {
        let runner = crate::process::MockProcessRunner::new();
        let registry = HookRegistry::with_builtins(Arc::new(runner));
        for name in ["installDependencies", "npm", "build", "grunt", "bbb", "script"] {
            assert!(registry.contains(name), "{name} should be registered");
        }
        assert!(!registry.contains("deploy"));
    }

    #[tokio::test]
    async fn it_should_run_hooks_in_order_with_their_arguments() {
        let mut sequence = Sequence::new();

        let mut install = MockHook::new();
        install
            .expect_run()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|context, argument| {
                context.working_copy == PathBuf::from("repo/") && argument.is_empty()
            })
            .returning(|_, _| Ok(Output::default()));

        let mut build = MockHook::new();
        build
            .expect_run()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|_, argument| argument == "taskA taskB")
            .returning(|_, _| Ok(Output::default()));

        let mut registry = HookRegistry::new();
        registry.register("installDependencies", Arc::new(install));
        registry.register("build", Arc::new(build));
        let chain = HookChain::new(registry);

        let outcomes = chain
            .run(
                &context(),
                &specs(&["installDependencies", "build|taskA taskB"]),
                ChainPolicy::BestEffort,
            )
            .await;

        assert_eq!(2, outcomes.len());
        assert!(outcomes
            .iter()
            .all(|step| matches!(step.outcome, Outcome::Succeeded)));
    }

    #[tokio::test]
    async fn it_should_continue_after_a_failed_hook() {
        let mut after = MockHook::new();
        after
            .expect_run()
            .times(1)
            .returning(|_, _| Ok(Output::default()));

        let mut registry = HookRegistry::new();
        registry.register("fail", Arc::new(failing_hook()));
        registry.register("after", Arc::new(after));
        let chain = HookChain::new(registry);

        let outcomes = chain
            .run(&context(), &specs(&["fail", "after"]), ChainPolicy::BestEffort)
            .await;

        assert!(matches!(
            outcomes[0].outcome,
            Outcome::Failed(HookError::CommandFailed(_))
        ));
        assert!(matches!(outcomes[1].outcome, Outcome::Succeeded));
    }

    #[tokio::test]
    async fn it_should_fail_unknown_hooks_without_halting() {
        let mut after = MockHook::new();
        after
            .expect_run()
            .times(1)
            .returning(|_, _| Ok(Output::default()));

        let mut registry = HookRegistry::new();
        registry.register("after", Arc::new(after));
        let chain = HookChain::new(registry);

        let outcomes = chain
            .run(
                &context(),
                &specs(&["nonexistent|arg", "after"]),
                ChainPolicy::BestEffort,
            )
            .await;

        assert!(
            matches!(
                &outcomes[0].outcome,
                Outcome::Failed(HookError::UnknownHook(name)) if name == "nonexistent"
            )
        );
        assert!(matches!(outcomes[1].outcome, Outcome::Succeeded));
    }

    #[tokio::test]
    async fn it_should_skip_the_rest_when_halting_on_failure() {
        let mut after = MockHook::new();
        after.expect_run().times(0);

        let mut registry = HookRegistry::new();
        registry.register("fail", Arc::new(failing_hook()));
        registry.register("after", Arc::new(after));
        let chain = HookChain::new(registry);

        let outcomes = chain
            .run(
                &context(),
                &specs(&["fail", "after", "after"]),
                ChainPolicy::HaltOnFailure,
            )
            .await;

        assert_eq!(3, outcomes.len());
        assert!(outcomes[0].outcome.is_failed());
        assert!(matches!(outcomes[1].outcome, Outcome::Skipped));
        assert!(matches!(outcomes[2].outcome, Outcome::Skipped));
    }

    #[tokio::test]
    async fn it_should_log_failed_hooks() {
        testing_logger::setup();

        let chain = HookChain::new(HookRegistry::new());
        let _ = chain
            .run(&context(), &specs(&["missing"]), ChainPolicy::BestEffort)
            .await;

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| {
                log.level == log::Level::Error
                    && log.body == "Hook missing failed: unknown hook \"missing\"."
            }));
        });
    }
}
