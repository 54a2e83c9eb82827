use crate::{
    git::GitError,
    hooks::StepOutcome,
    request::{DeploymentRequest, Outcome},
    tree::SyncError,
};
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/// Where a deployment is published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Live,
    Stage,
}

impl Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Live => write!(f, "live"),
            Flow::Stage => write!(f, "stage"),
        }
    }
}

/// The outcome of every stage of one pipeline run.
#[derive(Debug)]
pub struct DeploymentReport {
    pub flow: Flow,
    pub request: DeploymentRequest,
    /// The directory the working copy was synced to.
    pub target: PathBuf,
    pub git: Outcome<GitError>,
    pub hooks: Vec<StepOutcome>,
    pub sync: Outcome<SyncError>,
}

impl DeploymentReport {
    /// True if no stage failed.
    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// A description of every failed stage, in pipeline order.
    pub fn failures(&self) -> Vec<String> {
        let mut failures = vec![];
        if let Some(err) = self.git.error() {
            failures.push(format!("git: {err}"));
        }
        for step in &self.hooks {
            if let Some(err) = step.outcome.error() {
                failures.push(format!("hook {}: {err}", step.spec));
            }
        }
        if let Some(err) = self.sync.error() {
            failures.push(format!("sync: {err}"));
        }
        failures
    }

    /// The result of the last stage that ran, earlier failures are not included.
    pub fn last_outcome(&self) -> Result<(), String> {
        let last_hook = self
            .hooks
            .iter()
            .rev()
            .find(|step| !matches!(step.outcome, Outcome::Skipped));

        match (&self.sync, last_hook) {
            (Outcome::Failed(err), _) => Err(format!("sync: {err}")),
            (Outcome::Succeeded, _) => Ok(()),
            (Outcome::Skipped, Some(step)) => match step.outcome.error() {
                Some(err) => Err(format!("hook {}: {err}", step.spec)),
                None => Ok(()),
            },
            (Outcome::Skipped, None) => match self.git.error() {
                Some(err) => Err(format!("git: {err}")),
                None => Ok(()),
            },
        }
    }
}

impl Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failures();
        if failures.is_empty() {
            write!(
                f,
                "{} deployment of {} to {} succeeded",
                self.flow,
                self.request,
                self.target.display()
            )
        } else {
            write!(
                f,
                "{} deployment of {} to {} failed ({})",
                self.flow,
                self.request,
                self.target.display(),
                failures.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookError, HookSpec};

    fn report(hook: Outcome<HookError>) -> DeploymentReport {
        DeploymentReport {
            flow: Flow::Stage,
            request: DeploymentRequest::branch("stage"),
            target: PathBuf::from("out/stage"),
            git: Outcome::Succeeded,
            hooks: vec![
                StepOutcome {
                    spec: HookSpec::new("npm", ""),
                    outcome: hook,
                },
                StepOutcome {
                    spec: HookSpec::new("grunt", "build"),
                    outcome: Outcome::Succeeded,
                },
            ],
            sync: Outcome::Succeeded,
        }
    }

    #[test]
    fn it_should_succeed_without_failures() {
        let report = report(Outcome::Succeeded);

        assert!(report.is_success());
        assert_eq!(
            "stage deployment of stage to out/stage succeeded",
            report.to_string()
        );
    }

    #[test]
    fn it_should_report_failures_in_the_middle_of_the_chain() {
        let report = report(Outcome::Failed(HookError::UnknownHook(String::from("npm"))));

        assert!(!report.is_success());
        assert_eq!(vec!["hook npm: unknown hook \"npm\""], report.failures());
        assert_eq!(Ok(()), report.last_outcome());
    }

    #[test]
    fn it_should_use_the_last_stage_that_ran() {
        let mut report = report(Outcome::Failed(HookError::UnknownHook(String::from("npm"))));
        report.hooks[1].outcome = Outcome::Skipped;
        report.sync = Outcome::Skipped;

        assert_eq!(
            Err(String::from("hook npm: unknown hook \"npm\"")),
            report.last_outcome()
        );
    }
}
