use super::{Hook, HookContext, HookError};
use crate::process::{Output, ProcessRunner, ShellCommand};
use async_trait::async_trait;
use std::sync::Arc;

/// Every hook command gets the working copy as its directory and these variables.
fn in_working_copy(command: ShellCommand, context: &HookContext) -> ShellCommand {
    let directory = context.working_copy.to_string_lossy().into_owned();
    command
        .dir(&context.working_copy)
        .env("CI", "true")
        .env("BEAR_DIRECTORY", &directory)
}

/// Installs the package dependencies of the working copy with `npm install`.
pub struct InstallDependencies {
    runner: Arc<dyn ProcessRunner>,
}

impl InstallDependencies {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        InstallDependencies { runner }
    }
}

#[async_trait]
impl Hook for InstallDependencies {
    /// The argument is ignored.
    async fn run(&self, context: &HookContext, _argument: &str) -> Result<Output, HookError> {
        let command = in_working_copy(ShellCommand::new("npm", ["install"]), context);
        Ok(self.runner.run(&command).await?)
    }
}

/// Runs a grunt-like build tool with colors disabled.
///
/// The argument is a space-delimited list of tasks (quoting is respected),
/// an empty argument runs the default task.
pub struct BuildTool {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl BuildTool {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: &str) -> Self {
        BuildTool {
            runner,
            program: program.to_string(),
        }
    }

    fn command(&self, tasks: &str) -> Result<ShellCommand, HookError> {
        let tasks =
            shlex::split(tasks).ok_or_else(|| HookError::InvalidArgument(tasks.to_string()))?;
        let args = std::iter::once(String::from("--no-color")).chain(tasks);

        Ok(ShellCommand::new(&self.program, args))
    }
}

#[async_trait]
impl Hook for BuildTool {
    async fn run(&self, context: &HookContext, argument: &str) -> Result<Output, HookError> {
        let command = in_working_copy(self.command(argument)?, context);
        Ok(self.runner.run(&command).await?)
    }
}

/// Runs the argument as a line in the system shell, so it can use variable expansion,
/// pipes and redirection.
pub struct ScriptHook {
    runner: Arc<dyn ProcessRunner>,
}

impl ScriptHook {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        ScriptHook { runner }
    }
}

#[async_trait]
impl Hook for ScriptHook {
    async fn run(&self, context: &HookContext, argument: &str) -> Result<Output, HookError> {
        if argument.trim().is_empty() {
            return Err(HookError::InvalidArgument(argument.to_string()));
        }

        let command = in_working_copy(ShellCommand::shell(argument), context);
        Ok(self.runner.run(&command).await?)
    }
}
