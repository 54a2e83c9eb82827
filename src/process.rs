use async_trait::async_trait;
use duct::{cmd, Expression};
use duct_sh::sh_dangerous;
use log::trace;
use mockall::automock;
use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// What to execute: a program with its arguments, or a line for the system shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Program {
    Exec { program: String, args: Vec<String> },
    Shell(String),
}

/// A command with its working directory and additional environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: Program,
    pub directory: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    /// Creates a command that runs the program directly, without a shell in between.
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ShellCommand {
            program: Program::Exec {
                program: program.to_string(),
                args: args.into_iter().map(Into::into).collect(),
            },
            directory: None,
            env: vec![],
        }
    }

    /// Creates a command that runs in a subshell (`/bin/sh` on *nix, `cmd.exe` on Windows).
    pub fn shell(line: &str) -> Self {
        ShellCommand {
            program: Program::Shell(line.to_string()),
            directory: None,
            env: vec![],
        }
    }

    pub fn dir(mut self, directory: &Path) -> Self {
        self.directory = Some(directory.to_path_buf());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    fn expression(&self) -> Expression {
        let mut expression = match &self.program {
            Program::Exec { program, args } => cmd(program.as_str(), args),
            // We can run `sh_dangerous`, because the lines come from the site configuration.
            Program::Shell(line) => sh_dangerous(line.as_str()),
        };
        for (key, value) in &self.env {
            expression = expression.env(key, value);
        }
        if let Some(directory) = &self.directory {
            expression = expression.dir(directory);
        }

        expression.stdout_capture().stderr_capture().unchecked()
    }
}

impl Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.program {
            Program::Exec { program, args } if args.is_empty() => write!(f, "{program}"),
            Program::Exec { program, args } => write!(f, "{program} {}", args.join(" ")),
            Program::Shell(line) => write!(f, "{line}"),
        }
    }
}

/// The captured output of a successful command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// Every non-empty line of stdout followed by stderr.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|line| !line.trim().is_empty())
    }
}

/// Custom error describing the error cases for running a command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The underlying Rust command creation failed. The parameter contains the error.
    #[error("the command cannot run: {0}")]
    ProcessFailure(#[from] std::io::Error),
    /// The command returned a non-zero exit code. The captured output is kept
    /// to be reported along with the failure.
    #[error("the command returned non-zero exit code {code}")]
    NonZeroExitcode {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The command output contains non-UTF8 characters.
    #[error("the command returned invalid characters")]
    NonUtf8Return,
    /// The blocking task running the command was cancelled or panicked.
    #[error("the command was interrupted: {0}")]
    Interrupted(String),
}

impl ProcessError {
    /// Captured output of a failed command, if it got far enough to produce any.
    pub fn output(&self) -> Option<Output> {
        match self {
            ProcessError::NonZeroExitcode { stdout, stderr, .. } => Some(Output {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            }),
            _ => None,
        }
    }
}

/// Executes commands and captures their output.
#[automock]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the command to completion. Exit code zero is a success, everything else an error.
    async fn run(&self, command: &ShellCommand) -> Result<Output, ProcessError>;
}

/// Runs commands as child processes on the blocking thread pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRunner;

impl ShellRunner {
    fn run_blocking(command: &ShellCommand) -> Result<Output, ProcessError> {
        trace!("Running {command:?}.");
        let output = command.expression().run()?;

        let stdout = String::from_utf8(output.stdout).map_err(|_| ProcessError::NonUtf8Return)?;
        let stderr = String::from_utf8(output.stderr).map_err(|_| ProcessError::NonUtf8Return)?;
        let stdout = stdout.trim_end().to_string();
        let stderr = stderr.trim_end().to_string();

        if output.status.success() {
            Ok(Output { stdout, stderr })
        } else {
            Err(ProcessError::NonZeroExitcode {
                code: output.status.code().unwrap_or(-1),
                stdout,
                stderr,
            })
        }
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(&self, command: &ShellCommand) -> Result<Output, ProcessError> {
        let command = command.clone();
        tokio::task::spawn_blocking(move || ShellRunner::run_blocking(&command))
            .await
            .map_err(|err| ProcessError::Interrupted(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_display_the_command_line() {
        let command = ShellCommand::new("grunt", ["--no-color", "build"]);
        assert_eq!("grunt --no-color build", command.to_string());

        let command = ShellCommand::new("npm", Vec::<String>::new());
        assert_eq!("npm", command.to_string());

        let command = ShellCommand::shell("make && make install");
        assert_eq!("make && make install", command.to_string());
    }

    #[tokio::test]
    async fn it_should_run_the_command() -> Result<(), ProcessError> {
        let command = ShellCommand::new("echo", ["test"]);

        let output = ShellRunner.run(&command).await?;
        assert_eq!("test", output.stdout);
        assert_eq!("", output.stderr);

        Ok(())
    }

    #[tokio::test]
    async fn it_should_run_in_the_given_directory() -> Result<(), ProcessError> {
        let command = ShellCommand::shell("pwd").dir(Path::new("/"));

        let output = ShellRunner.run(&command).await?;
        assert_eq!("/", output.stdout);

        Ok(())
    }

    #[tokio::test]
    async fn it_should_set_the_env_vars() -> Result<(), ProcessError> {
        let command = ShellCommand::new("printenv", Vec::<String>::new())
            .env("CI", "true")
            .env("BEAR_DIRECTORY", ".");

        let output = ShellRunner.run(&command).await?;
        let lines: Vec<&str> = output.stdout.lines().collect();
        assert!(lines.contains(&"CI=true"));
        assert!(lines.contains(&"BEAR_DIRECTORY=."));

        Ok(())
    }

    #[tokio::test]
    async fn it_should_catch_error_output() -> Result<(), ProcessError> {
        let command = ShellCommand::shell("echo err >&2");

        let output = ShellRunner.run(&command).await?;
        assert_eq!("", output.stdout);
        assert_eq!("err", output.stderr);
        assert_eq!(vec!["err"], output.lines().collect::<Vec<_>>());

        Ok(())
    }

    #[tokio::test]
    async fn it_should_fail_if_the_command_fails() {
        let command = ShellCommand::shell("echo out; echo err >&2; exit 3");

        let result = ShellRunner.run(&command).await;
        assert!(
            matches!(
                &result,
                Err(ProcessError::NonZeroExitcode { code: 3, stdout, stderr })
                    if stdout == "out" && stderr == "err"
            ),
            "{result:?} should match non zero exit code"
        );
    }

    #[tokio::test]
    async fn it_should_fail_if_the_program_is_missing() {
        let command = ShellCommand::new("bear-this-program-does-not-exist", ["x"]);

        let result = ShellRunner.run(&command).await;
        assert!(
            matches!(result, Err(ProcessError::ProcessFailure(_))),
            "{result:?} should match process failure"
        );
    }

    #[tokio::test]
    async fn it_should_fail_if_the_command_returns_non_utf8() {
        let command = ShellCommand::shell("printf '\\303\\050'");

        let result = ShellRunner.run(&command).await;
        assert!(
            matches!(result, Err(ProcessError::NonUtf8Return)),
            "{result:?} should match non utf8 return"
        );
    }
}
