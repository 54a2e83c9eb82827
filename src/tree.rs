use crate::{
    files::FileStore,
    process::{ProcessError, ProcessRunner, ShellCommand},
};
use async_trait::async_trait;
use log::{debug, error, info};
use mockall::automock;
use std::{path::Path, sync::Arc};
use thiserror::Error;

/// A custom error describing the error cases for mirroring a tree.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The destination did not exist and it cannot be created.
    #[error("cannot create {0} ({1})")]
    CreateDirectoryFailed(String, String),
    /// The mirroring command failed.
    #[error("syncing changes to {0} failed: {1}")]
    MirrorFailed(String, ProcessError),
}

/// Mirrors a directory tree into another one.
#[automock]
#[async_trait]
pub trait TreeSync: Send + Sync {
    /// Make the destination a copy of the source. Files only in the destination are
    /// deleted and the `.git` directory is never copied or deleted.
    async fn sync(&self, source: &Path, destination: &Path) -> Result<(), SyncError>;
}

/// Mirrors trees with `rsync`, comparing files by checksum so unchanged files are not copied.
pub struct RsyncTree {
    files: Arc<dyn FileStore>,
    runner: Arc<dyn ProcessRunner>,
}

fn as_directory(path: &Path) -> String {
    let mut path = path.to_string_lossy().into_owned();
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

impl RsyncTree {
    pub fn new(files: Arc<dyn FileStore>, runner: Arc<dyn ProcessRunner>) -> Self {
        RsyncTree { files, runner }
    }

    /// The trailing slashes make rsync copy the contents of the source, not the directory itself.
    pub fn command(source: &Path, destination: &Path) -> ShellCommand {
        ShellCommand::new(
            "rsync",
            [
                String::from("-r"),
                String::from("--checksum"),
                String::from("--delete-after"),
                String::from("--exclude"),
                String::from(".git"),
                as_directory(source),
                as_directory(destination),
            ],
        )
    }

    async fn ensure_directory(&self, destination: &Path) -> Result<(), SyncError> {
        if self.files.exists(destination).await {
            return Ok(());
        }

        match self.files.create_dir_all(destination).await {
            Ok(()) => {
                info!("Created {}.", destination.display());
                Ok(())
            }
            Err(err) => {
                error!("Creating {} failed: {err}.", destination.display());
                Err(SyncError::CreateDirectoryFailed(
                    destination.to_string_lossy().into_owned(),
                    err.to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl TreeSync for RsyncTree {
    async fn sync(&self, source: &Path, destination: &Path) -> Result<(), SyncError> {
        self.ensure_directory(destination).await?;

        let command = RsyncTree::command(source, destination);
        match self.runner.run(&command).await {
            Ok(output) => {
                info!("Synced changes to {}.", destination.display());
                output.lines().for_each(|line| debug!("{line}"));
                Ok(())
            }
            Err(err) => {
                error!("Syncing changes to {} failed: {err}.", destination.display());
                if let Some(output) = err.output() {
                    output.lines().for_each(|line| debug!("{line}"));
                }
                Err(SyncError::MirrorFailed(
                    destination.to_string_lossy().into_owned(),
                    err,
                ))
            }
        }
    }
}
