use crate::request::DeploymentRequest;
use async_trait::async_trait;
use log::debug;
use mockall::automock;
use std::path::Path;
use thiserror::Error;

mod credentials;
mod repository;

pub use repository::{shorthash, GitRepository};

/// A custom error describing the error cases for updating the working copy.
#[derive(Debug, Error)]
pub enum GitError {
    /// The directory is not a valid git repository.
    #[error("{0} is not a valid git repository ({1})")]
    NotAGitRepository(String, String),
    /// Cannot fetch the remote. This can be a missing remote, a network failure,
    /// an authentication error or many other things.
    #[error("cannot fetch {0} ({1})")]
    FetchFailed(String, String),
    /// Cannot switch the working tree to the target. The target is usually
    /// missing, e.g. the branch is not on the remote.
    #[error("cannot check out {0} ({1})")]
    CheckoutFailed(String, String),
    /// The blocking task running libgit2 was cancelled or panicked.
    #[error("git update was interrupted ({0})")]
    Interrupted(String),
}

/// The state of the working copy after a successful update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitUpdate {
    /// What was checked out, e.g. `origin/master` or a commit hash.
    pub target: String,
    pub commit_sha: String,
}

/// Brings a working copy to a branch or an exact revision of a remote.
#[automock]
#[async_trait]
pub trait GitSync: Send + Sync {
    /// Fetch the remote, then force the checkout of the requested target.
    /// If the fetch fails, the checkout is not attempted.
    async fn update(
        &self,
        working_copy: &Path,
        request: &DeploymentRequest,
        remote: &str,
    ) -> Result<GitUpdate, GitError>;
}

/// Updates the working copy with libgit2 on the blocking thread pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct Git2Sync;

impl Git2Sync {
    fn update_blocking(
        working_copy: &Path,
        request: &DeploymentRequest,
        remote: &str,
    ) -> Result<GitUpdate, GitError> {
        let repo = GitRepository::open(working_copy)?;
        repo.fetch(remote)?;
        debug!("Fetched {remote} in {}.", working_copy.display());

        let target = request.checkout_target(remote);
        let commit = repo.checkout(&target)?;

        Ok(GitUpdate {
            target,
            commit_sha: commit.to_string(),
        })
    }
}

#[async_trait]
impl GitSync for Git2Sync {
    async fn update(
        &self,
        working_copy: &Path,
        request: &DeploymentRequest,
        remote: &str,
    ) -> Result<GitUpdate, GitError> {
        let working_copy = working_copy.to_path_buf();
        let request = request.clone();
        let remote = remote.to_string();

        tokio::task::spawn_blocking(move || {
            Git2Sync::update_blocking(&working_copy, &request, &remote)
        })
        .await
        .map_err(|err| GitError::Interrupted(err.to_string()))?
    }
}
