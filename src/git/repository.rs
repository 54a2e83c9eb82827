use super::{credentials::CredentialHandler, GitError};
use git2::{build::CheckoutBuilder, AutotagOption, FetchOptions, Oid, RemoteCallbacks, Repository};
use std::path::Path;

/// A working copy opened with libgit2.
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    pub fn open(directory: &Path) -> Result<Self, GitError> {
        let repo = Repository::open(directory).map_err(|err| {
            GitError::NotAGitRepository(
                directory.to_string_lossy().into_owned(),
                err.message().to_string(),
            )
        })?;

        Ok(GitRepository { repo })
    }

    /// Fetch every branch and tag of the remote with its configured refspecs.
    // Inspired from: https://github.com/rust-lang/git2-rs/blob/master/examples/fetch.rs
    pub fn fetch(&self, remote_name: &str) -> Result<(), GitError> {
        let fetch_failed = |err: git2::Error| {
            GitError::FetchFailed(remote_name.to_string(), err.message().to_string())
        };

        let mut remote = self.repo.find_remote(remote_name).map_err(fetch_failed)?;

        let git_config = git2::Config::open_default().map_err(fetch_failed)?;
        let mut ch = CredentialHandler::new(git_config);
        let mut cb = RemoteCallbacks::new();
        cb.credentials(move |url, username, allowed| {
            ch.try_next_credential(url, username, allowed)
        });

        let mut opts = FetchOptions::new();
        opts.remote_callbacks(cb);
        opts.download_tags(AutotagOption::All);

        remote
            .fetch::<&str>(&[], Some(&mut opts), None)
            .map_err(fetch_failed)?;

        Ok(())
    }

    /// Force the working tree and a detached HEAD to the target. Local modifications
    /// of tracked files are overwritten.
    pub fn checkout(&self, target: &str) -> Result<Oid, GitError> {
        let checkout_failed = |err: git2::Error| {
            GitError::CheckoutFailed(target.to_string(), err.message().to_string())
        };

        let commit = self
            .repo
            .revparse_single(target)
            .and_then(|object| object.peel_to_commit())
            .map_err(checkout_failed)?;

        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(checkout_failed)?;
        self.repo
            .set_head_detached(commit.id())
            .map_err(checkout_failed)?;

        Ok(commit.id())
    }
}

/// The first seven characters of the commit hash.
pub fn shorthash(sha: &str) -> String {
    sha.chars().take(7).collect()
}
