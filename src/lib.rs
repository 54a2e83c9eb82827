//! Deploy websites from git on every push.
//!
//! ## How it works
//!
//! `bear` is built up from **sites** and a **listener**. The listener receives
//! push notifications of the upstream repositories (e.g. GitHub webhooks) and
//! hands them to the sites subscribed to the repository. Every site decides
//! which deployments the notification triggers, and runs a pipeline for each:
//! the working copy is updated from the remote, the hooks run in it (e.g.
//! installing dependencies or building) and it is mirrored to the target.
//!
//! ```ignore
//! +----------+       +------+       +---------+       +-------+       +--------+
//! | listener | ----> | site | ----> | git     | ----> | hooks | ----> | mirror |
//! +----------+       +------+       +---------+       +-------+       +--------+
//! ```
//!
//! Pushes to the live branch are mirrored to the live directory, every pushed
//! branch is mirrored to its own directory under the staging root.

/// The configuration of a site.
pub mod config;
/// The deployment unit of a site, running the pipeline on notifications.
pub mod deploy;
/// The factory of the sites sharing a listening port.
pub mod deployer;
/// Access to the local filesystem.
pub mod files;
/// Updating the working copy from the remote repository.
pub mod git;
/// Named steps running in the working copy (e.g. [installing dependencies](hooks::builtin::InstallDependencies)).
pub mod hooks;
/// Receiving the push notifications of the upstream repositories.
pub mod listener;
/// Running child processes.
pub mod process;
/// What a deployment should check out.
pub mod request;
/// Mirroring the working copy to the target directories.
pub mod tree;
