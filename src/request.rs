use std::fmt::{self, Display};

/// What a deployment should check out: a branch head or an exact revision on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub branch_name: String,
    pub exact_revision: Option<String>,
}

impl DeploymentRequest {
    /// Request the head of the branch.
    pub fn branch(branch_name: &str) -> Self {
        DeploymentRequest {
            branch_name: branch_name.to_string(),
            exact_revision: None,
        }
    }

    /// Request an exact revision, the branch is kept for naming only.
    pub fn revision(branch_name: &str, exact_revision: &str) -> Self {
        DeploymentRequest {
            branch_name: branch_name.to_string(),
            exact_revision: Some(exact_revision.to_string()),
        }
    }

    /// The git object to check out: the exact revision verbatim if there is one,
    /// otherwise the remote tracking branch.
    pub fn checkout_target(&self, remote: &str) -> String {
        match &self.exact_revision {
            Some(revision) => revision.clone(),
            None => format!("{remote}/{}", self.branch_name),
        }
    }
}

impl Display for DeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exact_revision {
            Some(revision) => write!(f, "{}@{revision}", self.branch_name),
            None => write!(f, "{}", self.branch_name),
        }
    }
}

/// The result of one pipeline stage.
#[derive(Debug)]
pub enum Outcome<E> {
    Succeeded,
    Failed(E),
    /// The stage did not run, because an earlier stage failed and the site halts on failures.
    Skipped,
}

impl<E> Outcome<E> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<E> {
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(_) => Outcome::Succeeded,
            Err(err) => Outcome::Failed(err),
        }
    }
}
