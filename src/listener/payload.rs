use super::{ListenerError, PushNotification};
use serde::Deserialize;
use serde_json::Value;

const DELETED_SHA: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
struct Owner {
    name: Option<String>,
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: Option<String>,
    full_name: Option<String>,
    owner: Option<Owner>,
}

/// The parts of a GitHub-style push event we use.
#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    reference: String,
    after: Option<String>,
    base_ref: Option<String>,
    repository: Option<Repository>,
}

impl Repository {
    fn identifier(&self) -> Option<String> {
        if let Some(full_name) = &self.full_name {
            return Some(full_name.clone());
        }
        let owner = self.owner.as_ref()?;
        let owner = owner.name.as_ref().or(owner.login.as_ref())?;
        let name = self.name.as_ref()?;
        Some(format!("{owner}/{name}"))
    }
}

/// Normalize a push event to a notification.
///
/// Returns `None` for events that cannot be deployed: deleted refs, refs that are
/// neither branches nor tags and tags without a known branch.
pub fn normalize(payload: &Value) -> Result<Option<PushNotification>, ListenerError> {
    let event = PushEvent::deserialize(payload)
        .map_err(|err| ListenerError::InvalidPayload(err.to_string()))?;

    let exact_revision = event.after.filter(|sha| !sha.is_empty());
    if exact_revision.as_deref() == Some(DELETED_SHA) {
        return Ok(None);
    }

    let (branch_name, tag_name) =
        if let Some(branch) = event.reference.strip_prefix("refs/heads/") {
            (branch.to_string(), None)
        } else if let Some(tag) = event.reference.strip_prefix("refs/tags/") {
            let branch = event
                .base_ref
                .as_deref()
                .and_then(|base_ref| base_ref.strip_prefix("refs/heads/"));
            match branch {
                Some(branch) => (branch.to_string(), Some(tag.to_string())),
                None => return Ok(None),
            }
        } else {
            return Ok(None);
        };

    Ok(Some(PushNotification {
        branch_name,
        tag_name,
        exact_revision,
        repository: event.repository.as_ref().and_then(Repository::identifier),
    }))
}
