use crate::{config::SiteConfig, listener::PushNotification, request::DeploymentRequest};

/// The deployments a notification triggers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub live: Option<DeploymentRequest>,
    pub stage: DeploymentRequest,
}

/// Decide which deployments to run for a notification.
///
/// Pushes to the live branch go live, unless the site only deploys tags: then
/// only tag pushes go live, at the tagged commit. Every push is staged.
pub fn plan(config: &SiteConfig, notification: &PushNotification) -> DeploymentPlan {
    let live = if notification.branch_name != config.live_branch {
        None
    } else if !config.deploy_on_tag {
        Some(DeploymentRequest::branch(&config.live_branch))
    } else if notification.tag_name.is_some() {
        Some(DeploymentRequest {
            branch_name: config.live_branch.clone(),
            exact_revision: notification.exact_revision.clone(),
        })
    } else {
        None
    };

    DeploymentPlan {
        live,
        stage: DeploymentRequest::branch(&notification.branch_name),
    }
}
