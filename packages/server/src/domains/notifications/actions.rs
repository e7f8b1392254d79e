//! Notification delivery and reads.

use tracing::{debug, warn};

use crate::common::{Actor, PipelineResult};
use crate::kernel::{EmailMessage, ServerDeps};

use super::models::{NewNotification, Notification};

/// Mirror a stored notification to the owner's inbox.
///
/// Best effort: a missing user record or a provider failure is logged and
/// swallowed. The notification itself was already written with the
/// transition.
pub async fn email_notification(notification: &NewNotification, deps: &ServerDeps) {
    let user = match deps.store.find_user(notification.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!(user_id = %notification.user_id, "no user record, skipping email");
            return;
        }
        Err(e) => {
            warn!(user_id = %notification.user_id, error = %e, "failed to load user for email");
            return;
        }
    };

    let mut text = notification.message.clone();
    if let Some(link) = &notification.link {
        text.push_str("\n\n");
        text.push_str(&deps.link(link));
    }

    let message = EmailMessage {
        to: user.email,
        subject: notification.title.clone(),
        text,
    };

    if let Err(e) = deps.email.send(message).await {
        warn!(
            user_id = %notification.user_id,
            kind = %notification.kind,
            error = %e,
            "failed to send notification email"
        );
    }
}

/// The caller's notifications, newest first.
pub async fn list_notifications(actor: Actor, deps: &ServerDeps) -> PipelineResult<Vec<Notification>> {
    Ok(deps.store.list_notifications(actor.user_id).await?)
}
