use axum::{extract::Extension, Json};

use super::caller;
use crate::common::Actor;
use crate::domains::notifications::{self, Notification};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

/// `GET /notifications` - newest first.
pub async fn list_notifications_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
) -> ApiResult<Json<Vec<Notification>>> {
    let actor = caller(actor)?;
    Ok(Json(
        notifications::list_notifications(actor, &state.deps).await?,
    ))
}
