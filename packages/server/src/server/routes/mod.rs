// HTTP routes
pub mod audits;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod optimizations;
pub mod purchases;

pub use audits::*;
pub use health::*;
pub use jobs::*;
pub use notifications::*;
pub use optimizations::*;
pub use purchases::*;

use axum::extract::Extension;

use crate::common::{require_actor, Actor, PipelineResult};

/// The authenticated caller, or `AuthenticationRequired`.
pub(crate) fn caller(actor: Option<Extension<Actor>>) -> PipelineResult<Actor> {
    require_actor(actor.map(|Extension(actor)| actor))
}
