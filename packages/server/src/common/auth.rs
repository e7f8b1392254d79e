//! The authenticated principal, passed explicitly into every entry point.

use serde::{Deserialize, Serialize};

use super::entity_ids::UserId;
use super::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Owners and admins may read a resource.
    pub fn can_view(&self, owner: UserId) -> bool {
        self.is_admin || self.user_id == owner
    }

    pub fn ensure_owner(&self, owner: UserId, what: &str) -> PipelineResult<()> {
        if self.user_id == owner {
            Ok(())
        } else {
            Err(PipelineError::PermissionDenied(format!(
                "you do not own this {}",
                what
            )))
        }
    }

    pub fn ensure_can_view(&self, owner: UserId, what: &str) -> PipelineResult<()> {
        if self.can_view(owner) {
            Ok(())
        } else {
            Err(PipelineError::PermissionDenied(format!(
                "you do not own this {}",
                what
            )))
        }
    }

    pub fn ensure_admin(&self) -> PipelineResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(PipelineError::AdminRequired)
        }
    }
}

/// Entry points take `Option<Actor>` from the identity layer; `None` means
/// the request was anonymous.
pub fn require_actor(actor: Option<Actor>) -> PipelineResult<Actor> {
    actor.ok_or(PipelineError::AuthenticationRequired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_checks() {
        let owner = UserId::new();
        let stranger = Actor::user(UserId::new());
        assert!(Actor::user(owner).ensure_owner(owner, "audit").is_ok());
        assert!(matches!(
            stranger.ensure_owner(owner, "audit"),
            Err(PipelineError::PermissionDenied(_))
        ));
        assert!(Actor::admin(UserId::new()).can_view(owner));
        assert!(!stranger.can_view(owner));
    }

    #[test]
    fn test_anonymous_rejected() {
        assert!(matches!(
            require_actor(None),
            Err(PipelineError::AuthenticationRequired)
        ));
    }
}
