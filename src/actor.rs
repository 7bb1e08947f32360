use serde::Serialize;

use crate::db::models::User;
use crate::error::AppError;

/// The authenticated user a service call acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: i64,
    pub is_admin: bool,
    pub has_verified_photo: bool,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Actor {
            id: user.id,
            is_admin: user.is_admin == 1,
            has_verified_photo: user
                .profile_photo_path
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty()),
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Admins may act on anything; everyone else only on what they own.
    pub fn can_access(&self, owner_id: Option<i64>) -> bool {
        self.is_admin || owner_id == Some(self.id)
    }
}
