//! Access control policy: identity context × capability → decision.
//!
//! Pure functions, no I/O.

use super::AuthError;
use crate::models::auth::{IdentityContext, Role, UserId};

/// Permission level an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The operation targets this user id; only that user may call it.
    SelfOnly(UserId),
    /// `MODERATOR` or `ADMIN`.
    Moderator,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

/// Decide whether `ctx` holds `required`.
///
/// `SelfOnly` is an identity match and ignores roles entirely.
pub fn authorize(ctx: &IdentityContext, required: Capability) -> Decision {
    let allowed = match required {
        Capability::SelfOnly(target) => ctx.user_id == target,
        Capability::Moderator => ctx.has_role(Role::Moderator) || ctx.has_role(Role::Admin),
        Capability::Admin => ctx.has_role(Role::Admin),
    };
    if allowed {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}

/// [`authorize`] as a `Result`, denial being [`AuthError::InsufficientRole`].
pub fn require(ctx: &IdentityContext, required: Capability) -> Result<(), AuthError> {
    match authorize(ctx, required) {
        Decision::Allowed => Ok(()),
        Decision::Denied => Err(AuthError::InsufficientRole),
    }
}
