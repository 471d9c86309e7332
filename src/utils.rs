//! Small helpers.

use uuid::Uuid;

use crate::matching::MAGIC_COOKIE;

/// Generates an RFC 3261 branch parameter: the magic cookie followed by a
/// random unique token.
pub fn generate_branch() -> String {
    format!("{}-{}", MAGIC_COOKIE, Uuid::new_v4().simple())
}
