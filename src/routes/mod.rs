/// Router Module Index
///
/// Routes are split by access level. The split is enforced with router layers in
/// `create_router`, not inside handlers.

/// Routes open to anonymous clients: health check and account entry points.
pub mod public;

/// Routes behind the bearer-token guard.
pub mod authenticated;
