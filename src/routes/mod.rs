/// Router Module Index
///
/// Routes are split by access level. Authentication is applied once to the
/// protected tree in `create_router`; permission gates are declared per route in
/// `admin`.

/// Routes accessible without a token.
pub mod public;

/// Routes that require a verified bearer token but no specific permission.
pub mod authenticated;

/// User and role management. Every route declares the permission codes it needs.
pub mod admin;
