// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Security Level: Authenticate + Authorize(policy) per route
// Middleware: global chain, then route chain

pub mod test_auth;
pub mod users;

pub use test_auth::test_auth;
pub use users::query_by_id;
