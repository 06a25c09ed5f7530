/// Shard routing and connection registry
///
/// Accounts, the identity hash index, per-tenant game users and deletion
/// applications each live in their own partition space. Routing is pure and
/// deterministic so every service instance agrees without coordination.

pub mod registry;
pub mod route;

pub use registry::ShardRegistry;
