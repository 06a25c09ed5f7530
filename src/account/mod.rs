/// Account domain: records, data accessors, the multi-shard saga
/// coordinator, the deletion lifecycle and the minor-protection gate.

pub mod deletion;
pub mod minor;
pub mod saga;
pub mod store;
pub mod types;
