// ============================================================================
// entgraph: typed create builders over a graph persistence executor
// ============================================================================

pub mod client;
pub mod core;
pub mod device;
pub mod dialect;
pub mod entity;
pub mod hook;
pub mod migrate;
pub mod prelude;
pub mod schema;
pub mod session;
pub mod sqlgraph;

// Re-export main types for convenience
pub use client::{Client, Config, EntityClient};
pub use core::{
    ConstraintError, DbError, EntError, Result, ValidationError, Value, is_configuration_error,
    is_constraint_error, is_validation_error,
};
pub use dialect::sql::ConflictOption;
pub use dialect::{Dialect, Driver, MemoryDriver};
pub use schema::Id;

// Re-export builders
pub use device::{Device, DeviceCreate, DeviceCreateBulk, DeviceMutation};
pub use entity::{Create, CreateBulk, Entity, EntityMutation, Upsert, UpsertBulk, UpsertOne};
pub use hook::{Chain, Hook, HookSlot, Hooks, Mutation, Mutator, Next, Node};
pub use session::{
    Session, SessionCreate, SessionCreateBulk, SessionMutation, SessionUpsert, SessionUpsertBulk,
    SessionUpsertOne,
};
