//! Recommended imports grouped by abstraction level.
//!
//! The top level covers application code creating entities. `advanced`
//! exposes the executor and SQL layers for drivers and hook authors.

pub use crate::entity::{Entity, EntityMutation};
pub use crate::hook::{Hook, Mutation, Next, Node};
pub use crate::{
    Client, ConflictOption, Config, Device, Dialect, EntError, Id, Result, Session,
};

pub mod advanced {
    //! Escape hatch for the executor, statement and driver layers.
    pub use crate::dialect::sql::{Assignment, Insert, UpdateSet};
    pub use crate::dialect::{DebugDriver, Driver, ExecResult, MemoryDriver, TimeoutDriver};
    pub use crate::hook::{Chain, HookSlot, Hooks, Mutator};
    pub use crate::sqlgraph::{
        BatchCreateSpec, CreateSpec, EdgeSpec, EdgeTarget, FieldSpec, Rel, batch_create,
        create_node,
    };
}
