//! Typed create builders shared by every entity kind.
//!
//! An [`Entity`] describes how its mutation turns into a [`CreateSpec`];
//! [`Create`], [`CreateBulk`] and their upsert variants drive the hook chain
//! and the graph executor on top of that description.

mod bulk;
mod create;

pub use bulk::{CreateBulk, UpsertBulk};
pub use create::{Create, Upsert, UpsertOne};

use crate::core::{Result, Value};
use crate::hook::Mutation;
use crate::sqlgraph::CreateSpec;
use std::fmt;

/// Typed side of a [`Mutation`], used by the builders.
pub trait EntityMutation: Mutation + Default + Clone {
    type Id: Clone + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> Option<Self::Id>;

    fn set_id(&mut self, id: Self::Id);

    fn clear_id(&mut self);

    /// Record the stored ID and freeze the mutation.
    fn complete(&mut self, id: Self::Id);
}

/// A record type that builders can create.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: Clone + fmt::Debug + Send + Sync + 'static;
    type Mutation: EntityMutation<Id = Self::Id>;

    /// Type name used for hook registration, e.g. `Session`.
    const NAME: &'static str;
    const TABLE: &'static str;
    const FIELD_ID: &'static str;

    /// Builder names as they appear in error messages.
    const CREATE: &'static str;
    const CREATE_BULK: &'static str;
    const UPSERT_ONE: &'static str;

    fn id(&self) -> &Self::Id;

    /// Fill unset fields that declare a default.
    fn defaults(m: &mut Self::Mutation);

    /// Run field validators and required-edge checks.
    fn check(m: &Self::Mutation) -> Result<()>;

    /// Allocate the record and the insert description for `m`.
    fn create_spec(m: &Self::Mutation) -> (Self, CreateSpec);

    /// Store an ID read back from the driver.
    fn scan_id(&mut self, value: &Value) -> Result<()>;
}
