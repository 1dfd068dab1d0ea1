//! The `Device` entity, target of the `Session.device` edge.

use crate::core::{DataType, DbError, EntError, Result, ValidationError, Value};
use crate::entity::{Create, CreateBulk, Entity, EntityMutation};
use crate::hook::Mutation;
use crate::schema::{self, Id};
use crate::sqlgraph::{CreateSpec, FieldSpec};
use serde::{Deserialize, Serialize};
use std::any::Any;

pub const ENTITY: &str = "Device";
pub const TABLE: &str = "devices";
pub const FIELD_ID: &str = "id";

pub type DeviceCreate = Create<Device>;
pub type DeviceCreateBulk = CreateBulk<Device>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Id,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceMutation {
    id: Option<Id>,
    done: bool,
}

impl EntityMutation for DeviceMutation {
    type Id = Id;

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = Some(id);
    }

    fn clear_id(&mut self) {
        self.id = None;
    }

    fn complete(&mut self, id: Id) {
        self.id = Some(id);
        self.done = true;
    }
}

impl Mutation for DeviceMutation {
    fn type_name(&self) -> &'static str {
        "DeviceMutation"
    }

    fn entity(&self) -> &'static str {
        ENTITY
    }

    fn id_value(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_field(&mut self, name: &str, _value: Value) -> Result<()> {
        if self.done {
            return Err(EntError::MutationDone("DeviceMutation"));
        }
        Err(EntError::UnknownField {
            entity: ENTITY,
            field: name.to_string(),
        })
    }

    fn added_edges(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn added_ids(&self, _edge: &str) -> Vec<Value> {
        Vec::new()
    }

    fn add_edge_id(&mut self, edge: &str, _id: Value) -> Result<()> {
        if self.done {
            return Err(EntError::MutationDone("DeviceMutation"));
        }
        Err(EntError::UnknownEdge {
            entity: ENTITY,
            edge: edge.to_string(),
        })
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Entity for Device {
    type Id = Id;
    type Mutation = DeviceMutation;

    const NAME: &'static str = ENTITY;
    const TABLE: &'static str = TABLE;
    const FIELD_ID: &'static str = FIELD_ID;
    const CREATE: &'static str = "DeviceCreate";
    const CREATE_BULK: &'static str = "DeviceCreateBulk";
    const UPSERT_ONE: &'static str = "DeviceUpsertOne";

    fn id(&self) -> &Id {
        &self.id
    }

    fn defaults(m: &mut DeviceMutation) {
        if m.id().is_none() {
            m.set_id(schema::new_id());
        }
    }

    fn check(m: &DeviceMutation) -> Result<()> {
        if let Some(id) = m.id() {
            schema::validate_id(id.as_bytes()).map_err(|err| ValidationError {
                entity: ENTITY,
                name: FIELD_ID,
                source: Box::new(err),
            })?;
        }
        Ok(())
    }

    fn create_spec(m: &DeviceMutation) -> (Self, CreateSpec) {
        let mut node = Device { id: Id::NIL };
        let mut spec = CreateSpec::new(TABLE, FieldSpec::new(FIELD_ID, DataType::Bytes));
        if let Some(id) = m.id() {
            node.id = id;
            spec.id.value = Some(Value::from(id));
        }
        (node, spec)
    }

    fn scan_id(&mut self, value: &Value) -> Result<()> {
        self.id = Id::try_from(value)
            .map_err(|err| EntError::Db(DbError::TypeMismatch(err.to_string())))?;
        Ok(())
    }
}
