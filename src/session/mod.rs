//! The `Session` entity: a caller-keyed record with an optional owning
//! device and an optional parent session.

mod mutation;

pub use mutation::SessionMutation;

use crate::core::{DataType, DbError, EntError, Result, ValidationError, Value};
use crate::device::{self, Device};
use crate::entity::{Create, CreateBulk, Entity, EntityMutation, Upsert, UpsertBulk, UpsertOne};
use crate::schema::{self, Id};
use crate::sqlgraph::{CreateSpec, EdgeSpec, EdgeTarget, FieldSpec, Rel};
use serde::{Deserialize, Serialize};

pub const ENTITY: &str = "Session";
pub const TABLE: &str = "sessions";
pub const FIELD_ID: &str = "id";

pub const DEVICE_EDGE: &str = "device";
/// Table holding the `device` foreign key.
pub const DEVICE_TABLE: &str = "sessions";
pub const DEVICE_INVERSE_TABLE: &str = device::TABLE;
pub const DEVICE_COLUMN: &str = "device_sessions";

pub const PARENT_EDGE: &str = "parent";
pub const PARENT_TABLE: &str = "sessions";
pub const PARENT_COLUMN: &str = "session_children";

pub type SessionCreate = Create<Session>;
pub type SessionCreateBulk = CreateBulk<Session>;
pub type SessionUpsertOne = UpsertOne<Session>;
pub type SessionUpsertBulk = UpsertBulk<Session>;
pub type SessionUpsert<'a> = Upsert<'a, Session>;

/// Default generator of the `id` field.
pub fn default_id() -> Id {
    schema::new_id()
}

/// Validator of the `id` field.
pub fn id_validator(id: &Id) -> Result<()> {
    schema::validate_id(id.as_bytes()).map_err(|err| {
        EntError::Validation(ValidationError {
            entity: ENTITY,
            name: FIELD_ID,
            source: Box::new(err),
        })
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Id,
    #[serde(skip)]
    device_sessions: Option<Id>,
    #[serde(skip)]
    session_children: Option<Id>,
}

impl Session {
    /// ID of the device owning this session, when set at creation.
    pub fn device_id(&self) -> Option<Id> {
        self.device_sessions
    }

    pub fn parent_id(&self) -> Option<Id> {
        self.session_children
    }
}

fn m2o_edge(
    table: &'static str,
    column: &'static str,
    target_column: &'static str,
    target: Id,
) -> EdgeSpec {
    EdgeSpec {
        rel: Rel::M2O,
        inverse: true,
        table,
        columns: vec![column],
        bidi: false,
        target: EdgeTarget {
            id_spec: FieldSpec::new(target_column, DataType::Bytes),
            nodes: vec![Value::from(target)],
        },
    }
}

impl Entity for Session {
    type Id = Id;
    type Mutation = SessionMutation;

    const NAME: &'static str = ENTITY;
    const TABLE: &'static str = TABLE;
    const FIELD_ID: &'static str = FIELD_ID;
    const CREATE: &'static str = "SessionCreate";
    const CREATE_BULK: &'static str = "SessionCreateBulk";
    const UPSERT_ONE: &'static str = "SessionUpsertOne";

    fn id(&self) -> &Id {
        &self.id
    }

    fn defaults(m: &mut SessionMutation) {
        if m.id().is_none() {
            m.set_id(default_id());
        }
    }

    fn check(m: &SessionMutation) -> Result<()> {
        if let Some(id) = m.id() {
            id_validator(&id)?;
        }
        Ok(())
    }

    fn create_spec(m: &SessionMutation) -> (Self, CreateSpec) {
        let mut node = Session {
            id: Id::NIL,
            device_sessions: None,
            session_children: None,
        };
        let mut spec = CreateSpec::new(TABLE, FieldSpec::new(FIELD_ID, DataType::Bytes));
        if let Some(id) = m.id() {
            node.id = id;
            spec.id.value = Some(Value::from(id));
        }
        if let Some(device) = m.device_id() {
            node.device_sessions = Some(device);
            spec.edges.push(m2o_edge(DEVICE_TABLE, DEVICE_COLUMN, device::FIELD_ID, device));
        }
        if let Some(parent) = m.parent_id() {
            node.session_children = Some(parent);
            spec.edges.push(m2o_edge(PARENT_TABLE, PARENT_COLUMN, FIELD_ID, parent));
        }
        (node, spec)
    }

    fn scan_id(&mut self, value: &Value) -> Result<()> {
        self.id = Id::try_from(value)
            .map_err(|err| EntError::Db(DbError::TypeMismatch(err.to_string())))?;
        Ok(())
    }
}

impl Create<Session> {
    pub fn set_device_id(mut self, id: Id) -> Self {
        self.mutation.set_device_id(id);
        self
    }

    pub fn set_nillable_device_id(self, id: Option<Id>) -> Self {
        match id {
            Some(id) => self.set_device_id(id),
            None => self,
        }
    }

    pub fn set_device(self, device: &Device) -> Self {
        self.set_device_id(device.id)
    }

    pub fn set_parent_id(mut self, id: Id) -> Self {
        self.mutation.set_parent_id(id);
        self
    }

    pub fn set_nillable_parent_id(self, id: Option<Id>) -> Self {
        match id {
            Some(id) => self.set_parent_id(id),
            None => self,
        }
    }

    pub fn set_parent(self, parent: &Session) -> Self {
        self.set_parent_id(parent.id)
    }
}

impl Upsert<'_, Session> {
    /// Point the conflicting row at `id`.
    pub fn set_device_id(&mut self, id: Id) -> &mut Self {
        self.set(DEVICE_COLUMN, id);
        self
    }

    /// Take the device proposed for insertion.
    pub fn update_device_id(&mut self) -> &mut Self {
        self.set_excluded(DEVICE_COLUMN);
        self
    }

    pub fn clear_device(&mut self) -> &mut Self {
        self.set_null(DEVICE_COLUMN);
        self
    }

    pub fn set_parent_id(&mut self, id: Id) -> &mut Self {
        self.set(PARENT_COLUMN, id);
        self
    }

    pub fn update_parent_id(&mut self) -> &mut Self {
        self.set_excluded(PARENT_COLUMN);
        self
    }

    pub fn clear_parent(&mut self) -> &mut Self {
        self.set_null(PARENT_COLUMN);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validator() {
        assert!(id_validator(&default_id()).is_ok());
        let err = id_validator(&Id::NIL).unwrap_err();
        assert!(crate::core::is_validation_error(&err));
        assert!(err.to_string().contains("\"Session.id\""));
    }

    #[test]
    fn test_create_spec_carries_edges() {
        let (id, device, parent) = (default_id(), default_id(), default_id());
        let mut m = SessionMutation::new();
        m.set_id(id);
        m.set_device_id(device);
        m.set_parent_id(parent);

        let (node, spec) = Session::create_spec(&m);
        assert_eq!(node.id, id);
        assert_eq!(node.device_id(), Some(device));
        assert_eq!(node.parent_id(), Some(parent));
        assert_eq!(spec.table, "sessions");
        assert_eq!(spec.id.value, Some(Value::from(id)));
        assert_eq!(spec.edges.len(), 2);
        assert_eq!(spec.edges[0].columns, vec!["device_sessions"]);
        assert_eq!(spec.edges[1].columns, vec!["session_children"]);
    }

    #[test]
    fn test_defaults_keep_explicit_id() {
        let id = default_id();
        let mut m = SessionMutation::new();
        m.set_id(id);
        Session::defaults(&mut m);
        assert_eq!(m.id(), Some(id));

        let mut m = SessionMutation::new();
        Session::defaults(&mut m);
        assert!(m.id().is_some());
    }

    #[test]
    fn test_scan_id_rejects_text() {
        let mut node = Session::create_spec(&SessionMutation::new()).0;
        assert!(node.scan_id(&Value::Text("nope".into())).is_err());
        let id = default_id();
        node.scan_id(&Value::from(id)).unwrap();
        assert_eq!(node.id, id);
    }

    #[test]
    fn test_session_json_omits_foreign_keys() {
        let mut m = SessionMutation::new();
        m.set_id(default_id());
        m.set_device_id(default_id());
        let (node, _) = Session::create_spec(&m);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert_eq!(json["id"], node.id.to_string());
    }
}
