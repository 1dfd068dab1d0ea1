use super::{DEVICE_EDGE, ENTITY, PARENT_EDGE};
use crate::core::{EntError, Result, Value};
use crate::entity::EntityMutation;
use crate::hook::Mutation;
use crate::schema::Id;
use std::any::Any;

/// Pending changes of a `Session` create.
#[derive(Debug, Clone, Default)]
pub struct SessionMutation {
    id: Option<Id>,
    device: Option<Id>,
    cleared_device: bool,
    parent: Option<Id>,
    cleared_parent: bool,
    done: bool,
}

impl SessionMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_device_id(&mut self, id: Id) {
        self.device = Some(id);
    }

    pub fn device_id(&self) -> Option<Id> {
        self.device
    }

    /// IDs of the `device` edge; at most one for a unique edge.
    pub fn device_ids(&self) -> Vec<Id> {
        self.device.into_iter().collect()
    }

    pub fn clear_device(&mut self) {
        self.cleared_device = true;
    }

    pub fn device_cleared(&self) -> bool {
        self.cleared_device
    }

    pub fn reset_device(&mut self) {
        self.device = None;
        self.cleared_device = false;
    }

    pub fn set_parent_id(&mut self, id: Id) {
        self.parent = Some(id);
    }

    pub fn parent_id(&self) -> Option<Id> {
        self.parent
    }

    pub fn parent_ids(&self) -> Vec<Id> {
        self.parent.into_iter().collect()
    }

    pub fn clear_parent(&mut self) {
        self.cleared_parent = true;
    }

    pub fn parent_cleared(&self) -> bool {
        self.cleared_parent
    }

    pub fn reset_parent(&mut self) {
        self.parent = None;
        self.cleared_parent = false;
    }

    fn guard(&self) -> Result<()> {
        if self.done {
            return Err(EntError::MutationDone("SessionMutation"));
        }
        Ok(())
    }
}

impl EntityMutation for SessionMutation {
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

impl Mutation for SessionMutation {
    fn type_name(&self) -> &'static str {
        "SessionMutation"
    }

    fn entity(&self) -> &'static str {
        ENTITY
    }

    fn id_value(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    // Session has no scalar fields besides its ID.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_field(&mut self, name: &str, _value: Value) -> Result<()> {
        self.guard()?;
        Err(EntError::UnknownField {
            entity: ENTITY,
            field: name.to_string(),
        })
    }

    fn added_edges(&self) -> Vec<&'static str> {
        let mut edges = Vec::new();
        if self.device.is_some() {
            edges.push(DEVICE_EDGE);
        }
        if self.parent.is_some() {
            edges.push(PARENT_EDGE);
        }
        edges
    }

    fn added_ids(&self, edge: &str) -> Vec<Value> {
        match edge {
            DEVICE_EDGE => self.device_ids().into_iter().map(Value::from).collect(),
            PARENT_EDGE => self.parent_ids().into_iter().map(Value::from).collect(),
            _ => Vec::new(),
        }
    }

    fn add_edge_id(&mut self, edge: &str, id: Value) -> Result<()> {
        self.guard()?;
        let target = |id: &Value| {
            Id::try_from(id).map_err(|_| EntError::UnexpectedValueType {
                field: edge.to_string(),
                found: id.type_name(),
            })
        };
        match edge {
            DEVICE_EDGE => self.set_device_id(target(&id)?),
            PARENT_EDGE => self.set_parent_id(target(&id)?),
            _ => {
                return Err(EntError::UnknownEdge {
                    entity: ENTITY,
                    edge: edge.to_string(),
                });
            }
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::new_id;

    #[test]
    fn test_generic_edge_setters() {
        let mut m = SessionMutation::new();
        let device = new_id();
        m.add_edge_id("device", Value::from(device)).unwrap();
        assert_eq!(m.device_id(), Some(device));
        assert_eq!(m.added_edges(), vec!["device"]);
        assert_eq!(m.added_ids("device"), vec![Value::from(device)]);

        let err = m.add_edge_id("device", Value::Text("x".into())).unwrap_err();
        assert!(matches!(err, EntError::UnexpectedValueType { found: "TEXT", .. }));
        let err = m.add_edge_id("owner", Value::from(device)).unwrap_err();
        assert!(matches!(err, EntError::UnknownEdge { .. }));
        let err = m.set_field("name", Value::Text("x".into())).unwrap_err();
        assert!(matches!(err, EntError::UnknownField { .. }));
    }

    #[test]
    fn test_completed_mutation_rejects_writes() {
        let mut m = SessionMutation::new();
        let id = new_id();
        m.complete(id);
        assert!(m.is_done());
        assert_eq!(EntityMutation::id(&m), Some(id));
        let err = m.add_edge_id("parent", Value::from(new_id())).unwrap_err();
        assert!(matches!(err, EntError::MutationDone("SessionMutation")));
        assert!(m.parent_id().is_none());
    }

    #[test]
    fn test_reset_edges() {
        let mut m = SessionMutation::new();
        m.set_parent_id(new_id());
        m.clear_parent();
        assert!(m.parent_cleared());
        m.reset_parent();
        assert!(m.parent_id().is_none());
        assert!(!m.parent_cleared());
    }
}
