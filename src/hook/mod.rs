//! Mutations and the interceptor chain wrapped around their persistence.
//!
//! Hooks are registered per entity type. When a builder saves, its slots are
//! composed by [`Chain::new`] into invocation order: the last registered hook
//! runs first and the innermost step is the builder's own [`Mutator`].

use crate::core::{EntError, Result, Value};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Pending changes of one entity, as seen by hooks.
pub trait Mutation: Any + Send + Sync {
    /// Concrete mutation type, e.g. `SessionMutation`.
    fn type_name(&self) -> &'static str;

    /// Entity type this mutation creates, e.g. `Session`.
    fn entity(&self) -> &'static str;

    /// The ID assigned so far, if any.
    fn id_value(&self) -> Option<Value>;

    /// Value of a scalar field, if assigned.
    fn field(&self, name: &str) -> Option<Value>;

    /// Assign a scalar field through its untyped value.
    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;

    /// Names of the edges that received an ID.
    fn added_edges(&self) -> Vec<&'static str>;

    /// IDs assigned to the named edge.
    fn added_ids(&self, edge: &str) -> Vec<Value>;

    /// Assign an ID to the named edge through its untyped value.
    fn add_edge_id(&mut self, edge: &str, id: Value) -> Result<()>;

    /// Whether the mutation was persisted and must not change anymore.
    fn is_done(&self) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Type-erased value produced by a mutation chain; normally the created
/// entity record.
pub struct Node {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Node {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Any>(self) -> std::result::Result<T, Node> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|value| Node { value, type_name })
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("type", &self.type_name).finish()
    }
}

/// Innermost step of a chain: the operation the hooks wrap.
#[async_trait]
pub trait Mutator: Send {
    async fn mutate(&mut self, m: &mut dyn Mutation) -> Result<Node>;
}

/// An interceptor around persistence.
///
/// A hook may inspect or change the mutation, pass another mutation on,
/// return its own node without calling `next`, or call `next.run` once and
/// post-process the result.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn mutate(&self, m: &mut dyn Mutation, next: Next<'_>) -> Result<Node>;
}

/// A registered hook, or `None` for a slot whose runtime registration never
/// happened.
pub type HookSlot = Option<Arc<dyn Hook>>;

/// Cursor over the remaining hooks of a running chain.
pub struct Next<'a> {
    hooks: &'a [Arc<dyn Hook>],
    terminal: &'a mut (dyn Mutator + 'a),
}

impl<'a> Next<'a> {
    /// Hand the mutation to the next hook, or to the terminal mutator once
    /// all hooks have run.
    pub async fn run(self, m: &mut dyn Mutation) -> Result<Node> {
        match self.hooks.split_first() {
            Some((hook, rest)) => {
                let next = Next {
                    hooks: rest,
                    terminal: self.terminal,
                };
                hook.mutate(m, next).await
            }
            None => self.terminal.mutate(m).await,
        }
    }

    /// Hooks still ahead of the terminal mutator.
    pub fn remaining(&self) -> usize {
        self.hooks.len()
    }
}

/// Hooks of one builder, composed in invocation order.
pub struct Chain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl Chain {
    /// Compose `slots`, registered first to last, into an outermost-first
    /// chain. Fails on the first unset slot before any hook runs.
    pub fn new(slots: &[HookSlot]) -> Result<Self> {
        let mut hooks = Vec::with_capacity(slots.len());
        for slot in slots.iter().rev() {
            let hook = slot.as_ref().ok_or(EntError::UninitializedHook)?;
            hooks.push(Arc::clone(hook));
        }
        Ok(Self { hooks })
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Hook names in the order they are entered.
    pub fn order(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    pub async fn run<'a>(
        &'a self,
        m: &mut dyn Mutation,
        terminal: &'a mut (dyn Mutator + 'a),
    ) -> Result<Node> {
        Next {
            hooks: &self.hooks,
            terminal,
        }
        .run(m)
        .await
    }
}

/// Hook slots registered per entity type.
#[derive(Clone, Default)]
pub struct Hooks {
    by_entity: HashMap<&'static str, Vec<HookSlot>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: &'static str, hook: Arc<dyn Hook>) {
        self.push_slot(entity, Some(hook));
    }

    pub fn push_slot(&mut self, entity: &'static str, slot: HookSlot) {
        self.by_entity.entry(entity).or_default().push(slot);
    }

    pub fn slots(&self, entity: &str) -> Vec<HookSlot> {
        self.by_entity.get(entity).cloned().unwrap_or_default()
    }

    pub fn len(&self, entity: &str) -> usize {
        self.by_entity.get(entity).map_or(0, Vec::len)
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .by_entity
            .iter()
            .map(|(entity, slots)| (*entity, slots.len()))
            .collect();
        f.debug_struct("Hooks").field("slots", &counts).finish()
    }
}
