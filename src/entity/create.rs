use super::{Entity, EntityMutation};
use crate::client::Config;
use crate::core::{EntError, Result};
use crate::dialect::Dialect;
use crate::dialect::sql::{ConflictOption, UpdateSet};
use crate::hook::{Chain, HookSlot, Mutation, Mutator, Node};
use crate::sqlgraph;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use tracing::{Instrument, Level, debug_span, event};

/// Builder for creating one entity.
pub struct Create<E: Entity> {
    pub(crate) config: Config,
    pub(crate) mutation: E::Mutation,
    pub(crate) hooks: Vec<HookSlot>,
    pub(crate) conflict: Vec<ConflictOption>,
}

impl<E: Entity> Create<E> {
    /// A builder carrying the hooks registered for `E` at this moment.
    pub fn new(config: Config) -> Self {
        let hooks = config.hooks().slots(E::NAME);
        Self {
            config,
            mutation: E::Mutation::default(),
            hooks,
            conflict: Vec::new(),
        }
    }

    pub fn set_id(mut self, id: E::Id) -> Self {
        self.mutation.set_id(id);
        self
    }

    pub fn set_nillable_id(self, id: Option<E::Id>) -> Self {
        match id {
            Some(id) => self.set_id(id),
            None => self,
        }
    }

    pub fn mutation(&self) -> &E::Mutation {
        &self.mutation
    }

    pub fn mutation_mut(&mut self) -> &mut E::Mutation {
        &mut self.mutation
    }

    /// Create the entity and return the stored record.
    pub async fn save(self) -> Result<E> {
        let span = debug_span!("entgraph.create", entity = E::NAME, hooks = self.hooks.len());
        self.save_node().instrument(span).await
    }

    pub async fn exec(self) -> Result<()> {
        self.save().await.map(|_| ())
    }

    /// Replace the conflict policy of the insert with `opts`.
    pub fn on_conflict(mut self, opts: Vec<ConflictOption>) -> UpsertOne<E> {
        self.conflict = opts;
        UpsertOne { create: self }
    }

    /// Add a conflict target to the insert.
    pub fn on_conflict_columns<I, S>(mut self, columns: I) -> UpsertOne<E>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict.push(ConflictOption::columns(columns));
        UpsertOne { create: self }
    }
}

impl<E: Entity> std::fmt::Debug for Create<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Create")
            .field("entity", &E::NAME)
            .field("id", &self.mutation.id())
            .field("hooks", &self.hooks.len())
            .field("conflict", &self.conflict)
            .finish()
    }
}

impl<E: Entity> Create<E> {
    async fn save_node(mut self) -> Result<E> {
        E::defaults(&mut self.mutation);
        let chain = Chain::new(&self.hooks)?;

        if chain.is_empty() {
            E::check(&self.mutation)?;
            let node = persist::<E>(&self.config, &self.mutation, &self.conflict).await?;
            self.mutation.complete(node.id().clone());
            return Ok(node);
        }

        let mut terminal = SaveNode::<E> {
            config: &self.config,
            conflict: &self.conflict,
            entity: PhantomData,
        };
        let node = chain.run(&mut self.mutation, &mut terminal).await?;
        node.downcast::<E>()
            .map_err(|node| EntError::UnexpectedNodeType {
                found: node.type_name(),
                mutation: self.mutation.type_name(),
            })
    }
}

/// Insert the row described by `m` and return the record it became.
async fn persist<E: Entity>(
    config: &Config,
    m: &E::Mutation,
    conflict: &[ConflictOption],
) -> Result<E> {
    let (mut node, mut spec) = E::create_spec(m);
    spec.on_conflict = conflict.to_vec();
    if let Err(err) = sqlgraph::create_node(config.driver(), &mut spec).await {
        event!(Level::WARN, entity = E::NAME, error = %err, "create failed");
        return Err(EntError::from_db(err));
    }
    if let Some(id) = &spec.id.value {
        node.scan_id(id)?;
    }
    Ok(node)
}

/// Terminal mutator of a single create: validates and persists.
struct SaveNode<'a, E: Entity> {
    config: &'a Config,
    conflict: &'a [ConflictOption],
    entity: PhantomData<E>,
}

#[async_trait]
impl<'a, E: Entity> Mutator for SaveNode<'a, E> {
    async fn mutate(&mut self, m: &mut dyn Mutation) -> Result<Node> {
        let found = m.type_name();
        let mutation = m
            .as_any_mut()
            .downcast_mut::<E::Mutation>()
            .ok_or(EntError::UnexpectedMutationType(found))?;
        E::check(mutation)?;
        let node = persist::<E>(self.config, mutation, self.conflict).await?;
        mutation.complete(node.id().clone());
        Ok(Node::new(node))
    }
}

/// Resolver applied by `update_new_values`: a client-supplied ID keeps the
/// value stored in the conflicting row.
pub(super) fn keep_id<E: Entity>() -> ConflictOption {
    ConflictOption::resolve_with(|set: &mut UpdateSet| {
        if set.has_column(E::FIELD_ID) {
            set.set_ignore(E::FIELD_ID);
        }
    })
}

/// Typed view over the assignments applied to a conflicting row.
pub struct Upsert<'a, E> {
    set: &'a mut UpdateSet,
    entity: PhantomData<E>,
}

impl<'a, E: Entity> Upsert<'a, E> {
    pub fn new(set: &'a mut UpdateSet) -> Self {
        Self {
            set,
            entity: PhantomData,
        }
    }

    /// Overwrite the ID with the value proposed for insertion.
    pub fn update_id(&mut self) -> &mut Self {
        self.set.set_excluded(E::FIELD_ID);
        self
    }
}

impl<E> Deref for Upsert<'_, E> {
    type Target = UpdateSet;

    fn deref(&self) -> &UpdateSet {
        self.set
    }
}

impl<E> DerefMut for Upsert<'_, E> {
    fn deref_mut(&mut self) -> &mut UpdateSet {
        self.set
    }
}

/// Upsert configurator for one entity.
pub struct UpsertOne<E: Entity> {
    create: Create<E>,
}

impl<E: Entity> UpsertOne<E> {
    /// On conflict, set every column to its current value.
    pub fn ignore(mut self) -> Self {
        self.create.conflict.push(ConflictOption::ResolveWithIgnore);
        self
    }

    /// On conflict, leave the existing row untouched.
    pub fn do_nothing(mut self) -> Self {
        self.create.conflict.push(ConflictOption::DoNothing);
        self
    }

    /// On conflict, overwrite the row with the proposed values. A
    /// client-supplied ID is not overwritten.
    pub fn update_new_values(mut self) -> Self {
        self.create.conflict.push(ConflictOption::ResolveWithNewValues);
        self.create.conflict.push(keep_id::<E>());
        self
    }

    /// On conflict, apply the assignments chosen by `set`.
    pub fn update<F>(mut self, set: F) -> Self
    where
        F: Fn(&mut Upsert<'_, E>) + Send + Sync + 'static,
    {
        self.create
            .conflict
            .push(ConflictOption::resolve_with(move |update: &mut UpdateSet| {
                set(&mut Upsert::new(update))
            }));
        self
    }

    pub fn conflict_options(&self) -> &[ConflictOption] {
        &self.create.conflict
    }

    /// The underlying builder, conflict policy included.
    pub fn into_create(self) -> Create<E> {
        self.create
    }

    pub async fn exec(self) -> Result<()> {
        if self.create.conflict.is_empty() {
            return Err(EntError::MissingConflictOptions(E::CREATE));
        }
        self.create.exec().await
    }

    /// ID of the row after conflict resolution.
    pub async fn id(self) -> Result<E::Id> {
        let dialect = self.create.config.dialect();
        if dialect == Dialect::MySql {
            // MySQL cannot read back the ID of an updated row.
            return Err(EntError::UpsertIdUnsupported {
                upsert: E::UPSERT_ONE,
                dialect: "MySQL",
            });
        }
        if self.create.conflict.is_empty() {
            return Err(EntError::MissingConflictOptions(E::CREATE));
        }
        let node = self.create.save().await?;
        Ok(node.id().clone())
    }
}
