use super::create::{Upsert, keep_id};
use super::{Create, Entity, EntityMutation};
use crate::client::Config;
use crate::core::{EntError, Result};
use crate::dialect::sql::{ConflictOption, UpdateSet};
use crate::hook::{Chain, Mutation, Mutator, Node};
use crate::sqlgraph::{self, BatchCreateSpec, CreateSpec};
use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::{Instrument, Level, event, info_span};

/// Builder for creating many entities with one insert statement.
///
/// Saving happens in two phases. Every builder first runs its own hook chain
/// around a terminal that only validates and materializes the row; once all
/// rows exist, they are inserted together. A failure in the first phase
/// leaves the store untouched.
pub struct CreateBulk<E: Entity> {
    config: Config,
    builders: Vec<Create<E>>,
    conflict: Vec<ConflictOption>,
}

impl<E: Entity> CreateBulk<E> {
    pub fn new(config: Config, builders: Vec<Create<E>>) -> Self {
        Self {
            config,
            builders,
            conflict: Vec::new(),
        }
    }

    pub fn builders(&self) -> &[Create<E>] {
        &self.builders
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Create all entities and return their records in input order.
    pub async fn save(self) -> Result<Vec<E>> {
        let span = info_span!("entgraph.create_bulk", entity = E::NAME, size = self.builders.len());
        self.save_batch().instrument(span).await
    }

    pub async fn exec(self) -> Result<()> {
        self.save().await.map(|_| ())
    }

    /// Replace the conflict policy of the batch insert with `opts`.
    pub fn on_conflict(mut self, opts: Vec<ConflictOption>) -> UpsertBulk<E> {
        self.conflict = opts;
        UpsertBulk { create: self }
    }

    /// Add a conflict target to the batch insert.
    pub fn on_conflict_columns<I, S>(mut self, columns: I) -> UpsertBulk<E>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict.push(ConflictOption::columns(columns));
        UpsertBulk { create: self }
    }

    async fn save_batch(mut self) -> Result<Vec<E>> {
        if self.builders.is_empty() {
            return Ok(Vec::new());
        }

        let mut nodes = Vec::with_capacity(self.builders.len());
        let mut specs = Vec::with_capacity(self.builders.len());
        for (index, builder) in self.builders.iter_mut().enumerate() {
            let (node, spec) = materialize(builder).await.inspect_err(|err| {
                event!(Level::DEBUG, index, error = %err, "bulk item rejected");
            })?;
            nodes.push(node);
            specs.push(spec);
        }

        let mut batch = BatchCreateSpec {
            nodes: specs,
            on_conflict: self.conflict.clone(),
        };
        if let Err(err) = sqlgraph::batch_create(self.config.driver(), &mut batch).await {
            event!(Level::WARN, entity = E::NAME, error = %err, "bulk create failed");
            return Err(EntError::from_db(err));
        }

        for ((node, spec), builder) in nodes
            .iter_mut()
            .zip(&batch.nodes)
            .zip(&mut self.builders)
        {
            if let Some(id) = &spec.id.value {
                node.scan_id(id)?;
            }
            builder.mutation.complete(node.id().clone());
        }
        event!(Level::DEBUG, entity = E::NAME, created = nodes.len(), "bulk create done");
        Ok(nodes)
    }
}

/// Run one builder's hook chain and return the row it produced.
async fn materialize<E: Entity>(builder: &mut Create<E>) -> Result<(E, CreateSpec)> {
    E::defaults(&mut builder.mutation);
    let chain = Chain::new(&builder.hooks)?;
    let mut terminal = Materialize::<E> {
        output: None,
        entity: PhantomData,
    };

    let node = if chain.is_empty() {
        terminal.mutate(&mut builder.mutation).await?
    } else {
        chain.run(&mut builder.mutation, &mut terminal).await?
    };
    if !node.is::<E>() {
        return Err(EntError::UnexpectedNodeType {
            found: node.type_name(),
            mutation: builder.mutation.type_name(),
        });
    }
    terminal.output.ok_or_else(|| {
        EntError::Hook(format!(
            "hook chain of {} returned without reaching the insert",
            E::CREATE
        ))
    })
}

/// Terminal mutator of a bulk item: validates and builds the row, no I/O.
struct Materialize<E: Entity> {
    output: Option<(E, CreateSpec)>,
    entity: PhantomData<E>,
}

#[async_trait]
impl<E: Entity> Mutator for Materialize<E> {
    async fn mutate(&mut self, m: &mut dyn Mutation) -> Result<Node> {
        let found = m.type_name();
        let mutation = m
            .as_any()
            .downcast_ref::<E::Mutation>()
            .ok_or(EntError::UnexpectedMutationType(found))?;
        E::check(mutation)?;
        let (node, spec) = E::create_spec(mutation);
        self.output = Some((node.clone(), spec));
        Ok(Node::new(node))
    }
}

/// Upsert configurator for a batch.
pub struct UpsertBulk<E: Entity> {
    create: CreateBulk<E>,
}

impl<E: Entity> UpsertBulk<E> {
    /// On conflict, set every column to its current value.
    pub fn ignore(mut self) -> Self {
        self.create.conflict.push(ConflictOption::ResolveWithIgnore);
        self
    }

    pub fn do_nothing(mut self) -> Self {
        self.create.conflict.push(ConflictOption::DoNothing);
        self
    }

    /// On conflict, overwrite each row with its proposed values, keeping
    /// client-supplied IDs.
    pub fn update_new_values(mut self) -> Self {
        self.create.conflict.push(ConflictOption::ResolveWithNewValues);
        self.create.conflict.push(keep_id::<E>());
        self
    }

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

    pub async fn exec(self) -> Result<()> {
        for (index, builder) in self.create.builders.iter().enumerate() {
            if !builder.conflict.is_empty() {
                return Err(EntError::BuilderConflict {
                    index,
                    bulk: E::CREATE_BULK,
                });
            }
        }
        if self.create.conflict.is_empty() {
            return Err(EntError::MissingConflictOptions(E::CREATE_BULK));
        }
        self.create.exec().await
    }
}
