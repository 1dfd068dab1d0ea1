//! Entry point tying configuration, hooks and entity builders together.

mod config;

pub use config::Config;

use crate::core::{EntError, Result};
use crate::device::Device;
use crate::entity::{Create, CreateBulk, Entity};
use crate::hook::{Hook, HookSlot};
use crate::migrate;
use crate::session::Session;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{Level, event};

/// Client for the `Session` and `Device` entities.
///
/// # Examples
///
/// ```
/// use entgraph::{Client, Config, Dialect};
///
/// # #[tokio::main]
/// # async fn main() -> entgraph::Result<()> {
/// let client = Client::new(Config::memory(Dialect::Sqlite));
/// client.schema_create().await?;
///
/// let device = client.device().create().save().await?;
/// let session = client.session().create().set_device(&device).save().await?;
/// assert_eq!(session.device_id(), Some(device.id));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> EntityClient<Session> {
        EntityClient::new(self.config.clone())
    }

    pub fn device(&self) -> EntityClient<Device> {
        EntityClient::new(self.config.clone())
    }

    /// Register a hook for entity type `E`. Builders created afterwards run
    /// it; the last registered hook runs first.
    pub fn use_hook<E: Entity>(&mut self, hook: impl Hook + 'static) {
        event!(Level::DEBUG, entity = E::NAME, hook = hook.name(), "hook registered");
        self.config.hooks_mut().push(E::NAME, Arc::new(hook));
    }

    /// Register a raw slot, possibly still unset.
    pub fn use_slot<E: Entity>(&mut self, slot: HookSlot) {
        self.config.hooks_mut().push_slot(E::NAME, slot);
    }

    /// Create all tables of the schema.
    pub async fn schema_create(&self) -> Result<()> {
        migrate::create(self.config.driver())
            .await
            .map_err(EntError::from_db)
    }
}

/// Builder factory for one entity type.
pub struct EntityClient<E: Entity> {
    config: Config,
    entity: PhantomData<E>,
}

impl<E: Entity> EntityClient<E> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            entity: PhantomData,
        }
    }

    pub fn create(&self) -> Create<E> {
        Create::new(self.config.clone())
    }

    pub fn create_bulk(&self, builders: Vec<Create<E>>) -> CreateBulk<E> {
        CreateBulk::new(self.config.clone(), builders)
    }

    /// One builder per item of `items`, each configured by `set`.
    pub fn map_create_bulk<T, I, F>(&self, items: I, set: F) -> CreateBulk<E>
    where
        I: IntoIterator<Item = T>,
        F: Fn(Create<E>, T) -> Create<E>,
    {
        let builders = items
            .into_iter()
            .map(|item| set(self.create(), item))
            .collect();
        self.create_bulk(builders)
    }

    pub fn hooks(&self) -> Vec<HookSlot> {
        self.config.hooks().slots(E::NAME)
    }
}
