use crate::dialect::{DebugDriver, Dialect, Driver, MemoryDriver, TimeoutDriver};
use crate::hook::{Hook, HookSlot, Hooks};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Client configuration: the driver statements go to and the hooks
/// registered per entity type.
///
/// Decorators are rebuilt from the base driver whenever an option changes,
/// so setting an option twice does not stack wrappers.
#[derive(Clone)]
pub struct Config {
    base: Arc<dyn Driver>,
    driver: Arc<dyn Driver>,
    hooks: Hooks,

    /// Log every statement at `DEBUG`
    pub debug: bool,

    /// Per-statement deadline
    pub query_timeout: Option<Duration>,
}

impl Config {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            base: Arc::clone(&driver),
            driver,
            hooks: Hooks::new(),
            debug: false,
            query_timeout: None,
        }
    }

    /// Configuration backed by a fresh in-process store.
    pub fn memory(dialect: Dialect) -> Self {
        Self::new(Arc::new(MemoryDriver::new(dialect)))
    }

    /// Parse from a driver name, e.g. `"postgres"`, backed by an in-process
    /// store speaking that dialect.
    pub fn from_driver_name(name: &str) -> Result<Self, String> {
        Ok(Self::memory(name.parse()?))
    }

    /// Log statements before they reach the driver.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self.rebuild();
        self
    }

    /// Set query timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self.rebuild();
        self
    }

    /// Register `hook` for the entity type named `entity`.
    pub fn hook(mut self, entity: &'static str, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(entity, hook);
        self
    }

    pub fn hook_slot(mut self, entity: &'static str, slot: HookSlot) -> Self {
        self.hooks.push_slot(entity, slot);
        self
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.query_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("query_timeout must be > 0".to_string());
        }
        Ok(())
    }

    fn rebuild(&mut self) {
        let mut driver = Arc::clone(&self.base);
        if let Some(timeout) = self.query_timeout {
            driver = Arc::new(TimeoutDriver::new(driver, timeout));
        }
        if self.debug {
            driver = Arc::new(DebugDriver::new(driver));
        }
        self.driver = driver;
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("dialect", &self.dialect())
            .field("hooks", &self.hooks)
            .field("debug", &self.debug)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
