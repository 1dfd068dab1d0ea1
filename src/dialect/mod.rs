pub mod memory;
pub mod sql;

use crate::core::{DbError, DbResult, TableSchema, Value};
use async_trait::async_trait;
use sql::Insert;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, event};

pub use memory::MemoryDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite3",
            Self::MySql => "mysql",
        }
    }

    /// `MySQL` has no `RETURNING` clause, so server-side values of an
    /// upserted row cannot be read back.
    pub fn supports_returning(&self) -> bool {
        !matches!(self, Self::MySql)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::Sqlite => write!(f, "SQLite"),
            Self::MySql => write!(f, "MySQL"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::MySql),
            other => Err(format!("unsupported dialect '{}'", other)),
        }
    }
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    /// Values of the `RETURNING` column, one per inserted or updated row.
    pub returned: Vec<Value>,
}

/// The storage backend executing statements produced by `sqlgraph`.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn create_table(&self, schema: &TableSchema) -> DbResult<()>;

    async fn insert(&self, insert: &Insert) -> DbResult<ExecResult>;
}

/// Logs every statement, rendered for the wrapped driver's dialect.
pub struct DebugDriver {
    inner: Arc<dyn Driver>,
}

impl DebugDriver {
    pub fn new(inner: Arc<dyn Driver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Driver for DebugDriver {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn create_table(&self, schema: &TableSchema) -> DbResult<()> {
        event!(Level::DEBUG, dialect = %self.dialect(), table = schema.name(), "create table");
        self.inner.create_table(schema).await
    }

    async fn insert(&self, insert: &Insert) -> DbResult<ExecResult> {
        let (query, args) = insert.render(self.dialect());
        event!(Level::DEBUG, dialect = %self.dialect(), query = %query, args = ?args, "exec");
        let result = self.inner.insert(insert).await;
        if let Err(err) = &result {
            event!(Level::DEBUG, error = %err, "exec failed");
        }
        result
    }
}

/// Fails statements that outlive the configured deadline.
pub struct TimeoutDriver {
    inner: Arc<dyn Driver>,
    limit: Duration,
}

impl TimeoutDriver {
    pub fn new(inner: Arc<dyn Driver>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Driver for TimeoutDriver {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn create_table(&self, schema: &TableSchema) -> DbResult<()> {
        tokio::time::timeout(self.limit, self.inner.create_table(schema))
            .await
            .map_err(|_| DbError::Timeout(self.limit))?
    }

    async fn insert(&self, insert: &Insert) -> DbResult<ExecResult> {
        tokio::time::timeout(self.limit, self.inner.insert(insert))
            .await
            .map_err(|_| DbError::Timeout(self.limit))?
    }
}
