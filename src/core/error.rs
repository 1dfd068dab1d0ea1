use std::time::Duration;
use thiserror::Error;

/// Failures reported by a driver while executing a statement.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// A field value was rejected by one of its declared validators.
#[derive(Error, Debug)]
#[error("entgraph: validator failed for field \"{entity}.{name}\": {source}")]
pub struct ValidationError {
    pub entity: &'static str,
    pub name: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// The backing store rejected a row because of a uniqueness or foreign-key
/// violation.
#[derive(Error, Debug)]
#[error("entgraph: constraint failed: {source}")]
pub struct ConstraintError {
    #[source]
    pub source: DbError,
}

#[derive(Error, Debug)]
pub enum EntError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error("entgraph: missing options for {0}.OnConflict")]
    MissingConflictOptions(&'static str),

    #[error("entgraph: OnConflict was set for builder {index}. Set it on the {bulk} instead")]
    BuilderConflict { index: usize, bulk: &'static str },

    #[error("entgraph: {upsert}.ID is not supported by {dialect} driver. Use {upsert}.Exec instead")]
    UpsertIdUnsupported {
        upsert: &'static str,
        dialect: &'static str,
    },

    #[error("entgraph: uninitialized hook (runtime hooks were never registered)")]
    UninitializedHook,

    #[error("entgraph: mutation of type {0} is already complete")]
    MutationDone(&'static str),

    #[error("entgraph: unknown {entity} field {field}")]
    UnknownField { entity: &'static str, field: String },

    #[error("entgraph: unknown {entity} edge {edge}")]
    UnknownEdge { entity: &'static str, edge: String },

    #[error("unexpected mutation type {0}")]
    UnexpectedMutationType(&'static str),

    #[error("unexpected node type {found} returned from {mutation}")]
    UnexpectedNodeType {
        found: &'static str,
        mutation: &'static str,
    },

    #[error("unexpected type {found} for field {field}")]
    UnexpectedValueType { field: String, found: &'static str },

    #[error("hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Db(DbError),
}

pub type Result<T> = std::result::Result<T, EntError>;

impl EntError {
    /// Lift a driver failure, separating constraint violations from the rest.
    pub fn from_db(err: DbError) -> Self {
        if crate::sqlgraph::is_constraint_error(&err) {
            Self::Constraint(ConstraintError { source: err })
        } else {
            Self::Db(err)
        }
    }
}

pub fn is_validation_error(err: &EntError) -> bool {
    matches!(err, EntError::Validation(_))
}

pub fn is_constraint_error(err: &EntError) -> bool {
    matches!(err, EntError::Constraint(_))
}

/// Programmer misuse: wiring, missing conflict directives, unsupported
/// dialect features, or writes to a finished mutation.
pub fn is_configuration_error(err: &EntError) -> bool {
    matches!(
        err,
        EntError::MissingConflictOptions(_)
            | EntError::BuilderConflict { .. }
            | EntError::UpsertIdUnsupported { .. }
            | EntError::UninitializedHook
            | EntError::MutationDone(_)
            | EntError::UnknownField { .. }
            | EntError::UnknownEdge { .. }
    )
}
