pub mod error;
pub mod types;
pub mod value;

pub use error::{
    ConstraintError, DbError, DbResult, EntError, Result, ValidationError, is_configuration_error,
    is_constraint_error, is_validation_error,
};
pub use types::{Column, ForeignKey, Row, TableSchema};
pub use value::{DataType, Value};
