//! Table definitions of the schema and their installation.

use crate::core::{Column, DataType, DbResult, TableSchema};
use crate::dialect::Driver;
use crate::{device, session};
use tracing::{Level, event};

pub fn devices() -> TableSchema {
    TableSchema::new(
        device::TABLE,
        vec![Column::new(device::FIELD_ID, DataType::Bytes).primary_key()],
    )
}

pub fn sessions() -> TableSchema {
    TableSchema::new(
        session::TABLE,
        vec![
            Column::new(session::FIELD_ID, DataType::Bytes).primary_key(),
            Column::new(session::DEVICE_COLUMN, DataType::Bytes)
                .references(session::DEVICE_INVERSE_TABLE, device::FIELD_ID),
            Column::new(session::PARENT_COLUMN, DataType::Bytes)
                .references(session::TABLE, session::FIELD_ID),
        ],
    )
}

/// All tables, referenced tables first.
pub fn tables() -> Vec<TableSchema> {
    vec![devices(), sessions()]
}

/// Create every table of the schema.
pub async fn create(driver: &dyn Driver) -> DbResult<()> {
    for table in tables() {
        driver.create_table(&table).await?;
        event!(Level::DEBUG, table = table.name(), "table created");
    }
    Ok(())
}
