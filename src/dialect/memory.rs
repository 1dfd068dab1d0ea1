use super::sql::{Assignment, ConflictAction, Insert, UpdateSet};
use super::{Dialect, Driver, ExecResult};
use crate::core::{Column, DbError, DbResult, Row, TableSchema, Value};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<usize, Row>,
    next_row_id: usize,
    /// One index per primary key / unique column.
    indexes: HashMap<String, BTreeMap<Value, usize>>,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        let indexes = schema
            .columns()
            .iter()
            .filter(|col| col.is_unique())
            .map(|col| (col.name.clone(), BTreeMap::new()))
            .collect();
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
            indexes,
        }
    }

    fn validate_row(&self, row: &Row) -> DbResult<()> {
        for (column, value) in self.schema.columns().iter().zip(row) {
            column.validate(value)?;
        }
        Ok(())
    }

    /// First unique column whose value is already taken by another row.
    fn find_conflict(&self, row: &Row, ignore: Option<usize>) -> Option<(usize, &Column)> {
        for (idx, column) in self.schema.columns().iter().enumerate() {
            if !column.is_unique() || row[idx].is_null() {
                continue;
            }
            let taken = self
                .indexes
                .get(&column.name)
                .and_then(|index| index.get(&row[idx]))
                .filter(|id| Some(**id) != ignore);
            if let Some(id) = taken {
                return Some((*id, column));
            }
        }
        None
    }

    fn insert(&mut self, row: Row) -> usize {
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.index(id, &row);
        self.rows.insert(id, row);
        id
    }

    fn replace(&mut self, id: usize, row: Row) {
        if let Some(old) = self.rows.remove(&id) {
            for (idx, column) in self.schema.columns().iter().enumerate() {
                if let Some(index) = self.indexes.get_mut(&column.name) {
                    index.remove(&old[idx]);
                }
            }
        }
        self.index(id, &row);
        self.rows.insert(id, row);
    }

    fn index(&mut self, id: usize, row: &Row) {
        for (idx, column) in self.schema.columns().iter().enumerate() {
            if row[idx].is_null() {
                continue;
            }
            if let Some(index) = self.indexes.get_mut(&column.name) {
                index.insert(row[idx].clone(), id);
            }
        }
    }

    fn get(&self, id: usize) -> Option<&Row> {
        self.rows.get(&id)
    }

    fn contains(&self, column: &str, value: &Value) -> DbResult<bool> {
        if let Some(index) = self.indexes.get(column) {
            return Ok(index.contains_key(value));
        }
        let idx = self.schema.find_column_index(column).ok_or_else(|| {
            DbError::ColumnNotFound(column.to_string(), self.schema.name().to_string())
        })?;
        Ok(self.rows.values().any(|row| &row[idx] == value))
    }

    fn apply(&self, set: &UpdateSet, current: &Row, proposed: &Row) -> DbResult<Row> {
        let mut updated = current.clone();
        for (column, assignment) in set.assignments() {
            let idx = self.schema.find_column_index(column).ok_or_else(|| {
                DbError::ColumnNotFound(column.clone(), self.schema.name().to_string())
            })?;
            match assignment {
                Assignment::Excluded => updated[idx] = proposed[idx].clone(),
                Assignment::Itself => {}
                Assignment::Value(value) => updated[idx] = value.clone(),
            }
        }
        Ok(updated)
    }
}

/// In-process driver: tables live in memory, constraints are enforced the way
/// a SQL store would, and every insert handed to it is kept in a history.
pub struct MemoryDriver {
    dialect: Dialect,
    tables: RwLock<HashMap<String, Table>>,
    history: RwLock<Vec<Insert>>,
}

impl MemoryDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Every insert statement received, in arrival order, failed ones included.
    pub async fn history(&self) -> Vec<Insert> {
        self.history.read().await.clone()
    }

    /// Current rows of `table`, in insertion order.
    pub async fn rows(&self, table: &str) -> DbResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let table = tables
            .get(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
        Ok(table.rows.values().cloned().collect())
    }

    pub async fn row_count(&self, table: &str) -> DbResult<usize> {
        Ok(self.rows(table).await?.len())
    }

    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn check_foreign_keys(
        tables: &HashMap<String, Table>,
        staged: &Table,
        row: &Row,
    ) -> DbResult<()> {
        for (idx, column) in staged.schema.columns().iter().enumerate() {
            let Some(fk) = &column.references else {
                continue;
            };
            let value = &row[idx];
            if value.is_null() {
                continue;
            }
            // Self references resolve against the staged rows, so an item may
            // point at another item of the same statement.
            let exists = if fk.table == staged.schema.name() {
                staged.contains(&fk.column, value)?
            } else {
                tables
                    .get(&fk.table)
                    .ok_or_else(|| DbError::TableNotFound(fk.table.clone()))?
                    .contains(&fk.column, value)?
            };
            if !exists {
                return Err(DbError::ConstraintViolation(format!(
                    "FOREIGN KEY constraint failed: value {} in '{}.{}' references non-existent key in '{}.{}'",
                    value,
                    staged.schema.name(),
                    column.name,
                    fk.table,
                    fk.column
                )));
            }
        }
        Ok(())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(Dialect::Sqlite)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn create_table(&self, schema: &TableSchema) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(schema.name()) {
            return Err(DbError::TableExists(schema.name().to_string()));
        }
        tables.insert(schema.name().to_string(), Table::new(schema.clone()));
        Ok(())
    }

    async fn insert(&self, insert: &Insert) -> DbResult<ExecResult> {
        self.history.write().await.push(insert.clone());

        let mut tables = self.tables.write().await;
        // Work on a copy; it replaces the table only if every row succeeds.
        let mut staged = tables
            .get(&insert.table)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(insert.table.clone()))?;

        let positions = insert
            .columns
            .iter()
            .map(|column| {
                staged.schema.find_column_index(column).ok_or_else(|| {
                    DbError::ColumnNotFound(column.clone(), insert.table.clone())
                })
            })
            .collect::<DbResult<Vec<_>>>()?;
        let returning = match &insert.returning {
            Some(column) => Some(staged.schema.find_column_index(column).ok_or_else(|| {
                DbError::ColumnNotFound(column.clone(), insert.table.clone())
            })?),
            None => None,
        };

        let mut result = ExecResult::default();
        let mut touched = Vec::with_capacity(insert.rows.len());
        for values in &insert.rows {
            if values.len() != positions.len() {
                return Err(DbError::ExecutionError(format!(
                    "Expected {} values, got {}",
                    positions.len(),
                    values.len()
                )));
            }
            let mut row = vec![Value::Null; staged.schema.column_count()];
            for (pos, value) in positions.iter().zip(values) {
                row[*pos] = value.clone();
            }
            staged.validate_row(&row)?;

            let conflict = staged
                .find_conflict(&row, None)
                .map(|(id, column)| (id, column.name.clone()));
            let id = match conflict {
                None => staged.insert(row),
                Some((existing, column)) => {
                    let clause = insert
                        .on_conflict
                        .as_ref()
                        .filter(|clause| clause.target.contains(&column));
                    let Some(clause) = clause else {
                        return Err(DbError::ConstraintViolation(format!(
                            "UNIQUE constraint failed: {}.{}",
                            insert.table, column
                        )));
                    };
                    let ConflictAction::Update(set) = &clause.action else {
                        continue;
                    };
                    let current = staged.get(existing).cloned().unwrap_or_default();
                    let updated = staged.apply(set, &current, &row)?;
                    staged.validate_row(&updated)?;
                    if let Some((_, other)) = staged.find_conflict(&updated, Some(existing)) {
                        return Err(DbError::ConstraintViolation(format!(
                            "UNIQUE constraint failed: {}.{}",
                            insert.table, other.name
                        )));
                    }
                    staged.replace(existing, updated);
                    existing
                }
            };
            touched.push(id);
            result.rows_affected += 1;
            if let Some(idx) = returning
                && self.dialect.supports_returning()
                && let Some(stored) = staged.get(id)
            {
                result.returned.push(stored[idx].clone());
            }
        }

        for id in &touched {
            if let Some(row) = staged.get(*id) {
                Self::check_foreign_keys(&tables, &staged, row)?;
            }
        }

        tables.insert(insert.table.clone(), staged);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::dialect::sql::{ConflictOption, OnConflict};

    fn parents() -> TableSchema {
        TableSchema::new("parents", vec![Column::new("id", DataType::Integer).primary_key()])
    }

    fn children() -> TableSchema {
        TableSchema::new(
            "children",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("parent_id", DataType::Integer).references("parents", "id"),
                Column::new("next_id", DataType::Integer).references("children", "id"),
            ],
        )
    }

    async fn driver() -> MemoryDriver {
        let driver = MemoryDriver::new(Dialect::Postgres);
        driver.create_table(&parents()).await.unwrap();
        driver.create_table(&children()).await.unwrap();
        driver
    }

    fn child_insert(rows: Vec<Vec<Value>>) -> Insert {
        let mut insert = Insert::into("children").columns(vec![
            "id".to_string(),
            "parent_id".to_string(),
            "next_id".to_string(),
        ]);
        insert.rows = rows;
        insert.returning("id")
    }

    #[tokio::test]
    async fn test_duplicate_table() {
        let driver = driver().await;
        let err = driver.create_table(&parents()).await.unwrap_err();
        assert!(matches!(err, DbError::TableExists(_)));
    }

    #[tokio::test]
    async fn test_unique_violation() {
        let driver = driver().await;
        let insert = Insert::into("parents")
            .columns(vec!["id".to_string()])
            .values(vec![Value::Integer(1)]);
        driver.insert(&insert).await.unwrap();
        let err = driver.insert(&insert).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(msg) if msg.contains("UNIQUE")));
        assert_eq!(driver.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_foreign_key_violation_is_atomic() {
        let driver = driver().await;
        let insert = child_insert(vec![
            vec![Value::Integer(1), Value::Null, Value::Null],
            vec![Value::Integer(2), Value::Integer(99), Value::Null],
        ]);
        let err = driver.insert(&insert).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(msg) if msg.contains("FOREIGN KEY")));
        assert_eq!(driver.row_count("children").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forward_reference_within_statement() {
        let driver = driver().await;
        let insert = child_insert(vec![
            vec![Value::Integer(1), Value::Null, Value::Integer(2)],
            vec![Value::Integer(2), Value::Null, Value::Null],
        ]);
        let result = driver.insert(&insert).await.unwrap();
        assert_eq!(result.rows_affected, 2);
        assert_eq!(result.returned, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[tokio::test]
    async fn test_conflict_update_and_do_nothing() {
        let driver = driver().await;
        driver
            .insert(&Insert::into("parents").columns(vec!["id".to_string()]).values(vec![Value::Integer(7)]))
            .await
            .unwrap();
        driver
            .insert(&child_insert(vec![vec![Value::Integer(1), Value::Null, Value::Null]]))
            .await
            .unwrap();

        let columns = vec!["id".to_string(), "parent_id".to_string(), "next_id".to_string()];
        let mut upsert = child_insert(vec![vec![Value::Integer(1), Value::Integer(7), Value::Null]]);
        upsert.on_conflict = OnConflict::resolve(
            "children",
            &columns,
            "id",
            &[ConflictOption::ResolveWithNewValues],
        );
        let result = driver.insert(&upsert).await.unwrap();
        assert_eq!(result.returned, vec![Value::Integer(1)]);
        let rows = driver.rows("children").await.unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Integer(7), Value::Null]]);

        let mut skip = child_insert(vec![vec![Value::Integer(1), Value::Null, Value::Null]]);
        skip.on_conflict =
            OnConflict::resolve("children", &columns, "id", &[ConflictOption::DoNothing]);
        let result = driver.insert(&skip).await.unwrap();
        assert_eq!(result.rows_affected, 0);
        assert!(result.returned.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_column() {
        let driver = driver().await;
        let insert = Insert::into("parents")
            .columns(vec!["nope".to_string()])
            .values(vec![Value::Integer(1)]);
        let err = driver.insert(&insert).await.unwrap_err();
        assert!(matches!(err, DbError::ColumnNotFound(..)));
    }
}
