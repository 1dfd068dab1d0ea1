//! Graph-shaped create specifications and their execution as single insert
//! statements.

use crate::core::{DataType, DbError, DbResult, Value};
use crate::dialect::Driver;
use crate::dialect::sql::{ConflictOption, Insert, OnConflict};

/// Relation shape of an edge, seen from the node being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    O2O,
    O2M,
    M2O,
    M2M,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub column: &'static str,
    pub data_type: DataType,
    pub value: Option<Value>,
}

impl FieldSpec {
    pub fn new(column: &'static str, data_type: DataType) -> Self {
        Self {
            column,
            data_type,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeTarget {
    pub id_spec: FieldSpec,
    pub nodes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec {
    pub rel: Rel,
    /// Whether the edge is the inverse side declared on the other schema.
    pub inverse: bool,
    /// Table holding the foreign key.
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub bidi: bool,
    pub target: EdgeTarget,
}

impl EdgeSpec {
    /// Whether the foreign key of this edge lives in the created row.
    fn owns_foreign_key(&self) -> bool {
        matches!((self.rel, self.inverse), (Rel::M2O, _) | (Rel::O2O, true))
    }
}

/// Everything needed to insert one node.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub table: &'static str,
    pub id: FieldSpec,
    pub fields: Vec<FieldSpec>,
    pub edges: Vec<EdgeSpec>,
    pub on_conflict: Vec<ConflictOption>,
}

impl CreateSpec {
    pub fn new(table: &'static str, id: FieldSpec) -> Self {
        Self {
            table,
            id,
            fields: Vec::new(),
            edges: Vec::new(),
            on_conflict: Vec::new(),
        }
    }

    /// Column names and values of the row this spec inserts.
    fn row(&self) -> DbResult<(Vec<String>, Vec<Value>)> {
        let mut columns = Vec::new();
        let mut values = Vec::new();

        if let Some(id) = &self.id.value {
            columns.push(self.id.column.to_string());
            values.push(id.clone());
        }
        for field in &self.fields {
            if let Some(value) = &field.value {
                columns.push(field.column.to_string());
                values.push(value.clone());
            }
        }
        for edge in &self.edges {
            if !edge.owns_foreign_key() {
                return Err(DbError::UnsupportedOperation(format!(
                    "{:?} edge stored in '{}' cannot be created together with a '{}' node",
                    edge.rel, edge.table, self.table
                )));
            }
            let (Some(column), Some(node)) = (edge.columns.first(), edge.target.nodes.first())
            else {
                continue;
            };
            columns.push(column.to_string());
            values.push(node.clone());
        }
        Ok((columns, values))
    }
}

/// Several nodes of the same table inserted by one statement.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateSpec {
    pub nodes: Vec<CreateSpec>,
    pub on_conflict: Vec<ConflictOption>,
}

/// Insert the node described by `spec`. When the driver returns the stored
/// ID, it is written back into `spec.id.value`.
pub async fn create_node(driver: &dyn Driver, spec: &mut CreateSpec) -> DbResult<()> {
    let (columns, values) = spec.row()?;
    let on_conflict = OnConflict::resolve(spec.table, &columns, spec.id.column, &spec.on_conflict);
    let mut insert = Insert::into(spec.table)
        .columns(columns)
        .values(values)
        .on_conflict(on_conflict);
    if driver.dialect().supports_returning() {
        insert = insert.returning(spec.id.column);
    }

    let result = driver.insert(&insert).await?;
    if let Some(id) = result.returned.into_iter().next() {
        spec.id.value = Some(id);
    }
    Ok(())
}

/// Insert every node of `batch` with a single statement. The statement
/// lists every column set by any node; nodes missing one insert `NULL`.
pub async fn batch_create(driver: &dyn Driver, batch: &mut BatchCreateSpec) -> DbResult<()> {
    let Some(first) = batch.nodes.first() else {
        return Ok(());
    };
    let table = first.table;
    let id_column = first.id.column;

    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(batch.nodes.len());
    for node in &batch.nodes {
        if node.table != table {
            return Err(DbError::ExecutionError(format!(
                "batch mixes tables '{}' and '{}'",
                table, node.table
            )));
        }
        let (node_columns, values) = node.row()?;
        for column in &node_columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        rows.push((node_columns, values));
    }

    let mut insert = Insert::into(table);
    for (node_columns, values) in rows {
        let row = columns
            .iter()
            .map(|column| {
                node_columns
                    .iter()
                    .position(|c| c == column)
                    .map_or(Value::Null, |idx| values[idx].clone())
            })
            .collect();
        insert = insert.values(row);
    }

    let on_conflict = OnConflict::resolve(table, &columns, id_column, &batch.on_conflict);
    insert = insert.columns(columns).on_conflict(on_conflict);
    if driver.dialect().supports_returning() {
        insert = insert.returning(id_column);
    }

    let result = driver.insert(&insert).await?;
    // Rows skipped by DO NOTHING return nothing; positions are only
    // trustworthy when every row came back.
    if result.returned.len() == batch.nodes.len() {
        for (node, id) in batch.nodes.iter_mut().zip(result.returned) {
            node.id.value = Some(id);
        }
    }
    Ok(())
}

/// Whether the driver rejected the statement because of a uniqueness or
/// foreign-key constraint.
pub fn is_constraint_error(err: &DbError) -> bool {
    matches!(err, DbError::ConstraintViolation(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, TableSchema};
    use crate::dialect::{Dialect, MemoryDriver};

    async fn driver(dialect: Dialect) -> MemoryDriver {
        let driver = MemoryDriver::new(dialect);
        driver
            .create_table(&TableSchema::new(
                "owners",
                vec![Column::new("id", DataType::Integer).primary_key()],
            ))
            .await
            .unwrap();
        driver
            .create_table(&TableSchema::new(
                "pets",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("name", DataType::Text),
                    Column::new("owner_pets", DataType::Integer).references("owners", "id"),
                ],
            ))
            .await
            .unwrap();
        driver
    }

    fn owner_edge(owner: i64) -> EdgeSpec {
        EdgeSpec {
            rel: Rel::M2O,
            inverse: true,
            table: "pets",
            columns: vec!["owner_pets"],
            bidi: false,
            target: EdgeTarget {
                id_spec: FieldSpec::new("id", DataType::Integer),
                nodes: vec![Value::Integer(owner)],
            },
        }
    }

    fn pet(id: i64, name: &str) -> CreateSpec {
        let mut spec = CreateSpec::new("pets", FieldSpec::new("id", DataType::Integer).with_value(id));
        spec.fields.push(FieldSpec::new("name", DataType::Text).with_value(name));
        spec
    }

    #[tokio::test]
    async fn test_create_node_with_edge() {
        let driver = driver(Dialect::Postgres).await;
        let mut owner = CreateSpec::new("owners", FieldSpec::new("id", DataType::Integer).with_value(1i64));
        create_node(&driver, &mut owner).await.unwrap();

        let mut spec = pet(10, "rex");
        spec.edges.push(owner_edge(1));
        create_node(&driver, &mut spec).await.unwrap();
        assert_eq!(spec.id.value, Some(Value::Integer(10)));

        let insert = driver.history().await.pop().unwrap();
        assert_eq!(insert.columns, vec!["id", "name", "owner_pets"]);
        assert_eq!(insert.returning.as_deref(), Some("id"));
    }

    #[tokio::test]
    async fn test_create_node_constraint_error() {
        let driver = driver(Dialect::Sqlite).await;
        let mut spec = pet(10, "rex");
        spec.edges.push(owner_edge(404));
        let err = create_node(&driver, &mut spec).await.unwrap_err();
        assert!(is_constraint_error(&err));

        let err = create_node(&driver, &mut CreateSpec::new("ghosts", FieldSpec::new("id", DataType::Integer)))
            .await
            .unwrap_err();
        assert!(!is_constraint_error(&err));
    }

    #[tokio::test]
    async fn test_unsupported_edge_shape() {
        let driver = driver(Dialect::Postgres).await;
        let mut spec = pet(1, "rex");
        let mut edge = owner_edge(1);
        edge.rel = Rel::O2M;
        edge.inverse = false;
        spec.edges.push(edge);
        let err = create_node(&driver, &mut spec).await.unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperation(_)));
        assert!(driver.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_create_single_statement() {
        let driver = driver(Dialect::Postgres).await;
        let mut batch = BatchCreateSpec {
            nodes: vec![pet(1, "a"), pet(2, "b"), pet(3, "c")],
            on_conflict: Vec::new(),
        };
        batch_create(&driver, &mut batch).await.unwrap();

        let history = driver.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rows.len(), 3);
        assert_eq!(history[0].rows[2][0], Value::Integer(3));
        assert_eq!(driver.row_count("pets").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_batch_fills_missing_columns_with_null() {
        let driver = driver(Dialect::Postgres).await;
        let mut owner = CreateSpec::new("owners", FieldSpec::new("id", DataType::Integer).with_value(1i64));
        create_node(&driver, &mut owner).await.unwrap();

        let mut bare = pet(2, "b");
        bare.fields.clear();
        let mut owned = pet(3, "c");
        owned.edges.push(owner_edge(1));
        let mut batch = BatchCreateSpec {
            nodes: vec![pet(1, "a"), bare, owned],
            on_conflict: Vec::new(),
        };
        batch_create(&driver, &mut batch).await.unwrap();

        let insert = driver.history().await.pop().unwrap();
        assert_eq!(insert.columns, vec!["id", "name", "owner_pets"]);
        assert_eq!(insert.rows[0][2], Value::Null);
        assert_eq!(insert.rows[1][1], Value::Null);
        assert_eq!(insert.rows[2][2], Value::Integer(1));
    }

    #[tokio::test]
    async fn test_batch_rejects_mixed_tables() {
        let driver = driver(Dialect::Postgres).await;
        let owner = CreateSpec::new("owners", FieldSpec::new("id", DataType::Integer).with_value(1i64));
        let mut batch = BatchCreateSpec {
            nodes: vec![pet(1, "a"), owner],
            on_conflict: Vec::new(),
        };
        let err = batch_create(&driver, &mut batch).await.unwrap_err();
        assert!(matches!(err, DbError::ExecutionError(_)));
        assert!(driver.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let driver = driver(Dialect::Postgres).await;
        batch_create(&driver, &mut BatchCreateSpec::default()).await.unwrap();
        assert!(driver.history().await.is_empty());
    }
}
