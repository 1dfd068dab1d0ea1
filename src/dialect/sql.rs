//! Insert statements with `ON CONFLICT` / `ON DUPLICATE KEY` resolution, and
//! their rendering for each supported dialect.

use super::Dialect;
use crate::core::Value;
use std::fmt;
use std::sync::Arc;

/// Right-hand side of one `UPDATE` assignment applied on conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// The value proposed for insertion (`excluded.c` / `VALUES(c)`).
    Excluded,
    /// The column keeps its stored value.
    Itself,
    Value(Value),
}

/// Assignments applied to the existing row when an insert conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSet {
    table: String,
    columns: Vec<String>,
    assignments: Vec<(String, Assignment)>,
}

impl UpdateSet {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            assignments: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns of the insert statement this set belongs to.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn assignments(&self) -> &[(String, Assignment)] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.assign(column, Assignment::Value(value.into()))
    }

    pub fn set_null(&mut self, column: &str) -> &mut Self {
        self.assign(column, Assignment::Value(Value::Null))
    }

    pub fn set_ignore(&mut self, column: &str) -> &mut Self {
        self.assign(column, Assignment::Itself)
    }

    pub fn set_excluded(&mut self, column: &str) -> &mut Self {
        self.assign(column, Assignment::Excluded)
    }

    fn assign(&mut self, column: &str, assignment: Assignment) -> &mut Self {
        match self.assignments.iter_mut().find(|(c, _)| c == column) {
            Some(slot) => slot.1 = assignment,
            None => self.assignments.push((column.to_string(), assignment)),
        }
        self
    }
}

pub type Resolver = Arc<dyn Fn(&mut UpdateSet) + Send + Sync>;

/// One conflict-resolution directive. Directives are folded in order.
#[derive(Clone)]
pub enum ConflictOption {
    Columns(Vec<String>),
    DoNothing,
    ResolveWithIgnore,
    ResolveWithNewValues,
    ResolveWith(Resolver),
}

impl ConflictOption {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Columns(columns.into_iter().map(Into::into).collect())
    }

    pub fn resolve_with(f: impl Fn(&mut UpdateSet) + Send + Sync + 'static) -> Self {
        Self::ResolveWith(Arc::new(f))
    }
}

impl fmt::Debug for ConflictOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columns(cols) => f.debug_tuple("Columns").field(cols).finish(),
            Self::DoNothing => write!(f, "DoNothing"),
            Self::ResolveWithIgnore => write!(f, "ResolveWithIgnore"),
            Self::ResolveWithNewValues => write!(f, "ResolveWithNewValues"),
            Self::ResolveWith(_) => write!(f, "ResolveWith(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    DoNothing,
    Update(UpdateSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnConflict {
    pub target: Vec<String>,
    pub action: ConflictAction,
}

impl OnConflict {
    /// Folds `options` into a single clause for an insert into `table` with
    /// the given `columns`. Returns `None` when there is nothing to fold.
    pub fn resolve(
        table: &str,
        columns: &[String],
        default_target: &str,
        options: &[ConflictOption],
    ) -> Option<Self> {
        if options.is_empty() {
            return None;
        }

        let mut target = Vec::new();
        let mut nothing = false;
        let mut set = UpdateSet::new(table, columns.to_vec());
        for option in options {
            match option {
                ConflictOption::Columns(cols) => target = cols.clone(),
                ConflictOption::DoNothing => nothing = true,
                ConflictOption::ResolveWithIgnore => {
                    for column in columns {
                        set.set_ignore(column);
                    }
                }
                ConflictOption::ResolveWithNewValues => {
                    for column in columns {
                        set.set_excluded(column);
                    }
                }
                ConflictOption::ResolveWith(resolve) => resolve(&mut set),
            }
        }

        if target.is_empty() {
            target.push(default_target.to_string());
        }
        // An empty update set has nothing to write back.
        let action = if nothing || set.is_empty() {
            ConflictAction::DoNothing
        } else {
            ConflictAction::Update(set)
        };
        Some(Self { target, action })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Option<String>,
}

impl Insert {
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            on_conflict: None,
            returning: None,
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn values(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn on_conflict(mut self, on_conflict: Option<OnConflict>) -> Self {
        self.on_conflict = on_conflict;
        self
    }

    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }

    /// Build the statement text and its positional arguments.
    pub fn render(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut args = Vec::new();
        let mut sql = format!("INSERT INTO {}", quote(dialect, &self.table));

        if self.columns.is_empty() {
            match dialect {
                Dialect::MySql => sql.push_str(" () VALUES ()"),
                _ => sql.push_str(" DEFAULT VALUES"),
            }
        } else {
            let columns: Vec<String> = self.columns.iter().map(|c| quote(dialect, c)).collect();
            sql.push_str(&format!(" ({}) VALUES ", columns.join(", ")));
            let rows: Vec<String> = self
                .rows
                .iter()
                .map(|row| {
                    let placeholders: Vec<String> = row
                        .iter()
                        .map(|value| {
                            args.push(value.clone());
                            placeholder(dialect, args.len())
                        })
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            sql.push_str(&rows.join(", "));
        }

        if let Some(conflict) = &self.on_conflict {
            match dialect {
                Dialect::MySql => self.render_duplicate_key(conflict, &mut sql, &mut args),
                _ => self.render_on_conflict(dialect, conflict, &mut sql, &mut args),
            }
        }

        if let Some(column) = &self.returning
            && dialect.supports_returning()
        {
            sql.push_str(&format!(" RETURNING {}", quote(dialect, column)));
        }

        (sql, args)
    }

    fn render_on_conflict(
        &self,
        dialect: Dialect,
        conflict: &OnConflict,
        sql: &mut String,
        args: &mut Vec<Value>,
    ) {
        let target: Vec<String> = conflict.target.iter().map(|c| quote(dialect, c)).collect();
        sql.push_str(&format!(" ON CONFLICT ({})", target.join(", ")));
        match &conflict.action {
            ConflictAction::DoNothing => sql.push_str(" DO NOTHING"),
            ConflictAction::Update(set) => {
                let assignments: Vec<String> = set
                    .assignments()
                    .iter()
                    .map(|(column, assignment)| {
                        let rhs = match assignment {
                            Assignment::Excluded => {
                                format!("{}.{}", quote(dialect, "excluded"), quote(dialect, column))
                            }
                            Assignment::Itself => {
                                format!("{}.{}", quote(dialect, &self.table), quote(dialect, column))
                            }
                            Assignment::Value(value) => {
                                args.push(value.clone());
                                placeholder(dialect, args.len())
                            }
                        };
                        format!("{} = {}", quote(dialect, column), rhs)
                    })
                    .collect();
                sql.push_str(&format!(" DO UPDATE SET {}", assignments.join(", ")));
            }
        }
    }

    fn render_duplicate_key(&self, conflict: &OnConflict, sql: &mut String, args: &mut Vec<Value>) {
        let dialect = Dialect::MySql;
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        match &conflict.action {
            // No native DO NOTHING: assign a key column to itself.
            ConflictAction::DoNothing => {
                let column = quote(dialect, &conflict.target[0]);
                sql.push_str(&format!("{} = {}", column, column));
            }
            ConflictAction::Update(set) => {
                let assignments: Vec<String> = set
                    .assignments()
                    .iter()
                    .map(|(column, assignment)| {
                        let quoted = quote(dialect, column);
                        let rhs = match assignment {
                            Assignment::Excluded => format!("VALUES({})", quoted),
                            Assignment::Itself => quoted.clone(),
                            Assignment::Value(value) => {
                                args.push(value.clone());
                                placeholder(dialect, args.len())
                            }
                        };
                        format!("{} = {}", quoted, rhs)
                    })
                    .collect();
                sql.push_str(&assignments.join(", "));
            }
        }
    }
}

fn quote(dialect: Dialect, ident: &str) -> String {
    match dialect {
        Dialect::Postgres => format!("\"{}\"", ident),
        Dialect::Sqlite | Dialect::MySql => format!("`{}`", ident),
    }
}

fn placeholder(dialect: Dialect, n: usize) -> String {
    match dialect {
        Dialect::Postgres => format!("${}", n),
        Dialect::Sqlite | Dialect::MySql => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["id".to_string(), "device_sessions".to_string()]
    }

    fn insert(options: &[ConflictOption]) -> Insert {
        Insert::into("sessions")
            .columns(columns())
            .values(vec![Value::Bytes(vec![1]), Value::Null])
            .values(vec![Value::Bytes(vec![2]), Value::Null])
            .on_conflict(OnConflict::resolve("sessions", &columns(), "id", options))
            .returning("id")
    }

    #[test]
    fn test_resolve_empty_options() {
        assert!(OnConflict::resolve("sessions", &columns(), "id", &[]).is_none());
    }

    #[test]
    fn test_resolve_folds_in_order() {
        let options = vec![
            ConflictOption::ResolveWithNewValues,
            ConflictOption::resolve_with(|set| {
                set.set_ignore("id");
            }),
        ];
        let conflict = OnConflict::resolve("sessions", &columns(), "id", &options).unwrap();
        assert_eq!(conflict.target, vec!["id".to_string()]);
        let ConflictAction::Update(set) = conflict.action else {
            panic!("expected an update action");
        };
        assert_eq!(
            set.assignments(),
            &[
                ("id".to_string(), Assignment::Itself),
                ("device_sessions".to_string(), Assignment::Excluded),
            ]
        );
    }

    #[test]
    fn test_do_nothing_wins() {
        let options = vec![ConflictOption::DoNothing, ConflictOption::ResolveWithNewValues];
        let conflict = OnConflict::resolve("sessions", &columns(), "id", &options).unwrap();
        assert_eq!(conflict.action, ConflictAction::DoNothing);
    }

    #[test]
    fn test_render_postgres() {
        let (sql, args) = insert(&[ConflictOption::ResolveWithNewValues]).render(Dialect::Postgres);
        assert_eq!(
            sql,
            "INSERT INTO \"sessions\" (\"id\", \"device_sessions\") VALUES ($1, $2), ($3, $4) \
             ON CONFLICT (\"id\") DO UPDATE SET \"id\" = \"excluded\".\"id\", \
             \"device_sessions\" = \"excluded\".\"device_sessions\" RETURNING \"id\""
        );
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_render_sqlite_ignore() {
        let (sql, _) = insert(&[ConflictOption::ResolveWithIgnore]).render(Dialect::Sqlite);
        assert!(sql.contains("ON CONFLICT (`id`) DO UPDATE SET `id` = `sessions`.`id`"));
        assert!(sql.ends_with("RETURNING `id`"));
    }

    #[test]
    fn test_render_mysql() {
        let (sql, _) = insert(&[ConflictOption::ResolveWithNewValues]).render(Dialect::MySql);
        assert!(sql.starts_with("INSERT INTO `sessions` (`id`, `device_sessions`) VALUES (?, ?), (?, ?)"));
        assert!(sql.contains(
            "ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `device_sessions` = VALUES(`device_sessions`)"
        ));
        assert!(!sql.contains("RETURNING"));

        let (sql, _) = insert(&[ConflictOption::DoNothing]).render(Dialect::MySql);
        assert!(sql.ends_with("ON DUPLICATE KEY UPDATE `id` = `id`"));
    }

    #[test]
    fn test_render_custom_value_argument() {
        let options = vec![ConflictOption::resolve_with(|set| {
            set.set("device_sessions", Value::Bytes(vec![9]));
        })];
        let (sql, args) = insert(&options).render(Dialect::Postgres);
        assert!(sql.contains("DO UPDATE SET \"device_sessions\" = $5"));
        assert_eq!(args.last(), Some(&Value::Bytes(vec![9])));
    }

    #[test]
    fn test_render_default_values() {
        let (sql, args) = Insert::into("devices").render(Dialect::Postgres);
        assert_eq!(sql, "INSERT INTO \"devices\" DEFAULT VALUES");
        assert!(args.is_empty());
    }
}
