//! Typed statement model and MySQL rendering.
//!
//! The engine never concatenates SQL by hand. It builds a [`Statement`] and
//! the backend decides what to do with it: [`crate::MySqlBackend`] renders
//! it to text with positional `?` parameters, [`crate::InMemoryBackend`]
//! interprets it directly.
//!
//! Identifiers are emitted unquoted. Callers must only pass validated
//! identifiers (letters, digits and underscores).

use crate::value::Value;

/// Physical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `INT NOT NULL`, optionally `AUTO_INCREMENT`.
    Int {
        /// Whether the column auto-increments.
        auto_increment: bool,
    },
    /// `VARCHAR(n) NOT NULL`.
    Varchar(u32),
    /// `BIT NOT NULL`.
    Bit,
    /// `BIGINT NOT NULL`.
    BigInt,
    /// `FLOAT NOT NULL`.
    Float,
}

impl ColumnType {
    /// Renders the column type clause.
    #[must_use]
    pub fn ddl(&self) -> String {
        match self {
            ColumnType::Int {
                auto_increment: true,
            } => "INT NOT NULL AUTO_INCREMENT".to_string(),
            ColumnType::Int {
                auto_increment: false,
            } => "INT NOT NULL".to_string(),
            ColumnType::Varchar(size) => format!("VARCHAR({size}) NOT NULL"),
            ColumnType::Bit => "BIT NOT NULL".to_string(),
            ColumnType::BigInt => "BIGINT NOT NULL".to_string(),
            ColumnType::Float => "FLOAT NOT NULL".to_string(),
        }
    }

    /// Returns the value a fresh `NOT NULL` column holds for existing rows.
    #[must_use]
    pub fn zero(&self) -> Value {
        match self {
            ColumnType::Int { .. } | ColumnType::BigInt => Value::Int(0),
            ColumnType::Varchar(_) => Value::Text(String::new()),
            ColumnType::Bit => Value::Bool(false),
            ColumnType::Float => Value::Float(0.0),
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
}

impl ColumnDef {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    fn ddl(&self) -> String {
        format!("{} {}", self.name, self.ty.ddl())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// An `ORDER BY` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to order by.
    pub column: String,
    /// Direction.
    pub direction: Direction,
}

/// Escapes `%`, `_` and `\` so `text` matches itself in a `LIKE` pattern.
#[must_use]
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A `WHERE` condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq {
        /// Column name.
        column: String,
        /// Compared value.
        value: Value,
    },
    /// `column LIKE pattern`
    Like {
        /// Column name.
        column: String,
        /// Pattern with `%` and `_` wildcards; `\` escapes the next character.
        pattern: String,
    },
    /// Conjunction. Empty means true.
    All(Vec<Condition>),
    /// Disjunction. Empty means false.
    Any(Vec<Condition>),
}

impl Condition {
    /// Shorthand for an equality condition.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Every column referenced by this condition.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Eq { column, .. } | Condition::Like { column, .. } => out.push(column),
            Condition::All(items) | Condition::Any(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
        }
    }

    fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Condition::Eq { column, value } => {
                params.push(value.clone());
                format!("{column} = ?")
            }
            Condition::Like { column, pattern } => {
                params.push(Value::Text(pattern.clone()));
                format!("{column} LIKE ?")
            }
            Condition::All(items) => Self::render_group(items, " AND ", "1 = 1", params),
            Condition::Any(items) => Self::render_group(items, " OR ", "1 = 0", params),
        }
    }

    fn render_group(
        items: &[Condition],
        separator: &str,
        empty: &str,
        params: &mut Vec<Value>,
    ) -> String {
        match items {
            [] => empty.to_string(),
            [single] => single.render(params),
            _ => {
                let parts: Vec<String> = items.iter().map(|c| c.render(params)).collect();
                format!("({})", parts.join(separator))
            }
        }
    }
}

/// A `SELECT *` query.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Table to read.
    pub table: String,
    /// Optional filter.
    pub condition: Option<Condition>,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Optional row limit.
    pub limit: Option<u64>,
}

impl Select {
    /// Selects every row of `table`.
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: None,
            order: None,
            limit: None,
        }
    }
}

/// A statement the engine asks a backend to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `CREATE TABLE IF NOT EXISTS`.
    CreateTable {
        /// Table name.
        table: String,
        /// Columns in declaration order.
        columns: Vec<ColumnDef>,
        /// Primary key column, also given a `<col>_UNIQUE` key.
        primary_key: Option<String>,
    },
    /// `ALTER TABLE .. ADD COLUMN`.
    AddColumn {
        /// Table name.
        table: String,
        /// New column.
        column: ColumnDef,
    },
    /// `ALTER TABLE .. CHANGE COLUMN` keeping the name.
    ChangeColumn {
        /// Table name.
        table: String,
        /// Column with its new type.
        column: ColumnDef,
    },
    /// `ALTER TABLE .. ADD PRIMARY KEY`.
    AddPrimaryKey {
        /// Table name.
        table: String,
        /// Key column.
        column: String,
    },
    /// `ALTER TABLE .. ADD UNIQUE INDEX`.
    AddUniqueIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
        /// Indexed column.
        column: String,
    },
    /// `ALTER TABLE .. DROP INDEX`.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },
    /// `INSERT INTO`.
    Insert {
        /// Table name.
        table: String,
        /// Column/value pairs.
        values: Vec<(String, Value)>,
    },
    /// `UPDATE .. WHERE key = ?`.
    Update {
        /// Table name.
        table: String,
        /// Assignments.
        values: Vec<(String, Value)>,
        /// Key column.
        key_column: String,
        /// Key value.
        key_value: Value,
    },
    /// `DELETE FROM .. WHERE`.
    Delete {
        /// Table name.
        table: String,
        /// Rows to delete.
        condition: Condition,
    },
    /// `SELECT * FROM`.
    Select(Select),
    /// `SELECT COUNT(*) AS Count FROM`.
    Count {
        /// Table name.
        table: String,
        /// Optional filter.
        condition: Option<Condition>,
    },
    /// Several statements sent over one connection, in order.
    Batch(Vec<Statement>),
}

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    /// Returns the table this statement targets (first one for a batch).
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::CreateTable { table, .. }
            | Statement::AddColumn { table, .. }
            | Statement::ChangeColumn { table, .. }
            | Statement::AddPrimaryKey { table, .. }
            | Statement::AddUniqueIndex { table, .. }
            | Statement::DropIndex { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. }
            | Statement::Count { table, .. } => Some(table),
            Statement::Select(select) => Some(&select.table),
            Statement::Batch(items) => items.first().and_then(Statement::table),
        }
    }

    /// Returns true for schema-changing statements.
    #[must_use]
    pub fn is_ddl(&self) -> bool {
        match self {
            Statement::CreateTable { .. }
            | Statement::AddColumn { .. }
            | Statement::ChangeColumn { .. }
            | Statement::AddPrimaryKey { .. }
            | Statement::AddUniqueIndex { .. }
            | Statement::DropIndex { .. } => true,
            Statement::Batch(items) => items.iter().any(Statement::is_ddl),
            _ => false,
        }
    }

    /// Returns true if executing this statement produces a result set.
    #[must_use]
    pub const fn returns_rows(&self) -> bool {
        matches!(self, Statement::Select(_) | Statement::Count { .. })
    }

    /// Renders the statement as MySQL text.
    #[must_use]
    pub fn render(&self) -> RenderedSql {
        let mut params = Vec::new();
        let sql = self.render_into(&mut params);
        RenderedSql { sql, params }
    }

    fn render_into(&self, params: &mut Vec<Value>) -> String {
        match self {
            Statement::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                let mut parts: Vec<String> = columns.iter().map(ColumnDef::ddl).collect();
                if let Some(key) = primary_key {
                    parts.push(format!("PRIMARY KEY ({key})"));
                    parts.push(format!("UNIQUE KEY {key}_UNIQUE ({key})"));
                }
                format!("CREATE TABLE IF NOT EXISTS {table} ({})", parts.join(", "))
            }
            Statement::AddColumn { table, column } => {
                format!("ALTER TABLE {table} ADD COLUMN {}", column.ddl())
            }
            Statement::ChangeColumn { table, column } => format!(
                "ALTER TABLE {table} CHANGE COLUMN {} {}",
                column.name,
                column.ddl()
            ),
            Statement::AddPrimaryKey { table, column } => {
                format!("ALTER TABLE {table} ADD PRIMARY KEY ({column})")
            }
            Statement::AddUniqueIndex {
                table,
                index,
                column,
            } => format!("ALTER TABLE {table} ADD UNIQUE INDEX {index} ({column})"),
            Statement::DropIndex { table, index } => {
                format!("ALTER TABLE {table} DROP INDEX {index}")
            }
            Statement::Insert { table, values } => {
                let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
                let marks = vec!["?"; values.len()];
                params.extend(values.iter().map(|(_, v)| v.clone()));
                format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    columns.join(", "),
                    marks.join(", ")
                )
            }
            Statement::Update {
                table,
                values,
                key_column,
                key_value,
            } => {
                let sets: Vec<String> = values.iter().map(|(c, _)| format!("{c} = ?")).collect();
                params.extend(values.iter().map(|(_, v)| v.clone()));
                params.push(key_value.clone());
                format!(
                    "UPDATE {table} SET {} WHERE {key_column} = ?",
                    sets.join(", ")
                )
            }
            Statement::Delete { table, condition } => {
                format!("DELETE FROM {table} WHERE {}", condition.render(params))
            }
            Statement::Select(select) => {
                let mut sql = format!("SELECT * FROM {}", select.table);
                if let Some(condition) = &select.condition {
                    sql.push_str(" WHERE ");
                    sql.push_str(&condition.render(params));
                }
                if let Some(order) = &select.order {
                    sql.push_str(&format!(
                        " ORDER BY {} {}",
                        order.column,
                        order.direction.keyword()
                    ));
                }
                if let Some(limit) = select.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
                sql
            }
            Statement::Count { table, condition } => {
                let mut sql = format!("SELECT COUNT(*) AS Count FROM {table}");
                if let Some(condition) = condition {
                    sql.push_str(" WHERE ");
                    sql.push_str(&condition.render(params));
                }
                sql
            }
            Statement::Batch(items) => {
                let parts: Vec<String> = items.iter().map(|s| s.render_into(params)).collect();
                parts.join("; ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Statement {
        Statement::CreateTable {
            table: "Test".into(),
            columns: vec![
                ColumnDef::new(
                    "ID",
                    ColumnType::Int {
                        auto_increment: true,
                    },
                ),
                ColumnDef::new(
                    "IntValue",
                    ColumnType::Int {
                        auto_increment: false,
                    },
                ),
                ColumnDef::new("StringValue", ColumnType::Varchar(100)),
            ],
            primary_key: Some("ID".into()),
        }
    }

    #[test]
    fn create_table_text() {
        assert_eq!(
            sample_table().render().sql,
            "CREATE TABLE IF NOT EXISTS Test (ID INT NOT NULL AUTO_INCREMENT, \
             IntValue INT NOT NULL, StringValue VARCHAR(100) NOT NULL, \
             PRIMARY KEY (ID), UNIQUE KEY ID_UNIQUE (ID))"
        );
    }

    #[test]
    fn create_table_without_key() {
        let stmt = Statement::CreateTable {
            table: "Loose".into(),
            columns: vec![ColumnDef::new("Flag", ColumnType::Bit)],
            primary_key: None,
        };
        assert_eq!(
            stmt.render().sql,
            "CREATE TABLE IF NOT EXISTS Loose (Flag BIT NOT NULL)"
        );
    }

    #[test]
    fn column_type_contract() {
        assert_eq!(ColumnType::Varchar(250).ddl(), "VARCHAR(250) NOT NULL");
        assert_eq!(ColumnType::Bit.ddl(), "BIT NOT NULL");
        assert_eq!(ColumnType::BigInt.ddl(), "BIGINT NOT NULL");
        assert_eq!(ColumnType::Float.ddl(), "FLOAT NOT NULL");
    }

    #[test]
    fn alter_statements() {
        let add = Statement::AddColumn {
            table: "Test".into(),
            column: ColumnDef::new(
                "NewValue",
                ColumnType::Int {
                    auto_increment: false,
                },
            ),
        };
        assert_eq!(
            add.render().sql,
            "ALTER TABLE Test ADD COLUMN NewValue INT NOT NULL"
        );

        let change = Statement::ChangeColumn {
            table: "Test".into(),
            column: ColumnDef::new("Name", ColumnType::Varchar(80)),
        };
        assert_eq!(
            change.render().sql,
            "ALTER TABLE Test CHANGE COLUMN Name Name VARCHAR(80) NOT NULL"
        );
        assert!(change.is_ddl());
    }

    #[test]
    fn select_with_everything() {
        let stmt = Statement::Select(Select {
            table: "Test".into(),
            condition: Some(Condition::Any(vec![
                Condition::eq("ID", 1),
                Condition::eq("ID", 2),
            ])),
            order: Some(Order {
                column: "ID".into(),
                direction: Direction::Desc,
            }),
            limit: Some(5),
        });
        let rendered = stmt.render();
        assert_eq!(
            rendered.sql,
            "SELECT * FROM Test WHERE (ID = ? OR ID = ?) ORDER BY ID DESC LIMIT 5"
        );
        assert_eq!(rendered.params, vec![Value::Int(1), Value::Int(2)]);
        assert!(stmt.returns_rows());
    }

    #[test]
    fn update_params_end_with_key() {
        let stmt = Statement::Update {
            table: "Test".into(),
            values: vec![("A".into(), Value::Int(3)), ("B".into(), "x".into())],
            key_column: "ID".into(),
            key_value: Value::Int(9),
        };
        let rendered = stmt.render();
        assert_eq!(rendered.sql, "UPDATE Test SET A = ?, B = ? WHERE ID = ?");
        assert_eq!(
            rendered.params,
            vec![Value::Int(3), Value::from("x"), Value::Int(9)]
        );
    }

    #[test]
    fn empty_groups() {
        let stmt = Statement::Count {
            table: "T".into(),
            condition: Some(Condition::Any(Vec::new())),
        };
        assert_eq!(stmt.render().sql, "SELECT COUNT(*) AS Count FROM T WHERE 1 = 0");
    }

    #[test]
    fn condition_columns() {
        let cond = Condition::All(vec![
            Condition::eq("A", 1),
            Condition::Like {
                column: "B".into(),
                pattern: "%x%".into(),
            },
        ]);
        assert_eq!(cond.columns(), vec!["A", "B"]);
    }
}
