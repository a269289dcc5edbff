//! Schema blueprints: `CREATE TABLE` and `ALTER TABLE` builders.
//!
//! A [`Blueprint`] is bound to one [`Dialect`] and hands a [`CreateTable`]
//! or [`AlterTable`] to a callback, then renders the collected definitions
//! as SQL text. Type names, auto-increment keys and identifier quoting all
//! follow the dialect.
//!
//! ```
//! use strata_db::Dialect;
//! use strata_db_migrations::blueprint::{Blueprint, ColumnOptions};
//!
//! let schema = Blueprint::new(Dialect::Sqlite);
//! let sql = schema
//!     .create("users", |t| {
//!         t.id();
//!         t.string("email", ColumnOptions::new().unique());
//!         t.timestamps();
//!         Ok(())
//!     })
//!     .unwrap();
//! assert!(sql.starts_with("CREATE TABLE \"users\" (\"id\" INTEGER PRIMARY KEY"));
//! ```

use std::fmt::Write;

use strata_core::settings::DatabaseSettings;
use strata_core::{StrataError, StrataResult};
use strata_db::Dialect;

/// Per-column modifiers.
///
/// ```
/// use strata_db_migrations::blueprint::ColumnOptions;
///
/// let opts = ColumnOptions::new().nullable().default("'draft'");
/// assert!(opts.nullable);
/// assert_eq!(opts.default.as_deref(), Some("'draft'"));
/// assert!(!opts.unique);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    /// Emit `NULL` instead of `NOT NULL`.
    pub nullable: bool,
    /// Raw SQL default expression, e.g. `0` or `'draft'`.
    pub default: Option<String>,
    /// Add a `UNIQUE` constraint.
    pub unique: bool,
}

impl ColumnOptions {
    /// `NOT NULL`, no default, not unique.
    pub const fn new() -> Self {
        Self {
            nullable: false,
            default: None,
            unique: false,
        }
    }

    /// Allows NULL; the column renders as `NULL` rather than `NOT NULL`.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the `DEFAULT` clause. `expression` is emitted verbatim, so
    /// string defaults carry their own quotes. A blank expression is ignored.
    #[must_use]
    pub fn default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    /// Adds a column-level `UNIQUE` constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn render(&self, out: &mut String) {
        out.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = self.default.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = write!(out, " DEFAULT {default}");
        }
        if self.unique {
            out.push_str(" UNIQUE");
        }
    }
}

/// What happens to referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    /// Delete or update the referencing rows along with the referenced one.
    Cascade,
    /// Refuse the change while referencing rows exist.
    Restrict,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default.
    SetDefault,
    /// Like `Restrict`, but checked at the end of the statement.
    NoAction,
}

impl ReferentialAction {
    /// The SQL keyword(s) for this action.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// Target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced column.
    pub references: String,
    /// Referenced table.
    pub on_table: String,
    /// `ON DELETE` action; omitted when `None`.
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action; omitted when `None`.
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKey {
    /// A reference to `on_table(references)`.
    pub fn new(on_table: impl Into<String>, references: impl Into<String>) -> Self {
        Self {
            references: references.into(),
            on_table: on_table.into(),
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the `ON DELETE` action.
    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the `ON UPDATE` action.
    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    fn render(&self, dialect: Dialect, out: &mut String) {
        let _ = write!(
            out,
            "REFERENCES {} ({})",
            dialect.quote_identifier(&self.on_table),
            dialect.quote_identifier(&self.references)
        );
        if let Some(action) = self.on_delete {
            let _ = write!(out, " ON DELETE {}", action.as_sql());
        }
        if let Some(action) = self.on_update {
            let _ = write!(out, " ON UPDATE {}", action.as_sql());
        }
    }
}

fn checked_table(table: &str) -> StrataResult<&str> {
    let table = table.trim();
    if table.is_empty() {
        return Err(StrataError::InvalidArgument(
            "Table name is required.".to_string(),
        ));
    }
    Ok(table)
}

fn quoted_list(dialect: Dialect, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds DDL for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blueprint {
    dialect: Dialect,
}

impl Blueprint {
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// A blueprint for the configured dialect.
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedDialect` for an unknown dialect name.
    pub fn from_settings(settings: &DatabaseSettings) -> StrataResult<Self> {
        Ok(Self::new(settings.dialect.parse()?))
    }

    /// The dialect DDL is rendered for.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Renders `CREATE TABLE` for `table` plus any requested indexes.
    pub fn create<F>(&self, table: &str, build: F) -> StrataResult<String>
    where
        F: FnOnce(&mut CreateTable) -> StrataResult<()>,
    {
        let mut create = CreateTable::new(self.dialect, checked_table(table)?);
        build(&mut create)?;
        create.to_sql()
    }

    /// Renders the `ALTER TABLE` statements for `table`, joined by `; `.
    pub fn alter<F>(&self, table: &str, build: F) -> StrataResult<String>
    where
        F: FnOnce(&mut AlterTable) -> StrataResult<()>,
    {
        let mut alter = AlterTable::new(self.dialect, checked_table(table)?);
        build(&mut alter)?;
        Ok(alter.to_sql())
    }

    /// `DROP TABLE IF EXISTS table`.
    pub fn drop_if_exists(&self, table: &str) -> StrataResult<String> {
        Ok(format!(
            "DROP TABLE IF EXISTS {}",
            self.dialect.quote_identifier(checked_table(table)?)
        ))
    }
}

#[derive(Debug, Clone)]
enum TableItem {
    Column { name: String, definition: String },
    Foreign { column: String, target: ForeignKey },
    Primary(Vec<String>),
}

/// Column definitions of a `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct CreateTable {
    dialect: Dialect,
    table: String,
    items: Vec<TableItem>,
    indexes: Vec<String>,
}

impl CreateTable {
    fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: table.to_string(),
            items: Vec::new(),
            indexes: Vec::new(),
        }
    }

    fn raw_column(&mut self, name: &str, definition: impl Into<String>) -> &mut Self {
        self.items.push(TableItem::Column {
            name: name.to_string(),
            definition: definition.into(),
        });
        self
    }

    fn typed(&mut self, name: &str, sql_type: &str, options: ColumnOptions) -> &mut Self {
        let mut definition = sql_type.to_string();
        options.render(&mut definition);
        self.raw_column(name, definition)
    }

    /// Auto-increment integer primary key named `id`.
    pub fn id(&mut self) -> &mut Self {
        let definition = match self.dialect {
            Dialect::Sqlite => "INTEGER PRIMARY KEY",
            Dialect::MySql => "INT AUTO_INCREMENT PRIMARY KEY",
            Dialect::PostgreSql => "SERIAL PRIMARY KEY",
        };
        self.raw_column("id", definition)
    }

    pub fn string(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        let sql_type = match self.dialect {
            Dialect::Sqlite => "TEXT",
            Dialect::MySql | Dialect::PostgreSql => "VARCHAR(255)",
        };
        self.typed(name, sql_type, options)
    }

    pub fn text(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        self.typed(name, "TEXT", options)
    }

    pub fn integer(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        self.typed(name, "INTEGER", options)
    }

    pub fn float(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        let sql_type = match self.dialect {
            Dialect::Sqlite => "REAL",
            Dialect::MySql | Dialect::PostgreSql => "FLOAT",
        };
        self.typed(name, sql_type, options)
    }

    pub fn double(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        let sql_type = match self.dialect {
            Dialect::Sqlite => "REAL",
            Dialect::MySql => "DOUBLE",
            Dialect::PostgreSql => "DOUBLE PRECISION",
        };
        self.typed(name, sql_type, options)
    }

    pub fn boolean(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        let sql_type = match self.dialect {
            Dialect::Sqlite => "INTEGER",
            Dialect::MySql | Dialect::PostgreSql => "BOOLEAN",
        };
        self.typed(name, sql_type, options)
    }

    pub fn date(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        self.typed(name, "DATE", options)
    }

    /// A date-time column. PostgreSQL has no `DATETIME` and gets `TIMESTAMP`.
    pub fn datetime(&mut self, name: &str, options: ColumnOptions) -> &mut Self {
        let sql_type = match self.dialect {
            Dialect::PostgreSql => "TIMESTAMP",
            Dialect::MySql | Dialect::Sqlite => "DATETIME",
        };
        self.typed(name, sql_type, options)
    }

    /// `created_at` and `updated_at`, both defaulting to now. MySQL also
    /// refreshes `updated_at` on every update.
    pub fn timestamps(&mut self) -> &mut Self {
        self.raw_column("created_at", "TIMESTAMP DEFAULT CURRENT_TIMESTAMP");
        let updated = match self.dialect {
            Dialect::MySql => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
            Dialect::PostgreSql | Dialect::Sqlite => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
        };
        self.raw_column("updated_at", updated)
    }

    /// Nullable `deleted_at` marker used by soft-delete models.
    pub fn soft_deletes(&mut self) -> &mut Self {
        self.raw_column("deleted_at", "TIMESTAMP NULL")
    }

    /// A table-level foreign key on an already declared `column`.
    pub fn foreign(&mut self, column: &str, target: ForeignKey) -> &mut Self {
        self.items.push(TableItem::Foreign {
            column: column.to_string(),
            target,
        });
        self
    }

    /// A composite primary key. An empty list adds nothing.
    pub fn primary(&mut self, columns: &[&str]) -> &mut Self {
        if !columns.is_empty() {
            self.items.push(TableItem::Primary(
                columns.iter().map(|c| (*c).to_string()).collect(),
            ));
        }
        self
    }

    /// A trailing `CREATE INDEX {column}_index` statement.
    pub fn index(&mut self, column: &str) -> &mut Self {
        let q = |s: &str| self.dialect.quote_identifier(s);
        let statement = format!(
            "CREATE INDEX {} ON {} ({})",
            q(&format!("{column}_index")),
            q(&self.table),
            q(column)
        );
        self.indexes.push(statement);
        self
    }

    /// Renders the statement.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` when no column was declared.
    pub fn to_sql(&self) -> StrataResult<String> {
        let dialect = self.dialect;
        let mut definitions = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let mut def = String::new();
            match item {
                TableItem::Column { name, definition } => {
                    let _ = write!(def, "{} {definition}", dialect.quote_identifier(name));
                }
                TableItem::Foreign { column, target } => {
                    let _ = write!(def, "FOREIGN KEY ({}) ", dialect.quote_identifier(column));
                    target.render(dialect, &mut def);
                }
                TableItem::Primary(columns) => {
                    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                    let _ = write!(def, "PRIMARY KEY ({})", quoted_list(dialect, &columns));
                }
            }
            definitions.push(def);
        }

        if !self
            .items
            .iter()
            .any(|item| matches!(item, TableItem::Column { .. }))
        {
            return Err(StrataError::InvalidState(format!(
                "Table '{}' has no columns",
                self.table
            )));
        }

        let mut sql = format!(
            "CREATE TABLE {} ({});",
            dialect.quote_identifier(&self.table),
            definitions.join(", ")
        );
        for index in &self.indexes {
            let _ = write!(sql, " {index};");
        }
        Ok(sql)
    }
}

/// Statements of an `ALTER TABLE` migration.
#[derive(Debug, Clone)]
pub struct AlterTable {
    dialect: Dialect,
    table: String,
    queries: Vec<String>,
}

impl AlterTable {
    fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: table.to_string(),
            queries: Vec::new(),
        }
    }

    fn q(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    fn alter_table(&self, action: &str) -> String {
        format!("ALTER TABLE {} {action}", self.q(&self.table))
    }

    /// `ADD COLUMN name type ...`.
    pub fn add_column(&mut self, name: &str, sql_type: &str, options: ColumnOptions) -> &mut Self {
        let mut action = format!("ADD COLUMN {} {sql_type}", self.q(name));
        options.render(&mut action);
        let statement = self.alter_table(&action);
        self.queries.push(statement);
        self
    }

    /// `DROP COLUMN name`.
    pub fn drop_column(&mut self, name: &str) -> &mut Self {
        let statement = self.alter_table(&format!("DROP COLUMN {}", self.q(name)));
        self.queries.push(statement);
        self
    }

    /// Changes a column's type, nullability and default.
    ///
    /// MySQL gets one `MODIFY COLUMN`; PostgreSQL one `ALTER COLUMN` per
    /// property.
    ///
    /// # Errors
    ///
    /// SQLite cannot alter columns in place and fails with `InvalidState`.
    pub fn modify_column(
        &mut self,
        name: &str,
        sql_type: &str,
        options: ColumnOptions,
    ) -> StrataResult<&mut Self> {
        let column = self.q(name);
        match self.dialect {
            Dialect::MySql => {
                let mut action = format!("MODIFY COLUMN {column} {sql_type}");
                options.render(&mut action);
                let statement = self.alter_table(&action);
                self.queries.push(statement);
            }
            Dialect::PostgreSql => {
                let mut statements = vec![
                    self.alter_table(&format!("ALTER COLUMN {column} TYPE {sql_type}")),
                    self.alter_table(&format!(
                        "ALTER COLUMN {column} {} NOT NULL",
                        if options.nullable { "DROP" } else { "SET" }
                    )),
                ];
                if let Some(default) = options.default.as_deref() {
                    statements.push(
                        self.alter_table(&format!("ALTER COLUMN {column} SET DEFAULT {default}")),
                    );
                }
                if options.unique {
                    statements.push(self.alter_table(&format!(
                        "ADD CONSTRAINT {} UNIQUE ({column})",
                        self.q(&format!("{}_{name}_unique", self.table))
                    )));
                }
                self.queries.extend(statements);
            }
            Dialect::Sqlite => {
                return Err(StrataError::InvalidState(format!(
                    "SQLite cannot modify column '{name}' in place"
                )));
            }
        }
        Ok(self)
    }

    /// `CREATE INDEX name ON table (columns)`.
    pub fn add_index(&mut self, name: &str, columns: &[&str]) -> StrataResult<&mut Self> {
        if columns.is_empty() {
            return Err(StrataError::InvalidArgument(format!(
                "Index '{name}' requires at least one column"
            )));
        }
        let statement = format!(
            "CREATE INDEX {} ON {} ({})",
            self.q(name),
            self.q(&self.table),
            quoted_list(self.dialect, columns)
        );
        self.queries.push(statement);
        Ok(self)
    }

    /// `DROP INDEX name`; MySQL names the table too.
    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        let statement = match self.dialect {
            Dialect::MySql => format!("DROP INDEX {} ON {}", self.q(name), self.q(&self.table)),
            Dialect::PostgreSql | Dialect::Sqlite => format!("DROP INDEX {}", self.q(name)),
        };
        self.queries.push(statement);
        self
    }

    /// `ADD CONSTRAINT name FOREIGN KEY (column) REFERENCES ...`.
    ///
    /// # Errors
    ///
    /// SQLite cannot add constraints to an existing table and fails with
    /// `InvalidState`.
    pub fn add_foreign_key(
        &mut self,
        name: &str,
        column: &str,
        target: ForeignKey,
    ) -> StrataResult<&mut Self> {
        if self.dialect == Dialect::Sqlite {
            return Err(StrataError::InvalidState(format!(
                "SQLite cannot add foreign key '{name}' to an existing table"
            )));
        }
        let mut action = format!(
            "ADD CONSTRAINT {} FOREIGN KEY ({}) ",
            self.q(name),
            self.q(column)
        );
        target.render(self.dialect, &mut action);
        let statement = self.alter_table(&action);
        self.queries.push(statement);
        Ok(self)
    }

    /// The collected statements, in order.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// The statements joined by `; `.
    pub fn to_sql(&self) -> String {
        self.queries.join("; ")
    }
}
