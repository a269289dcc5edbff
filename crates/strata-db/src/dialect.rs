//! SQL dialects and the text transformations that differ between them.
//!
//! Builders always emit `?` placeholders. [`Dialect::lower_placeholders`] is
//! the single pass that turns them into `$1..$n` for PostgreSQL. The
//! remaining helpers quote identifiers and render literals for diagnostic
//! traces.

use std::fmt;
use std::str::FromStr;

use strata_core::StrataError;

use crate::value::Value;

/// The SQL dialects strata can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    PostgreSql,
    /// SQLite 3.
    Sqlite,
}

impl Dialect {
    /// The canonical configuration name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns `true` for PostgreSQL, which numbers its placeholders.
    pub const fn uses_numbered_placeholders(self) -> bool {
        matches!(self, Self::PostgreSql)
    }

    /// Rewrites `?` placeholders to `$1..$n` for PostgreSQL.
    ///
    /// Question marks inside single-quoted literals are left alone. Other
    /// dialects get the input back unchanged.
    ///
    /// ```
    /// use strata_db::dialect::Dialect;
    ///
    /// let sql = "SELECT * FROM t WHERE a = ? AND b = '?' AND c = ?";
    /// assert_eq!(
    ///     Dialect::PostgreSql.lower_placeholders(sql),
    ///     "SELECT * FROM t WHERE a = $1 AND b = '?' AND c = $2"
    /// );
    /// assert_eq!(Dialect::MySql.lower_placeholders(sql), sql);
    /// ```
    pub fn lower_placeholders(self, sql: &str) -> String {
        if !self.uses_numbered_placeholders() {
            return sql.to_string();
        }
        let mut index = 0usize;
        replace_placeholders(sql, |out| {
            index += 1;
            out.push('$');
            out.push_str(&index.to_string());
        })
    }

    /// Quotes an identifier for DDL.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSql | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Renders `value` as a literal of this dialect.
    ///
    /// The result is meant for logs and traces only; statements are always
    /// executed with bound parameters.
    pub fn escape(self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => match self {
                Self::MySql => b.to_string(),
                Self::PostgreSql => if *b { "TRUE" } else { "FALSE" }.to_string(),
                Self::Sqlite => if *b { "1" } else { "0" }.to_string(),
            },
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            other => self.quote_string(&other.to_string()),
        }
    }

    fn quote_string(self, raw: &str) -> String {
        match self {
            Self::MySql => {
                let mut out = String::with_capacity(raw.len() + 2);
                out.push('\'');
                for c in raw.chars() {
                    match c {
                        '\0' => out.push_str("\\0"),
                        '\u{8}' => out.push_str("\\b"),
                        '\t' => out.push_str("\\t"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\u{1a}' => out.push_str("\\Z"),
                        '\'' | '"' | '\\' => {
                            out.push('\\');
                            out.push(c);
                        }
                        _ => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
            Self::PostgreSql => format!("'{}'", raw.replace('\'', "''")),
            Self::Sqlite => format!("'{}'", raw.replace('\\', "\\\\").replace('\'', "''")),
        }
    }

    /// Substitutes `params` into `sql` for a human-readable trace.
    ///
    /// PostgreSQL statements are matched on `$n`; the others on positional
    /// `?`. Placeholders without a matching parameter are left as written.
    pub fn interpolate(self, sql: &str, params: &[Value]) -> String {
        if self.uses_numbered_placeholders() {
            return interpolate_numbered(self, sql, params);
        }
        let mut remaining = params.iter();
        replace_placeholders(sql, |out| match remaining.next() {
            Some(value) => out.push_str(&self.escape(value)),
            None => out.push('?'),
        })
    }
}

/// Copies `sql`, handing each `?` outside a quoted literal to `emit`.
fn replace_placeholders(sql: &str, mut emit: impl FnMut(&mut String)) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_literal = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => emit(&mut out),
            _ => out.push(c),
        }
    }
    out
}

fn interpolate_numbered(dialect: Dialect, sql: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
        }
        if c != '$' || in_literal {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        let param = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        match param {
            Some(value) => out.push_str(&dialect.escape(value)),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgresql" | "postgres" | "pgsql" | "pg" => Ok(Self::PostgreSql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(StrataError::UnsupportedDialect(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!(" PostgreSQL ".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert_eq!("sqlite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, StrataError::UnsupportedDialect(ref d) if d == "oracle"));
    }

    #[test]
    fn test_display_roundtrip() {
        for d in [Dialect::MySql, Dialect::PostgreSql, Dialect::Sqlite] {
            assert_eq!(d.to_string().parse::<Dialect>().unwrap(), d);
        }
    }

    // ── Placeholders ────────────────────────────────────────────────

    #[test]
    fn test_lower_placeholders_postgres() {
        assert_eq!(
            Dialect::PostgreSql.lower_placeholders("a = ? AND b IN (?, ?)"),
            "a = $1 AND b IN ($2, $3)"
        );
    }

    #[test]
    fn test_lower_placeholders_skips_literals() {
        assert_eq!(
            Dialect::PostgreSql.lower_placeholders("x = 'it''s ?' AND y = ?"),
            "x = 'it''s ?' AND y = $1"
        );
    }

    #[test]
    fn test_lower_placeholders_other_dialects() {
        assert_eq!(Dialect::Sqlite.lower_placeholders("a = ?"), "a = ?");
        assert_eq!(Dialect::MySql.lower_placeholders("a = ?"), "a = ?");
    }

    // ── Identifiers ─────────────────────────────────────────────────

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::MySql.quote_identifier("users"), "`users`");
        assert_eq!(Dialect::MySql.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(Dialect::PostgreSql.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    // ── Escaping ────────────────────────────────────────────────────

    #[test]
    fn test_escape_scalars() {
        assert_eq!(Dialect::MySql.escape(&Value::Null), "NULL");
        assert_eq!(Dialect::PostgreSql.escape(&Value::Int(5)), "5");
        assert_eq!(Dialect::Sqlite.escape(&Value::Bool(true)), "1");
        assert_eq!(Dialect::Sqlite.escape(&Value::Bool(false)), "0");
        assert_eq!(Dialect::PostgreSql.escape(&Value::Bool(true)), "TRUE");
        assert_eq!(Dialect::MySql.escape(&Value::Bool(false)), "false");
        assert_eq!(Dialect::MySql.escape(&Value::Bytes(vec![0xAB, 1])), "X'AB01'");
    }

    #[test]
    fn test_escape_strings() {
        let v = Value::from("O'Reilly \\ co");
        assert_eq!(Dialect::MySql.escape(&v), "'O\\'Reilly \\\\ co'");
        assert_eq!(Dialect::PostgreSql.escape(&v), "'O''Reilly \\ co'");
        assert_eq!(Dialect::Sqlite.escape(&v), "'O''Reilly \\\\ co'");
        assert_eq!(Dialect::MySql.escape(&Value::from("a\nb")), "'a\\nb'");
    }

    #[test]
    fn test_escape_dates() {
        let d = chrono::NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(Dialect::Sqlite.escape(&Value::Date(d)), "'2024-05-06'");
    }

    // ── Interpolation ───────────────────────────────────────────────

    #[test]
    fn test_interpolate_positional() {
        let sql = "SELECT * FROM users WHERE name = ? AND age > ?";
        let params = [Value::from("Ann"), Value::Int(30)];
        assert_eq!(
            Dialect::MySql.interpolate(sql, &params),
            "SELECT * FROM users WHERE name = 'Ann' AND age > 30"
        );
    }

    #[test]
    fn test_interpolate_numbered() {
        let sql = "SELECT * FROM users WHERE name = $1 AND age > $2 AND x = $9";
        let params = [Value::from("Ann"), Value::Int(30)];
        assert_eq!(
            Dialect::PostgreSql.interpolate(sql, &params),
            "SELECT * FROM users WHERE name = 'Ann' AND age > 30 AND x = $9"
        );
    }

    #[test]
    fn test_interpolate_missing_params() {
        assert_eq!(Dialect::Sqlite.interpolate("a = ? AND b = ?", &[Value::Int(1)]), "a = 1 AND b = ?");
    }
}
