//! WHERE / HAVING predicates and the buckets that hold them.
//!
//! A [`Conditions`] value keeps two ordered lists: the AND-joined primary
//! clauses and the OR alternatives appended after them. Each [`Clause`] owns
//! its bound values, so walking the lists in order yields parameters in
//! exactly the order their `?` placeholders are rendered.

use std::fmt::Write as _;

use strata_core::{StrataError, StrataResult};

use crate::value::Value;

/// Comparison operators accepted by `where`, `having` and join `on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
}

impl Operator {
    /// Parses an operator from the allow-list, ignoring case and surrounding
    /// whitespace.
    pub fn parse(raw: &str) -> StrataResult<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            ">" => Ok(Self::Gt),
            "<=" => Ok(Self::Lte),
            ">=" => Ok(Self::Gte),
            "LIKE" => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            _ => Err(StrataError::InvalidArgument(format!("Invalid operator: {raw}"))),
        }
    }

    /// The SQL spelling.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

/// How a clause attaches to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjunction {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl Conjunction {
    /// The SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// One predicate with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op ?`
    Compare {
        column: String,
        operator: Operator,
        value: Value,
    },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        column: String,
        negated: bool,
        low: Value,
        high: Value,
    },
    /// `column [NOT] IN (?, ...)`
    In {
        column: String,
        negated: bool,
        values: Vec<Value>,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
}

impl Predicate {
    /// `column op value`, validating the column.
    pub fn compare(column: &str, operator: Operator, value: Value) -> StrataResult<Self> {
        Ok(Self::Compare {
            column: checked_column(column)?,
            operator,
            value,
        })
    }

    /// `column [NOT] BETWEEN low AND high`.
    pub fn between(column: &str, negated: bool, low: Value, high: Value) -> StrataResult<Self> {
        Ok(Self::Between {
            column: checked_column(column)?,
            negated,
            low,
            high,
        })
    }

    /// `column [NOT] IN (values)`; the list must not be empty.
    pub fn in_list(column: &str, negated: bool, values: Vec<Value>) -> StrataResult<Self> {
        let column = checked_column(column)?;
        if values.is_empty() {
            return Err(StrataError::InvalidArgument(format!(
                "IN list for '{column}' requires at least one value"
            )));
        }
        Ok(Self::In {
            column,
            negated,
            values,
        })
    }

    /// `column IS [NOT] NULL`.
    pub fn null(column: &str, negated: bool) -> StrataResult<Self> {
        Ok(Self::Null {
            column: checked_column(column)?,
            negated,
        })
    }

    /// The column the predicate tests.
    pub fn column(&self) -> &str {
        match self {
            Self::Compare { column, .. }
            | Self::Between { column, .. }
            | Self::In { column, .. }
            | Self::Null { column, .. } => column,
        }
    }

    /// Appends the bound values in placeholder order.
    pub fn collect_values(&self, out: &mut Vec<Value>) {
        match self {
            Self::Compare { value, .. } => out.push(value.clone()),
            Self::Between { low, high, .. } => {
                out.push(low.clone());
                out.push(high.clone());
            }
            Self::In { values, .. } => out.extend(values.iter().cloned()),
            Self::Null { .. } => {}
        }
    }

    /// Number of placeholders this predicate renders.
    pub fn placeholder_count(&self) -> usize {
        match self {
            Self::Compare { .. } => 1,
            Self::Between { .. } => 2,
            Self::In { values, .. } => values.len(),
            Self::Null { .. } => 0,
        }
    }

    /// Renders the predicate with `?` placeholders.
    pub fn render(&self, out: &mut String) {
        let not = |negated: bool| if negated { "NOT " } else { "" };
        match self {
            Self::Compare {
                column, operator, ..
            } => {
                let _ = write!(out, "{column} {} ?", operator.as_sql());
            }
            Self::Between {
                column, negated, ..
            } => {
                let _ = write!(out, "{column} {}BETWEEN ? AND ?", not(*negated));
            }
            Self::In {
                column,
                negated,
                values,
            } => {
                let marks = vec!["?"; values.len()].join(", ");
                let _ = write!(out, "{column} {}IN ({marks})", not(*negated));
            }
            Self::Null { column, negated } => {
                let _ = write!(out, "{column} IS {}NULL", not(*negated));
            }
        }
    }
}

fn checked_column(column: &str) -> StrataResult<String> {
    let trimmed = column.trim();
    if trimmed.is_empty() {
        return Err(StrataError::InvalidArgument(
            "Column name must be a non-empty string".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// A predicate and the conjunction that links it to its predecessor.
///
/// The very first clause of a statement carries no conjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub predicate: Predicate,
    pub conjunction: Option<Conjunction>,
}

/// The primary (AND) and alternative (OR) clause lists of a WHERE or HAVING
/// section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    primary: Vec<Clause>,
    alternatives: Vec<Clause>,
}

impl Conditions {
    /// Creates an empty bucket pair.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an AND clause.
    ///
    /// `preceding` counts clauses that render before this bucket (the parent
    /// WHERE for a join scope). The clause is unlinked only when nothing at
    /// all precedes it.
    pub fn push_and(&mut self, predicate: Predicate, preceding: usize) {
        let conjunction = if preceding + self.primary.len() == 0 {
            None
        } else {
            Some(Conjunction::And)
        };
        self.primary.push(Clause {
            predicate,
            conjunction,
        });
    }

    /// Appends an OR alternative; fails if no primary clause exists yet.
    pub fn push_or(&mut self, predicate: Predicate, preceding: usize, section: &str) -> StrataResult<()> {
        if preceding + self.primary.len() == 0 {
            return Err(StrataError::InvalidState(format!(
                "No previous {section} clause to apply OR condition"
            )));
        }
        self.alternatives.push(Clause {
            predicate,
            conjunction: Some(Conjunction::Or),
        });
        Ok(())
    }

    /// The AND-joined clauses.
    pub fn primary(&self) -> &[Clause] {
        &self.primary
    }

    /// The OR alternatives.
    pub fn alternatives(&self) -> &[Clause] {
        &self.alternatives
    }

    /// Number of primary clauses.
    pub fn primary_len(&self) -> usize {
        self.primary.len()
    }

    /// Returns `true` when both lists are empty.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.alternatives.is_empty()
    }

    /// Returns `true` if a primary clause matches `predicate` exactly.
    pub fn contains(&self, predicate: &Predicate) -> bool {
        self.primary.iter().any(|c| &c.predicate == predicate)
    }

    /// Moves every clause of `other` to the end of the matching list.
    pub fn absorb(&mut self, other: Self) {
        self.primary.extend(other.primary);
        self.alternatives.extend(other.alternatives);
    }

    /// Iterates primary clauses then alternatives.
    pub fn iter(&self) -> impl Iterator<Item = &Clause> {
        self.primary.iter().chain(self.alternatives.iter())
    }

    /// Bound values: primary values, then alternative values.
    pub fn values(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.collect_values(&mut out);
        out
    }

    /// Appends bound values to `out` in render order.
    pub fn collect_values(&self, out: &mut Vec<Value>) {
        for clause in self.iter() {
            clause.predicate.collect_values(out);
        }
    }

    /// Renders ` {keyword} p1 AND p2 OR p3`, or nothing when empty.
    ///
    /// The first rendered clause drops its conjunction whatever it holds.
    pub fn render(&self, keyword: &str, out: &mut String) {
        for (i, clause) in self.iter().enumerate() {
            if i == 0 {
                out.push(' ');
                out.push_str(keyword);
            } else if let Some(conj) = clause.conjunction {
                out.push(' ');
                out.push_str(conj.as_sql());
            } else {
                out.push_str(" AND");
            }
            out.push(' ');
            clause.predicate.render(out);
        }
    }
}
