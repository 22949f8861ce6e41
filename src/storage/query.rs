//! Engine-neutral SQL builders.
//!
//! Builders turn structured filter and mutation descriptions into a
//! [`Statement`]: SQL text plus the positional parameters it references. The
//! only thing they ask of a [`Dialect`] is the placeholder token, so adding a
//! backend never touches this module.
//!
//! Inputs are borrowed immutably; rendering never consumes or reorders the
//! caller's filters.

use std::fmt::Write as _;

use crate::storage::StorageError;
use crate::storage::dialect::Dialect;
use crate::storage::types::Value;

// =============================================================================
// Statement
// =============================================================================

/// Rendered SQL with its ordered parameter list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Statement with positional parameters.
    pub fn with_params<I, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Comparison applied by a filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
        }
    }
}

/// One `column <op> value` term.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub column: String,
    pub comparison: Comparison,
    pub value: Value,
}

/// Conjunction of equality and inequality terms.
///
/// Terms keep insertion order within each comparison kind. When rendered,
/// every `=` term comes before every `!=` term.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    terms: Vec<Criterion>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `column = value` term.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Comparison::Eq, value);
        self
    }

    /// Add a `column != value` term.
    pub fn not_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Comparison::NotEq, value);
        self
    }

    pub fn push(
        &mut self,
        column: impl Into<String>,
        comparison: Comparison,
        value: impl Into<Value>,
    ) {
        self.terms.push(Criterion {
            column: column.into(),
            comparison,
            value: value.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Terms in render order: equalities first, then inequalities.
    pub fn ordered(&self) -> impl Iterator<Item = &Criterion> {
        let eq = self.terms.iter().filter(|t| t.comparison == Comparison::Eq);
        let ne = self
            .terms
            .iter()
            .filter(|t| t.comparison == Comparison::NotEq);
        eq.chain(ne)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    /// Collects equality terms.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Filter::new(), |filter, (k, v)| filter.eq(k, v))
    }
}

// =============================================================================
// Mutations
// =============================================================================

/// Ordered `column = value` pairs for INSERT columns or UPDATE's SET clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignments {
    pairs: Vec<(String, Value)>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column; a repeated column replaces the earlier value in place.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.pairs.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(c, v)| (c.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Assignments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Assignments::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

/// Which rows an UPDATE touches.
///
/// There is no implicit default: updating every row must be spelled
/// [`UpdateScope::AllRows`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateScope {
    Matching(Filter),
    AllRows,
}

impl From<Filter> for UpdateScope {
    fn from(filter: Filter) -> Self {
        Self::Matching(filter)
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Accumulates SQL text and parameters, keeping placeholder numbering in sync.
struct SqlWriter<'d> {
    dialect: &'d Dialect,
    sql: String,
    params: Vec<Value>,
}

impl<'d> SqlWriter<'d> {
    fn new(dialect: &'d Dialect, head: String) -> Self {
        Self {
            dialect,
            sql: head,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &Value) {
        let token = self.dialect.placeholder().token(self.params.len());
        self.sql.push_str(&token);
        self.params.push(value.clone());
    }

    fn where_clause<'a>(&mut self, terms: impl Iterator<Item = &'a Criterion>) {
        for (i, term) in terms.enumerate() {
            self.sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            let _ = write!(self.sql, "{} {} ", term.column, term.comparison.operator());
            self.bind(&term.value);
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// `SELECT * FROM table [WHERE ...]`.
pub fn render_select(dialect: &Dialect, table: &str, filter: &Filter) -> Statement {
    let mut w = SqlWriter::new(dialect, format!("SELECT * FROM {table}"));
    w.where_clause(filter.ordered());
    w.finish()
}

/// `SELECT column FROM table`.
pub fn render_column(table: &str, column: &str) -> Statement {
    Statement::new(format!("SELECT {column} FROM {table}"))
}

/// `INSERT INTO table (a, b) VALUES (?, ?)`.
///
/// Empty data renders `INSERT INTO table DEFAULT VALUES`.
pub fn render_insert(dialect: &Dialect, table: &str, data: &Assignments) -> Statement {
    if data.is_empty() {
        return Statement::new(format!("INSERT INTO {table} DEFAULT VALUES"));
    }
    let columns: Vec<&str> = data.iter().map(|(c, _)| c).collect();
    let mut w = SqlWriter::new(
        dialect,
        format!("INSERT INTO {} ({}) VALUES (", table, columns.join(", ")),
    );
    for (i, (_, value)) in data.iter().enumerate() {
        if i > 0 {
            w.sql.push_str(", ");
        }
        w.bind(value);
    }
    w.sql.push(')');
    w.finish()
}

/// `UPDATE table SET a = ?, b = ? [WHERE ...]`.
///
/// Returns `None` when there is nothing to set.
pub fn render_update(
    dialect: &Dialect,
    table: &str,
    scope: &UpdateScope,
    data: &Assignments,
) -> Option<Statement> {
    if data.is_empty() {
        return None;
    }
    let mut w = SqlWriter::new(dialect, format!("UPDATE {table} SET "));
    for (i, (column, value)) in data.iter().enumerate() {
        if i > 0 {
            w.sql.push_str(", ");
        }
        let _ = write!(w.sql, "{column} = ");
        w.bind(value);
    }
    if let UpdateScope::Matching(filter) = scope {
        w.where_clause(filter.ordered());
    }
    Some(w.finish())
}

/// `DELETE FROM table WHERE ...`.
///
/// An empty filter is rejected; whole-table deletes go through
/// [`render_delete_all`].
pub fn render_delete(
    dialect: &Dialect,
    table: &str,
    filter: &Filter,
) -> Result<Statement, StorageError> {
    if filter.is_empty() {
        return Err(StorageError::EmptyFilter {
            table: table.to_string(),
        });
    }
    let mut w = SqlWriter::new(dialect, format!("DELETE FROM {table}"));
    w.where_clause(filter.ordered());
    Ok(w.finish())
}

/// `DELETE FROM table` with no restriction.
pub fn render_delete_all(table: &str) -> Statement {
    Statement::new(format!("DELETE FROM {table}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_placeholders(stmt: &Statement) -> usize {
        stmt.sql.matches('?').count()
    }

    #[test]
    fn test_select_without_filter_has_no_where() {
        let stmt = render_select(&Dialect::sqlite(), "reports", &Filter::new());
        assert_eq!(stmt.sql, "SELECT * FROM reports");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_single_filter() {
        let filter = Filter::new().eq("title", "apt");
        let stmt = render_select(&Dialect::sqlite(), "reports", &filter);
        assert_eq!(stmt.sql, "SELECT * FROM reports WHERE title = ?");
        assert_eq!(stmt.params, vec![Value::from("apt")]);
    }

    #[test]
    fn test_select_equals_before_not_equals() {
        let filter = Filter::new()
            .not_eq("status", "done")
            .eq("a", 1)
            .not_eq("kind", "x")
            .eq("b", 2);
        let stmt = render_select(&Dialect::sqlite(), "t", &filter);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t WHERE a = ? AND b = ? AND status != ? AND kind != ?"
        );
        assert_eq!(
            stmt.params,
            vec![
                Value::from(1),
                Value::from(2),
                Value::from("done"),
                Value::from("x")
            ]
        );
        assert_eq!(count_placeholders(&stmt), stmt.params.len());
    }

    #[test]
    fn test_select_where_term_count_matches_filter_size() {
        for size in 0..4 {
            let filter: Filter = (0..size).map(|i| (format!("c{i}"), i)).collect();
            let stmt = render_select(&Dialect::sqlite(), "t", &filter);
            assert_eq!(stmt.sql.matches(" = ").count(), size as usize);
            assert_eq!(stmt.sql.contains(" WHERE "), size > 0);
            assert_eq!(stmt.sql.matches(" AND ").count(), (size as usize).saturating_sub(1));
            let expected: Vec<Value> = (0..size).map(Value::from).collect();
            assert_eq!(stmt.params, expected);
        }
    }

    #[test]
    fn test_select_numbered_placeholders() {
        let filter = Filter::new().eq("a", 1).not_eq("b", 2);
        let stmt = render_select(&Dialect::postgres(), "t", &filter);
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = $1 AND b != $2");
    }

    #[test]
    fn test_filter_render_does_not_consume_input() {
        let filter = Filter::new().eq("a", 1).eq("b", 2);
        let first = render_select(&Dialect::sqlite(), "t", &filter);
        let second = render_select(&Dialect::sqlite(), "t", &filter);
        assert_eq!(first, second);
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_update_renders_set_then_where() {
        let data = Assignments::new().set("name", "n").set("done", 1);
        let scope = UpdateScope::Matching(Filter::new().eq("uid", "abc"));
        let stmt = render_update(&Dialect::sqlite(), "reports", &scope, &data).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE reports SET name = ?, done = ? WHERE uid = ?"
        );
        assert_eq!(
            stmt.params,
            vec![Value::from("n"), Value::from(1), Value::from("abc")]
        );
    }

    #[test]
    fn test_update_numbered_placeholders_continue_into_where() {
        let data = Assignments::new().set("a", 1).set("b", 2);
        let scope = UpdateScope::Matching(Filter::new().eq("id", 3));
        let stmt = render_update(&Dialect::postgres(), "t", &scope, &data).unwrap();
        assert_eq!(stmt.sql, "UPDATE t SET a = $1, b = $2 WHERE id = $3");
    }

    #[test]
    fn test_update_all_rows_has_no_where() {
        let data = Assignments::new().set("flag", 0);
        let stmt = render_update(&Dialect::sqlite(), "t", &UpdateScope::AllRows, &data).unwrap();
        assert_eq!(stmt.sql, "UPDATE t SET flag = ?");
    }

    #[test]
    fn test_update_empty_assignments_renders_nothing() {
        let scope = UpdateScope::Matching(Filter::new().eq("id", 1));
        assert!(render_update(&Dialect::sqlite(), "t", &scope, &Assignments::new()).is_none());
    }

    #[test]
    fn test_delete_contains_every_column() {
        let filter = Filter::new().eq("report_uid", "r1").eq("sen_index", 4);
        let stmt = render_delete(&Dialect::sqlite(), "report_sentences", &filter).unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM report_sentences WHERE report_uid = ? AND sen_index = ?"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_delete_empty_filter_rejected() {
        let err = render_delete(&Dialect::sqlite(), "t", &Filter::new()).unwrap_err();
        assert!(matches!(err, StorageError::EmptyFilter { .. }));
        assert_eq!(render_delete_all("t").sql, "DELETE FROM t");
    }

    #[test]
    fn test_insert_render() {
        let data = Assignments::new().set("uid", "u1").set("name", "n");
        let stmt = render_insert(&Dialect::postgres(), "reports", &data);
        assert_eq!(stmt.sql, "INSERT INTO reports (uid, name) VALUES ($1, $2)");
        let stmt = render_insert(&Dialect::sqlite(), "reports", &Assignments::new());
        assert_eq!(stmt.sql, "INSERT INTO reports DEFAULT VALUES");
    }

    #[test]
    fn test_assignments_replace_keeps_position() {
        let data = Assignments::new().set("a", 1).set("b", 2).set("a", 3);
        let cols: Vec<&str> = data.iter().map(|(c, _)| c).collect();
        assert_eq!(cols, vec!["a", "b"]);
        assert_eq!(data.get("a"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_column_render() {
        assert_eq!(render_column("attack_uids", "tid").sql, "SELECT tid FROM attack_uids");
    }
}
