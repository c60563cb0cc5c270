//! Statement analyzer
//!
//! Parses raw SQL once and derives everything later stages need: the
//! statement kind, the referenced tables and whether a mutation carries a
//! filtering predicate. Parse failures never raise; they come back as an
//! `Unknown` statement with the parser's message attached.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    self, visit_relations, ObjectName, ObjectNamePart, Query, SetExpr, Visit, Visitor,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::ControlFlow;

/// Closed set of statement shapes the pipeline reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Merge,
    Grant,
    Revoke,
    Analyze,
    Comment,
    Commit,
    Rollback,
    Unknown,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Merge => "MERGE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Analyze => "ANALYZE",
            Self::Comment => "COMMENT",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted statement plus its derived attributes
#[derive(Debug, Clone)]
pub struct Statement {
    /// Raw text exactly as submitted
    pub sql: String,
    pub kind: StatementKind,
    pub tables: BTreeSet<String>,
    /// Only meaningful for UPDATE and DELETE
    pub has_predicate: bool,
    /// Why the statement could not be analyzed
    pub parse_error: Option<String>,
    ast: Option<ast::Statement>,
}

impl Statement {
    fn unknown(sql: &str, reason: impl Into<String>) -> Self {
        Self {
            sql: sql.to_string(),
            kind: StatementKind::Unknown,
            tables: BTreeSet::new(),
            has_predicate: false,
            parse_error: Some(reason.into()),
            ast: None,
        }
    }

    /// The parsed tree, absent on parse failure
    pub fn ast(&self) -> Option<&ast::Statement> {
        self.ast.as_ref()
    }

    /// Text rebuilt from the parsed tree. This is what gets executed, so
    /// nothing reaches the database that did not survive parsing.
    pub fn canonical_sql(&self) -> Option<String> {
        self.ast.as_ref().map(|stmt| stmt.to_string())
    }

    /// Replay is only allowed for statements that cannot write
    pub fn is_read_only(&self) -> bool {
        self.kind == StatementKind::Select
    }

    /// Short preview for logs and summaries
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            flat
        } else {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

pub struct StatementAnalyzer;

impl StatementAnalyzer {
    /// Analyze one SQL statement
    pub fn analyze(sql: &str) -> Statement {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Statement::unknown(sql, "Empty statement");
        }

        let mut parsed = match Parser::parse_sql(&PostgreSqlDialect {}, trimmed) {
            Ok(parsed) => parsed,
            Err(e) => return Statement::unknown(sql, format!("Parse failure: {}", e)),
        };

        if parsed.len() != 1 {
            return Statement::unknown(
                sql,
                format!("Expected exactly one statement, found {}", parsed.len()),
            );
        }
        let stmt = parsed.remove(0);

        let nested_write = Self::has_nested_write(&stmt);
        let kind = if nested_write {
            StatementKind::Unknown
        } else {
            Self::kind_of(&stmt)
        };
        let has_predicate = Self::has_predicate(&stmt);
        let tables = Self::referenced_tables(&stmt);

        let parse_error = if nested_write {
            Some("Data-modifying statement inside a query".to_string())
        } else {
            (kind == StatementKind::Unknown)
                .then(|| format!("Unsupported statement form: {}", Self::leading_keyword(&stmt)))
        };

        Statement {
            sql: sql.to_string(),
            kind,
            tables,
            has_predicate,
            parse_error,
            ast: Some(stmt),
        }
    }

    fn kind_of(stmt: &ast::Statement) -> StatementKind {
        use ast::Statement as S;

        match stmt {
            S::Query(_) => StatementKind::Select,
            S::Insert { .. } => StatementKind::Insert,
            S::Update { .. } => StatementKind::Update,
            S::Delete { .. } => StatementKind::Delete,
            S::Drop { .. } => StatementKind::Drop,
            S::AlterTable { .. } => StatementKind::Alter,
            S::CreateTable { .. }
            | S::CreateView { .. }
            | S::CreateIndex { .. }
            | S::CreateSchema { .. } => StatementKind::Create,
            S::Truncate { .. } => StatementKind::Truncate,
            S::Merge { .. } => StatementKind::Merge,
            S::Grant { .. } => StatementKind::Grant,
            S::Revoke { .. } => StatementKind::Revoke,
            S::Analyze { .. } => StatementKind::Analyze,
            S::Comment { .. } => StatementKind::Comment,
            S::Commit { .. } => StatementKind::Commit,
            S::Rollback { .. } => StatementKind::Rollback,
            other => match Self::leading_keyword(other).as_str() {
                "CREATE" => StatementKind::Create,
                "ALTER" => StatementKind::Alter,
                "DROP" => StatementKind::Drop,
                _ => StatementKind::Unknown,
            },
        }
    }

    /// True when any query in the tree, including CTEs and subqueries,
    /// writes: a DML body or `SELECT ... INTO`
    fn has_nested_write(stmt: &ast::Statement) -> bool {
        stmt.visit(&mut NestedWriteFinder).is_break()
    }

    fn leading_keyword(stmt: &ast::Statement) -> String {
        stmt.to_string()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    fn has_predicate(stmt: &ast::Statement) -> bool {
        match stmt {
            ast::Statement::Update { selection, .. } => selection.is_some(),
            ast::Statement::Delete(delete) => delete.selection.is_some(),
            _ => false,
        }
    }

    /// Every relation the statement touches, including joins, subqueries
    /// and set-operation branches
    fn referenced_tables(stmt: &ast::Statement) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();

        let _ = visit_relations(stmt, |name| {
            let table = table_name(name);
            if !table.is_empty() {
                tables.insert(table);
            }
            ControlFlow::<()>::Continue(())
        });

        if let ast::Statement::Drop { names, .. } = stmt {
            tables.extend(names.iter().map(table_name).filter(|t| !t.is_empty()));
        }

        tables
    }
}

struct NestedWriteFinder;

impl Visitor for NestedWriteFinder {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if body_writes(&query.body) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

// Parenthesized subqueries are `SetExpr::Query` and get their own visit.
fn body_writes(body: &SetExpr) -> bool {
    match body {
        SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Delete(_) => true,
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => body_writes(left) || body_writes(right),
        _ => false,
    }
}

/// Unqualified name of a relation
pub(crate) fn table_name(name: &ObjectName) -> String {
    match name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => ident.value.clone(),
        _ => String::new(),
    }
}
