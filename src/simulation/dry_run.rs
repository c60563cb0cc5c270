//! Dry run estimator
//!
//! Rewrites a statement into a row-counting probe and runs it through the
//! read-only path of the driver. Nothing here can mutate state: probes are
//! always `SELECT COUNT(*)` forms, and literal INSERTs are counted without a
//! round trip.

use super::analyzer::{Statement, StatementKind};
use crate::db::Database;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{self, FromTable, Query, SetExpr, TableWithJoins};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

/// Sentinel for "could not estimate"
pub const ESTIMATE_UNAVAILABLE: i64 = -1;

/// Column every counting probe projects
const COUNT_COLUMN: &str = "estimated_rows";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunResult {
    pub estimated_rows: i64,
    pub probe_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DryRunResult {
    fn unavailable(probe_statement: Option<String>, note: impl Into<String>) -> Self {
        Self {
            estimated_rows: ESTIMATE_UNAVAILABLE,
            probe_statement,
            note: Some(note.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.estimated_rows >= 0
    }
}

/// A rewritten statement that yields the affected-row count
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Must be run against the database
    Count(String),
    /// Known without a round trip
    Constant(i64),
}

impl Probe {
    pub fn statement(&self) -> String {
        match self {
            Probe::Count(sql) => sql.clone(),
            Probe::Constant(n) => format!("SELECT {} AS {}", n, COUNT_COLUMN),
        }
    }
}

pub struct DryRunner;

impl DryRunner {
    /// Build a counting probe, or `None` when the statement shape has no
    /// meaningful row count (DDL, multi-target mutations, calls)
    pub fn rewrite(stmt: &Statement) -> Result<Option<Probe>, String> {
        let Some(tree) = stmt.ast() else {
            return Ok(None);
        };

        let probe = match (stmt.kind, tree) {
            (StatementKind::Select, ast::Statement::Query(query)) => {
                Some(Probe::Count(Self::count_query(query)))
            }
            (StatementKind::Update, ast::Statement::Update { table, from, selection, .. }) => {
                if from.is_some() {
                    None
                } else {
                    Self::count_target(table, selection.as_ref())
                }
            }
            (StatementKind::Delete, ast::Statement::Delete(delete)) => {
                let targets = match &delete.from {
                    FromTable::WithFromKeyword(targets) | FromTable::WithoutKeyword(targets) => targets,
                };
                if !delete.tables.is_empty() || delete.using.is_some() || targets.len() != 1 {
                    None
                } else {
                    Self::count_target(&targets[0], delete.selection.as_ref())
                }
            }
            (StatementKind::Insert, ast::Statement::Insert(insert)) => match &insert.source {
                // INSERT ... DEFAULT VALUES writes exactly one row
                None => Some(Probe::Constant(1)),
                Some(source) => match source.body.as_ref() {
                    SetExpr::Values(values) => Some(Probe::Constant(values.rows.len() as i64)),
                    _ => Some(Probe::Count(Self::count_query(source))),
                },
            },
            _ => None,
        };

        if let Some(Probe::Count(sql)) = &probe {
            Parser::parse_sql(&PostgreSqlDialect {}, sql)
                .map_err(|e| format!("Rewritten probe does not parse: {}", e))?;
        }

        Ok(probe)
    }

    /// Estimate affected rows. Never fails; problems come back as an
    /// unavailable estimate with a note.
    pub async fn estimate(db: &dyn Database, stmt: &Statement) -> DryRunResult {
        let probe = match Self::rewrite(stmt) {
            Ok(Some(probe)) => probe,
            Ok(None) => {
                return DryRunResult::unavailable(
                    None,
                    format!("No counting probe for {} statements", stmt.kind),
                )
            }
            Err(e) => {
                warn!("Dry-run rewrite failed: {}", e);
                return DryRunResult::unavailable(None, e);
            }
        };

        let probe_sql = probe.statement();
        let count = match probe {
            Probe::Constant(n) => n,
            Probe::Count(sql) => {
                debug!("Running dry-run probe: {}", sql);
                match db.fetch_rows(&sql).await {
                    Ok(rows) => {
                        let count = rows
                            .first()
                            .and_then(|row| row.get(COUNT_COLUMN))
                            .and_then(|value| value.as_i64());
                        match count {
                            Some(n) => n,
                            None => {
                                return DryRunResult::unavailable(
                                    Some(probe_sql),
                                    "Probe returned no count",
                                )
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Dry-run probe failed: {}", e);
                        return DryRunResult::unavailable(Some(probe_sql), e.to_string());
                    }
                }
            }
        };

        DryRunResult {
            estimated_rows: count,
            probe_statement: Some(probe_sql),
            note: None,
        }
    }

    /// Ordering never changes a count and may be expensive
    fn count_query(query: &Query) -> String {
        let mut query = query.clone();
        query.order_by = None;
        format!("SELECT COUNT(*) AS {} FROM ({}) AS t", COUNT_COLUMN, query)
    }

    fn count_target(target: &TableWithJoins, selection: Option<&ast::Expr>) -> Option<Probe> {
        if !target.joins.is_empty() {
            return None;
        }

        let mut sql = format!("SELECT COUNT(*) AS {} FROM {}", COUNT_COLUMN, target.relation);
        if let Some(predicate) = selection {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        Some(Probe::Count(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::StatementAnalyzer;
    use crate::testing::MockDatabase;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn probe(sql: &str) -> Option<Probe> {
        DryRunner::rewrite(&StatementAnalyzer::analyze(sql)).unwrap()
    }

    #[test]
    fn test_select_is_wrapped_and_order_dropped() {
        assert_eq!(
            probe("SELECT id FROM person WHERE id > 3 ORDER BY id DESC"),
            Some(Probe::Count(
                "SELECT COUNT(*) AS estimated_rows FROM (SELECT id FROM person WHERE id > 3) AS t".to_string()
            ))
        );
    }

    #[test]
    fn test_union_is_wrapped() {
        assert_eq!(
            probe("SELECT id FROM a UNION SELECT id FROM b"),
            Some(Probe::Count(
                "SELECT COUNT(*) AS estimated_rows FROM (SELECT id FROM a UNION SELECT id FROM b) AS t".to_string()
            ))
        );
    }

    #[test]
    fn test_update_and_delete_count_their_target() {
        assert_eq!(
            probe("UPDATE person SET location_id = 999"),
            Some(Probe::Count("SELECT COUNT(*) AS estimated_rows FROM person".to_string()))
        );
        assert_eq!(
            probe("DELETE FROM person WHERE id = 4"),
            Some(Probe::Count(
                "SELECT COUNT(*) AS estimated_rows FROM person WHERE id = 4".to_string()
            ))
        );
    }

    #[test]
    fn test_literal_insert_counts_rows() {
        assert_eq!(probe("INSERT INTO t VALUES (1, 'a'), (2, 'b')"), Some(Probe::Constant(2)));
        assert_eq!(Probe::Constant(2).statement(), "SELECT 2 AS estimated_rows");
    }

    #[test]
    fn test_insert_select_wraps_source() {
        assert_eq!(
            probe("INSERT INTO archive SELECT * FROM person WHERE id < 10"),
            Some(Probe::Count(
                "SELECT COUNT(*) AS estimated_rows FROM (SELECT * FROM person WHERE id < 10) AS t".to_string()
            ))
        );
    }

    #[test]
    fn test_declines_ddl_multi_target_and_unknown() {
        assert_eq!(probe("DROP TABLE person"), None);
        assert_eq!(probe("CREATE TABLE t (id INT)"), None);
        assert_eq!(probe("TRUNCATE person"), None);
        assert_eq!(probe("DELETE FROM person USING visit WHERE person.id = visit.person_id"), None);
        assert_eq!(probe("not sql at all"), None);
    }

    #[tokio::test]
    async fn test_literal_insert_estimate_skips_database() {
        let db = MockDatabase::new();
        let stmt = StatementAnalyzer::analyze("INSERT INTO t VALUES (1,'a'),(2,'b');");

        let result = DryRunner::estimate(&db, &stmt).await;

        assert_eq!(result.estimated_rows, 2);
        assert_eq!(result.probe_statement.as_deref(), Some("SELECT 2 AS estimated_rows"));
        assert!(db.fetched().is_empty());
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_select_estimate_runs_probe() {
        let db = MockDatabase::new();
        db.respond_to("COUNT(*)", vec![json!({"estimated_rows": 42})]);
        let stmt = StatementAnalyzer::analyze("SELECT * FROM person");

        let result = DryRunner::estimate(&db, &stmt).await;

        assert_eq!(result.estimated_rows, 42);
        assert!(result.is_available());
        assert_eq!(db.fetched().len(), 1);
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_is_unavailable_not_zero() {
        let db = MockDatabase::new();
        db.fail_fetch_on("COUNT(*)");
        let stmt = StatementAnalyzer::analyze("SELECT * FROM missing_table");

        let result = DryRunner::estimate(&db, &stmt).await;

        assert_eq!(result.estimated_rows, ESTIMATE_UNAVAILABLE);
        assert!(result.probe_statement.is_some());
        assert!(result.note.is_some());
    }

    #[tokio::test]
    async fn test_declined_rewrite_is_unavailable() {
        let db = MockDatabase::new();
        let stmt = StatementAnalyzer::analyze("DROP TABLE person");

        let result = DryRunner::estimate(&db, &stmt).await;

        assert_eq!(result.estimated_rows, ESTIMATE_UNAVAILABLE);
        assert_eq!(result.probe_statement, None);
    }
}
