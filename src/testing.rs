//! In-memory doubles for unit tests

use crate::db::{Database, RestoreOp, Row, TableCapture};
use crate::error::AppError;
use crate::introspection::ColumnInfo;
use crate::pipeline::confirm::{ConfirmationRequest, Confirmer};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct MockTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct MockState {
    tables: BTreeMap<String, MockTable>,
    /// (fragment, rows) checked in insertion order
    responses: Vec<(String, Vec<Row>)>,
    affected: Vec<(String, u64)>,
    fail_fetch: Vec<String>,
    fail_execute: Vec<String>,
    fail_restore: Vec<String>,
    fail_capture: bool,
    fetched: Vec<String>,
    executed: Vec<String>,
    events: Vec<String>,
    restore_calls: usize,
}

fn to_row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("test rows must be objects, got {}", other),
    }
}

fn injected(what: &str) -> AppError {
    AppError::Internal(format!("injected failure for {}", what))
}

/// Scriptable database. Reads answer from registered responses, writes
/// return registered affected counts, and restores act on in-memory tables.
#[derive(Default)]
pub struct MockDatabase {
    state: Mutex<MockState>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnInfo>, rows: Vec<serde_json::Value>) {
        let table = MockTable {
            columns,
            rows: rows.into_iter().map(to_row).collect(),
        };
        self.state.lock().unwrap().tables.insert(name.to_string(), table);
    }

    pub fn set_rows(&self, name: &str, rows: Vec<serde_json::Value>) {
        let mut state = self.state.lock().unwrap();
        if let Some(table) = state.tables.get_mut(name) {
            table.rows = rows.into_iter().map(to_row).collect();
        }
    }

    pub fn remove_table(&self, name: &str) {
        self.state.lock().unwrap().tables.remove(name);
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    pub fn table_rows(&self, name: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Any read whose SQL contains `fragment` returns `rows`
    pub fn respond_to(&self, fragment: &str, rows: Vec<serde_json::Value>) {
        let rows = rows.into_iter().map(to_row).collect();
        self.state.lock().unwrap().responses.push((fragment.to_string(), rows));
    }

    /// Any write whose SQL contains `fragment` reports `count` rows
    pub fn affect(&self, fragment: &str, count: u64) {
        self.state.lock().unwrap().affected.push((fragment.to_string(), count));
    }

    pub fn fail_fetch_on(&self, fragment: &str) {
        self.state.lock().unwrap().fail_fetch.push(fragment.to_string());
    }

    pub fn fail_execute_on(&self, fragment: &str) {
        self.state.lock().unwrap().fail_execute.push(fragment.to_string());
    }

    /// Any restore touching `table` fails and changes nothing
    pub fn fail_restore_on(&self, table: &str) {
        self.state.lock().unwrap().fail_restore.push(table.to_string());
    }

    pub fn fail_capture(&self) {
        self.state.lock().unwrap().fail_capture = true;
    }

    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Every call in order, e.g. `capture` or `execute:<sql>`
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn restore_calls(&self) -> usize {
        self.state.lock().unwrap().restore_calls
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("fetch:{}", sql));
        state.fetched.push(sql.to_string());

        if state.fail_fetch.iter().any(|f| sql.contains(f.as_str())) {
            return Err(injected(sql));
        }
        Ok(state
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("execute:{}", sql));

        if state.fail_execute.iter().any(|f| sql.contains(f.as_str())) {
            return Err(injected(sql));
        }
        state.executed.push(sql.to_string());
        Ok(state
            .affected
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, count)| *count)
            .unwrap_or(0))
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.events.push("list_tables".to_string());
        Ok(state.tables.keys().cloned().collect())
    }

    /// Reads every table under one lock, the in-memory analogue of a
    /// single repeatable-read transaction
    async fn capture(&self, sample_cap: usize) -> Result<Vec<TableCapture>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.events.push("capture".to_string());
        if state.fail_capture {
            return Err(injected("capture"));
        }

        Ok(state
            .tables
            .iter()
            .map(|(name, table)| TableCapture {
                table: name.clone(),
                columns: table.columns.clone(),
                row_count: table.rows.len() as i64,
                sample: table.rows.iter().take(sample_cap).cloned().collect(),
            })
            .collect())
    }

    async fn apply_restore(&self, ops: &[RestoreOp]) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.events.push("apply_restore".to_string());
        state.restore_calls += 1;

        // Work on a copy and swap it in only when every op succeeded
        let mut tables = state.tables.clone();
        for op in ops {
            let table = match op {
                RestoreOp::DropTable { table }
                | RestoreOp::CreateTable { table, .. }
                | RestoreOp::InsertRows { table, .. } => table,
            };
            if state.fail_restore.iter().any(|t| t == table) {
                return Err(injected(table));
            }

            match op {
                RestoreOp::DropTable { table } => {
                    tables.remove(table);
                }
                RestoreOp::CreateTable { table, columns } => {
                    if tables.contains_key(table) {
                        return Err(AppError::Internal(format!("table {} already exists", table)));
                    }
                    tables.insert(
                        table.clone(),
                        MockTable {
                            columns: columns.clone(),
                            rows: Vec::new(),
                        },
                    );
                }
                RestoreOp::InsertRows { table, columns, rows } => {
                    let target = tables
                        .get_mut(table)
                        .ok_or_else(|| AppError::Internal(format!("no table {}", table)))?;
                    for row in rows {
                        let projected: Row = columns
                            .iter()
                            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(serde_json::Value::Null)))
                            .collect();
                        target.rows.push(projected);
                    }
                }
            }
        }

        state.tables = tables;
        Ok(())
    }
}

/// Confirmer with a fixed answer that remembers what it was asked
pub struct ScriptedConfirmer {
    answer: Result<bool, String>,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl ScriptedConfirmer {
    pub fn approving() -> Self {
        Self::with(Ok(true))
    }

    pub fn denying() -> Self {
        Self::with(Ok(false))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Err(message.to_string()))
    }

    fn with(answer: Result<bool, String>) -> Self {
        Self {
            answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answer.clone().map_err(AppError::Internal)
    }
}
