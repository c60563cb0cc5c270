//! Schema Introspection Module
//!
//! Reads the live table set and column structure that snapshots capture.

use crate::db::queries::{GET_COLUMNS, LIST_TABLES};
use crate::error::AppError;
use deadpool_postgres::GenericClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Column name and its DDL-ready type, in table order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Schema introspector for PostgreSQL
pub struct PostgresIntrospector;

impl PostgresIntrospector {
    /// Get all tables visible on the search path
    pub async fn get_tables<C: GenericClient>(client: &C) -> Result<Vec<String>, AppError> {
        let rows = client.query(LIST_TABLES, &[]).await?;
        let tables: Vec<String> = rows.iter().map(|row| row.get("name")).collect();

        debug!("Introspected {} tables", tables.len());
        Ok(tables)
    }

    /// Get columns for a table
    pub async fn get_columns<C: GenericClient>(
        client: &C,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, AppError> {
        let rows = client.query(GET_COLUMNS, &[&table]).await?;

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
            })
            .collect();

        Ok(columns)
    }
}
