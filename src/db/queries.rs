//! SQL query constants and builders
//!
//! Contains all SQL the layer issues on its own behalf. Identifiers are always
//! quoted through [`SqlBuilder::quote_ident`] and originate from the catalog or
//! from a parsed statement, never from raw request text.

use crate::introspection::ColumnInfo;

/// List base tables and partitioned parents visible on the search path.
///
/// Partitions are left out: their rows are already read through the parent,
/// which restores as one plain table holding every row.
pub const LIST_TABLES: &str = r#"
    SELECT c.relname AS name
    FROM pg_catalog.pg_class c
        LEFT JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r','p')
        AND NOT c.relispartition
        AND n.nspname <> 'pg_catalog'
        AND n.nspname !~ '^pg_toast'
        AND n.nspname <> 'information_schema'
        AND pg_catalog.pg_table_is_visible(c.oid)
    ORDER BY name
"#;

/// Ordered column names and DDL-ready type names for one table
pub const GET_COLUMNS: &str = r#"
    SELECT
        a.attname AS column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type
    FROM pg_catalog.pg_attribute a
    WHERE a.attrelid = to_regclass(quote_ident($1))
        AND a.attnum > 0
        AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// SQL builder for safe identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        // PostgreSQL identifier quoting
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Wrap a read statement so each result row comes back as one JSON object
    pub fn rows_as_json(select_sql: &str) -> String {
        format!("SELECT row_to_json(t) AS row FROM ({}) AS t", select_sql)
    }

    /// Build COUNT(*) over a whole table
    pub fn count_rows(table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table))
    }

    /// Build a bounded JSON row sample; the limit is bound as `$1`
    pub fn sample_rows(table: &str) -> String {
        format!(
            "SELECT row_to_json(t) AS row FROM {} AS t LIMIT $1",
            Self::quote_ident(table)
        )
    }

    /// Build DROP TABLE with cascading semantics so dependents do not orphan
    pub fn drop_table_cascade(table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", Self::quote_ident(table))
    }

    /// Build CREATE TABLE from captured column definitions
    pub fn create_table(table: &str, columns: &[ColumnInfo]) -> String {
        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", Self::quote_ident(&c.name), c.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", Self::quote_ident(table), column_defs)
    }

    /// Build a bulk INSERT whose rows arrive as a single JSON array bound to `$1`.
    ///
    /// Values are matched to columns by key name, so the rows never pass
    /// through string interpolation.
    pub fn insert_json_rows(table: &str, columns: &[String]) -> String {
        let table = Self::quote_ident(table);
        let column_list = columns
            .iter()
            .map(|c| Self::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} ({cols}) SELECT {cols} FROM json_populate_recordset(NULL::{table}, $1::json)",
            table = table,
            cols = column_list
        )
    }
}
