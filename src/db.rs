//! Database connection management
//!
//! The execution driver every pipeline stage talks to. [`Database`] is the
//! seam; [`PostgresDatabase`] is the live implementation over a deadpool
//! connection pool. Each call checks out its own session, so nothing is held
//! open while the pipeline waits on an operator. A snapshot capture reads
//! every table inside one repeatable-read transaction, so counts and samples
//! all describe the same instant.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::introspection::{ColumnInfo, PostgresIntrospector};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use queries::SqlBuilder;
use tokio_postgres::{IsolationLevel, NoTls};
use tracing::{debug, info};

/// One result row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A single step of a snapshot restore. A restore is applied as one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOp {
    /// Drop a table with cascading semantics
    DropTable { table: String },
    /// Recreate a table from captured structure
    CreateTable { table: String, columns: Vec<ColumnInfo> },
    /// Bulk-insert captured rows, keyed by the captured column names
    InsertRows {
        table: String,
        columns: Vec<String>,
        rows: Vec<Row>,
    },
}

/// One table as read during a snapshot capture
#[derive(Debug, Clone, PartialEq)]
pub struct TableCapture {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    /// Total rows at capture time
    pub row_count: i64,
    /// At most `sample_cap` rows
    pub sample: Vec<Row>,
}

/// Relational execution driver consumed by the pipeline
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a read statement and return every row
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, AppError>;

    /// Run a statement for its side effects, returning the affected-row count
    async fn execute(&self, sql: &str) -> Result<u64, AppError>;

    /// Tables visible in the connected schema
    async fn list_tables(&self) -> Result<Vec<String>, AppError>;

    /// Structure, row count and a bounded sample of every visible table,
    /// all read from a single consistent view of the database
    async fn capture(&self, sample_cap: usize) -> Result<Vec<TableCapture>, AppError>;

    /// Apply every op inside one transaction. Any failure leaves the
    /// database exactly as it was before the call.
    async fn apply_restore(&self, ops: &[RestoreOp]) -> Result<(), AppError>;
}

/// Live PostgreSQL driver
pub struct PostgresDatabase {
    pool: Pool,
}

impl PostgresDatabase {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from configuration and verify it can reach the server
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = Self::create_pool(config)?;

        // Test connection
        let client = pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        drop(client);

        info!(
            "Database connection successful ({}@{}:{}/{}, TLS: {})",
            config.user, config.host, config.port, config.database, config.require_tls
        );
        Ok(Self::new(pool))
    }

    /// Create a connection pool with given configuration
    fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.database.clone());
        cfg.pool = Some(PoolConfig::new(config.max_pool_size));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        if config.require_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
                .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))
        }
    }
}

fn json_row(value: serde_json::Value) -> Result<Row, AppError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(AppError::Internal(format!(
            "Expected a JSON object row, got {}",
            other
        ))),
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let mut client = self.pool.get().await?;

        // Reads run in a read-only transaction so a probe can never write
        let transaction = client.build_transaction().read_only(true).start().await?;
        let rows = transaction.query(&SqlBuilder::rows_as_json(sql), &[]).await?;
        transaction.commit().await?;

        debug!("Fetched {} rows", rows.len());
        rows.iter()
            .map(|row| json_row(row.get::<_, serde_json::Value>("row")))
            .collect()
    }

    async fn execute(&self, sql: &str) -> Result<u64, AppError> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        // Dropping the transaction on error rolls it back
        let affected = transaction.execute(sql, &[]).await?;
        transaction.commit().await?;

        debug!("Statement affected {} rows", affected);
        Ok(affected)
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let client = self.pool.get().await?;
        PostgresIntrospector::get_tables(&client).await
    }

    async fn capture(&self, sample_cap: usize) -> Result<Vec<TableCapture>, AppError> {
        let mut client = self.pool.get().await?;
        let transaction = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;
        let limit = i64::try_from(sample_cap).unwrap_or(i64::MAX);

        let mut captured = Vec::new();
        for table in PostgresIntrospector::get_tables(&transaction).await? {
            let columns = PostgresIntrospector::get_columns(&transaction, &table).await?;
            let row_count: i64 = transaction
                .query_one(&SqlBuilder::count_rows(&table), &[])
                .await?
                .get(0);
            let sample = transaction
                .query(&SqlBuilder::sample_rows(&table), &[&limit])
                .await?
                .iter()
                .map(|row| json_row(row.get::<_, serde_json::Value>("row")))
                .collect::<Result<Vec<_>, _>>()?;

            captured.push(TableCapture {
                table,
                columns,
                row_count,
                sample,
            });
        }
        transaction.commit().await?;

        debug!("Captured {} tables in one transaction", captured.len());
        Ok(captured)
    }

    async fn apply_restore(&self, ops: &[RestoreOp]) -> Result<(), AppError> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        for op in ops {
            match op {
                RestoreOp::DropTable { table } => {
                    transaction
                        .execute(&SqlBuilder::drop_table_cascade(table), &[])
                        .await?;
                }
                RestoreOp::CreateTable { table, columns } => {
                    transaction
                        .execute(&SqlBuilder::create_table(table, columns), &[])
                        .await?;
                }
                RestoreOp::InsertRows { table, columns, rows } => {
                    let payload = serde_json::Value::Array(
                        rows.iter().cloned().map(serde_json::Value::Object).collect(),
                    );
                    transaction
                        .execute(&SqlBuilder::insert_json_rows(table, columns), &[&payload])
                        .await?;
                }
            }
        }

        transaction.commit().await?;
        info!("Applied {} restore operations in one transaction", ops.len());
        Ok(())
    }
}
