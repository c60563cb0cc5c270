//! Confirmation gate
//!
//! The orchestrator asks a [`Confirmer`] before running anything above LOW
//! risk. No database session is held while the answer is pending.

use crate::error::AppError;
use crate::pipeline::types::RiskAssessment;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Everything an operator needs to decide
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub sql: String,
    pub risk: RiskAssessment,
    pub estimated_rows: i64,
    pub tables: Vec<String>,
}

#[async_trait]
pub trait Confirmer: Send + Sync {
    /// `Ok(true)` approves. Errors are treated as a denial.
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool, AppError>;
}

/// Decision fixed in advance, e.g. the `approve` flag of an API request
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmer {
    approve: bool,
}

impl StaticConfirmer {
    pub fn new(approve: bool) -> Self {
        Self { approve }
    }
}

#[async_trait]
impl Confirmer for StaticConfirmer {
    async fn confirm(&self, _request: &ConfirmationRequest) -> Result<bool, AppError> {
        Ok(self.approve)
    }
}

/// Non-interactive policy function
pub struct PolicyConfirmer<F> {
    policy: F,
}

impl<F> PolicyConfirmer<F>
where
    F: Fn(&ConfirmationRequest) -> bool + Send + Sync,
{
    pub fn new(policy: F) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl<F> Confirmer for PolicyConfirmer<F>
where
    F: Fn(&ConfirmationRequest) -> bool + Send + Sync,
{
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool, AppError> {
        Ok((self.policy)(request))
    }
}

/// Interactive operator prompt. Shows the risk, its reason and the
/// estimate, then waits for `yes` or `no`, asking again on anything else.
pub struct ConsoleConfirmer<R, W> {
    io: Mutex<(BufReader<R>, W)>,
}

impl ConsoleConfirmer<tokio::io::Stdin, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> ConsoleConfirmer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((BufReader::new(reader), writer)),
        }
    }

    fn banner(request: &ConfirmationRequest) -> String {
        let rule = "=".repeat(60);
        let estimate = if request.estimated_rows >= 0 {
            request.estimated_rows.to_string()
        } else {
            "unable to estimate".to_string()
        };

        format!(
            "\n{rule}\n{level} risk operation\n{rule}\n\
             SQL statement: {sql}\n\
             Operation type: {kind}\n\
             Reason: {reason}\n\
             Tables: {tables}\n\
             Estimated affected rows: {estimate}\n{rule}\n",
            rule = rule,
            level = request.risk.level,
            sql = request.sql,
            kind = request.risk.statement_kind,
            reason = request.risk.reason,
            tables = request.tables.join(", "),
            estimate = estimate,
        )
    }
}

#[async_trait]
impl<R, W> Confirmer for ConsoleConfirmer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool, AppError> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        writer.write_all(Self::banner(request).as_bytes()).await?;
        loop {
            writer.write_all(b"Continue execution? (yes/no): ").await?;
            writer.flush().await?;

            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(AppError::Internal(
                    "Confirmation input closed before an answer".to_string(),
                ));
            }

            match line.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" => return Ok(true),
                "no" | "n" => return Ok(false),
                _ => writer.write_all(b"Please enter yes or no\n").await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::RiskLevel;
    use crate::simulation::StatementKind;

    fn request(level: RiskLevel) -> ConfirmationRequest {
        ConfirmationRequest {
            sql: "DELETE FROM person WHERE id = 4".to_string(),
            risk: RiskAssessment {
                level,
                reason: "test".to_string(),
                statement_kind: StatementKind::Delete,
            },
            estimated_rows: 1,
            tables: vec!["person".to_string()],
        }
    }

    #[tokio::test]
    async fn test_static_confirmer() {
        assert!(StaticConfirmer::new(true).confirm(&request(RiskLevel::High)).await.unwrap());
        assert!(!StaticConfirmer::new(false).confirm(&request(RiskLevel::High)).await.unwrap());
    }

    #[tokio::test]
    async fn test_console_confirmer_shows_risk_and_reads_answer() {
        let mut output = Vec::new();
        let approved = ConsoleConfirmer::new(&b"maybe\n YES \n"[..], &mut output)
            .confirm(&request(RiskLevel::High))
            .await
            .unwrap();
        assert!(approved);

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("HIGH risk operation"));
        assert!(shown.contains("SQL statement: DELETE FROM person WHERE id = 4"));
        assert!(shown.contains("Estimated affected rows: 1"));
        assert!(shown.contains("Please enter yes or no"));
        assert_eq!(shown.matches("Continue execution?").count(), 2);
    }

    #[tokio::test]
    async fn test_console_confirmer_denies_and_fails_on_closed_input() {
        let mut sink = Vec::new();
        let denied = ConsoleConfirmer::new(&b"n\n"[..], &mut sink)
            .confirm(&request(RiskLevel::Medium))
            .await
            .unwrap();
        assert!(!denied);

        let mut sink = Vec::new();
        let closed = ConsoleConfirmer::new(&b""[..], &mut sink)
            .confirm(&request(RiskLevel::Medium))
            .await;
        assert!(matches!(closed, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_policy_confirmer_sees_request() {
        let confirmer = PolicyConfirmer::new(|req: &ConfirmationRequest| req.risk.level != RiskLevel::Critical);
        assert!(confirmer.confirm(&request(RiskLevel::Medium)).await.unwrap());
        assert!(!confirmer.confirm(&request(RiskLevel::Critical)).await.unwrap());
    }
}
