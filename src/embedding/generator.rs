//! External vector generator interface
//!
//! The embedding model lives outside this process. The core only consumes
//! its output contract: a batch of `(id, text)` pairs goes in, a vector or
//! a per-id failure marker comes back for each. `CommandGenerator` bridges
//! to a configured subprocess over JSON lines; tests substitute their own
//! implementations of the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// A whole-batch generation failure. Per-id failures travel inside
/// [`EmbeddingResult`] instead so one bad text never sinks its batch.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator failed to start: {0}")]
    Spawn(String),

    #[error("generator exited unsuccessfully: {0}")]
    Exited(String),

    #[error("generator produced malformed output: {0}")]
    Malformed(String),

    #[error("generator call timed out")]
    Timeout,

    #[error("io error talking to generator: {0}")]
    Io(#[from] std::io::Error),

    #[error("no generator command configured")]
    NotConfigured,
}

/// One `(id, text)` pair to embed.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub id: String,
    pub text: String,
}

/// Per-id outcome of a batch call. A failed id carries the generator's
/// message and is retried on the next synchronization pass.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub id: String,
    pub outcome: Result<Vec<f32>, String>,
}

/// Contract with the external vector generator.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks. All vectors destined for one store must share the
/// same dimensionality; the synchronizer rejects strays.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed a batch. Whole-batch failures return `Err`; per-id failures
    /// come back as failed [`EmbeddingResult`]s. Ids absent from the reply
    /// are treated as failed by the caller.
    async fn embed_batch(
        &self,
        batch: &[EmbeddingRequest],
    ) -> Result<Vec<EmbeddingResult>, GenerationError>;

    /// Generator name for logging.
    fn name(&self) -> &str;
}

/// One reply line from the subprocess: either an embedding or an error.
#[derive(Debug, Deserialize)]
struct WireReply {
    id: String,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

/// Bridges to an external embedding command.
///
/// Protocol: requests are written to the child's stdin as JSON lines
/// (`{"id": "...", "text": "..."}`), stdin is closed, and one JSON reply
/// line per id is read back (`{"id": "...", "embedding": [...]}` or
/// `{"id": "...", "error": "..."}`).
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }
}

#[async_trait]
impl EmbeddingGenerator for CommandGenerator {
    async fn embed_batch(
        &self,
        batch: &[EmbeddingRequest],
    ) -> Result<Vec<EmbeddingResult>, GenerationError> {
        // kill_on_drop: when the caller's timeout drops this future, the
        // child must die with it instead of running on as an orphan.
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GenerationError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GenerationError::Spawn("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::Spawn("child stdout unavailable".to_string()))?;

        for request in batch {
            let line = serde_json::to_string(request)
                .map_err(|e| GenerationError::Malformed(e.to_string()))?;
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }
        // Closing stdin signals end of batch.
        drop(stdin);

        let mut results = Vec::with_capacity(batch.len());
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply: WireReply = serde_json::from_str(&line)
                .map_err(|e| GenerationError::Malformed(format!("{e}: {line}")))?;
            let outcome = match (reply.embedding, reply.error) {
                (Some(embedding), None) => Ok(embedding),
                (_, Some(message)) => Err(message),
                (None, None) => Err("generator returned neither embedding nor error".to_string()),
            };
            results.push(EmbeddingResult {
                id: reply.id,
                outcome,
            });
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(GenerationError::Exited(status.to_string()));
        }

        tracing::debug!(
            requested = batch.len(),
            replied = results.len(),
            generator = %self.program,
            "generator batch complete"
        );
        Ok(results)
    }

    fn name(&self) -> &str {
        &self.program
    }
}
