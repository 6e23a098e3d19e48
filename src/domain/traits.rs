//! # Domain Traits
//!
//! Abstract interfaces for the execution environment the parsed actions are applied to.
//! Allows for pluggable implementations in the Infrastructure layer (and fakes in tests).

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::types::CommandOutcome;

/// Abstract interface for the sandbox that performs file, directory and shell operations.
#[async_trait]
pub trait ExecutionTarget: Send + Sync {
    /// Write `content` to the absolute `path`, replacing any existing file.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Create the absolute directory `path` (and its parents).
    async fn create_directory(&self, path: &str) -> Result<()>;

    /// Run a shell command. A non-zero exit code is reported, not returned as an error.
    async fn run_command(&self, command: &str) -> Result<CommandOutcome>;

    /// Readiness test checked before each dispatch.
    fn is_ready(&self) -> bool;
}
