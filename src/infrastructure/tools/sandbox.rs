//! # Local Sandbox
//!
//! An [`ExecutionTarget`] backed by a real directory. Virtual paths under the working
//! directory root are mapped into the sandbox directory, and every resolved path is
//! validated to stay inside it. Commands run through the configured shell in the
//! sandbox directory.

use anyhow::{Context as AnyhowContext, Result, anyhow, bail};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use crate::domain::config::CommandsConfig;
use crate::domain::paths::WorkDir;
use crate::domain::traits::ExecutionTarget;
use crate::domain::types::CommandOutcome;
use crate::strings::logs;

#[derive(Debug)]
pub struct LocalSandbox {
    /// Canonical sandbox directory.
    root: PathBuf,
    work_dir: WorkDir,
    shell: String,
    timeout: Duration,
    ready: AtomicBool,
}

impl LocalSandbox {
    /// Creates the sandbox directory if needed. The sandbox starts out ready.
    pub fn new(sandbox_dir: impl AsRef<Path>, work_dir: WorkDir, commands: &CommandsConfig) -> Result<Self> {
        let sandbox_dir = sandbox_dir.as_ref();
        std::fs::create_dir_all(sandbox_dir)
            .with_context(|| format!("Failed to create sandbox directory {}", sandbox_dir.display()))?;
        let root = sandbox_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve sandbox directory {}", sandbox_dir.display()))?;
        info!("{}", logs::sandbox_ready(&root.display().to_string()));

        Ok(Self {
            root,
            work_dir,
            shell: commands.shell.clone(),
            timeout: Duration::from_secs(commands.timeout.max(1)),
            ready: AtomicBool::new(true),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Marks the environment as booted (or not). Actions arriving while not ready are queued.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Maps a virtual path onto the sandbox directory.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf> {
        let normalized = self.work_dir.normalize(virtual_path);
        let root = self.work_dir.root();
        let relative = normalized
            .strip_prefix(&root)
            .unwrap_or(&normalized)
            .trim_start_matches('/');

        let mut path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => bail!("Access denied: '{}' leaves the sandbox", virtual_path),
            }
        }

        self.validate_path(&path)
    }

    /// Resolves symlinks through the deepest existing ancestor and checks the result
    /// is still under the sandbox root.
    fn validate_path(&self, path: &Path) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        let mut relative_parts = Vec::new();

        let abs_path = loop {
            if current.exists() {
                let mut resolved = current.canonicalize()?;
                for part in relative_parts.iter().rev() {
                    resolved.push(part);
                }
                break resolved;
            }

            match (current.parent(), current.file_name()) {
                (Some(parent), Some(name)) => {
                    relative_parts.push(name.to_owned());
                    current = parent.to_path_buf();
                }
                _ => bail!("Unable to validate path: {:?}", path),
            }
        };

        if abs_path.starts_with(&self.root) {
            Ok(abs_path)
        } else {
            Err(anyhow!(
                "Access denied: Path '{:?}' is outside the sandbox {:?}",
                abs_path,
                self.root
            ))
        }
    }
}

#[async_trait]
impl ExecutionTarget for LocalSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let safe_path = self.resolve(path)?;
        if let Some(parent) = safe_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create parent of {}", path))?;
        }
        tokio::fs::write(&safe_path, content)
            .await
            .with_context(|| format!("Failed to write {}", path))
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let safe_path = self.resolve(path)?;
        tokio::fs::create_dir_all(&safe_path)
            .await
            .with_context(|| format!("Failed to create directory {}", path))
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutcome> {
        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.args(["-c", command]);
        cmd.current_dir(&self.root);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.shell))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!(logs::command_timeout(command, self.timeout.as_secs())))?
            .context("Failed to collect command output")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut result = stdout.into_owned();
        if !stderr.is_empty() {
            if !result.is_empty() {
                result.push_str("\n--- STDERR ---\n");
            }
            result.push_str(&stderr);
        }

        Ok(CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            output: result,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
