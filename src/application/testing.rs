//! Recording fake of the execution target shared by the application tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::domain::traits::ExecutionTarget;
use crate::domain::types::CommandOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(String, String),
    Mkdir(String),
    Run(String),
}

#[derive(Debug, Default)]
pub struct RecordingTarget {
    calls: Mutex<Vec<Call>>,
    ready: AtomicBool,
    /// Readiness checks still answered with `false` before `ready` is consulted.
    booting: AtomicUsize,
    failing: Mutex<Vec<String>>,
}

impl RecordingTarget {
    pub fn ready() -> Arc<Self> {
        let target = Self::default();
        target.ready.store(true, Ordering::SeqCst);
        Arc::new(target)
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ready, except that the first `checks` readiness queries report unavailable.
    pub fn booting(checks: usize) -> Arc<Self> {
        let target = Self::ready();
        target.booting.store(checks, Ordering::SeqCst);
        target
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Every call whose key (path or command) equals `key` fails after being recorded.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().push(key.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().iter().any(|k| k == key) {
            return Err(anyhow!("simulated failure for {}", key));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionTarget for RecordingTarget {
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.record(Call::Write(path.to_string(), content.to_string()), path)
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        self.record(Call::Mkdir(path.to_string()), path)
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutcome> {
        self.record(Call::Run(command.to_string()), command)?;
        let exit_code = if command.starts_with("false") { 1 } else { 0 };
        Ok(CommandOutcome {
            exit_code,
            output: String::new(),
        })
    }

    fn is_ready(&self) -> bool {
        let booting = self
            .booting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        !booting && self.ready.load(Ordering::SeqCst)
    }
}
