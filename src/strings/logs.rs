use crate::domain::types::Action;

pub fn config_loaded(path: &str) -> String {
    format!("Loaded configuration from {path}")
}

pub const CONFIG_MISSING: &str = "No configuration file found, using defaults";

pub fn replay_started(path: &str, chunking: &str) -> String {
    format!("Replaying {path} ({chunking})")
}

pub fn log_reset_failed(err: &anyhow::Error) -> String {
    format!("Could not clear the previous session log: {err:#}")
}

pub fn shutdown_fail(err: &str) -> String {
    format!("Unable to listen for shutdown signal: {err}")
}

// --- Tokenizer ---

pub fn cursor_out_of_range(cursor: usize, len: usize) -> String {
    format!("Parser cursor {cursor} is not a valid offset into {len} bytes, waiting")
}

pub fn iteration_limit(limit: usize, cursor: usize) -> String {
    format!("Scan stopped after {limit} iterations at offset {cursor}, resuming on next chunk")
}

pub fn skipped_tag(reason: &str, tag: &str) -> String {
    format!("Skipped action tag ({reason}): {tag}")
}

pub const EMPTY_COMMAND_SKIPPED: &str = "Skipped shell action with an empty body";

pub fn fallback_ignored(language: &str, reason: &str) -> String {
    format!("Ignored fenced block [{language}]: {reason}")
}

// --- Executor ---

pub fn action_queued(action: &Action) -> String {
    format!("Execution target not ready, queued {} {}", action.label(), action.key())
}

pub fn file_written(path: &str, bytes: usize) -> String {
    format!("Wrote {path} ({bytes} bytes)")
}

pub fn directory_created(path: &str) -> String {
    format!("Created directory {path}")
}

pub fn command_finished(command: &str, exit_code: i32) -> String {
    format!("Command `{command}` exited with {exit_code}")
}

pub fn dispatch_failed(action: &Action, err: &anyhow::Error) -> String {
    format!("Failed to apply {} {}: {err:#}", action.label(), action.key())
}

pub fn queue_flushed(applied: usize, failed: usize) -> String {
    format!("Flushed pending actions: {applied} applied, {failed} failed")
}

// --- Turn driver ---

pub const TURN_STARTED: &str = "Turn started";
pub const TARGET_READY: &str = "Execution target became ready, flushing pending actions";
pub const TURN_CANCELLED: &str = "Turn cancelled, skipping final re-parse";

pub fn final_pass(actions: usize, skipped: usize) -> String {
    format!("Final re-parse found {actions} actions, {skipped} already applied")
}

pub fn final_rewrite(path: &str) -> String {
    format!("Final re-parse corrected {path}")
}

pub fn truncated_action(label: &str) -> String {
    format!("Stream ended inside an unfinished {label} action, dropping it")
}

pub fn fallback_used(actions: usize) -> String {
    format!("No action tags in response, recovered {actions} actions from code fences")
}

pub fn stream_error(message: &str) -> String {
    format!("Stream reported an error, aborting turn: {message}")
}

pub fn transport_error(err: &anyhow::Error) -> String {
    format!("Transport failed, aborting turn: {err:#}")
}

pub fn turn_finished(files: usize, commands: usize, pending: usize) -> String {
    format!("Turn finished: {files} files, {commands} commands, {pending} still pending")
}

// --- Sandbox ---

pub fn sandbox_ready(dir: &str) -> String {
    format!("Sandbox rooted at {dir}")
}

pub fn command_timeout(command: &str, secs: u64) -> String {
    format!("Command `{command}` timed out after {secs}s")
}
