//! # Messages
//!
//! User-facing text: narrative placeholders, feed labels and error notices.

pub const PROCESSING: &str = "Processing…";

/// "Created a", "Created a and b", "Created a, b and c" (file names only).
pub fn created_files(paths: &[String]) -> String {
    let names: Vec<&str> = paths
        .iter()
        .map(|path| path.rsplit('/').next().unwrap_or(path))
        .collect();

    match names.as_slice() {
        [] => String::new(),
        [only] => format!("Created {only}"),
        [rest @ .., last] => format!("Created {} and {last}", rest.join(", ")),
    }
}

pub fn stream_failed(err: &str) -> String {
    format!("❌ **Response Failed**: {err}")
}

pub const STOPPED: &str = "⏹️ Stopped by user.";

// --- Feed ---

pub const FEED_ACTIVE: &str = "**🔄 Active Task**";
pub const FEED_FINAL: &str = "**✅ Execution Complete**";
pub const FEED_STOPPED: &str = "**⏹️ Execution Stopped**";
pub const FEED_FAILED: &str = "**❌ Execution Failed**";

pub const LABEL_WROTE: &str = "Wrote";
pub const LABEL_CREATED: &str = "Created";
pub const LABEL_RAN: &str = "Ran";
pub const LABEL_QUEUED: &str = "Queued";
pub const LABEL_FAILED: &str = "Failed";

pub fn writing_file(path: &str) -> String {
    format!("Writing `{path}`")
}

pub const PREPARING_COMMAND: &str = "Preparing command";

pub fn running_command(command: &str) -> String {
    format!("Running: `{command}`")
}

pub fn exit_code(code: i32) -> String {
    format!("exit code {code}")
}

pub fn flushed(applied: usize, failed: usize) -> String {
    if failed == 0 {
        format!("Environment ready, applied {applied} pending actions")
    } else {
        format!("Environment ready, applied {applied} pending actions ({failed} failed)")
    }
}

pub fn truncated(label: &str) -> String {
    format!("Response ended inside an unfinished {label} action; it was not applied")
}

pub fn recovered_from_fences(actions: usize) -> String {
    format!("Recovered {actions} actions from code blocks")
}
