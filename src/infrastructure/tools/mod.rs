//! # Tools Module
//!
//! Execution targets that actually perform file writes, directory creation and shell commands.

pub mod sandbox;
