//! # Application Layer
//!
//! The streaming core: tag tokenizer, narrative and fallback extraction, the pending
//! queue, the executor and the turn driver that ties them together.

pub mod attributes;
pub mod dispatch_log;
pub mod driver;
pub mod executor;
pub mod fallback;
pub mod feed;
pub mod narrative;
pub mod protocol;
pub mod queue;
pub mod tokenizer;

#[cfg(test)]
pub(crate) mod testing;
