//! CLI command implementations.

pub mod bench;
pub mod output;
pub mod pipeline;
pub mod storage;
