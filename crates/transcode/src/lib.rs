pub mod error;
mod runner;
mod tool;
mod transcode;

pub use crate::runner::{ProcessRunner, ToolOutput, ToolRunner};
#[cfg(any(test, feature = "mock"))]
pub use crate::runner::{Script, ScriptedRunner};
pub use crate::tool::{TOOL_NAME, ToolLocation};
pub use crate::transcode::{Stripped, Transcoder};
