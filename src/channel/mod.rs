//! Reconciliation of streamed output channels into stored messages.

pub mod merge;

pub use merge::{merge_channels, update_final_content, update_tool_execution};
