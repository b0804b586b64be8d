//! Built-in tool implementations.

mod workspace;

pub use workspace::WorkspaceTool;
