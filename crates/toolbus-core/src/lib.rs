//! Core types for the toolbus protocol.
//!
//! This crate is the foundation layer shared by every other toolbus crate:
//!
//! - [`Message`] and friends - the newline-delimited JSON wire model
//! - [`Error`] - the error taxonomy for the whole stack
//! - [`ToolCapability`] / [`ResourceCapability`] - the contracts a tool or
//!   resource implementation fulfils
//! - [`Registry`] - the name-keyed component registry used for dispatch
//! - [`ExecutionResult`] - the uniform dispatch envelope

mod capability;
mod error;
mod message;
mod registry;

pub use capability::{
    AuthContext, ExecutionResult, ResourceCapability, ResourceMetadata, ToolCapability,
    ToolDescriptor, ToolParameter,
};
pub use error::{ComponentKind, Error, Result};
pub use message::{ErrorPayload, HEALTH_CHECK_TOOL, Message, MessageType, RequestPayload};
pub use registry::Registry;

/// Error code relayed on the wire when dispatch or execution fails.
pub const EXECUTION_ERROR_CODE: &str = "EXECUTION_ERROR";
