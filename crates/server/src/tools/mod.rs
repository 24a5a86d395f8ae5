//! Tool registry, argument binding and the BookStack tool catalog.

pub mod bookstack;
pub mod params;
pub mod registry;

pub use params::{BoundArgs, ParamDescriptor, ParamKind, ParamValue};
pub use registry::{
    Failure, FailureKind, InvocationResult, RegistryError, ToolDefinition, ToolDescriptor,
    ToolRegistry,
};

use bookstack_api::ApiError;
use thiserror::Error;

/// Error returned by a tool handler.
///
/// `InvalidArgument` surfaces as a BadRequest failure; everything else is an InternalError.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{message}")]
    InvalidArgument { parameter: String, message: String },

    #[error(transparent)]
    Upstream(#[from] ApiError),

    #[error("{0}")]
    Internal(String),

    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn invalid(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}
