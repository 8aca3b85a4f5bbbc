//! # Conveyor Core
//!
//! Shared foundation for the Conveyor pipeline engine: configuration,
//! the workspace-wide error type, the function/data model, and the
//! narrow traits through which external collaborators (process
//! invocation, the remote assistant API, the user-visible diagnostic
//! stream) are consumed.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ConveyorConfig;
pub use error::{ConveyorError, Result};
pub use traits::{DiagnosticSink, MessageSender, ProcessInvoker, TracingSink};
pub use types::{AssistantFunctions, AssistantReply, FunctionImplementation, InvokeRequest};
