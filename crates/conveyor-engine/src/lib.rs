//! # Conveyor Engine
//!
//! The pipeline core: load a node's declared implementation, invoke it
//! through the process invoker, normalize the returned payload, validate
//! it against the declared schemas, and fan it out across the graph's
//! connections to downstream assistants.
//!
//! ```text
//! assistant function call
//!   └── FunctionEngine::execute
//!         ├── FunctionsStore (per-assistant implementations)
//!         ├── normalize (args, paths, result reshaping)
//!         ├── ShellInvoker (external process, stdin JSON, sentinel split)
//!         └── OutputRouter (is_output only)
//!               ├── casing (port-name match, five folds)
//!               ├── SchemaValidator → InstanceStore
//!               └── MessageSender per matching connection
//! ```

pub mod batch;
pub mod casing;
pub mod executor;
pub mod impls;
pub mod invoker;
pub mod normalize;
pub mod outline;
pub mod overlay;
pub mod router;

pub use batch::{process_batches, BatchReport};
pub use executor::FunctionEngine;
pub use impls::FunctionsStore;
pub use invoker::{split_sentinel, ShellInvoker, OUTPUT_SENTINEL};
pub use outline::{parse_outlines, send_outlines, send_outlines_strict};
pub use overlay::{MessageOverlay, OverlayMessage, ThreadMessage};
pub use router::{OutputRouter, RoutingReport};
