//! Main Library File for Expiring PDF Documents
//! Compiles a validity window into a viewer-side gate script and prepares
//! documents whose pages stay hidden unless the gate authorizes access.

// Configuration and Errors
pub mod config;
pub mod error;

// Gate model and the script it compiles to
pub mod gate;
pub mod script;

// Document preparation
pub mod protect;
pub mod batch;

// Re-exports for crate consumers
pub use batch::{create_unique_output, run_batch, BatchReport};
pub use config::ProtectOptions;
pub use error::{Error, GateError, Result};
pub use gate::{
    ExpirationGate, GateOutcome, HostCapabilities, OptionalContentGroup, RunGuard, Scope, SimulatedHost,
    ValidityWindow,
};
pub use protect::{DocumentProtector, ProtectReport};
pub use script::render_open_action_script;
