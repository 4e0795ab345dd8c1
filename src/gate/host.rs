//! Capabilities a viewer host may expose to the gate.

use chrono::{DateTime, FixedOffset};

use crate::error::GateError;
use crate::gate::layer::OptionalContentGroup;

/// Where a host primitive lives: on the document object or in global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Document,
    Global,
}

impl Scope {
    /// Accessors are always tried document-first.
    pub const RESOLUTION_ORDER: [Scope; 2] = [Scope::Document, Scope::Global];

    pub fn ocg_accessor(self) -> &'static str {
        match self {
            Scope::Document => "this.getOCGs",
            Scope::Global => "getOCGs",
        }
    }

    pub fn close_primitive(self) -> &'static str {
        match self {
            Scope::Document => "this.closeDoc",
            Scope::Global => "closeDoc",
        }
    }
}

/// Host primitives consumed by the gate. Every primitive except the clock is
/// optional: the default bodies report `CapabilityMissing`, which the gate
/// treats as "fall back or skip".
pub trait HostCapabilities {
    /// Current time in the host's local offset.
    fn now(&self) -> Result<DateTime<FixedOffset>, GateError>;

    fn alert(&mut self, _message: &str) -> Result<(), GateError> {
        Err(GateError::CapabilityMissing("app.alert"))
    }

    /// The document's layers, in host order.
    fn ocgs(&mut self, scope: Scope) -> Result<&mut [OptionalContentGroup], GateError> {
        Err(GateError::CapabilityMissing(scope.ocg_accessor()))
    }

    fn close_doc(&mut self, scope: Scope, _discard_changes: bool) -> Result<(), GateError> {
        Err(GateError::CapabilityMissing(scope.close_primitive()))
    }
}
