//! In-memory viewer host with individually removable capabilities.

use chrono::{DateTime, FixedOffset};

use crate::error::GateError;
use crate::gate::host::{HostCapabilities, Scope};
use crate::gate::layer::OptionalContentGroup;

/// Records every call the gate makes so a run can be inspected afterwards.
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    now: Result<DateTime<FixedOffset>, GateError>,
    document_layers: Option<Vec<OptionalContentGroup>>,
    global_layers: Option<Vec<OptionalContentGroup>>,
    broken_accessor: Option<String>,
    alert_available: bool,
    document_close: bool,
    global_close: bool,
    alerts: Vec<String>,
    close_calls: Vec<(Scope, bool)>,
}

impl SimulatedHost {
    /// A host with alert and both close primitives, but no layer accessor.
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Ok(now),
            document_layers: None,
            global_layers: None,
            broken_accessor: None,
            alert_available: true,
            document_close: true,
            global_close: true,
            alerts: Vec::new(),
            close_calls: Vec::new(),
        }
    }

    pub fn with_layers(mut self, layers: Vec<OptionalContentGroup>) -> Self {
        self.document_layers = Some(layers);
        self
    }

    pub fn with_global_layers(mut self, layers: Vec<OptionalContentGroup>) -> Self {
        self.global_layers = Some(layers);
        self
    }

    /// The layer accessor exists but throws when called.
    pub fn with_broken_accessor(mut self, message: impl Into<String>) -> Self {
        self.broken_accessor = Some(message.into());
        self
    }

    pub fn with_failing_clock(mut self, message: impl Into<String>) -> Self {
        self.now = Err(GateError::ClockOrParseFailure(message.into()));
        self
    }

    pub fn without_alert(mut self) -> Self {
        self.alert_available = false;
        self
    }

    pub fn without_document_close(mut self) -> Self {
        self.document_close = false;
        self
    }

    pub fn without_global_close(mut self) -> Self {
        self.global_close = false;
        self
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    pub fn close_calls(&self) -> &[(Scope, bool)] {
        &self.close_calls
    }

    /// Layers as the gate would resolve them: document scope first.
    pub fn layers(&self) -> &[OptionalContentGroup] {
        self.document_layers
            .as_deref()
            .or(self.global_layers.as_deref())
            .unwrap_or(&[])
    }

    pub fn layer(&self, name: &str) -> Option<&OptionalContentGroup> {
        self.layers().iter().find(|layer| layer.name == name)
    }
}

impl HostCapabilities for SimulatedHost {
    fn now(&self) -> Result<DateTime<FixedOffset>, GateError> {
        self.now.clone()
    }

    fn alert(&mut self, message: &str) -> Result<(), GateError> {
        if !self.alert_available {
            return Err(GateError::CapabilityMissing("app.alert"));
        }
        self.alerts.push(message.to_string());
        Ok(())
    }

    fn ocgs(&mut self, scope: Scope) -> Result<&mut [OptionalContentGroup], GateError> {
        if let Some(message) = &self.broken_accessor {
            return Err(GateError::UnexpectedRuntime(message.clone()));
        }
        let layers = match scope {
            Scope::Document => self.document_layers.as_deref_mut(),
            Scope::Global => self.global_layers.as_deref_mut(),
        };
        layers.ok_or(GateError::CapabilityMissing(scope.ocg_accessor()))
    }

    fn close_doc(&mut self, scope: Scope, discard_changes: bool) -> Result<(), GateError> {
        let available = match scope {
            Scope::Document => self.document_close,
            Scope::Global => self.global_close,
        };
        if !available {
            return Err(GateError::CapabilityMissing(scope.close_primitive()));
        }
        self.close_calls.push((scope, discard_changes));
        Ok(())
    }
}
