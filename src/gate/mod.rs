//! Expiration gate: decides once per document open whether protected layers
//! may be shown, and enforces the decision through the host's layer,
//! alert and close primitives.
//!
//! The gate never assumes a primitive exists. A missing primitive falls back
//! or is skipped; any other failure is contained at a single boundary in
//! [`ExpirationGate::run`] and reported through the host alert.

pub mod host;
pub mod layer;
pub mod simulated;
pub mod window;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, error, info, instrument, warn};

use crate::error::GateError;

pub use host::{HostCapabilities, Scope};
pub use layer::{LayerRole, OptionalContentGroup, EXPIRY_MASK_PREFIX, EXPIRY_NOTICE_PREFIX};
pub use simulated::SimulatedHost;
pub use window::{parse_timestamp, ValidityWindow};

/// Prefix of every diagnostic reported through the host alert.
pub const DIAGNOSTIC_CONTEXT: &str = "Error while verifying the document validity period";

/// One gate instance: the literals and messages baked in at generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationGate {
    start_literal: String,
    end_literal: String,
    expiry_message: String,
    checking_notice: Option<String>,
}

/// Per-session guard making a second invocation a no-op.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunGuard {
    already_ran: bool,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` on the first call only. The flag is set before the
    /// caller performs any side effect.
    pub fn enter(&mut self) -> bool {
        if self.already_ran {
            return false;
        }
        self.already_ran = true;
        true
    }

    pub fn already_ran(&self) -> bool {
        self.already_ran
    }
}

/// The single evaluation of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub now: DateTime<FixedOffset>,
    pub in_range: bool,
}

/// Which close primitive the denial branch reached, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    Issued(Scope),
    Unavailable,
}

/// Side effects of the unauthorized branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Expiry-UI layers set to hidden.
    pub hidden: usize,
    /// Whether the expiry message reached the host alert.
    pub alerted: bool,
    pub close: CloseRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The guard was already set; nothing was touched.
    AlreadyRan,
    Authorized { hidden: usize },
    Denied(Denial),
    /// The run hit an error. `denial` is set when the gate failed closed.
    Failed { diagnostic: String, denial: Option<Denial> },
}

impl GateOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, GateOutcome::Authorized { .. })
    }
}

impl ExpirationGate {
    /// `start` and `end` are kept verbatim and parsed on every run, as the
    /// viewer script does with its substituted literals.
    pub fn new(start: impl Into<String>, end: impl Into<String>, expiry_message: impl Into<String>) -> Self {
        Self {
            start_literal: start.into(),
            end_literal: end.into(),
            expiry_message: expiry_message.into(),
            checking_notice: None,
        }
    }

    pub fn from_window(window: &ValidityWindow, expiry_message: impl Into<String>) -> Self {
        let (start, end) = window.to_literals();
        Self::new(start, end, expiry_message)
    }

    /// Alerted at the start of every run, before the window is evaluated.
    pub fn with_checking_notice(mut self, notice: impl Into<String>) -> Self {
        let notice = notice.into();
        self.checking_notice = if notice.is_empty() { None } else { Some(notice) };
        self
    }

    pub fn start_literal(&self) -> &str {
        &self.start_literal
    }

    pub fn end_literal(&self) -> &str {
        &self.end_literal
    }

    pub fn expiry_message(&self) -> &str {
        &self.expiry_message
    }

    pub fn checking_notice(&self) -> Option<&str> {
        self.checking_notice.as_deref()
    }

    /// Runs the gate once against `host`. Never panics and never returns an
    /// error: failures come back as [`GateOutcome::Failed`].
    #[instrument(skip(self, guard, host))]
    pub fn run(&self, guard: &mut RunGuard, host: &mut dyn HostCapabilities) -> GateOutcome {
        if !guard.enter() {
            debug!("gate already ran in this session");
            return GateOutcome::AlreadyRan;
        }

        match self.evaluate_and_enforce(host) {
            Ok(outcome) => outcome,
            Err(err) => self.contain_failure(host, err),
        }
    }

    /// Resolves the clock and computes the inclusive range check.
    pub fn evaluate(&self, host: &dyn HostCapabilities) -> Result<ExecutionContext, GateError> {
        let now = host.now()?;
        let window = ValidityWindow::parse(&self.start_literal, &self.end_literal, now.offset())?;
        let in_range = window.contains(&now);
        debug!(%now, start = %window.start, end = %window.end, in_range, "validity window evaluated");
        Ok(ExecutionContext { now, in_range })
    }

    fn evaluate_and_enforce(&self, host: &mut dyn HostCapabilities) -> Result<GateOutcome, GateError> {
        if let Some(notice) = &self.checking_notice {
            try_alert(host, notice)?;
        }

        let context = self.evaluate(&*host)?;
        if context.in_range {
            let hidden = self.authorize(host)?;
            info!(hidden, "document authorized");
            Ok(GateOutcome::Authorized { hidden })
        } else {
            let denial = self.deny(host)?;
            info!(hidden = denial.hidden, close = ?denial.close, "document expired");
            Ok(GateOutcome::Denied(denial))
        }
    }

    /// Every layer is hidden; the protected content is visible through the
    /// document's default layer state once the overlays are gone.
    fn authorize(&self, host: &mut dyn HostCapabilities) -> Result<usize, GateError> {
        apply_to_layers(host, |layer| {
            layer.hide();
            true
        })
    }

    /// Hides expiry-UI layers only, shows the expiry message and asks the
    /// host to close the document without prompting to save.
    fn deny(&self, host: &mut dyn HostCapabilities) -> Result<Denial, GateError> {
        let hidden = apply_to_layers(host, |layer| {
            if layer.role().is_expiry_ui() {
                layer.hide();
                true
            } else {
                false
            }
        })?;

        let alerted = if self.expiry_message.is_empty() {
            false
        } else {
            try_alert(host, &self.expiry_message)?
        };

        let close = request_close(host)?;
        Ok(Denial { hidden, alerted, close })
    }

    fn contain_failure(&self, host: &mut dyn HostCapabilities, err: GateError) -> GateOutcome {
        let diagnostic = format!("{}: {}", DIAGNOSTIC_CONTEXT, err.message());
        error!(%err, "gate run failed");

        if let Err(alert_err) = try_alert(host, &diagnostic) {
            warn!(%alert_err, "could not report gate failure");
        }

        // A window that cannot be evaluated is treated as expired.
        let denial = match err {
            GateError::ClockOrParseFailure(_) => match self.deny(host) {
                Ok(denial) => Some(denial),
                Err(deny_err) => {
                    warn!(%deny_err, "fail-closed enforcement incomplete");
                    None
                }
            },
            _ => None,
        };

        GateOutcome::Failed { diagnostic, denial }
    }
}

/// Alerts if the host can. `Ok(false)` means the primitive is absent.
fn try_alert(host: &mut dyn HostCapabilities, message: &str) -> Result<bool, GateError> {
    match host.alert(message) {
        Ok(()) => Ok(true),
        Err(err) if err.is_capability_missing() => {
            debug!(%err, "alert unavailable");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Applies `f` to every layer of the first scope whose accessor exists and
/// returns how many layers `f` changed. No accessor means no layers.
fn apply_to_layers<F>(host: &mut dyn HostCapabilities, mut f: F) -> Result<usize, GateError>
where
    F: FnMut(&mut OptionalContentGroup) -> bool,
{
    for scope in Scope::RESOLUTION_ORDER {
        match host.ocgs(scope) {
            Ok(layers) => {
                let mut changed = 0;
                for layer in layers.iter_mut() {
                    if f(layer) {
                        changed += 1;
                    }
                }
                debug!(?scope, total = layers.len(), changed, "layers updated");
                return Ok(changed);
            }
            Err(err) if err.is_capability_missing() => continue,
            Err(err) => return Err(err),
        }
    }
    debug!("no layer accessor available");
    Ok(0)
}

fn request_close(host: &mut dyn HostCapabilities) -> Result<CloseRequest, GateError> {
    for scope in Scope::RESOLUTION_ORDER {
        match host.close_doc(scope, true) {
            Ok(()) => return Ok(CloseRequest::Issued(scope)),
            Err(err) if err.is_capability_missing() => continue,
            Err(err) => return Err(err),
        }
    }
    warn!("no close primitive available; document stays open");
    Ok(CloseRequest::Unavailable)
}
