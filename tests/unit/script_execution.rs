//! Runs the compiled open-action script in an embedded JavaScript engine
//! against a mock viewer.

use boa_engine::{Context, Source};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use pdfgate::gate::DIAGNOSTIC_CONTEXT;
use pdfgate::{render_open_action_script, ExpirationGate, GateOutcome, OptionalContentGroup, RunGuard, SimulatedHost};

use crate::fixtures::TestFixtures;

const CHECKING: &str = "Checking document validity...";

const REPORT: &str = r#"JSON.stringify({
  alerts: __alerts,
  closes: __closes,
  layers: __layers.map(function(l){ return [l.name, l.state]; })
})"#;

/// Which primitives the mock viewer exposes, and where.
struct Viewer {
    layers: Vec<(&'static str, bool)>,
    document_ocgs: bool,
    global_ocgs: bool,
    document_close: bool,
    global_close: bool,
    alert_throws: bool,
}

#[derive(Debug, Deserialize)]
struct ViewerState {
    alerts: Vec<String>,
    closes: Vec<(String, bool)>,
    layers: Vec<(String, bool)>,
}

impl ViewerState {
    fn layer(&self, name: &str) -> bool {
        self.layers
            .iter()
            .find(|(layer, _)| layer == name)
            .map(|(_, visible)| *visible)
            .unwrap()
    }
}

impl Viewer {
    fn acrobat() -> Self {
        Self {
            layers: vec![
                ("mask_01_01", true),
                ("expired_01", true),
                ("expired_mask_01", true),
                ("text_01", true),
                ("watermark", false),
            ],
            document_ocgs: true,
            global_ocgs: false,
            document_close: true,
            global_close: false,
            alert_throws: false,
        }
    }

    fn prelude(&self) -> String {
        let layers: Vec<_> = self
            .layers
            .iter()
            .map(|(name, state)| serde_json::json!({ "name": name, "state": state }))
            .collect();
        let mut js = format!(
            "var __alerts = [];\nvar __closes = [];\nvar __layers = {};\nvar doc = {{}};\n",
            serde_json::Value::Array(layers)
        );
        js.push_str(if self.alert_throws {
            "var app = { alert: function(o){ throw new Error(\"alert broken\"); } };\n"
        } else {
            "var app = { alert: function(o){ __alerts.push(o.cMsg); } };\n"
        });
        if self.document_ocgs {
            js.push_str("doc.getOCGs = function(){ return __layers; };\n");
        }
        if self.global_ocgs {
            js.push_str("globalThis.getOCGs = function(){ return __layers; };\n");
        }
        if self.document_close {
            js.push_str("doc.closeDoc = function(d){ __closes.push([\"document\", d]); };\n");
        }
        if self.global_close {
            js.push_str("globalThis.closeDoc = function(d){ __closes.push([\"global\", d]); };\n");
        }
        js
    }

    /// Opens the document `runs` times with the viewer clock at `now`.
    fn open(&self, script: &str, now: DateTime<FixedOffset>, runs: usize) -> ViewerState {
        let clocked = script.replacen("new Date()", &format!("new Date({})", now.timestamp_millis()), 1);
        let invocation = format!("(function(){{\n{}\n}}).call(doc);", clocked);

        let mut context = Context::default();
        context.eval(Source::from_bytes(&self.prelude())).unwrap();
        for _ in 0..runs {
            context.eval(Source::from_bytes(&invocation)).unwrap();
        }
        let report = context.eval(Source::from_bytes(REPORT)).unwrap();
        let json = report.to_string(&mut context).unwrap().to_std_string_escaped();
        serde_json::from_str(&json).unwrap()
    }
}

fn script(message: &str) -> String {
    let gate = ExpirationGate::new("2024-01-01T00:00:00Z", "2024-12-31T23:59:59Z", message)
        .with_checking_notice(CHECKING);
    render_open_action_script(&gate)
}

#[test]
fn test_inside_window_hides_every_layer() {
    let state = Viewer::acrobat().open(&script("Document expired"), TestFixtures::utc(2024, 6, 1, 0, 0, 0), 1);

    assert!(state.layers.iter().all(|(_, visible)| !visible));
    assert_eq!(state.alerts, vec![CHECKING.to_string()]);
    assert!(state.closes.is_empty());
}

#[test]
fn test_after_window_hides_only_expiry_ui_and_closes() {
    let state = Viewer::acrobat().open(&script("Document expired"), TestFixtures::utc(2025, 1, 1, 0, 0, 0), 1);

    assert!(state.layer("mask_01_01"));
    assert!(state.layer("expired_01"));
    assert!(!state.layer("expired_mask_01"));
    assert!(!state.layer("text_01"));
    assert!(!state.layer("watermark"));
    assert_eq!(state.alerts, vec![CHECKING.to_string(), "Document expired".to_string()]);
    assert_eq!(state.closes, vec![("document".to_string(), true)]);
}

#[test]
fn test_bounds_are_inclusive() {
    let viewer = Viewer::acrobat();
    let script = script("");
    for now in [
        TestFixtures::utc(2024, 1, 1, 0, 0, 0),
        TestFixtures::utc(2024, 12, 31, 23, 59, 59),
    ] {
        let state = viewer.open(&script, now, 1);
        assert!(state.closes.is_empty(), "{} should be inside", now);
        assert!(!state.layer("mask_01_01"));
    }
    for now in [
        TestFixtures::utc(2023, 12, 31, 23, 59, 59),
        TestFixtures::utc(2025, 1, 1, 0, 0, 0),
    ] {
        let state = viewer.open(&script, now, 1);
        assert_eq!(state.closes.len(), 1, "{} should be outside", now);
        assert!(state.layer("mask_01_01"));
    }
}

#[test]
fn test_second_open_in_session_has_no_effect() {
    let viewer = Viewer::acrobat();
    let script = script("Document expired");
    let now = TestFixtures::utc(2025, 6, 1, 0, 0, 0);

    let once = viewer.open(&script, now, 1);
    let twice = viewer.open(&script, now, 2);
    assert_eq!(twice.alerts, once.alerts);
    assert_eq!(twice.closes, once.closes);
    assert_eq!(twice.layers, once.layers);
}

#[test]
fn test_missing_layer_accessor_and_close() {
    let viewer = Viewer {
        document_ocgs: false,
        document_close: false,
        ..Viewer::acrobat()
    };
    let state = viewer.open(&script("Document expired"), TestFixtures::utc(2025, 6, 1, 0, 0, 0), 1);

    assert!(state.layers.iter().zip(&viewer.layers).all(|((_, after), (_, before))| after == before));
    assert_eq!(state.alerts.last().unwrap(), "Document expired");
    assert!(state.closes.is_empty());
}

#[test]
fn test_global_primitives_used_as_fallback() {
    let viewer = Viewer {
        document_ocgs: false,
        global_ocgs: true,
        document_close: false,
        global_close: true,
        ..Viewer::acrobat()
    };
    let state = viewer.open(&script(""), TestFixtures::utc(2025, 6, 1, 0, 0, 0), 1);

    assert!(!state.layer("text_01"));
    assert!(state.layer("mask_01_01"));
    assert_eq!(state.closes, vec![("global".to_string(), true)]);
}

#[test]
fn test_document_close_preferred_over_global() {
    let viewer = Viewer {
        global_close: true,
        ..Viewer::acrobat()
    };
    let state = viewer.open(&script(""), TestFixtures::utc(2025, 6, 1, 0, 0, 0), 1);
    assert_eq!(state.closes, vec![("document".to_string(), true)]);
}

#[test]
fn test_unparseable_window_matches_rust_model() {
    let gate = ExpirationGate::new("not a date", "2024-12-31T23:59:59Z", "Document expired")
        .with_checking_notice(CHECKING);
    let now = TestFixtures::utc(2024, 6, 1, 0, 0, 0);

    let state = Viewer::acrobat().open(&render_open_action_script(&gate), now, 1);

    let layers = Viewer::acrobat()
        .layers
        .iter()
        .map(|(name, visible)| OptionalContentGroup::new(*name, *visible))
        .collect();
    let mut host = SimulatedHost::new(now).with_layers(layers);
    let outcome = gate.run(&mut RunGuard::new(), &mut host);

    match outcome {
        GateOutcome::Failed { diagnostic, denial } => {
            assert_eq!(state.alerts[1], diagnostic);
            assert!(denial.is_some());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(state.alerts[1].starts_with(DIAGNOSTIC_CONTEXT));
    assert_eq!(state.alerts, host.alerts());
    assert_eq!(state.closes, vec![("document".to_string(), true)]);
    assert!(state.layer("mask_01_01"));
    assert!(!state.layer("text_01"));
}

#[test]
fn test_throwing_alert_never_escapes() {
    let viewer = Viewer {
        alert_throws: true,
        ..Viewer::acrobat()
    };
    // `open` unwraps every evaluation, so an escaping exception fails here.
    let state = viewer.open(&script("Document expired"), TestFixtures::utc(2025, 6, 1, 0, 0, 0), 1);
    assert!(state.alerts.is_empty());
    assert!(state.closes.is_empty());
}
