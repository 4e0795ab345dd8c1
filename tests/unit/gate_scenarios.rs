use pdfgate::gate::{CloseRequest, Denial, LayerRole, Scope, DIAGNOSTIC_CONTEXT};
use pdfgate::{ExpirationGate, GateOutcome, OptionalContentGroup, RunGuard, SimulatedHost};

use crate::fixtures::TestFixtures;

fn gate(message: &str) -> ExpirationGate {
    ExpirationGate::new("2024-01-01T00:00:00", "2024-12-31T23:59:59", message)
        .with_checking_notice("Checking document validity...")
}

fn notice_and_content() -> Vec<OptionalContentGroup> {
    vec![
        OptionalContentGroup::new("text_notice", true),
        OptionalContentGroup::new("content_main", false),
    ]
}

fn mixed_layers() -> Vec<OptionalContentGroup> {
    vec![
        OptionalContentGroup::new("mask_01_01", true),
        OptionalContentGroup::new("expired_01", true),
        OptionalContentGroup::new("expired_mask_01", true),
        OptionalContentGroup::new("text_01", true),
        OptionalContentGroup::new("watermark", false),
    ]
}

#[test]
fn test_scenario_inside_window() {
    let mut host = SimulatedHost::new(TestFixtures::utc(2024, 6, 1, 0, 0, 0)).with_layers(notice_and_content());
    let outcome = gate("Document expired").run(&mut RunGuard::new(), &mut host);

    assert!(outcome.is_authorized());
    assert!(!host.layer("text_notice").unwrap().visible);
    assert!(!host.layer("content_main").unwrap().visible);
    assert_eq!(host.alerts(), ["Checking document validity...".to_string()]);
    assert!(host.close_calls().is_empty());
}

#[test]
fn test_scenario_after_window() {
    let mut host = SimulatedHost::new(TestFixtures::utc(2025, 1, 1, 0, 0, 0)).with_layers(notice_and_content());
    let outcome = gate("Document expired").run(&mut RunGuard::new(), &mut host);

    assert_eq!(
        outcome,
        GateOutcome::Denied(Denial {
            hidden: 1,
            alerted: true,
            close: CloseRequest::Issued(Scope::Document),
        })
    );
    assert!(!host.layer("text_notice").unwrap().visible);
    assert!(!host.layer("content_main").unwrap().visible);
    assert_eq!(host.alerts().last().unwrap(), "Document expired");
    assert_eq!(host.close_calls(), [(Scope::Document, true)]);
}

#[test]
fn test_window_bounds_are_inclusive() {
    for now in [
        TestFixtures::utc(2024, 1, 1, 0, 0, 0),
        TestFixtures::utc(2024, 12, 31, 23, 59, 59),
    ] {
        let mut host = SimulatedHost::new(now).with_layers(mixed_layers());
        assert!(gate("").run(&mut RunGuard::new(), &mut host).is_authorized());
        assert!(host.layers().iter().all(|layer| !layer.visible));
    }
}

#[test]
fn test_one_second_outside_is_denied() {
    for now in [
        TestFixtures::utc(2023, 12, 31, 23, 59, 59),
        TestFixtures::utc(2025, 1, 1, 0, 0, 0),
    ] {
        let mut host = SimulatedHost::new(now).with_layers(mixed_layers());
        let outcome = gate("").run(&mut RunGuard::new(), &mut host);
        assert!(matches!(outcome, GateOutcome::Denied(_)));
    }
}

#[test]
fn test_denial_touches_only_expiry_ui_layers() {
    let before = mixed_layers();
    let mut host = SimulatedHost::new(TestFixtures::utc(2026, 3, 1, 0, 0, 0)).with_layers(before.clone());
    gate("Document expired").run(&mut RunGuard::new(), &mut host);

    for original in &before {
        let after = host.layer(&original.name).unwrap();
        if original.role().is_expiry_ui() {
            assert!(!after.visible, "{} should be hidden", original.name);
        } else {
            assert_eq!(after.visible, original.visible, "{} should be untouched", original.name);
        }
    }
    assert_eq!(host.layer("mask_01_01").unwrap().role(), LayerRole::ProtectedContent);
}

#[test]
fn test_naive_window_follows_host_offset() {
    // 2024-12-31T23:30:00 in UTC+08:00 is 15:30 UTC, still inside the window
    // when the literals are read in the host's local offset.
    let east = chrono::FixedOffset::east_opt(8 * 3600).unwrap();
    let now = TestFixtures::utc(2024, 12, 31, 15, 30, 0).with_timezone(&east);
    let mut host = SimulatedHost::new(now).with_layers(mixed_layers());
    assert!(gate("").run(&mut RunGuard::new(), &mut host).is_authorized());

    // One second past local midnight in UTC-10:00 is outside.
    let west = chrono::FixedOffset::west_opt(10 * 3600).unwrap();
    let late = TestFixtures::utc(2025, 1, 1, 10, 0, 1).with_timezone(&west);
    let mut host = SimulatedHost::new(late).with_layers(mixed_layers());
    assert!(matches!(
        gate("").run(&mut RunGuard::new(), &mut host),
        GateOutcome::Denied(_)
    ));
}

#[test]
fn test_second_invocation_has_no_effect() {
    let mut guard = RunGuard::new();
    let mut host = SimulatedHost::new(TestFixtures::utc(2025, 6, 1, 0, 0, 0)).with_layers(mixed_layers());
    let gate = gate("Document expired");

    gate.run(&mut guard, &mut host);
    let alerts = host.alerts().len();
    let closes = host.close_calls().len();
    let layers = host.layers().to_vec();

    assert_eq!(gate.run(&mut guard, &mut host), GateOutcome::AlreadyRan);
    assert_eq!(host.alerts().len(), alerts);
    assert_eq!(host.close_calls().len(), closes);
    assert_eq!(host.layers(), layers.as_slice());
}

#[test]
fn test_missing_accessor_and_close() {
    let mut host = SimulatedHost::new(TestFixtures::utc(2025, 6, 1, 0, 0, 0))
        .without_document_close()
        .without_global_close();
    let outcome = gate("Document expired").run(&mut RunGuard::new(), &mut host);

    assert_eq!(
        outcome,
        GateOutcome::Denied(Denial {
            hidden: 0,
            alerted: true,
            close: CloseRequest::Unavailable,
        })
    );
}

#[test]
fn test_global_close_used_when_document_close_missing() {
    let mut host = SimulatedHost::new(TestFixtures::utc(2025, 6, 1, 0, 0, 0))
        .with_global_layers(mixed_layers())
        .without_document_close();
    gate("").run(&mut RunGuard::new(), &mut host);

    assert_eq!(host.close_calls(), [(Scope::Global, true)]);
    assert!(!host.layer("text_01").unwrap().visible);
}

#[test]
fn test_empty_message_alerts_only_checking_notice() {
    let mut host = SimulatedHost::new(TestFixtures::utc(2025, 6, 1, 0, 0, 0)).with_layers(mixed_layers());
    gate("").run(&mut RunGuard::new(), &mut host);
    assert_eq!(host.alerts(), ["Checking document validity...".to_string()]);
}

#[test]
fn test_unparseable_window_fails_closed() {
    let broken = ExpirationGate::new("not a date", "2024-12-31T23:59:59", "Document expired");
    let mut host = SimulatedHost::new(TestFixtures::utc(2024, 6, 1, 0, 0, 0)).with_layers(mixed_layers());

    match broken.run(&mut RunGuard::new(), &mut host) {
        GateOutcome::Failed { diagnostic, denial } => {
            assert!(diagnostic.starts_with(&format!("{}: ", DIAGNOSTIC_CONTEXT)));
            assert!(denial.is_some());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(host.alerts()[0].starts_with(DIAGNOSTIC_CONTEXT));
    assert!(host.layer("mask_01_01").unwrap().visible);
    assert!(!host.layer("text_01").unwrap().visible);
}

#[test]
fn test_accessor_error_is_reported_once() {
    let mut host = SimulatedHost::new(TestFixtures::utc(2024, 6, 1, 0, 0, 0)).with_broken_accessor("boom");
    let outcome = gate("").run(&mut RunGuard::new(), &mut host);

    assert!(matches!(outcome, GateOutcome::Failed { denial: None, .. }));
    let diagnostics: Vec<_> = host
        .alerts()
        .iter()
        .filter(|alert| alert.starts_with(DIAGNOSTIC_CONTEXT))
        .collect();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].ends_with("boom"));
    assert!(host.close_calls().is_empty());
}
