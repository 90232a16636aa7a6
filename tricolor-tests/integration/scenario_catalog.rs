//! Every canned scenario must hold its invariants and replay identically.

use tricolor_core::Color;
use tricolor_sim::{ScenarioRunner, scenarios};

#[test]
fn test_catalog_scenarios_pass() {
    let runner = ScenarioRunner::new(2024);

    for info in scenarios::catalog() {
        let report = runner.run_paused(&info.scenario()).unwrap();

        assert!(report.passed(), "{report}");
        assert_eq!(report.final_snapshot.in_flight, 0, "{}", info.name);
        assert!(report.final_snapshot.is_balanced(), "{}", info.name);
    }
}

#[test]
fn test_separate_isolation_overflows_only_red() {
    let report = ScenarioRunner::new(8)
        .run_paused(&scenarios::find("separate_isolation").unwrap())
        .unwrap();

    let snapshot = &report.final_snapshot;
    assert!(snapshot.black_box.overflow[Color::Red] > 0);
    assert_eq!(snapshot.black_box.overflow[Color::Blue], 0);
    assert_eq!(snapshot.black_box.overflow[Color::Yellow], 0);
}

#[test]
fn test_replay_is_deterministic() {
    let scenario = scenarios::find("lossy_transit").unwrap();

    let first = ScenarioRunner::new(77).run_paused(&scenario).unwrap();
    let second = ScenarioRunner::new(77).run_paused(&scenario).unwrap();

    assert_eq!(first.final_snapshot, second.final_snapshot);
    assert_eq!(first.transit, second.transit);
    assert_eq!(first.checks, second.checks);
}

#[test]
fn test_report_json_shape() {
    let report = ScenarioRunner::new(1)
        .run_paused(&scenarios::find("idle_terminal").unwrap())
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["scenario"], "idle_terminal");
    assert_eq!(json["violation_count"], 0);
    assert_eq!(json["final_snapshot"]["mode"], "shared");
    assert_eq!(json["final_snapshot"]["terminals"][1]["received"], 0);
}
