//! Parameterised conflict detection tests for `flightdeck-detector`.
//!
//! Covers the three baseline laws: equal values never conflict; one-sided
//! drift from the baseline wins silently; independent two-sided drift is
//! exactly one conflict carrying both values and the baseline.

use flightdeck_detector::{detect, FieldConflict, FieldMap};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn map(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Without a baseline
// ---------------------------------------------------------------------------

#[rstest]
#[case("active", "active")]
#[case("", "")]
#[case("blocked", "blocked")]
fn no_baseline_equal_values_no_conflict(#[case] db: &str, #[case] file: &str) {
    let conflicts = detect(&map(&[("status", db)]), &map(&[("status", file)]), None);
    assert!(conflicts.is_empty());
}

#[rstest]
#[case("active", "complete")]
#[case("", "active")]
#[case("pending", "")]
fn no_baseline_any_divergence_conflicts(#[case] db: &str, #[case] file: &str) {
    let conflicts = detect(&map(&[("status", db)]), &map(&[("status", file)]), None);
    assert_eq!(
        conflicts,
        vec![FieldConflict {
            field: "status".to_string(),
            db_value: db.to_string(),
            file_value: file.to_string(),
            last_sync_value: None,
        }]
    );
}

// ---------------------------------------------------------------------------
// With a baseline
// ---------------------------------------------------------------------------

#[rstest]
// Only the file changed: file wins silently.
#[case("active", "complete", "active")]
// Only the DB changed: DB wins silently.
#[case("blocked", "active", "active")]
fn one_sided_drift_is_not_a_conflict(
    #[case] db: &str,
    #[case] file: &str,
    #[case] baseline: &str,
) {
    let conflicts = detect(
        &map(&[("status", db)]),
        &map(&[("status", file)]),
        Some(&map(&[("status", baseline)])),
    );
    assert!(conflicts.is_empty(), "one-sided drift must win silently");
}

#[test]
fn two_sided_drift_is_exactly_one_conflict_with_baseline() {
    let conflicts = detect(
        &map(&[("status", "blocked")]),
        &map(&[("status", "complete")]),
        Some(&map(&[("status", "active")])),
    );
    assert_eq!(
        conflicts,
        vec![FieldConflict {
            field: "status".to_string(),
            db_value: "blocked".to_string(),
            file_value: "complete".to_string(),
            last_sync_value: Some("active".to_string()),
        }]
    );
}

#[test]
fn baseline_missing_field_is_empty_string() {
    // Baseline has no entry for the field: both sides having non-empty,
    // differing values means both changed relative to "".
    let conflicts = detect(
        &map(&[("agent_id", "a-1")]),
        &map(&[("agent_id", "a-2")]),
        Some(&map(&[])),
    );
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].last_sync_value.as_deref(), Some(""));
}

// ---------------------------------------------------------------------------
// Spec scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_equal_tracked_fields_stay_clean() {
    // DB status=active; file status=active, agent_id="" — no conflict.
    let db = map(&[("status", "active"), ("agent_id", "")]);
    let file = map(&[("status", "active"), ("agent_id", "")]);
    assert!(detect(&db, &file, None).is_empty());
}

#[test]
fn scenario_file_edit_against_stale_baseline() {
    // DB status=active, file edited to complete, baseline active: only the
    // file changed, so the edit wins without a conflict...
    let db = map(&[("status", "active")]);
    let file = map(&[("status", "complete")]);
    let baseline = map(&[("status", "active")]);
    assert!(detect(&db, &file, Some(&baseline)).is_empty());

    // ...but if the DB had moved too, it is a true conflict carrying all
    // three values.
    let db = map(&[("status", "blocked")]);
    let conflicts = detect(&db, &file, Some(&baseline));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].db_value, "blocked");
    assert_eq!(conflicts[0].file_value, "complete");
    assert_eq!(conflicts[0].last_sync_value.as_deref(), Some("active"));
}

#[test]
fn multi_field_conflicts_report_each_field_once() {
    let db = map(&[("status", "active"), ("agent_id", "a-1")]);
    let file = map(&[("status", "complete"), ("agent_id", "a-2")]);
    let conflicts = detect(&db, &file, None);
    assert_eq!(conflicts.len(), 2);
    assert!(conflicts.iter().any(|c| c.field == "status"));
    assert!(conflicts.iter().any(|c| c.field == "agent_id"));
}

#[test]
fn field_conflict_serializes_without_null_baseline() {
    let conflict = FieldConflict {
        field: "status".to_string(),
        db_value: "active".to_string(),
        file_value: "complete".to_string(),
        last_sync_value: None,
    };
    let json = serde_json::to_value(&conflict).expect("serialize");
    assert!(json.get("last_sync_value").is_none());
}
