//! Conflict detection for `flightdeck-detector`.
//!
//! [`detect`] compares the database-side and file-side field maps of one
//! phase and returns the fields in true conflict. Pure and stateless; the
//! sync engine owns all the surrounding state.
//!
//! Conflict rule: with a last-sync baseline, a field is a conflict only when
//! *both* sides changed independently (neither matches the baseline). If
//! only one side differs from the baseline, that side is assumed
//! authoritative and wins silently. Without a baseline the check degrades
//! to the conservative form: any divergence is a conflict.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Field values of one side of the sync, keyed by field name.
/// An absent field is equivalent to an empty string.
pub type FieldMap = BTreeMap<String, String>;

/// A single field whose two sides disagree and cannot be reconciled
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub db_value: String,
    pub file_value: String,
    /// The value both sides last agreed on, when a baseline was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_value: Option<String>,
}

/// Compare database state against file state field by field.
///
/// Iterates the union of field names on both sides in deterministic
/// (lexicographic) order, so repeated calls over the same inputs produce
/// identically ordered results.
pub fn detect(
    db_state: &FieldMap,
    file_state: &FieldMap,
    last_sync_state: Option<&FieldMap>,
) -> Vec<FieldConflict> {
    let mut conflicts = Vec::new();

    let all_fields: BTreeSet<&str> = db_state
        .keys()
        .chain(file_state.keys())
        .map(String::as_str)
        .collect();

    for field in all_fields {
        let db_value = value_of(db_state, field);
        let file_value = value_of(file_state, field);

        if db_value == file_value {
            continue;
        }

        let Some(baseline) = last_sync_state else {
            // No baseline: any divergence is a conflict.
            conflicts.push(FieldConflict {
                field: field.to_string(),
                db_value: db_value.to_string(),
                file_value: file_value.to_string(),
                last_sync_value: None,
            });
            continue;
        };

        let last_sync = value_of(baseline, field);
        let db_changed = db_value != last_sync;
        let file_changed = file_value != last_sync;

        if db_changed && file_changed {
            conflicts.push(FieldConflict {
                field: field.to_string(),
                db_value: db_value.to_string(),
                file_value: file_value.to_string(),
                last_sync_value: Some(last_sync.to_string()),
            });
        }
        // Only one side changed: that side wins, no conflict.
    }

    conflicts
}

fn value_of<'a>(map: &'a FieldMap, field: &str) -> &'a str {
    map.get(field).map(String::as_str).unwrap_or("")
}
