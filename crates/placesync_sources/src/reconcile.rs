//! Reconciliation of loaded records with indexed remote records.

use crate::index::SourceIndex;
use placesync_model::{Record, SyncState};
use std::collections::HashMap;

/// Gives `record` the remote identity matching `source_id`.
///
/// On a match the record inherits the remote identifier and endpoint and
/// will be saved as an update. Otherwise any identity it carried is cleared
/// so it will be saved as a creation. Returns true on a match.
pub fn reconcile(record: &mut Record, source_id: &str, index: &SourceIndex) -> bool {
    record.source_identifier = Some(source_id.to_string());

    match index.get(source_id) {
        Some(remote) if remote.is_synced() => {
            record.state = remote.state.clone();
            true
        }
        _ => {
            record.state = SyncState::Unsynced;
            false
        }
    }
}

/// Removes records whose source identifier reappears later in `records`.
///
/// The last occurrence wins and keeps its position; records without a
/// source identifier are always kept.
pub fn dedupe_last_wins(records: Vec<Record>) -> Vec<Record> {
    let mut last_seen: HashMap<String, usize> = HashMap::new();
    for (position, record) in records.iter().enumerate() {
        if let Some(source_id) = &record.source_identifier {
            last_seen.insert(source_id.clone(), position);
        }
    }

    let before = records.len();
    let deduped: Vec<Record> = records
        .into_iter()
        .enumerate()
        .filter(|(position, record)| match &record.source_identifier {
            Some(source_id) => last_seen.get(source_id) == Some(position),
            None => true,
        })
        .map(|(_, record)| record)
        .collect();

    if deduped.len() < before {
        tracing::warn!(
            "{} record(s) replaced by later records with the same source id",
            before - deduped.len()
        );
    }
    deduped
}

/// Concatenates loaded batches in load order and de-duplicates them, so a
/// record from a later source replaces one from an earlier source.
pub fn merge_sources<I>(batches: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    dedupe_last_wins(batches.into_iter().flatten().collect())
}
