use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::registry::RegistryClient;
use super::types::{JournalRecord, MAX_LOOKUP_CONCURRENCY, NONE, RunStats};

fn sanitize_lookup_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_LOOKUP_CONCURRENCY)
}

/// Indices of journals that still need a registry lookup.
pub fn pending_lookups(records: &[JournalRecord]) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.white_level.is_empty() || record.white_level == NONE)
        .map(|(idx, _)| idx)
        .collect()
}

/// Looks up every unresolved journal, at most `concurrency` at a time, and
/// writes resolved statuses back in place.
///
/// Journals that already carry a level are left alone; lookups that find no
/// level leave the journal unchanged.
pub async fn enrich_records(
    records: &mut [JournalRecord],
    client: &RegistryClient,
    concurrency: usize,
) -> RunStats {
    let pending = pending_lookups(records);
    if pending.is_empty() {
        return RunStats::tally(records, 0);
    }
    tracing::info!(
        pending = pending.len(),
        total = records.len(),
        "checking journals against the registry"
    );

    let permits = Arc::new(Semaphore::new(sanitize_lookup_concurrency(concurrency)));
    let mut set = JoinSet::new();
    for idx in pending {
        let permits = permits.clone();
        let client = client.clone();
        let issn = records[idx].issn.clone();
        let name = records[idx].name.clone();
        set.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (idx, None),
            };
            (idx, Some(client.check(&issn, &name).await))
        });
    }

    let mut updated = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Some(status))) if status.is_resolved() => {
                records[idx].apply_status(status);
                updated += 1;
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "registry lookup task failed"),
        }
    }

    let stats = RunStats::tally(records, updated);
    tracing::info!(
        total = stats.total,
        updated = stats.updated,
        white_listed = stats.white_listed,
        in_second_registry = stats.in_second_registry,
        "registry enrichment finished"
    );
    stats
}
