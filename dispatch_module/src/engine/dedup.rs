use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::address;
use super::store::SqliteCampaignStore;
use super::types::{DuplicateStats, EngineError, Recipient, MAX_BATCH_SIZE};

/// Result of one read-only dedup pass. Calling [`filter`] repeatedly without
/// an intervening send yields identical outcomes.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub fresh: Vec<Recipient>,
    pub duplicate_count: usize,
    pub already_sent_count: usize,
    pub invalid_count: usize,
}

/// Narrow a candidate set to fresh unique addresses for a campaign.
///
/// 1. normalize every candidate address (invalid ones are dropped, counted);
/// 2. collapse to one recipient per normalized address, keeping the first
///    occurrence (tie-break: lowest recipient id);
/// 3. subtract addresses already holding a `sent` record for this campaign.
///
/// An empty `fresh` result is a valid terminal state, not an error.
pub fn filter(
    store: &SqliteCampaignStore,
    campaign_id: Uuid,
    candidates: Vec<Recipient>,
) -> Result<DedupOutcome, EngineError> {
    let mut unique: Vec<Recipient> = Vec::with_capacity(candidates.len());
    let mut index_by_address: HashMap<String, usize> = HashMap::with_capacity(candidates.len());
    let mut duplicate_count = 0usize;
    let mut invalid_count = 0usize;

    for mut candidate in candidates {
        let normalized = match address::normalize(&candidate.email) {
            Ok(normalized) => normalized,
            Err(_) => {
                debug!(
                    recipient_id = candidate.id,
                    "dropping candidate with invalid address"
                );
                invalid_count += 1;
                continue;
            }
        };
        candidate.email = normalized.clone();
        match index_by_address.get(&normalized) {
            Some(&index) => {
                duplicate_count += 1;
                if candidate.id < unique[index].id {
                    unique[index] = candidate;
                }
            }
            None => {
                index_by_address.insert(normalized, unique.len());
                unique.push(candidate);
            }
        }
    }

    let sent = store.sent_addresses(campaign_id)?;
    let mut fresh = Vec::with_capacity(unique.len());
    let mut already_sent_count = 0usize;
    for recipient in unique {
        if sent.contains(&recipient.email) {
            already_sent_count += 1;
        } else {
            fresh.push(recipient);
        }
    }

    Ok(DedupOutcome {
        fresh,
        duplicate_count,
        already_sent_count,
        invalid_count,
    })
}

/// The read-only "duplicate/fresh" counters the UI polls before a send is
/// committed, computed over the campaign's full attached recipient set.
pub fn duplicate_stats(
    store: &SqliteCampaignStore,
    campaign_id: Uuid,
) -> Result<DuplicateStats, EngineError> {
    let candidates = store.campaign_recipients(campaign_id)?;
    let total_recipients = candidates.len();
    let outcome = filter(store, campaign_id, candidates)?;
    Ok(DuplicateStats {
        total_recipients,
        unique_emails: outcome.fresh.len() + outcome.already_sent_count,
        duplicate_count: outcome.duplicate_count,
        sent_emails: outcome.already_sent_count,
        fresh_unique_emails: outcome.fresh.len(),
        batch_cap: MAX_BATCH_SIZE,
    })
}
