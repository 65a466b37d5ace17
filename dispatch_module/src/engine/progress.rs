use tracing::info;
use uuid::Uuid;

use super::store::SqliteCampaignStore;
use super::types::{
    BatchResult, CampaignStatus, EngineError, ProgressSnapshot, SendStatus, MAX_BATCH_SIZE,
};

/// Build a consistent point-in-time view of send progress for a campaign.
///
/// Designed for ~2s polling by a client during a live send. The snapshot is
/// recomputed from persisted batch counters and send records on every read,
/// so it survives a page reload or service restart; completion is signaled
/// by `progress_percentage >= 100`.
pub fn snapshot(
    store: &SqliteCampaignStore,
    campaign_id: Uuid,
) -> Result<ProgressSnapshot, EngineError> {
    let (total_recipients, total_batches, completed_batches, status) = store
        .progress_row(campaign_id)?
        .ok_or(EngineError::CampaignNotFound(campaign_id))?;
    let total_sent = store.status_counts(campaign_id, SendStatus::Sent)?;
    let processing_batches =
        usize::from(status == CampaignStatus::Sending && completed_batches < total_batches);
    // A completed run with nothing fresh has no batches; pollers watching
    // for >= 100 still need to see it finish.
    let progress_percentage = if total_batches == 0 {
        if status == CampaignStatus::Completed {
            100.0
        } else {
            0.0
        }
    } else {
        completed_batches as f64 / total_batches as f64 * 100.0
    };
    Ok(ProgressSnapshot {
        campaign_id,
        total_recipients,
        total_sent,
        total_batches,
        completed_batches,
        processing_batches,
        progress_percentage,
        batch_cap: MAX_BATCH_SIZE,
    })
}

/// Record one completed batch. Called exactly once per batch by the delivery
/// executor, never per recipient, to bound update volume on large campaigns.
pub fn advance(
    store: &SqliteCampaignStore,
    campaign_id: Uuid,
    batch_result: &BatchResult,
) -> Result<(), EngineError> {
    store.increment_completed_batches(campaign_id)?;
    info!(
        %campaign_id,
        sent = batch_result.sent,
        failed = batch_result.failed,
        "batch complete"
    );
    Ok(())
}
