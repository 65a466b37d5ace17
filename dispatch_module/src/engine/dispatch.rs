use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};
use transport_module::EmailTransport;
use uuid::Uuid;

use super::batch;
use super::dedup;
use super::executor::DeliveryExecutor;
use super::progress;
use super::schedule::next_run_after;
use super::store::SqliteCampaignStore;
use super::types::{
    Campaign, CampaignStatus, DispatchMode, DispatchSummary, EngineError, Recipient,
    RecipientSelector,
};

/// In-process record of campaigns with a dispatch run in flight. First line
/// of the per-campaign mutual exclusion; the store-level status claim is the
/// second, and the partial unique index on send records the last.
#[derive(Default)]
pub(crate) struct ActiveDispatches {
    inner: Mutex<HashSet<Uuid>>,
}

impl ActiveDispatches {
    fn try_begin(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        inner.insert(id)
    }

    fn release(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        inner.remove(&id);
    }
}

struct DispatchGuard<'a> {
    active: &'a ActiveDispatches,
    id: Uuid,
}

impl<'a> DispatchGuard<'a> {
    fn claim(active: &'a ActiveDispatches, id: Uuid) -> Result<Self, EngineError> {
        if !active.try_begin(id) {
            return Err(EngineError::ConcurrentDispatch(id));
        }
        Ok(Self { active, id })
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.active.release(self.id);
    }
}

/// How a finished run leaves the campaign.
enum RunCompletion {
    Complete,
    Rearm,
}

/// The shared dedup -> plan -> execute -> progress pipeline that both
/// user-initiated sends and ticker-fired schedules converge on.
pub struct DispatchEngine {
    store: Arc<SqliteCampaignStore>,
    transport: Arc<dyn EmailTransport>,
    active: ActiveDispatches,
}

impl DispatchEngine {
    pub fn new(store: Arc<SqliteCampaignStore>, transport: Arc<dyn EmailTransport>) -> Self {
        Self {
            store,
            transport,
            active: ActiveDispatches::default(),
        }
    }

    pub fn store(&self) -> &SqliteCampaignStore {
        &self.store
    }

    pub(crate) fn load_existing(&self, campaign_id: Uuid) -> Result<Campaign, EngineError> {
        match self.store.load_campaign(campaign_id)? {
            Some(campaign) if !campaign.deleted => Ok(campaign),
            _ => Err(EngineError::CampaignNotFound(campaign_id)),
        }
    }

    /// User-initiated send: explicit recipient ids or "all unsent".
    pub fn send_campaign(
        &self,
        campaign_id: Uuid,
        selector: &RecipientSelector,
    ) -> Result<DispatchSummary, EngineError> {
        let campaign = self.load_existing(campaign_id)?;
        let guard = DispatchGuard::claim(&self.active, campaign_id)?;

        // Holding the guard means no run is in flight in this process, so a
        // row still in `sending` is a stale claim from an interrupted run and
        // may be reclaimed for retry. Re-delivery stays impossible either
        // way: the partial unique index rejects a second `sent` record.
        let claimed = self.store.try_claim_dispatch(
            campaign_id,
            &[
                CampaignStatus::Draft,
                CampaignStatus::Scheduled,
                CampaignStatus::Sending,
                CampaignStatus::Active,
                CampaignStatus::Completed,
            ],
        )?;
        if !claimed {
            let current = self.load_existing(campaign_id)?;
            return Err(EngineError::InvalidTransition {
                from: current.status,
                action: "send".to_string(),
            });
        }

        let candidates = match selector {
            RecipientSelector::ExplicitIds { ids } => self.store.load_recipients(ids)?,
            RecipientSelector::AllUnsent => self.store.campaign_recipients(campaign_id)?,
        };
        let result = self.run(&campaign, candidates, RunCompletion::Complete);
        drop(guard);
        result
    }

    /// Ticker-fired dispatch of a due scheduled campaign. The atomic
    /// `scheduled -> sending` claim makes this safe to call from multiple
    /// concurrent ticker instances; the loser simply skips the campaign.
    pub fn fire_due_campaign(&self, campaign_id: Uuid) -> Result<Option<DispatchSummary>, EngineError> {
        let campaign = self.load_existing(campaign_id)?;
        if !campaign.is_due(Utc::now()) {
            return Ok(None);
        }
        let guard = match DispatchGuard::claim(&self.active, campaign_id) {
            Ok(guard) => guard,
            Err(EngineError::ConcurrentDispatch(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        if !self
            .store
            .try_claim_dispatch(campaign_id, &[CampaignStatus::Scheduled])?
        {
            return Ok(None);
        }

        // The persisted selection reproduces exactly the target set chosen at
        // schedule time, regardless of later recipient-table changes. It is
        // kept until the run finishes unpaused: a run that pauses mid-way
        // must be able to re-fire against the same selection after resume.
        let scheduled_ids = self.store.load_scheduled_set(campaign_id)?;
        let candidates = self.store.load_recipients(&scheduled_ids)?;

        let completion = match campaign.dispatch_mode {
            DispatchMode::Recurring => RunCompletion::Rearm,
            _ => RunCompletion::Complete,
        };
        let result = self.run(&campaign, candidates, completion);
        drop(guard);
        result.map(Some)
    }

    fn run(
        &self,
        campaign: &Campaign,
        candidates: Vec<Recipient>,
        completion: RunCompletion,
    ) -> Result<DispatchSummary, EngineError> {
        let candidate_ids: Vec<i64> = candidates.iter().map(|recipient| recipient.id).collect();
        let outcome = dedup::filter(&self.store, campaign.id, candidates)?;
        let mut summary = DispatchSummary {
            skipped_duplicates: outcome.duplicate_count,
            skipped_already_sent: outcome.already_sent_count,
            skipped_invalid: outcome.invalid_count,
            ..DispatchSummary::default()
        };

        if outcome.fresh.is_empty() {
            // "All recipients already sent" is a valid terminal state.
            info!(campaign_id = %campaign.id, "no fresh recipients; dispatch is a no-op");
            self.store.set_run_totals(campaign.id, 0, 0)?;
            self.finish(campaign, &candidate_ids, completion)?;
            return Ok(summary);
        }

        let batches = batch::plan_default(outcome.fresh);
        summary.total_batches = batches.len();
        self.store
            .set_run_totals(campaign.id, batches.iter().map(|b| b.recipients.len()).sum(), batches.len())?;
        info!(
            campaign_id = %campaign.id,
            total_batches = batches.len(),
            "dispatch run started"
        );

        let executor = DeliveryExecutor::new(&self.store, self.transport.as_ref());
        let mut paused = false;
        for planned in &batches {
            // Pause is honored between batches only; a batch in flight always
            // completes fully.
            if planned.seq > 0 {
                let current = self.load_existing(campaign.id)?;
                if current.status == CampaignStatus::Paused {
                    warn!(
                        campaign_id = %campaign.id,
                        completed = planned.seq,
                        "campaign paused mid-run; remaining batches deferred"
                    );
                    paused = true;
                    break;
                }
            }
            let result = executor.execute(campaign, planned)?;
            summary.sent += result.sent;
            summary.failed += result.failed;
            progress::advance(&self.store, campaign.id, &result)?;
        }

        if !paused {
            self.finish(campaign, &candidate_ids, completion)?;
        }
        Ok(summary)
    }

    fn finish(
        &self,
        campaign: &Campaign,
        candidate_ids: &[i64],
        completion: RunCompletion,
    ) -> Result<(), EngineError> {
        match completion {
            RunCompletion::Complete => {
                self.store.set_status(campaign.id, CampaignStatus::Completed)?;
                self.store.clear_scheduled_set(campaign.id)?;
            }
            RunCompletion::Rearm => {
                let interval = campaign.recurrence_interval.ok_or_else(|| {
                    EngineError::InvalidSchedule(
                        "recurring campaign has no recurrence_interval".to_string(),
                    )
                })?;
                let from = campaign.schedule_time.unwrap_or_else(Utc::now);
                let next = next_run_after(interval, from)?;
                // Re-persist the same selection so the next tick fires the
                // identical target set.
                self.store.save_scheduled_set(campaign.id, candidate_ids)?;
                let mut updated = self.load_existing(campaign.id)?;
                updated.schedule_time = Some(next);
                updated.status = CampaignStatus::Scheduled;
                updated.updated_at = Utc::now();
                self.store.update_campaign(&updated)?;
                info!(
                    campaign_id = %campaign.id,
                    next_run = %next.to_rfc3339(),
                    "recurring campaign re-armed"
                );
            }
        }
        Ok(())
    }
}
