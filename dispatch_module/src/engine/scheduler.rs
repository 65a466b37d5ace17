use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::dispatch::DispatchEngine;
use super::schedule::validate_schedule;
use super::template;
use super::types::{
    Campaign, CampaignStatus, ContentType, DispatchMode, DispatchSummary, EngineError,
    RecipientSelector, ScheduleRequest,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignDraft {
    pub name: String,
    pub subject: String,
    pub body: String,
    pub from_name: String,
    pub from_address: String,
    pub content_type: ContentType,
}

/// Partial edit; `schedule_time` is only touched when explicitly supplied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
}

/// Subject and body rendered against the fixed sample-variable set.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub subject: String,
    pub body: String,
    pub content_type: ContentType,
}

#[derive(Debug)]
pub enum ScheduleOutcome {
    /// Immediate mode: the dispatch ran synchronously.
    Dispatched(DispatchSummary),
    /// Scheduled/recurring: armed for a future ticker fire.
    Armed { next_run: DateTime<Utc> },
}

/// Resolves a campaign's temporal mode and drives the state machine:
/// draft -> scheduled -> sending -> active/completed, with paused reachable
/// from scheduled and active.
pub struct CampaignScheduler<'a> {
    engine: &'a DispatchEngine,
}

impl<'a> CampaignScheduler<'a> {
    pub fn new(engine: &'a DispatchEngine) -> Self {
        Self { engine }
    }

    pub fn create_campaign(&self, draft: CampaignDraft) -> Result<Campaign, EngineError> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: draft.name,
            subject: draft.subject,
            body: draft.body,
            from_name: draft.from_name,
            from_address: draft.from_address,
            content_type: draft.content_type,
            dispatch_mode: DispatchMode::Immediate,
            schedule_time: None,
            recurrence_interval: None,
            status: CampaignStatus::Draft,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.engine.store().insert_campaign(&campaign)?;
        Ok(campaign)
    }

    /// Validates per mode, then either dispatches synchronously (immediate)
    /// or persists the recipient selection and arms the schedule. Validation
    /// failures surface before any state mutation.
    pub fn schedule_campaign(
        &self,
        campaign_id: Uuid,
        request: ScheduleRequest,
    ) -> Result<ScheduleOutcome, EngineError> {
        let mut campaign = self.engine.load_existing(campaign_id)?;
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Scheduled) {
            return Err(EngineError::InvalidTransition {
                from: campaign.status,
                action: "schedule".to_string(),
            });
        }
        validate_schedule(&request, Utc::now())?;

        match request.mode {
            DispatchMode::Immediate => {
                campaign.dispatch_mode = DispatchMode::Immediate;
                campaign.updated_at = Utc::now();
                self.engine.store().update_campaign(&campaign)?;
                let summary = self.engine.send_campaign(
                    campaign_id,
                    &RecipientSelector::ExplicitIds {
                        ids: request.recipient_ids,
                    },
                )?;
                Ok(ScheduleOutcome::Dispatched(summary))
            }
            DispatchMode::Scheduled | DispatchMode::Recurring => {
                let next_run = request.schedule_time.ok_or_else(|| {
                    EngineError::InvalidSchedule("schedule_time is required".to_string())
                })?;
                self.engine
                    .store()
                    .save_scheduled_set(campaign_id, &request.recipient_ids)?;
                campaign.dispatch_mode = request.mode;
                campaign.schedule_time = Some(next_run);
                campaign.recurrence_interval = request.recurrence_interval;
                campaign.status = CampaignStatus::Scheduled;
                campaign.updated_at = Utc::now();
                self.engine.store().update_campaign(&campaign)?;
                info!(
                    %campaign_id,
                    mode = campaign.dispatch_mode.as_str(),
                    next_run = %next_run.to_rfc3339(),
                    "campaign scheduled"
                );
                Ok(ScheduleOutcome::Armed { next_run })
            }
        }
    }

    /// Render the campaign with sample data. Writes nothing and sends
    /// nothing; live sends always render per recipient instead.
    pub fn preview_campaign(&self, campaign_id: Uuid) -> Result<MessagePreview, EngineError> {
        let campaign = self.engine.load_existing(campaign_id)?;
        Ok(MessagePreview {
            subject: template::render_preview(&campaign.subject),
            body: template::render_preview(&campaign.body),
            content_type: campaign.content_type,
        })
    }

    /// Permitted in `draft` and `scheduled` only.
    pub fn edit_campaign(
        &self,
        campaign_id: Uuid,
        edit: CampaignEdit,
    ) -> Result<Campaign, EngineError> {
        let mut campaign = self.engine.load_existing(campaign_id)?;
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Scheduled) {
            return Err(EngineError::InvalidTransition {
                from: campaign.status,
                action: "edit".to_string(),
            });
        }
        if let Some(name) = edit.name {
            campaign.name = name;
        }
        if let Some(subject) = edit.subject {
            campaign.subject = subject;
        }
        if let Some(body) = edit.body {
            campaign.body = body;
        }
        if let Some(from_name) = edit.from_name {
            campaign.from_name = from_name;
        }
        if let Some(from_address) = edit.from_address {
            campaign.from_address = from_address;
        }
        if let Some(content_type) = edit.content_type {
            campaign.content_type = content_type;
        }
        if let Some(schedule_time) = edit.schedule_time {
            if schedule_time <= Utc::now() {
                return Err(EngineError::InvalidSchedule(format!(
                    "schedule_time {} is not in the future",
                    schedule_time.to_rfc3339()
                )));
            }
            campaign.schedule_time = Some(schedule_time);
        }
        campaign.updated_at = Utc::now();
        self.engine.store().update_campaign(&campaign)?;
        Ok(campaign)
    }

    /// Pause takes effect between batches; a batch in flight completes fully.
    pub fn pause_campaign(&self, campaign_id: Uuid) -> Result<(), EngineError> {
        let campaign = self.engine.load_existing(campaign_id)?;
        match campaign.status {
            CampaignStatus::Scheduled | CampaignStatus::Active | CampaignStatus::Sending => {
                self.engine
                    .store()
                    .set_status(campaign_id, CampaignStatus::Paused)?;
                info!(%campaign_id, "campaign paused");
                Ok(())
            }
            from => Err(EngineError::InvalidTransition {
                from,
                action: "pause".to_string(),
            }),
        }
    }

    pub fn resume_campaign(&self, campaign_id: Uuid) -> Result<(), EngineError> {
        let campaign = self.engine.load_existing(campaign_id)?;
        if campaign.status != CampaignStatus::Paused {
            return Err(EngineError::InvalidTransition {
                from: campaign.status,
                action: "resume".to_string(),
            });
        }
        let next = match (campaign.dispatch_mode, campaign.schedule_time) {
            (DispatchMode::Scheduled | DispatchMode::Recurring, Some(_)) => {
                CampaignStatus::Scheduled
            }
            _ => CampaignStatus::Active,
        };
        self.engine.store().set_status(campaign_id, next)?;
        info!(%campaign_id, status = next.as_str(), "campaign resumed");
        Ok(())
    }

    /// Soft delete when send records exist (audit trail); hard delete only
    /// when no sends have ever occurred.
    pub fn delete_campaign(&self, campaign_id: Uuid) -> Result<(), EngineError> {
        let _ = self.engine.load_existing(campaign_id)?;
        let store = self.engine.store();
        if store.send_record_count(campaign_id)? > 0 {
            store.soft_delete_campaign(campaign_id)?;
            info!(%campaign_id, "campaign soft-deleted (send records preserved)");
        } else {
            store.hard_delete_campaign(campaign_id)?;
            info!(%campaign_id, "campaign hard-deleted");
        }
        Ok(())
    }
}
