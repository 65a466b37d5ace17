//! End-to-end flows through the public library surface: create a campaign,
//! attach recipients, schedule it, let the ticker fire it, and poll progress.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tempfile::TempDir;
use transport_module::{EmailTransport, OutboundEmail, TransportError};

use dispatch_module::{
    dedup, progress, CampaignDraft, CampaignScheduler, CampaignStatus, ContentType,
    DispatchEngine, DispatchMode, DispatchTicker, RecipientSelector, RecurrenceInterval,
    ScheduleOutcome, ScheduleRequest, SqliteCampaignStore,
};

/// Captures every outbound message instead of talking to an email API.
#[derive(Default)]
struct CapturingTransport {
    outbox: Mutex<Vec<OutboundEmail>>,
}

impl CapturingTransport {
    fn messages(&self) -> Vec<OutboundEmail> {
        self.outbox.lock().expect("lock").clone()
    }
}

impl EmailTransport for CapturingTransport {
    fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        self.outbox.lock().expect("lock").push(email.clone());
        Ok(())
    }
}

struct Harness {
    _temp: TempDir,
    engine: Arc<DispatchEngine>,
    transport: Arc<CapturingTransport>,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let store =
            Arc::new(SqliteCampaignStore::new(temp.path().join("campaigns.db")).expect("store"));
        let transport = Arc::new(CapturingTransport::default());
        let engine = Arc::new(DispatchEngine::new(store, transport.clone()));
        Self {
            _temp: temp,
            engine,
            transport,
        }
    }

    fn add_recipient(&self, email: &str, name: &str, company: &str) -> i64 {
        self.engine
            .store()
            .insert_recipient(email, Some(name), Some(company))
            .expect("insert recipient")
    }
}

fn outreach_draft() -> CampaignDraft {
    CampaignDraft {
        name: "Q3 outreach".to_string(),
        subject: "{{name}}, news for {{company}}".to_string(),
        body: "<p>Hello {{name}} at {{company}}. Reach us at {{email}}.</p>".to_string(),
        from_name: "Acme Outreach".to_string(),
        from_address: "news@acme.example".to_string(),
        content_type: ContentType::Html,
    }
}

#[test]
fn scheduled_campaign_fires_and_reports_progress() {
    let harness = Harness::new();
    let scheduler = CampaignScheduler::new(&harness.engine);
    let campaign = scheduler.create_campaign(outreach_draft()).expect("create");

    let ada = harness.add_recipient("ada@lovelace.example", "Ada", "Analytical Engines");
    let grace = harness.add_recipient("grace@hopper.example", "Grace", "Compilers Inc");
    harness
        .engine
        .store()
        .attach_recipients(campaign.id, &[ada, grace])
        .expect("attach");

    let outcome = scheduler
        .schedule_campaign(
            campaign.id,
            ScheduleRequest {
                mode: DispatchMode::Scheduled,
                schedule_time: Some(Utc::now() + Duration::minutes(5)),
                recurrence_interval: None,
                recipient_ids: vec![ada, grace],
            },
        )
        .expect("schedule");
    assert!(matches!(outcome, ScheduleOutcome::Armed { .. }));

    // Not due yet: the ticker leaves it armed.
    let ticker = DispatchTicker::new(harness.engine.clone());
    assert_eq!(ticker.tick().expect("early tick"), 0);

    // Backdate the schedule so the next tick sees a due campaign.
    let mut armed = harness
        .engine
        .store()
        .load_campaign(campaign.id)
        .expect("load")
        .expect("present");
    armed.schedule_time = Some(Utc::now() - Duration::minutes(1));
    harness
        .engine
        .store()
        .update_campaign(&armed)
        .expect("backdate");
    assert_eq!(ticker.tick().expect("due tick"), 1);

    let messages = harness.transport.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].to, "ada@lovelace.example");
    assert_eq!(messages[0].subject, "Ada, news for Analytical Engines");
    assert!(messages[0]
        .body
        .contains("Hello Ada at Analytical Engines. Reach us at ada@lovelace.example."));
    assert!(messages[0].html);
    assert_eq!(messages[1].subject, "Grace, news for Compilers Inc");

    let snapshot = progress::snapshot(harness.engine.store(), campaign.id).expect("snapshot");
    assert_eq!(snapshot.total_recipients, 2);
    assert_eq!(snapshot.total_sent, 2);
    assert!((snapshot.progress_percentage - 100.0).abs() < f64::EPSILON);

    let fired = harness
        .engine
        .store()
        .load_campaign(campaign.id)
        .expect("load")
        .expect("present");
    assert_eq!(fired.status, CampaignStatus::Completed);
}

#[test]
fn manual_send_then_recurring_schedule_never_double_sends() {
    let harness = Harness::new();
    let scheduler = CampaignScheduler::new(&harness.engine);
    let campaign = scheduler.create_campaign(outreach_draft()).expect("create");

    let ids: Vec<i64> = (0..5)
        .map(|index| {
            harness.add_recipient(
                &format!("user{index}@example.com"),
                "User",
                "Example Co",
            )
        })
        .collect();
    harness
        .engine
        .store()
        .attach_recipients(campaign.id, &ids)
        .expect("attach");

    // Manually deliver to the first two before the schedule exists.
    let manual = harness
        .engine
        .send_campaign(
            campaign.id,
            &RecipientSelector::ExplicitIds {
                ids: ids[..2].to_vec(),
            },
        )
        .expect("manual send");
    assert_eq!(manual.sent, 2);

    let outcome = scheduler
        .schedule_campaign(
            campaign.id,
            ScheduleRequest {
                mode: DispatchMode::Recurring,
                schedule_time: Some(Utc::now() + Duration::hours(1)),
                recurrence_interval: Some(RecurrenceInterval::Weekly),
                recipient_ids: ids.clone(),
            },
        )
        .expect("schedule");
    assert!(matches!(outcome, ScheduleOutcome::Armed { .. }));

    let mut armed = harness
        .engine
        .store()
        .load_campaign(campaign.id)
        .expect("load")
        .expect("present");
    let fired_at = Utc::now() - Duration::minutes(1);
    armed.schedule_time = Some(fired_at);
    harness
        .engine
        .store()
        .update_campaign(&armed)
        .expect("backdate");

    let ticker = DispatchTicker::new(harness.engine.clone());
    assert_eq!(ticker.tick().expect("tick"), 1);

    // Only the three unsent recipients received the scheduled run.
    let messages = harness.transport.messages();
    assert_eq!(messages.len(), 5);
    let mut delivered: Vec<String> = messages.iter().map(|m| m.to.clone()).collect();
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered.len(), 5);

    // Recurring mode re-arms one interval later with the same target set.
    let rearmed = harness
        .engine
        .store()
        .load_campaign(campaign.id)
        .expect("load")
        .expect("present");
    assert_eq!(rearmed.status, CampaignStatus::Scheduled);
    assert_eq!(rearmed.schedule_time, Some(fired_at + Duration::days(7)));
    assert_eq!(
        harness
            .engine
            .store()
            .load_scheduled_set(campaign.id)
            .expect("set"),
        ids
    );
}

#[test]
fn duplicate_stats_match_dispatch_outcome() {
    let harness = Harness::new();
    let scheduler = CampaignScheduler::new(&harness.engine);
    let campaign = scheduler.create_campaign(outreach_draft()).expect("create");

    let a = harness.add_recipient("dup@example.com", "First", "Co");
    let b = harness.add_recipient("dup@example.com", "Second", "Co");
    let c = harness.add_recipient("solo@example.com", "Solo", "Co");
    harness
        .engine
        .store()
        .attach_recipients(campaign.id, &[a, b, c])
        .expect("attach");

    let stats = dedup::duplicate_stats(harness.engine.store(), campaign.id).expect("stats");
    assert_eq!(stats.total_recipients, 3);
    assert_eq!(stats.fresh_unique_emails, 2);
    assert_eq!(stats.duplicate_count, 1);

    let summary = harness
        .engine
        .send_campaign(campaign.id, &RecipientSelector::AllUnsent)
        .expect("send");
    assert_eq!(summary.sent, stats.fresh_unique_emails);
    assert_eq!(summary.skipped_duplicates, stats.duplicate_count);
    assert_eq!(harness.transport.messages().len(), 2);
}
