use chrono::Utc;
use tracing::{error, warn};
use transport_module::{EmailTransport, OutboundEmail};

use super::template;
use super::store::SqliteCampaignStore;
use super::types::{
    Batch, BatchResult, Campaign, ContentType, EngineError, Recipient, RecipientOutcome,
    SendStatus,
};

/// Sends one batch, recording a per-recipient send record as it goes.
///
/// Failures are isolated per recipient: neither a transport error nor a
/// store write error for one address aborts the remaining recipients in the
/// batch. Failed recipients stay eligible for future dedup passes.
pub struct DeliveryExecutor<'a> {
    store: &'a SqliteCampaignStore,
    transport: &'a dyn EmailTransport,
}

impl<'a> DeliveryExecutor<'a> {
    pub fn new(store: &'a SqliteCampaignStore, transport: &'a dyn EmailTransport) -> Self {
        Self { store, transport }
    }

    pub fn execute(&self, campaign: &Campaign, batch: &Batch) -> Result<BatchResult, EngineError> {
        let mut result = BatchResult::default();
        for recipient in &batch.recipients {
            match self.send_one(campaign, batch.seq, recipient) {
                Ok(Some(outcome)) => {
                    match outcome.status {
                        SendStatus::Sent => result.sent += 1,
                        SendStatus::Failed => result.failed += 1,
                    }
                    result.outcomes.push(outcome);
                }
                // Lost the write race: another dispatch already delivered
                // to this address. Nothing for us to record.
                Ok(None) => {
                    warn!(
                        campaign_id = %campaign.id,
                        email = %recipient.email,
                        "address was sent concurrently; dropping duplicate outcome"
                    );
                }
                Err(err) => {
                    error!(
                        campaign_id = %campaign.id,
                        email = %recipient.email,
                        "send record write failed: {err}"
                    );
                    result.failed += 1;
                    result.outcomes.push(RecipientOutcome {
                        recipient_id: recipient.id,
                        email: recipient.email.clone(),
                        status: SendStatus::Failed,
                        error: Some(format!("store write failed: {err}")),
                    });
                }
            }
        }
        Ok(result)
    }

    fn send_one(
        &self,
        campaign: &Campaign,
        batch_seq: usize,
        recipient: &Recipient,
    ) -> Result<Option<RecipientOutcome>, EngineError> {
        let variables = template::recipient_variables(recipient);
        let email = OutboundEmail {
            to: recipient.email.clone(),
            from_name: campaign.from_name.clone(),
            from_address: campaign.from_address.clone(),
            subject: template::render(&campaign.subject, &variables),
            body: template::render(&campaign.body, &variables),
            html: campaign.content_type == ContentType::Html,
        };

        match self.transport.send(&email) {
            Ok(()) => {
                let fresh = self.store.record_sent_if_fresh(
                    campaign.id,
                    recipient.id,
                    &recipient.email,
                    batch_seq,
                    Utc::now(),
                )?;
                if !fresh {
                    return Ok(None);
                }
                Ok(Some(RecipientOutcome {
                    recipient_id: recipient.id,
                    email: recipient.email.clone(),
                    status: SendStatus::Sent,
                    error: None,
                }))
            }
            Err(err) => {
                warn!(
                    campaign_id = %campaign.id,
                    email = %recipient.email,
                    "transport failure: {err}"
                );
                // Best-effort: a failed record that cannot be written is only
                // fatal to this recipient's bookkeeping.
                if let Err(store_err) = self.store.record_failed(
                    campaign.id,
                    recipient.id,
                    &recipient.email,
                    batch_seq,
                    Utc::now(),
                ) {
                    error!(
                        campaign_id = %campaign.id,
                        email = %recipient.email,
                        "failed to record transport failure: {store_err}"
                    );
                }
                Ok(Some(RecipientOutcome {
                    recipient_id: recipient.id,
                    email: recipient.email.clone(),
                    status: SendStatus::Failed,
                    error: Some(err.to_string()),
                }))
            }
        }
    }
}
