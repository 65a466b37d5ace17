use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use super::types::{
    Campaign, CampaignStatus, EngineError, Recipient, SendStatus,
};
use super::utils::{
    bool_to_int, format_datetime, parse_datetime, parse_enum, parse_optional_datetime,
    parse_optional_enum,
};

mod schema;

use schema::CAMPAIGN_SCHEMA;

/// Single source of truth for campaign, recipient, send-record, and schedule
/// state. Opens a fresh connection per call; the schema batch is idempotent.
#[derive(Debug)]
pub struct SqliteCampaignStore {
    path: PathBuf,
}

const CAMPAIGN_COLUMNS: &str = "id, name, subject, body, from_name, from_address, content_type, \
     dispatch_mode, schedule_time, recurrence_interval, status, deleted, created_at, updated_at";

impl SqliteCampaignStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, EngineError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(CAMPAIGN_SCHEMA)?;
        Ok(conn)
    }

    // -- campaigns ---------------------------------------------------------

    pub fn insert_campaign(&self, campaign: &Campaign) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO campaigns (id, name, subject, body, from_name, from_address, content_type,
                                    dispatch_mode, schedule_time, recurrence_interval, status,
                                    deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                campaign.id.to_string(),
                campaign.name,
                campaign.subject,
                campaign.body,
                campaign.from_name,
                campaign.from_address,
                campaign.content_type.as_str(),
                campaign.dispatch_mode.as_str(),
                campaign.schedule_time.map(format_datetime),
                campaign
                    .recurrence_interval
                    .map(|interval| interval.as_str()),
                campaign.status.as_str(),
                bool_to_int(campaign.deleted),
                format_datetime(campaign.created_at),
                format_datetime(campaign.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_campaign(&self, campaign: &Campaign) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE campaigns
             SET name = ?1,
                 subject = ?2,
                 body = ?3,
                 from_name = ?4,
                 from_address = ?5,
                 content_type = ?6,
                 dispatch_mode = ?7,
                 schedule_time = ?8,
                 recurrence_interval = ?9,
                 status = ?10,
                 updated_at = ?11
             WHERE id = ?12",
            params![
                campaign.name,
                campaign.subject,
                campaign.body,
                campaign.from_name,
                campaign.from_address,
                campaign.content_type.as_str(),
                campaign.dispatch_mode.as_str(),
                campaign.schedule_time.map(format_datetime),
                campaign
                    .recurrence_interval
                    .map(|interval| interval.as_str()),
                campaign.status.as_str(),
                format_datetime(campaign.updated_at),
                campaign.id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn load_campaign(&self, id: Uuid) -> Result<Option<Campaign>, EngineError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id.to_string()],
                campaign_row_tuple,
            )
            .optional()?;
        row.map(campaign_from_tuple).transpose()
    }

    pub fn set_status(&self, id: Uuid, status: CampaignStatus) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE campaigns SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                status.as_str(),
                format_datetime(Utc::now()),
                id.to_string()
            ],
        )?;
        Ok(())
    }

    /// Atomically move a campaign into `sending` if its current status allows
    /// it. Returns false when another dispatcher won the claim (or the status
    /// is simply wrong), which is how concurrent ticker instances avoid
    /// double-firing the same campaign.
    pub fn try_claim_dispatch(
        &self,
        id: Uuid,
        allowed_from: &[CampaignStatus],
    ) -> Result<bool, EngineError> {
        let conn = self.open()?;
        let placeholders = allowed_from
            .iter()
            .enumerate()
            .map(|(index, _)| format!("?{}", index + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE campaigns
             SET status = 'sending', updated_at = ?1
             WHERE id = ?2 AND deleted = 0 AND status IN ({placeholders})"
        );
        let mut values: Vec<String> = vec![format_datetime(Utc::now()), id.to_string()];
        values.extend(allowed_from.iter().map(|status| status.as_str().to_string()));
        let changed = conn.execute(&sql, params_from_iter(values))?;
        Ok(changed == 1)
    }

    pub fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
             WHERE deleted = 0 AND status = 'scheduled' AND schedule_time IS NOT NULL
               AND schedule_time <= ?1
             ORDER BY schedule_time"
        ))?;
        let rows = stmt.query_map(params![format_datetime(now)], campaign_row_tuple)?;
        let mut campaigns = Vec::new();
        for row in rows {
            campaigns.push(campaign_from_tuple(row?)?);
        }
        Ok(campaigns)
    }

    pub fn soft_delete_campaign(&self, id: Uuid) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE campaigns SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![format_datetime(Utc::now()), id.to_string()],
        )?;
        Ok(())
    }

    pub fn hard_delete_campaign(&self, id: Uuid) -> Result<(), EngineError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM campaign_recipients WHERE campaign_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM scheduled_recipient_sets WHERE campaign_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM campaigns WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // -- recipients --------------------------------------------------------

    /// `email` must already be normalized by the address module.
    pub fn insert_recipient(
        &self,
        email: &str,
        display_name: Option<&str>,
        company: Option<&str>,
    ) -> Result<i64, EngineError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO recipients (email, display_name, company, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![email, display_name, company, format_datetime(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Load recipients preserving the order of `ids`; unknown ids are skipped.
    pub fn load_recipients(&self, ids: &[i64]) -> Result<Vec<Recipient>, EngineError> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT id, email, display_name, company FROM recipients WHERE id = ?1")?;
        let mut recipients = Vec::with_capacity(ids.len());
        for id in ids {
            let recipient = stmt
                .query_row(params![id], recipient_from_row)
                .optional()?;
            if let Some(recipient) = recipient {
                recipients.push(recipient);
            }
        }
        Ok(recipients)
    }

    pub fn attach_recipients(
        &self,
        campaign_id: Uuid,
        recipient_ids: &[i64],
    ) -> Result<(), EngineError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO campaign_recipients (campaign_id, recipient_id)
                 VALUES (?1, ?2)",
            )?;
            for recipient_id in recipient_ids {
                stmt.execute(params![campaign_id.to_string(), recipient_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn campaign_recipients(&self, campaign_id: Uuid) -> Result<Vec<Recipient>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.email, r.display_name, r.company
             FROM recipients r
             JOIN campaign_recipients cr ON cr.recipient_id = r.id
             WHERE cr.campaign_id = ?1
             ORDER BY r.id",
        )?;
        let rows = stmt.query_map(params![campaign_id.to_string()], recipient_from_row)?;
        let mut recipients = Vec::new();
        for row in rows {
            recipients.push(row?);
        }
        Ok(recipients)
    }

    // -- send records ------------------------------------------------------

    pub fn sent_addresses(&self, campaign_id: Uuid) -> Result<HashSet<String>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT email FROM send_records WHERE campaign_id = ?1 AND send_status = 'sent'",
        )?;
        let rows = stmt.query_map(params![campaign_id.to_string()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut addresses = HashSet::new();
        for row in rows {
            addresses.insert(row?);
        }
        Ok(addresses)
    }

    /// Append a `sent` record unless one already exists for this address.
    /// Returns false when the partial unique index rejected the write, i.e.
    /// some other dispatch already delivered to this address.
    pub fn record_sent_if_fresh(
        &self,
        campaign_id: Uuid,
        recipient_id: i64,
        email: &str,
        batch_seq: usize,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO send_records (campaign_id, recipient_id, email, send_status, batch_seq, sent_at)
             VALUES (?1, ?2, ?3, 'sent', ?4, ?5)",
            params![
                campaign_id.to_string(),
                recipient_id,
                email,
                batch_seq as i64,
                format_datetime(at)
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn record_failed(
        &self,
        campaign_id: Uuid,
        recipient_id: i64,
        email: &str,
        batch_seq: usize,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO send_records (campaign_id, recipient_id, email, send_status, batch_seq, sent_at)
             VALUES (?1, ?2, ?3, 'failed', ?4, ?5)",
            params![
                campaign_id.to_string(),
                recipient_id,
                email,
                batch_seq as i64,
                format_datetime(at)
            ],
        )?;
        Ok(())
    }

    pub fn send_record_count(&self, campaign_id: Uuid) -> Result<usize, EngineError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM send_records WHERE campaign_id = ?1",
            params![campaign_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn status_counts(&self, campaign_id: Uuid, status: SendStatus) -> Result<usize, EngineError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM send_records WHERE campaign_id = ?1 AND send_status = ?2",
            params![campaign_id.to_string(), status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // -- scheduled recipient sets -----------------------------------------

    /// Replace the persisted target selection for a future scheduler tick.
    pub fn save_scheduled_set(
        &self,
        campaign_id: Uuid,
        recipient_ids: &[i64],
    ) -> Result<(), EngineError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM scheduled_recipient_sets WHERE campaign_id = ?1",
            params![campaign_id.to_string()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scheduled_recipient_sets (campaign_id, position, recipient_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (position, recipient_id) in recipient_ids.iter().enumerate() {
                stmt.execute(params![
                    campaign_id.to_string(),
                    position as i64,
                    recipient_id
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_scheduled_set(&self, campaign_id: Uuid) -> Result<Vec<i64>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT recipient_id FROM scheduled_recipient_sets
             WHERE campaign_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![campaign_id.to_string()], |row| {
            row.get::<_, i64>(0)
        })?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn clear_scheduled_set(&self, campaign_id: Uuid) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM scheduled_recipient_sets WHERE campaign_id = ?1",
            params![campaign_id.to_string()],
        )?;
        Ok(())
    }

    // -- progress accounting -----------------------------------------------

    /// Reset batch counters for a new dispatch run.
    pub fn set_run_totals(
        &self,
        campaign_id: Uuid,
        total_recipients: usize,
        total_batches: usize,
    ) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE campaigns
             SET total_recipients = ?1, total_batches = ?2, completed_batches = 0, updated_at = ?3
             WHERE id = ?4",
            params![
                total_recipients as i64,
                total_batches as i64,
                format_datetime(Utc::now()),
                campaign_id.to_string()
            ],
        )?;
        Ok(())
    }

    pub fn increment_completed_batches(&self, campaign_id: Uuid) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE campaigns
             SET completed_batches = MIN(completed_batches + 1, total_batches), updated_at = ?1
             WHERE id = ?2",
            params![format_datetime(Utc::now()), campaign_id.to_string()],
        )?;
        Ok(())
    }

    /// (total_recipients, total_batches, completed_batches, status)
    pub fn progress_row(
        &self,
        campaign_id: Uuid,
    ) -> Result<Option<(usize, usize, usize, CampaignStatus)>, EngineError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT total_recipients, total_batches, completed_batches, status
                 FROM campaigns WHERE id = ?1",
                params![campaign_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((total_recipients, total_batches, completed_batches, status_raw)) => {
                let status = parse_enum(&status_raw)?;
                Ok(Some((
                    total_recipients as usize,
                    total_batches as usize,
                    completed_batches as usize,
                    status,
                )))
            }
            None => Ok(None),
        }
    }
}

type CampaignRowTuple = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
    String,
    String,
);

fn campaign_row_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRowTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

fn campaign_from_tuple(tuple: CampaignRowTuple) -> Result<Campaign, EngineError> {
    let (
        id_raw,
        name,
        subject,
        body,
        from_name,
        from_address,
        content_type_raw,
        dispatch_mode_raw,
        schedule_time_raw,
        recurrence_raw,
        status_raw,
        deleted_raw,
        created_at_raw,
        updated_at_raw,
    ) = tuple;
    Ok(Campaign {
        id: Uuid::parse_str(&id_raw)?,
        name,
        subject,
        body,
        from_name,
        from_address,
        content_type: parse_enum(&content_type_raw)?,
        dispatch_mode: parse_enum(&dispatch_mode_raw)?,
        schedule_time: parse_optional_datetime(schedule_time_raw.as_deref())?,
        recurrence_interval: parse_optional_enum(recurrence_raw.as_deref())?,
        status: parse_enum(&status_raw)?,
        deleted: deleted_raw != 0,
        created_at: parse_datetime(&created_at_raw)?,
        updated_at: parse_datetime(&updated_at_raw)?,
    })
}

fn recipient_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        company: row.get(3)?,
    })
}
