pub(super) const CAMPAIGN_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    from_name TEXT NOT NULL,
    from_address TEXT NOT NULL,
    content_type TEXT NOT NULL,
    dispatch_mode TEXT NOT NULL,
    schedule_time TEXT,
    recurrence_interval TEXT,
    status TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    total_recipients INTEGER NOT NULL DEFAULT 0,
    total_batches INTEGER NOT NULL DEFAULT 0,
    completed_batches INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recipients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    display_name TEXT,
    company TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS campaign_recipients (
    campaign_id TEXT NOT NULL,
    recipient_id INTEGER NOT NULL,
    PRIMARY KEY (campaign_id, recipient_id)
);

CREATE TABLE IF NOT EXISTS send_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id TEXT NOT NULL,
    recipient_id INTEGER NOT NULL,
    email TEXT NOT NULL,
    send_status TEXT NOT NULL,
    batch_seq INTEGER NOT NULL,
    sent_at TEXT NOT NULL
);

-- Last line of defense for the no-double-send invariant: at most one 'sent'
-- record per (campaign, normalized email), whatever the callers race to.
CREATE UNIQUE INDEX IF NOT EXISTS idx_send_records_sent_once
    ON send_records (campaign_id, email)
    WHERE send_status = 'sent';

CREATE INDEX IF NOT EXISTS idx_send_records_campaign
    ON send_records (campaign_id);

CREATE TABLE IF NOT EXISTS scheduled_recipient_sets (
    campaign_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    recipient_id INTEGER NOT NULL,
    PRIMARY KEY (campaign_id, position)
);
";
