pub mod service;

mod engine;

pub use engine::{
    start_ticker_thread, Batch, BatchResult, Campaign, CampaignDraft, CampaignEdit,
    CampaignScheduler, CampaignStatus, ContentType, DeliveryExecutor, DispatchEngine, DispatchMode,
    DispatchSummary, DispatchTicker, DuplicateStats, EngineError, MessagePreview, ProgressSnapshot,
    Recipient,
    RecipientOutcome, RecipientSelector, RecurrenceInterval, ScheduleOutcome, ScheduleRequest,
    SendRecord, SendStatus, SqliteCampaignStore, TickerControl, MAX_BATCH_SIZE,
};
pub use engine::{address, batch, dedup, progress, template};
