pub mod address;
pub mod batch;
pub mod dedup;
mod dispatch;
mod executor;
pub mod progress;
mod schedule;
mod scheduler;
mod store;
pub mod template;
mod ticker;
mod types;
mod utils;

pub use dispatch::DispatchEngine;
pub use executor::DeliveryExecutor;
pub use scheduler::{
    CampaignDraft, CampaignEdit, CampaignScheduler, MessagePreview, ScheduleOutcome,
};
pub use store::SqliteCampaignStore;
pub use ticker::{start_ticker_thread, DispatchTicker, TickerControl};
pub use types::{
    Batch, BatchResult, Campaign, CampaignStatus, ContentType, DispatchMode, DispatchSummary,
    DuplicateStats, EngineError, ProgressSnapshot, Recipient, RecipientOutcome, RecipientSelector,
    RecurrenceInterval, ScheduleRequest, SendRecord, SendStatus, MAX_BATCH_SIZE,
};
