pub mod event;
pub mod request;

pub use event::{
    EventsDocument, Harvest, NormalizedEvent, RawRecord, EVENT_FIELDS, NOT_AVAILABLE,
};
pub use request::{
    Acquired, AttemptOutcome, DirectEndpoint, FetchAttempt, FetchRequest, Payload, SettleWindow,
    Strategy, StrategyHint,
};
