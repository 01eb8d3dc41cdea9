pub mod config;
pub mod events;

pub use config::AppConfig;
pub use events::{EventHandler, EventPublisher, LoggingEventHandler, TransferEvent, run_event_loop};
