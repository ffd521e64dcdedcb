pub mod apns_client;
pub mod auth;
pub mod device_registry;
pub mod event_handler;
pub mod fanout;
pub mod fcm_client;
pub mod idempotency;
pub mod inbox;
pub mod monitor;
pub mod notification_service;
pub mod outbox;
pub mod preferences;
pub mod quiet_hours;
pub mod scheduler;
pub mod stampede;
pub mod token_lifecycle;
pub mod worker_pool;

pub use apns_client::*;
pub use auth::*;
pub use device_registry::*;
pub use event_handler::*;
pub use fanout::*;
pub use fcm_client::*;
pub use idempotency::*;
pub use inbox::*;
pub use monitor::*;
pub use notification_service::*;
pub use outbox::*;
pub use preferences::*;
pub use quiet_hours::*;
pub use scheduler::*;
pub use stampede::*;
pub use token_lifecycle::*;
pub use worker_pool::*;
