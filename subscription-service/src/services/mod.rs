//! Engine components and their collaborators.

pub mod cascade;
pub mod catalog;
pub mod clock;
pub mod coverage;
pub mod database;
pub mod engine;
pub mod error;
pub mod grace;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod memory;
pub mod metrics;
pub mod money;
pub mod notifier;
pub mod refunds;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use database::MongoStore;
pub use engine::{Engine, EngineContext, EngineSettings, GraceDays};
pub use error::ServiceError;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{LogNotifier, MockNotifier, Notifier};
pub use store::SubscriptionStore;
