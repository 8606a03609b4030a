//! HTTP handlers for subscription-service.

pub mod actor;
pub mod advertisers;
pub mod health;
pub mod plans;
pub mod refunds;
pub mod subscriptions;
pub mod sweeps;

pub use actor::ActorId;
pub use health::{health_check, metrics, readiness_check};
