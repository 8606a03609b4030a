//! Advertiser subscription financial and lifecycle engine.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
