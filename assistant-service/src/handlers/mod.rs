//! HTTP handlers for the assistant service.

pub mod auth;
pub mod calendar;
pub mod chat;
pub mod health;
pub mod metrics;
