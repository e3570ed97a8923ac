//! Domain layer for the form webhook service.
//!
//! This crate contains:
//! - Domain models (retry queue message, submission view, webhook payload)
//! - The webhook error taxonomy
//! - Delivery services (URL validation, dispatch, retry queue bridge, orchestration)
//! - Traits for the external collaborators those services consume

pub mod errors;
pub mod models;
pub mod services;

pub use errors::{ErrorClass, WebhookError};
