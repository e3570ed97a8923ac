//! Persistence layer for the form webhook service.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations of the delivery collaborators
//! - Query metrics

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
