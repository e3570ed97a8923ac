//! Shared utilities for the form webhook service.
//!
//! This crate provides functionality used across the other crates:
//! - Webhook payload signing and verification (Ed25519)
//! - HMAC and SHA-256 helpers
//! - Network address classification for outbound request guards

pub mod crypto;
pub mod validation;
