//! Cryptographic utilities for webhook signatures and signed links.
//!
//! Outgoing webhooks are signed with Ed25519 so that receivers can verify
//! them with the published public key. The signed message binds the target
//! URL, submission id, form id, signing time and a digest of the body:
//!
//! ```text
//! {url}.{submission_id}.{form_id}.{epoch_ms}.{sha256_hex(body)}
//! ```
//!
//! The signature travels in the [`SIGNATURE_HEADER`] header as
//! `t={epoch_ms},s={submission_id},f={form_id},v1={base64 signature}`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "X-FormSG-Signature";

/// Errors raised while loading keys or checking signatures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("Signature does not match")]
    InvalidSignature,
}

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Computes HMAC-SHA256 of `message` keyed with `secret`, hex encoded.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Result<String, CryptoError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Fields covered by a webhook signature.
#[derive(Debug, Clone, Copy)]
pub struct SignatureInput<'a> {
    pub url: &'a str,
    pub submission_id: &'a str,
    pub form_id: &'a str,
    pub epoch_ms: i64,
    pub body: &'a [u8],
}

impl SignatureInput<'_> {
    fn canonical_message(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.url,
            self.submission_id,
            self.form_id,
            self.epoch_ms,
            sha256_hex(self.body)
        )
    }
}

/// Signs outgoing webhook requests with an Ed25519 key.
#[derive(Clone)]
pub struct WebhookSigner {
    signing_key: SigningKey,
}

impl std::fmt::Debug for WebhookSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSigner")
            .field("public_key", &self.public_key_base64())
            .finish()
    }
}

impl WebhookSigner {
    /// Create a signer from a raw 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Create a signer from a base64-encoded 32-byte Ed25519 seed.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Public key receivers use to verify signatures, base64 encoded.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Produce the base64 signature over the canonical message.
    pub fn sign(&self, input: &SignatureInput<'_>) -> String {
        let signature = self.signing_key.sign(input.canonical_message().as_bytes());
        STANDARD.encode(signature.to_bytes())
    }

    /// Produce the full signature header value.
    pub fn signature_header(&self, input: &SignatureInput<'_>) -> String {
        format!(
            "t={},s={},f={},v1={}",
            input.epoch_ms,
            input.submission_id,
            input.form_id,
            self.sign(input)
        )
    }
}

/// Parsed form of a signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub epoch_ms: i64,
    pub submission_id: String,
    pub form_id: String,
    pub signature: String,
}

impl SignatureHeader {
    /// Parse `t=..,s=..,f=..,v1=..`. Key order is not significant.
    pub fn parse(header: &str) -> Result<Self, CryptoError> {
        let mut epoch_ms = None;
        let mut submission_id = None;
        let mut form_id = None;
        let mut signature = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| CryptoError::MalformedHeader(format!("bad segment '{part}'")))?;
            match key.trim() {
                "t" => {
                    epoch_ms = Some(value.parse::<i64>().map_err(|_| {
                        CryptoError::MalformedHeader(format!("bad timestamp '{value}'"))
                    })?)
                }
                "s" => submission_id = Some(value.to_string()),
                "f" => form_id = Some(value.to_string()),
                "v1" => signature = Some(value.to_string()),
                _ => {}
            }
        }

        match (epoch_ms, submission_id, form_id, signature) {
            (Some(epoch_ms), Some(submission_id), Some(form_id), Some(signature)) => Ok(Self {
                epoch_ms,
                submission_id,
                form_id,
                signature,
            }),
            _ => Err(CryptoError::MalformedHeader(
                "missing one of t, s, f, v1".to_string(),
            )),
        }
    }
}

/// Verify a signature header against a base64 public key, target URL and body.
///
/// Returns the parsed header on success so callers can apply their own
/// freshness check on `epoch_ms`.
pub fn verify_signature_header(
    public_key_base64: &str,
    header: &str,
    url: &str,
    body: &[u8],
) -> Result<SignatureHeader, CryptoError> {
    let parsed = SignatureHeader::parse(header)?;

    let key_bytes = STANDARD
        .decode(public_key_base64.trim())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let key_bytes: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".to_string()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let signature_bytes = STANDARD
        .decode(&parsed.signature)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| CryptoError::InvalidSignature)?;

    let input = SignatureInput {
        url,
        submission_id: &parsed.submission_id,
        form_id: &parsed.form_id,
        epoch_ms: parsed.epoch_ms,
        body,
    };

    verifying_key
        .verify(input.canonical_message().as_bytes(), &signature)
        .map_err(|_| CryptoError::InvalidSignature)?;

    Ok(parsed)
}
