//! SSRF guard for webhook URLs.
//!
//! Runs before every attempt, not only when the URL is configured, because
//! DNS answers can change between attempts.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use shared::validation::is_public_ip;
use url::{Host, Url};

use super::collaborators::HostResolver;
use crate::errors::WebhookError;

/// A webhook URL that passed validation, with the addresses it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    pub url: Url,
    pub addrs: Vec<SocketAddr>,
}

impl ValidatedUrl {
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// Resolver backed by the system's DNS configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.collect())
    }
}

/// Validates webhook URLs: HTTPS only, every resolved address public.
#[derive(Clone)]
pub struct UrlValidator {
    resolver: Arc<dyn HostResolver>,
}

impl UrlValidator {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    pub async fn validate(&self, raw: &str) -> Result<ValidatedUrl, WebhookError> {
        let url = Url::parse(raw)
            .map_err(|e| WebhookError::validation(raw, format!("invalid URL: {e}")))?;

        if url.scheme() != "https" {
            return Err(WebhookError::validation(
                raw,
                format!("scheme '{}' is not allowed, only https", url.scheme()),
            ));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(WebhookError::validation(
                raw,
                "URL must not contain credentials",
            ));
        }

        let port = url.port_or_known_default().unwrap_or(443);

        let addrs = match url.host() {
            Some(Host::Ipv4(ip)) => vec![SocketAddr::new(IpAddr::V4(ip), port)],
            Some(Host::Ipv6(ip)) => vec![SocketAddr::new(IpAddr::V6(ip), port)],
            Some(Host::Domain(domain)) => {
                let addrs = self.resolver.resolve(domain, port).await.map_err(|e| {
                    WebhookError::validation(raw, format!("DNS resolution failed for '{domain}': {e}"))
                })?;
                if addrs.is_empty() {
                    return Err(WebhookError::validation(
                        raw,
                        format!("DNS resolution returned no addresses for '{domain}'"),
                    ));
                }
                addrs
            }
            None => return Err(WebhookError::validation(raw, "URL has no host")),
        };

        if let Some(addr) = addrs.iter().find(|addr| !is_public_ip(&addr.ip())) {
            return Err(WebhookError::validation(
                raw,
                format!("host resolves to non-public address {}", addr.ip()),
            ));
        }

        Ok(ValidatedUrl { url, addrs })
    }
}
