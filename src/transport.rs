use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{BocmError, Result};

/// Byte-level access to the gazette. Success is HTTP 200; the caller decides
/// what any other status means.
#[async_trait]
pub trait Transport: Send + Sync {
    /// HEAD-equivalent presence check. Returns the status code.
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16>;

    /// GET the full body.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<(u16, Vec<u8>)>;
}

/// reqwest-backed transport with a connection pool sized for the resolver.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, pool_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(pool_size)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| BocmError::TransportUnavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16> {
        let resp = self.client.head(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        debug!(url = %url, status, "probe");
        Ok(status)
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<(u16, Vec<u8>)> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

/// GET that treats anything but 200 as an error.
pub async fn fetch_ok(transport: &dyn Transport, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let (status, body) = transport.fetch(url, timeout).await?;
    if status != 200 {
        return Err(BocmError::Http {
            url: url.to_string(),
            status,
        });
    }
    Ok(body)
}
