use crate::core::{Result, SyncError};
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_VERIFY_URL: &str = "https://www.nationstates.net/cgi-bin/api.cgi";

/// The external service that confirms a nation owns a one-time code.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn verify(&self, nation: &str, checksum: &str) -> Result<bool>;
}

/// HTTP verifier: `GET {base}?a=verify&nation=..&checksum=..`, body `1` means verified.
pub struct HttpVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVerifier {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dumpsync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl VerificationApi for HttpVerifier {
    async fn verify(&self, nation: &str, checksum: &str) -> Result<bool> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("a", "verify"), ("nation", nation), ("checksum", checksum)])
            .send()
            .await
            .map_err(|e| SyncError::Verification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::Verification(format!(
                "verification endpoint returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Verification(e.to_string()))?;
        Ok(is_verified(&body))
    }
}

fn is_verified(body: &str) -> bool {
    body.trim() == "1"
}
