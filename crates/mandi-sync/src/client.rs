//! # Remote Sync Client
//!
//! HTTP client for the upload endpoint.
//!
//! ## Wire Format
//! ```text
//! POST {upload_url}
//! Content-Type: application/json
//! Accept: application/json
//!
//! [
//!   {
//!     "id": 12,
//!     "crop_name": "Wheat",
//!     "market_selling_price": 2500.5,        ← rupees, JSON number
//!     "district_name": "Pune",
//!     "created_at": "2024-05-01T10:00:00.000Z"
//!   },
//!   ...
//! ]
//!
//! 2xx          → accepted, caller marks the batch synced
//! anything else → rejected, batch stays unsynced
//! ```

use std::time::Duration;

use chrono::SecondsFormat;
use futures_util::future::BoxFuture;
use mandi_core::PriceRecord;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Uploader Trait
// =============================================================================

/// Something that can deliver a batch of records to the remote side.
///
/// Returns `true` when the whole batch was accepted. Failures are logged by
/// the implementation, never raised.
pub trait PriceUploader: Send + Sync {
    fn upload<'a>(&'a self, records: &'a [PriceRecord]) -> BoxFuture<'a, bool>;
}

// =============================================================================
// Payload
// =============================================================================

/// One record as the upload endpoint expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRecord {
    pub id: i64,
    pub crop_name: String,
    pub market_selling_price: f64,
    pub district_name: String,
    pub created_at: String,
}

impl From<&PriceRecord> for UploadRecord {
    fn from(record: &PriceRecord) -> Self {
        UploadRecord {
            id: record.id,
            crop_name: record.crop_name.clone(),
            market_selling_price: record.selling_price.as_rupees(),
            district_name: record.district_name.clone(),
            created_at: record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Builds a reqwest client with a hard per-request deadline.
pub(crate) fn http_client(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))
}

/// Maps a send failure, naming the deadline when it was a timeout.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout(timeout.as_millis() as u64)
    } else {
        err.into()
    }
}

/// Pushes unsynced batches to the upload endpoint.
///
/// ## Example
/// ```rust,ignore
/// let client = SyncClient::new(&config.remote)?;
/// if client.push(&records).await {
///     repo.mark_synced(&ids).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    upload_url: Url,
    enabled: bool,
    timeout: Duration,
}

impl SyncClient {
    /// Creates a client using the configured request timeout.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        Self::with_timeout(settings, settings.request_timeout())
    }

    /// Creates a client with an explicit request timeout.
    pub fn with_timeout(settings: &RemoteSettings, timeout: Duration) -> SyncResult<Self> {
        let upload_url = Url::parse(&settings.upload_url)?;

        if !settings.enabled {
            info!("Remote sync disabled, pushes are local no-ops");
        }

        Ok(SyncClient {
            http: http_client(timeout)?,
            upload_url,
            enabled: settings.enabled,
            timeout,
        })
    }

    /// Pushes a batch and reports whether the endpoint accepted it.
    ///
    /// Timeouts, connection errors and non-2xx statuses all return `false`.
    pub async fn push(&self, records: &[PriceRecord]) -> bool {
        match self.try_push(records).await {
            Ok(()) => true,
            Err(e) => {
                warn!(count = records.len(), error = %e, "Push failed");
                false
            }
        }
    }

    /// Pushes a batch, keeping the failure reason.
    pub async fn try_push(&self, records: &[PriceRecord]) -> SyncResult<()> {
        if !self.enabled {
            debug!(count = records.len(), "Remote disabled, skipping push");
            return Ok(());
        }

        let payload: Vec<UploadRecord> = records.iter().map(UploadRecord::from).collect();

        debug!(count = payload.len(), url = %self.upload_url, "Pushing records");

        let response = self
            .http
            .post(self.upload_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
            });
        }

        info!(count = payload.len(), status = status.as_u16(), "Push accepted");
        Ok(())
    }
}

impl PriceUploader for SyncClient {
    fn upload<'a>(&'a self, records: &'a [PriceRecord]) -> BoxFuture<'a, bool> {
        Box::pin(self.push(records))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
