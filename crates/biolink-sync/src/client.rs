//! # Remote Client
//!
//! HTTP client for the remote ingestion endpoints: one logical endpoint per
//! item kind, authenticated POST, outcomes classified rather than thrown.
//!
//! ## Outcome Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   POST {base_url}{kind path}                            │
//! │                                                                         │
//! │  Headers: Authorization: Bearer <token>     (when configured)          │
//! │           X-Sync-Item-Id: <item id>         (remote-side dedup)        │
//! │           X-Force-Overwrite: 1              (keep-local re-sends)      │
//! │  Body:    the item's opaque JSON payload                               │
//! │                                                                         │
//! │  2xx        ──► Accepted(body)    item becomes synced                  │
//! │  409        ──► Conflict(body)    item holds the remote's view         │
//! │  4xx        ──► Failed (permanent: payload/auth problem)               │
//! │  5xx / 429  ──► Failed (retryable: server trouble)                     │
//! │  transport  ──► Failed (retryable: network trouble)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use biolink_core::SyncItem;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

/// Header carrying the item id so the remote side can deduplicate retried
/// attempts.
pub const ITEM_ID_HEADER: &str = "X-Sync-Item-Id";

/// Header marking a keep-local re-send that should overwrite the remote's
/// view.
pub const FORCE_OVERWRITE_HEADER: &str = "X-Force-Overwrite";

// =============================================================================
// Push Outcome
// =============================================================================

/// Classified result of one delivery attempt. Delivery problems are data,
/// not errors - the engine records them on the item.
#[derive(Debug, Clone)]
pub enum PushOutcome {
    /// Remote accepted the item.
    Accepted(Option<serde_json::Value>),

    /// Remote rejected the item as conflicting, returning its own view.
    Conflict(Option<serde_json::Value>),

    /// Delivery failed.
    Failed {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },
}

impl PushOutcome {
    pub fn is_retryable_failure(&self) -> bool {
        matches!(self, PushOutcome::Failed { retryable: true, .. })
    }
}

// =============================================================================
// Remote Client
// =============================================================================

/// Client for the remote sync endpoints.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl RemoteClient {
    /// Builds a client from settings. Requires a configured base URL.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let base_url = settings
            .base_url
            .clone()
            .ok_or_else(|| SyncError::InvalidConfig("remote base_url is not configured".into()))?;

        url::Url::parse(&base_url)
            .map_err(|e| SyncError::InvalidConfig(format!("invalid remote base_url: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(RemoteClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: settings.auth_token.clone(),
            client,
        })
    }

    /// Endpoint URL for an item.
    fn endpoint_for(&self, item: &SyncItem) -> String {
        format!("{}{}", self.base_url, item.kind.endpoint_path())
    }

    /// Delivers one item and classifies the outcome. Never returns an
    /// error: everything that can go wrong becomes a `PushOutcome`.
    pub async fn push(&self, item: &SyncItem) -> PushOutcome {
        let url = self.endpoint_for(item);
        debug!(item_id = %item.id, %url, "Pushing sync item");

        let mut request = self
            .client
            .post(&url)
            .header(ITEM_ID_HEADER, &item.id)
            .json(&item.payload);

        if item.force_overwrite {
            request = request.header(FORCE_OVERWRITE_HEADER, "1");
        }
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return PushOutcome::Failed {
                    status: None,
                    message: e.to_string(),
                    retryable: true,
                };
            }
        };

        let status = response.status();

        if status.is_success() {
            return PushOutcome::Accepted(response.json().await.ok());
        }

        if status == reqwest::StatusCode::CONFLICT {
            return PushOutcome::Conflict(response.json().await.ok());
        }

        let retryable = status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
        let message = match response.text().await {
            Ok(body) if !body.is_empty() => {
                format!("{status}: {}", body.chars().take(200).collect::<String>())
            }
            _ => status.to_string(),
        };

        warn!(item_id = %item.id, %status, retryable, "Remote rejected sync item");
        PushOutcome::Failed {
            status: Some(status.as_u16()),
            message,
            retryable,
        }
    }

    /// Delivers one item, retrying transient failures with exponential
    /// backoff until `max_elapsed` is spent. Used for the immediate send of
    /// critical enqueues; regular passes rely on the engine's cross-pass
    /// retry instead.
    pub async fn push_with_backoff(&self, item: &SyncItem, max_elapsed: Duration) -> PushOutcome {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };

        let attempt = || async {
            let outcome = self.push(item).await;
            if outcome.is_retryable_failure() {
                Err(backoff::Error::transient(outcome))
            } else {
                Ok(outcome)
            }
        };

        match backoff::future::retry(policy, attempt).await {
            Ok(outcome) => outcome,
            Err(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biolink_core::SyncItemKind;
    use serde_json::json;

    fn settings(base_url: &str) -> RemoteSettings {
        RemoteSettings {
            base_url: Some(base_url.to_string()),
            auth_token: None,
            request_timeout_secs: 1,
        }
    }

    #[test]
    fn test_client_requires_base_url() {
        assert!(RemoteClient::new(&RemoteSettings::default()).is_err());
        assert!(RemoteClient::new(&settings("https://ingest.example.com")).is_ok());
        assert!(RemoteClient::new(&settings("not a url")).is_err());
    }

    #[test]
    fn test_endpoint_paths_per_kind() {
        let client = RemoteClient::new(&settings("https://ingest.example.com/api/")).unwrap();

        let item = SyncItem::new(SyncItemKind::Measurement, json!({}));
        assert_eq!(
            client.endpoint_for(&item),
            "https://ingest.example.com/api/measurements"
        );

        let item = SyncItem::new(SyncItemKind::HealthRecord, json!({}));
        assert_eq!(
            client.endpoint_for(&item),
            "https://ingest.example.com/api/health-records"
        );
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_retryable_failure() {
        let client = RemoteClient::new(&settings("http://127.0.0.1:9")).unwrap();
        let item = SyncItem::new(SyncItemKind::Measurement, json!({"v": 1}));

        let outcome = client.push(&item).await;
        assert!(outcome.is_retryable_failure());
    }
}
