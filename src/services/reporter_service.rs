use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::ReporterConfig;

/// Client for the external usage-metering service. Reporting is a
/// best-effort side channel: every failure is logged and swallowed so
/// consumption correctness never depends on it.
pub struct UsageReporter {
    endpoint: Option<String>,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageReport {
    idempotency_key: Uuid,
    owner_id: Uuid,
    purchased_credits: i64,
    #[serde(with = "time::serde::rfc3339")]
    occurred_at: OffsetDateTime,
}

impl UsageReporter {
    pub fn new(config: &ReporterConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    /// A reporter that drops every report. Used when no endpoint is
    /// configured and by tests.
    pub fn disabled() -> Self {
        Self::new(&ReporterConfig::default())
    }

    /// Report the purchased-credits portion of one consumption. Keyed by an
    /// idempotency identifier (the usage record id where one exists) so the
    /// metering side can drop duplicates.
    #[instrument(skip(self))]
    pub async fn report_purchased_usage(
        &self,
        idempotency_key: Uuid,
        owner_id: Uuid,
        purchased_credits: i64,
    ) {
        let Some(endpoint) = &self.endpoint else {
            debug!("Usage reporter disabled; skipping report");
            return;
        };

        let report = UsageReport {
            idempotency_key,
            owner_id,
            purchased_credits,
            occurred_at: OffsetDateTime::now_utc(),
        };

        let mut request = self.http_client.post(endpoint).json(&report);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => debug!(
                idempotency_key = %idempotency_key,
                purchased_credits,
                "Reported purchased usage"
            ),
            Err(e) => warn!(
                idempotency_key = %idempotency_key,
                "Usage reporting failed (consumption unaffected): {}",
                e
            ),
        }
    }
}
