//! HTTP client for the MGNREGA citizen data card endpoint.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use tracing::{debug, warn};

use super::{RawPayload, Upstream, UpstreamError};
use crate::config::UpstreamConfig;
use crate::models::{PerformanceRecord, PeriodId, RegionId};

/// Path of the district data card below the portal base URL.
const DATA_CARD_PATH: &str = "citizen_data_card/citizen_data_card_generate.aspx";

const USER_AGENT: &str = concat!("nregacache/", env!("CARGO_PKG_VERSION"));

const ACCEPT: &str = "application/json, text/plain, */*";

/// Upstream client with bounded timeout and linear retry backoff.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, DATA_CARD_PATH)
    }

    /// One request, no retries. Returns the body of a successful response.
    async fn request_once(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<String, UpstreamError> {
        let period = period.to_string();
        let response = self
            .client
            .get(self.endpoint())
            .header(header::ACCEPT, ACCEPT)
            .query(&[
                ("state_code", region.state_code()),
                ("district_code", region.as_str()),
                ("fin_year", period.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }

        Ok(response.text().await?)
    }

    /// Request with retries: attempt `n` failing waits `n * retry_delay` before retrying.
    ///
    /// Only transport and HTTP failures are retried. A body that arrives but
    /// cannot be decoded fails at once with `InvalidResponse`.
    pub async fn fetch_payload(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<RawPayload, UpstreamError> {
        let body = self.fetch_body(region, period).await?;
        decode_payload(&body)
    }

    async fn fetch_body(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<String, UpstreamError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.request_once(region, period).await {
                Ok(body) => {
                    debug!(
                        region = %region,
                        period = %period,
                        attempt,
                        "Upstream request succeeded"
                    );
                    return Ok(body);
                }
                Err(e) if attempt > self.retry_attempts => {
                    return Err(UpstreamError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let backoff = self.retry_delay * attempt;
                    warn!(
                        region = %region,
                        period = %period,
                        retry = attempt,
                        max_retries = self.retry_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Upstream request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn decode_payload(body: &str) -> Result<RawPayload, UpstreamError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("body is not JSON: {}", e)))?;
    RawPayload::from_json(&value)
}

#[async_trait]
impl Upstream for UpstreamClient {
    async fn fetch(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<PerformanceRecord, UpstreamError> {
        let payload = self.fetch_payload(region, period).await?;
        Ok(payload.into_record(region, period, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataSource;
    use serde_json::json;
    use wiremock::matchers::{headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, retry_attempts: u32) -> UpstreamClient {
        let config = UpstreamConfig {
            base_url: format!("{}/", server.uri()),
            timeout_secs: 2,
            retry_attempts,
            retry_delay_ms: 1,
        };
        UpstreamClient::new(&config).unwrap()
    }

    fn ids() -> (RegionId, PeriodId) {
        (
            RegionId::parse("0901").unwrap(),
            PeriodId::parse("2024-25").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_sends_district_query_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", DATA_CARD_PATH)))
            .and(query_param("state_code", "09"))
            .and(query_param("district_code", "0901"))
            .and(query_param("fin_year", "2024-25"))
            .and(headers("accept", vec!["application/json", "text/plain", "*/*"]))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "works_completed": 40,
                "works_ongoing": 10,
                "budget_approved": 1000000,
                "expenditure": 700000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (region, period) = ids();
        let record = client_for(&server, 3).fetch(&region, &period).await.unwrap();

        assert_eq!(record.performance.completion_rate, 80);
        assert_eq!(record.performance.utilization_rate, 70);
        assert_eq!(record.data_quality.source, DataSource::Upstream);
    }

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"works_completed": 1})))
            .mount(&server)
            .await;

        let (region, period) = ids();
        let record = client_for(&server, 3).fetch(&region, &period).await.unwrap();

        assert_eq!(record.works_completed.total, 1.0);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (region, period) = ids();
        let err = client_for(&server, 3).fetch(&region, &period).await.unwrap_err();

        match err {
            UpstreamError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4); // first try + 3 retries
                assert_eq!(*last, UpstreamError::Server("boom".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_undecodable_body_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let (region, period) = ids();
        let err = client_for(&server, 3).fetch(&region, &period).await.unwrap_err();

        assert!(matches!(err, UpstreamError::InvalidResponse(_)), "got {err:?}");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_array_body_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .mount(&server)
            .await;

        let (region, period) = ids();
        let err = client_for(&server, 3).fetch(&region, &period).await.unwrap_err();

        assert!(matches!(err, UpstreamError::InvalidResponse(_)), "got {err:?}");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
