use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::TelemetryError;
use crate::{
    config::TelemetryUploadConfig, integrations::RateLimiter, models::TelemetryIdentity,
};

/// Destination for collected metrics.
#[async_trait]
pub trait TelemetryUploader: Send + Sync {
    /// Look up or create the customer and instance for this installation.
    async fn register_instance(&self, admin_email: &str) -> Result<TelemetryIdentity, TelemetryError>;

    async fn send_metric(
        &self,
        identity: &TelemetryIdentity,
        key: &str,
        value: &JsonValue,
    ) -> Result<(), TelemetryError>;
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    customer_id: String,
    instance_id: String,
}

#[derive(Serialize)]
struct MetricRequest<'a> {
    customer_id: Option<&'a str>,
    key: &'a str,
    value: &'a JsonValue,
}

/// Uploads to the telemetry backend's REST API, paced by a [`RateLimiter`].
pub struct HttpTelemetryUploader {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl HttpTelemetryUploader {
    pub fn new(client: reqwest::Client, config: &TelemetryUploadConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            rate_limiter: RateLimiter::with_default_margin(config.requests_per_second),
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, TelemetryError> {
        self.rate_limiter.wait().await;

        let response = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TelemetryUploader for HttpTelemetryUploader {
    async fn register_instance(&self, admin_email: &str) -> Result<TelemetryIdentity, TelemetryError> {
        let response = self
            .post("/v1/instances", &RegisterRequest { email: admin_email })
            .await?;
        let registered: RegisterResponse = response.json().await?;

        Ok(TelemetryIdentity {
            customer_id: Some(registered.customer_id),
            instance_id: Some(registered.instance_id),
        })
    }

    async fn send_metric(
        &self,
        identity: &TelemetryIdentity,
        key: &str,
        value: &JsonValue,
    ) -> Result<(), TelemetryError> {
        let instance_id = identity.instance_id.as_deref().unwrap_or_default();
        self.post(
            &format!("/v1/instances/{}/metrics", instance_id),
            &MetricRequest {
                customer_id: identity.customer_id.as_deref(),
                key,
                value,
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;

    fn uploader(server: &MockServer) -> HttpTelemetryUploader {
        HttpTelemetryUploader::new(
            reqwest::Client::new(),
            &TelemetryUploadConfig {
                endpoint: format!("{}/", server.uri()),
                api_key: "pk_test".to_string(),
                requests_per_second: 100.0,
                timeout_secs: 5,
            },
        )
    }

    #[tokio::test]
    async fn test_register_instance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/instances"))
            .and(header("authorization", "Bearer pk_test"))
            .and(body_json(json!({"email": "admin@acme.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "customer_id": "cust-1",
                "instance_id": "inst-1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let identity = uploader(&server)
            .register_instance("admin@acme.com")
            .await
            .unwrap();

        assert_eq!(identity.customer_id.as_deref(), Some("cust-1"));
        assert_eq!(identity.instance_id.as_deref(), Some("inst-1"));
    }

    #[tokio::test]
    async fn test_send_metric() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/instances/inst-1/metrics"))
            .and(body_json(json!({
                "customer_id": "cust-1",
                "key": "total_organizations",
                "value": 3,
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let identity = TelemetryIdentity {
            customer_id: Some("cust-1".to_string()),
            instance_id: Some("inst-1".to_string()),
        };
        uploader(&server)
            .send_metric(&identity, "total_organizations", &json!(3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("license revoked"))
            .mount(&server)
            .await;

        let err = uploader(&server)
            .register_instance("admin@acme.com")
            .await
            .unwrap_err();

        assert!(
            matches!(err, TelemetryError::Rejected { status: 403, ref body } if body == "license revoked")
        );
    }
}
