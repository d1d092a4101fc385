use std::time::Duration;

use anyhow::Context;
use reqwest::header::CONTENT_TYPE;

use airdry_common::{
    telemetry::{self, TelemetryRequest},
    RemoteDirectives, TelemetryError,
};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote API transport. The exchange is bounded by the client timeout so a
/// dead link cannot stall the control loop past one telemetry slot.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .context("failed to build telemetry http client")?;
        Ok(Self { http })
    }

    pub async fn exchange(
        &self,
        request: &TelemetryRequest,
    ) -> Result<RemoteDirectives, TelemetryError> {
        let mut builder = self
            .http
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone());
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TelemetryError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TelemetryError::Transport(err.to_string()))?;

        telemetry::parse_response(status, &body)
    }
}
