use crate::config::DeviceConfig;
use crate::types::{ApiHealth, RelayTargets, RemoteDirectives, SensorSample, TelemetryBody, FIRMWARE_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// No connectivity, connect/timeout failure, or an HTTP-level error.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected http status {0}")]
    Http(u16),
    /// Malformed response body. Counts as a transport-level failure for
    /// escalation; no directive from such a response is applied.
    #[error("malformed telemetry response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything the transport needs for one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRequest {
    pub url: String,
    pub bearer: Option<String>,
    pub body: String,
}

pub fn build_request(
    config: &DeviceConfig,
    sample: &SensorSample,
    relays: RelayTargets,
) -> TelemetryRequest {
    let scheme = if config.use_tls { "https" } else { "http" };
    let url = format!(
        "{scheme}://{}:{}{}/{}/data",
        config.api_host, config.api_port, config.api_path, config.device_id
    );

    let body = TelemetryBody {
        temperature: sample.temperature_c,
        humidity: sample.humidity,
        power: sample.power_w,
        energy: sample.energy_kwh,
        relay1_state: relays.relay1.is_on(),
        relay2_state: relays.relay2.is_on(),
        runtime: sample.runtime_s,
        version: FIRMWARE_VERSION,
    };

    TelemetryRequest {
        url,
        bearer: (!config.auth_token.is_empty()).then(|| config.auth_token.clone()),
        // TelemetryBody has no unserializable fields.
        body: serde_json::to_string(&body).unwrap_or_default(),
    }
}

pub fn parse_response(status: u16, body: &str) -> Result<RemoteDirectives, TelemetryError> {
    if !(200..300).contains(&status) {
        return Err(TelemetryError::Http(status));
    }
    Ok(serde_json::from_str(body)?)
}

/// Consecutive-failure bookkeeping. Reaching the threshold requests exactly
/// one forced reconnect and restarts the count, bounding how long a degraded
/// link is tolerated without causing a reconnect storm.
#[derive(Debug, Clone)]
pub struct TelemetryTracker {
    health: ApiHealth,
    threshold: u32,
}

impl TelemetryTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            health: ApiHealth::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn health(&self) -> ApiHealth {
        self.health
    }

    /// Records an exchange outcome; returns true when a forced reconnect
    /// should fire.
    pub fn record(&mut self, success: bool) -> bool {
        if success {
            self.health.consecutive_failures = 0;
            self.health.last_success = true;
            return false;
        }

        self.health.last_success = false;
        self.health.consecutive_failures += 1;
        if self.health.consecutive_failures >= self.threshold {
            self.health.consecutive_failures = 0;
            return true;
        }
        false
    }
}
