use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{info, warn};

use airdry_common::{
    ConnectivityManager, ConnectivityState, ControlLoop, DeviceConfig, RelayId, SimulatedSensor,
    TickEffects, PRODUCT_NAME,
};

use crate::{
    api::ApiClient,
    net::{HostNetwork, PortalHandle},
    store::ConfigStore,
};

#[derive(Clone)]
struct AppState {
    control: Arc<Mutex<ControlLoop>>,
    connectivity: Arc<Mutex<ConnectivityManager<HostNetwork>>>,
    portal: PortalHandle,
    store: ConfigStore,
    api: ApiClient,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "apiHost")]
    api_host: String,
    #[serde(rename = "apiPort")]
    api_port: u16,
    #[serde(rename = "apiPath")]
    api_path: String,
    #[serde(rename = "useTls")]
    use_tls: bool,
    #[serde(rename = "authTokenSet")]
    auth_token_set: bool,
    #[serde(rename = "relay1Enabled")]
    relay1_enabled: bool,
    #[serde(rename = "relay2Enabled")]
    relay2_enabled: bool,
    #[serde(rename = "tempThreshold")]
    temp_threshold: f32,
    #[serde(rename = "humidThreshold")]
    humid_threshold: f32,
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    #[serde(rename = "apiHost")]
    api_host: String,
    #[serde(rename = "apiPort")]
    api_port: u16,
    #[serde(rename = "apiPath")]
    api_path: String,
    #[serde(rename = "useTls")]
    use_tls: bool,
    #[serde(rename = "authToken", default)]
    auth_token: Option<String>,
    #[serde(rename = "relay1Enabled")]
    relay1_enabled: bool,
    #[serde(rename = "relay2Enabled")]
    relay2_enabled: bool,
    #[serde(rename = "tempThreshold")]
    temp_threshold: f32,
    #[serde(rename = "humidThreshold")]
    humid_threshold: f32,
}

#[derive(Debug, Deserialize)]
struct ProvisionForm {
    ssid: String,
    #[serde(default)]
    pass: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut runtime = store.load().await.unwrap_or_else(|err| {
        // Corrupt record: fall back to compiled-in defaults, never fatal.
        warn!("failed to load persisted config: {err:#}");
        airdry_common::RuntimeConfig::default()
    });
    runtime.device.sanitize();

    let (backend, portal) = HostNetwork::new(runtime.network.clone());

    if runtime.device.ensure_identity(airdry_common::NetworkBackend::mac(&backend)) {
        info!("generated device identity {}", runtime.device.device_id);
        store
            .save(&runtime)
            .await
            .context("failed to persist generated device identity")?;
    }

    let ap_name = format!("{PRODUCT_NAME}-{}", runtime.device.device_id);
    let connectivity = ConnectivityManager::new(
        backend,
        ap_name,
        runtime.network.ap_passphrase.clone(),
        runtime.tuning.provisioning_timeout_ms,
    );

    // Hardware integration point: swap the simulated source for the real
    // temperature/humidity driver on the ESP build.
    let control = ControlLoop::new(
        runtime.device.clone(),
        runtime.tuning.clone(),
        Box::new(SimulatedSensor::default()),
    );

    let app_state = AppState {
        control: Arc::new(Mutex::new(control)),
        connectivity: Arc::new(Mutex::new(connectivity)),
        portal,
        store,
        api: ApiClient::new()?,
    };

    spawn_device_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route(
            "/api/config",
            get(handle_get_config).put(handle_put_config),
        )
        .route("/api/relay1/toggle", post(handle_toggle_relay1))
        .route("/api/relay2/toggle", post(handle_toggle_relay2))
        .route("/api/reset", post(handle_reset))
        .route("/api/restart", post(handle_restart))
        .route("/provision", get(handle_get_provision).post(handle_post_provision))
        .with_state(app_state);

    let port = std::env::var("AIRDRY_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind device server at {addr}"))?;

    info!("device server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_device_loop(state: AppState) {
    tokio::spawn(async move {
        // Startup: associate or run the provisioning window to completion.
        loop {
            let result = {
                let mut connectivity = state.connectivity.lock().await;
                connectivity.ensure_connected(monotonic_ms())
            };
            match result {
                Ok(ConnectivityState::Connected) => {
                    info!("network connected");
                    break;
                }
                Ok(_) => tokio::time::sleep(Duration::from_millis(250)).await,
                Err(err) => restart_device(&err.to_string()),
            }
        }

        let mut interval = tokio::time::interval(Duration::from_millis(50));
        let mut reconnect_pending = false;

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let connectivity = {
                let mut connectivity = state.connectivity.lock().await;
                if reconnect_pending {
                    match connectivity.ensure_connected(now_ms) {
                        Ok(current) => {
                            if current.is_connected() {
                                info!("reconnected");
                                reconnect_pending = false;
                            }
                            current
                        }
                        Err(err) => restart_device(&err.to_string()),
                    }
                } else {
                    connectivity.poll()
                }
            };

            let effects = {
                let mut control = state.control.lock().await;
                // Hardware integration point: the membrane switch ADC feeds
                // the second argument on the ESP build.
                control.tick(now_ms, None, connectivity)
            };
            apply_output_effects(&effects);

            if effects.save_config {
                persist_device_config(&state).await;
            }

            if let Some(request) = effects.telemetry {
                let result = state.api.exchange(&request).await;
                if let Err(err) = &result {
                    warn!("telemetry exchange failed: {err}");
                }

                let follow_up = {
                    let mut control = state.control.lock().await;
                    control.complete_telemetry(result)
                };
                apply_output_effects(&follow_up);

                if follow_up.reconnect {
                    warn!("telemetry failure threshold reached, forcing reconnect");
                    state.connectivity.lock().await.request_reconnect();
                    reconnect_pending = true;
                }
            }
        }
    });
}

/// The single authorized sink for relay and LED output. GPIO writes hook in
/// here on the ESP build; the host logs the transitions.
fn apply_output_effects(effects: &TickEffects) {
    for change in &effects.relay_changes {
        info!("relay {:?} -> {}", change.relay, change.state.as_str());
    }
    if let Some(led) = effects.led {
        tracing::trace!("status led brightness {}", led.brightness);
    }
}

async fn persist_device_config(state: &AppState) {
    let device = {
        let control = state.control.lock().await;
        control.config().clone()
    };

    let mut runtime = state.store.load().await.unwrap_or_else(|err| {
        warn!("failed to load persisted config for update: {err:#}");
        airdry_common::RuntimeConfig::default()
    });
    runtime.device = device;
    runtime.network = state.portal.network_config();

    if let Err(err) = state.store.save(&runtime).await {
        warn!("failed to persist config: {err:#}");
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let control = state.control.lock().await;
    Json(control.status(monotonic_ms()))
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let control = state.control.lock().await;
    Json(build_config_view(control.config()))
}

async fn handle_put_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> impl IntoResponse {
    if update.api_host.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "apiHost cannot be empty");
    }
    if update.api_port == 0 {
        return error_response(StatusCode::BAD_REQUEST, "apiPort must be between 1 and 65535");
    }

    let effects = {
        let mut control = state.control.lock().await;
        let current = control.config();
        let config = DeviceConfig {
            device_id: current.device_id.clone(),
            api_host: update.api_host,
            api_port: update.api_port,
            api_path: update.api_path,
            use_tls: update.use_tls,
            auth_token: update
                .auth_token
                .unwrap_or_else(|| current.auth_token.clone()),
            relay1_enabled: update.relay1_enabled,
            relay2_enabled: update.relay2_enabled,
            temp_threshold: update.temp_threshold,
            humid_threshold: update.humid_threshold,
        };
        control.update_config(config)
    };
    apply_output_effects(&effects);
    persist_device_config(&state).await;

    handle_get_config(State(state)).await.into_response()
}

async fn handle_toggle_relay1(State(state): State<AppState>) -> impl IntoResponse {
    toggle_relay(state, RelayId::Relay1).await
}

async fn handle_toggle_relay2(State(state): State<AppState>) -> impl IntoResponse {
    toggle_relay(state, RelayId::Relay2).await
}

async fn toggle_relay(state: AppState, relay: RelayId) -> axum::response::Response {
    let effects = {
        let mut control = state.control.lock().await;
        control.toggle_relay(relay)
    };
    apply_output_effects(&effects);
    handle_get_status(State(state)).await.into_response()
}

async fn handle_reset(State(state): State<AppState>) -> impl IntoResponse {
    let effects = {
        let mut control = state.control.lock().await;
        control.reset_config()
    };
    apply_output_effects(&effects);
    persist_device_config(&state).await;

    handle_get_config(State(state)).await.into_response()
}

async fn handle_restart(State(_state): State<AppState>) -> impl IntoResponse {
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        restart_device("restart requested via local api");
    });
    StatusCode::ACCEPTED
}

async fn handle_get_provision() -> impl IntoResponse {
    Html(
        "<!DOCTYPE html><html><head><title>airdry setup</title></head><body>\
         <h1>Network setup</h1>\
         <form method=\"post\" action=\"/provision\">\
         <label>SSID <input name=\"ssid\"></label><br>\
         <label>Passphrase <input name=\"pass\" type=\"password\"></label><br>\
         <button type=\"submit\">Save</button>\
         </form></body></html>",
    )
}

async fn handle_post_provision(
    State(state): State<AppState>,
    Form(form): Form<ProvisionForm>,
) -> impl IntoResponse {
    if form.ssid.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "ssid cannot be empty");
    }

    state.portal.submit(form.ssid, form.pass);
    persist_device_config(&state).await;
    info!("provisioning credentials received");

    (StatusCode::OK, "credentials saved, connecting").into_response()
}

fn build_config_view(config: &DeviceConfig) -> ConfigView {
    ConfigView {
        device_id: config.device_id.clone(),
        api_host: config.api_host.clone(),
        api_port: config.api_port,
        api_path: config.api_path.clone(),
        use_tls: config.use_tls,
        auth_token_set: !config.auth_token.is_empty(),
        relay1_enabled: config.relay1_enabled,
        relay2_enabled: config.relay2_enabled,
        temp_threshold: config.temp_threshold,
        humid_threshold: config.humid_threshold,
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Provisioning timeout is terminal: no partial state is trusted, the
/// process exits and the supervisor (or the ESP reset vector) starts over.
fn restart_device(reason: &str) -> ! {
    warn!("restarting device: {reason}");
    std::process::exit(1)
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
