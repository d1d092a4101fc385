use serde::{Deserialize, Serialize};

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product prefix used for the provisioning access point name.
pub const PRODUCT_NAME: &str = "airdry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub fn from_bool(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectivityState {
    Disconnected,
    Provisioning,
    Connected,
}

impl ConnectivityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Provisioning => "PROVISIONING",
            Self::Connected => "CONNECTED",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayId {
    Relay1,
    Relay2,
}

/// One periodic reading of everything the device senses or derives.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    pub temperature_c: f32,
    pub humidity: f32,
    pub power_w: f32,
    pub energy_kwh: f32,
    pub runtime_s: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTargets {
    pub relay1: RelayState,
    pub relay2: RelayState,
}

impl Default for RelayTargets {
    fn default() -> Self {
        Self {
            relay1: RelayState::Off,
            relay2: RelayState::Off,
        }
    }
}

impl RelayTargets {
    pub fn any_on(self) -> bool {
        self.relay1.is_on() || self.relay2.is_on()
    }

    pub fn get(self, relay: RelayId) -> RelayState {
        match relay {
            RelayId::Relay1 => self.relay1,
            RelayId::Relay2 => self.relay2,
        }
    }
}

/// Remote API health as seen by the telemetry exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiHealth {
    pub consecutive_failures: u32,
    pub last_success: bool,
}

impl Default for ApiHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            last_success: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Up,
    Down,
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress(ButtonId),
    LongPress(ButtonId),
}

/// Relay target instructions parsed from a telemetry response. An absent
/// key means "no directive", never "set false".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct RemoteDirectives {
    #[serde(rename = "relay1_control")]
    pub relay1: Option<bool>,
    #[serde(rename = "relay2_control")]
    pub relay2: Option<bool>,
}

impl RemoteDirectives {
    pub fn is_empty(self) -> bool {
        self.relay1.is_none() && self.relay2.is_none()
    }
}

/// Body POSTed to the remote API on every telemetry tick.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryBody {
    pub temperature: f32,
    pub humidity: f32,
    pub power: f32,
    pub energy: f32,
    pub relay1_state: bool,
    pub relay2_state: bool,
    pub runtime: u64,
    pub version: &'static str,
}

/// Mirror of the latest sample served by the local status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub device_id: String,
    pub temperature: f32,
    pub humidity: f32,
    pub power: f32,
    pub energy: f32,
    pub relay1_state: bool,
    pub relay2_state: bool,
    pub runtime: u64,
    pub connectivity: &'static str,
    pub api_healthy: bool,
    pub api_failures: u32,
    pub version: &'static str,
}
