use serde::{Deserialize, Serialize};

/// Persisted device identity and API endpoint settings. Mutated only via an
/// explicit save; `device_id` is generated once from the hardware MAC and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub api_host: String,
    pub api_port: u16,
    pub api_path: String,
    pub use_tls: bool,
    pub auth_token: String,
    pub relay1_enabled: bool,
    pub relay2_enabled: bool,
    pub temp_threshold: f32,
    pub humid_threshold: f32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            api_host: "api.vgnc.org".to_string(),
            api_port: 443,
            api_path: "/api/device".to_string(),
            use_tls: true,
            auth_token: String::new(),
            relay1_enabled: true,
            relay2_enabled: false,
            temp_threshold: 20.0,
            humid_threshold: 60.0,
        }
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        self.temp_threshold = self.temp_threshold.clamp(0.0, 50.0);
        self.humid_threshold = self.humid_threshold.clamp(20.0, 95.0);

        if self.api_port == 0 {
            self.api_port = if self.use_tls { 443 } else { 80 };
        }
        if !self.api_path.starts_with('/') {
            self.api_path.insert(0, '/');
        }
        while self.api_path.len() > 1 && self.api_path.ends_with('/') {
            self.api_path.pop();
        }
    }

    /// Generates the stable identity if none exists yet. A non-empty id is
    /// never overwritten.
    pub fn ensure_identity(&mut self, mac: [u8; 6]) -> bool {
        if !self.device_id.is_empty() {
            return false;
        }
        self.device_id = device_id_from_mac(mac);
        true
    }
}

/// Derives the device id from the last three MAC octets, matching the id
/// the appliance reports for its whole life.
pub fn device_id_from_mac(mac: [u8; 6]) -> String {
    format!("esp-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5])
}

/// Loop cadence and policy knobs. Compiled-in defaults; not exposed on the
/// config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlTuning {
    pub sensor_interval_ms: u64,
    pub telemetry_interval_ms: u64,
    pub led_interval_ms: u64,
    pub failure_threshold: u32,
    pub provisioning_timeout_ms: u64,
    pub debounce_ms: u64,
    pub long_press_ms: u64,
    /// When true, remote directives stay in force until replaced or cleared;
    /// when false they are consumed by a single automation pass.
    pub sticky_directives: bool,
    pub threshold_step: f32,
    pub threshold_step_long: f32,
}

impl Default for ControlTuning {
    fn default() -> Self {
        Self {
            sensor_interval_ms: 5_000,
            telemetry_interval_ms: 30_000,
            led_interval_ms: 1_000,
            failure_threshold: 5,
            provisioning_timeout_ms: 180_000,
            debounce_ms: 50,
            long_press_ms: 800,
            sticky_directives: true,
            threshold_step: 1.0,
            threshold_step_long: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub ap_passphrase: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            ap_passphrase: "airdry-setup".to_string(),
        }
    }
}

/// The whole persisted record, loaded at boot and written only on explicit
/// save.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub tuning: ControlTuning,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identity_is_generated_once() {
        let mut config = DeviceConfig::default();

        assert!(config.ensure_identity([0xde, 0xad, 0xbe, 0x12, 0x34, 0x56]));
        assert_eq!(config.device_id, "esp-123456");

        // A second call with a different MAC must not rewrite the id.
        assert!(!config.ensure_identity([0, 0, 0, 0xaa, 0xbb, 0xcc]));
        assert_eq!(config.device_id, "esp-123456");
    }

    #[test]
    fn sanitize_clamps_thresholds() {
        let mut config = DeviceConfig {
            temp_threshold: -12.0,
            humid_threshold: 250.0,
            ..DeviceConfig::default()
        };
        config.sanitize();

        assert_eq!(config.temp_threshold, 0.0);
        assert_eq!(config.humid_threshold, 95.0);
    }

    #[test]
    fn sanitize_repairs_port_and_path() {
        let mut config = DeviceConfig {
            api_port: 0,
            api_path: "api/device/".to_string(),
            ..DeviceConfig::default()
        };
        config.sanitize();

        assert_eq!(config.api_port, 443);
        assert_eq!(config.api_path, "/api/device");
    }

    #[test]
    fn runtime_config_round_trips_with_missing_sections() {
        // Older records carry only the device section.
        let raw = r#"{"device":{"device_id":"esp-0a0b0c","api_host":"h","api_port":8080,"api_path":"/d","use_tls":false,"auth_token":"","relay1_enabled":true,"relay2_enabled":false,"temp_threshold":20.0,"humid_threshold":60.0}}"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.device.device_id, "esp-0a0b0c");
        assert_eq!(runtime.tuning.failure_threshold, 5);
        assert_eq!(runtime.network.ap_passphrase, "airdry-setup");
    }
}
