use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tracing::info;

use airdry_common::{NetworkBackend, NetworkConfig};

const DEFAULT_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x12, 0x34, 0x56];

/// Shared handle between the network backend and the provisioning portal
/// route: the portal submits credentials, the backend picks them up on its
/// next poll.
#[derive(Clone)]
pub struct PortalHandle {
    credentials: Arc<Mutex<NetworkConfig>>,
    submitted: Arc<AtomicBool>,
}

impl PortalHandle {
    pub fn submit(&self, ssid: String, pass: String) {
        {
            let mut credentials = self.credentials.lock().expect("portal credentials lock");
            credentials.wifi_ssid = ssid;
            credentials.wifi_pass = pass;
        }
        self.submitted.store(true, Ordering::SeqCst);
    }

    pub fn network_config(&self) -> NetworkConfig {
        self.credentials
            .lock()
            .expect("portal credentials lock")
            .clone()
    }
}

/// Host stand-in for the Wi-Fi driver: association succeeds whenever
/// credentials exist (or `AIRDRY_WIFI_SSID` is set), and the provisioning
/// access point is just the local portal route. The ESP build implements
/// the same trait over the esp-idf Wi-Fi and soft-AP services.
pub struct HostNetwork {
    portal: PortalHandle,
    link_up: bool,
    mac: [u8; 6],
}

impl HostNetwork {
    pub fn new(network: NetworkConfig) -> (Self, PortalHandle) {
        let portal = PortalHandle {
            credentials: Arc::new(Mutex::new(network)),
            submitted: Arc::new(AtomicBool::new(false)),
        };
        let backend = Self {
            portal: portal.clone(),
            link_up: false,
            mac: mac_from_env().unwrap_or(DEFAULT_MAC),
        };
        (backend, portal)
    }

    fn has_credentials(&self) -> bool {
        if std::env::var("AIRDRY_WIFI_SSID").is_ok_and(|ssid| !ssid.is_empty()) {
            return true;
        }
        !self.portal.network_config().wifi_ssid.is_empty()
    }
}

impl NetworkBackend for HostNetwork {
    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn try_associate(&mut self) -> bool {
        self.link_up = self.has_credentials();
        self.link_up
    }

    fn start_provisioning(&mut self, ap_name: &str, passphrase: &str) {
        info!("provisioning access point {ap_name} up (passphrase {passphrase}); waiting for portal submission");
    }

    fn provisioning_complete(&mut self) -> bool {
        if !self.portal.submitted.load(Ordering::SeqCst) {
            return false;
        }
        self.link_up = self.has_credentials();
        self.link_up
    }

    fn stop_provisioning(&mut self) {
        info!("provisioning access point down");
    }

    fn is_link_up(&self) -> bool {
        self.link_up
    }

    fn reconnect(&mut self) {
        info!("dropping association for forced reconnect");
        self.link_up = false;
    }
}

/// `AIRDRY_MAC=aa:bb:cc:dd:ee:ff` pins the identity for host runs.
fn mac_from_env() -> Option<[u8; 6]> {
    let raw = std::env::var("AIRDRY_MAC").ok()?;
    let octets: Vec<u8> = raw
        .split(':')
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<_, _>>()
        .ok()?;
    octets.try_into().ok()
}
