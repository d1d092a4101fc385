use crate::types::ConnectivityState;

#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    /// The provisioning window expired. Terminal: the caller restarts the
    /// device rather than trusting partial state.
    #[error("provisioning window expired after {0} ms")]
    ProvisioningTimeout(u64),
}

/// Platform seam for the radio. The host build fakes this; the ESP build
/// maps it onto the Wi-Fi driver and a soft-AP portal.
pub trait NetworkBackend {
    fn mac(&self) -> [u8; 6];
    /// One bounded association attempt with stored credentials.
    fn try_associate(&mut self) -> bool;
    fn start_provisioning(&mut self, ap_name: &str, passphrase: &str);
    /// True once the portal delivered credentials and association succeeded.
    fn provisioning_complete(&mut self) -> bool;
    fn stop_provisioning(&mut self);
    /// Cheap link poll, safe to call every tick.
    fn is_link_up(&self) -> bool;
    /// Tears the association down so the next attempt starts fresh.
    fn reconnect(&mut self);
}

/// Owns the association lifecycle: Disconnected -> Connected, or through a
/// bounded Provisioning window. Never reconnects on its own; the telemetry
/// escalation policy decides when to force one.
pub struct ConnectivityManager<B> {
    backend: B,
    state: ConnectivityState,
    provisioning_since_ms: Option<u64>,
    timeout_ms: u64,
    ap_name: String,
    ap_passphrase: String,
}

impl<B: NetworkBackend> ConnectivityManager<B> {
    pub fn new(backend: B, ap_name: String, ap_passphrase: String, timeout_ms: u64) -> Self {
        Self {
            backend,
            state: ConnectivityState::Disconnected,
            provisioning_since_ms: None,
            timeout_ms,
            ap_name,
            ap_passphrase,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn mac(&self) -> [u8; 6] {
        self.backend.mac()
    }

    /// Non-blocking status check for every loop tick. Notices a dropped
    /// link but does not try to repair it.
    pub fn poll(&mut self) -> ConnectivityState {
        if self.state.is_connected() && !self.backend.is_link_up() {
            self.state = ConnectivityState::Disconnected;
        }
        self.state
    }

    /// Advances the association state machine one step. Call repeatedly
    /// until Connected, or until ProvisioningTimeout, which is terminal.
    pub fn ensure_connected(
        &mut self,
        now_ms: u64,
    ) -> Result<ConnectivityState, ConnectivityError> {
        match self.state {
            ConnectivityState::Connected => {
                self.poll();
                Ok(self.state)
            }
            ConnectivityState::Disconnected => {
                if self.backend.try_associate() {
                    self.state = ConnectivityState::Connected;
                } else {
                    self.backend
                        .start_provisioning(&self.ap_name, &self.ap_passphrase);
                    self.provisioning_since_ms = Some(now_ms);
                    self.state = ConnectivityState::Provisioning;
                }
                Ok(self.state)
            }
            ConnectivityState::Provisioning => {
                if self.backend.provisioning_complete() {
                    self.backend.stop_provisioning();
                    self.provisioning_since_ms = None;
                    self.state = ConnectivityState::Connected;
                    return Ok(self.state);
                }

                let since = self.provisioning_since_ms.unwrap_or(now_ms);
                if now_ms.saturating_sub(since) >= self.timeout_ms {
                    return Err(ConnectivityError::ProvisioningTimeout(self.timeout_ms));
                }
                Ok(self.state)
            }
        }
    }

    /// Serves the telemetry failure-escalation policy: drop the association
    /// so the next `ensure_connected` starts over.
    pub fn request_reconnect(&mut self) {
        self.backend.reconnect();
        self.state = ConnectivityState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeBackend {
        associate_results: Vec<bool>,
        associate_calls: u32,
        provisioning_started: u32,
        provisioning_stopped: u32,
        provisioned: bool,
        link_up: bool,
        reconnects: u32,
    }

    impl NetworkBackend for FakeBackend {
        fn mac(&self) -> [u8; 6] {
            [0, 0, 0, 0xaa, 0xbb, 0xcc]
        }

        fn try_associate(&mut self) -> bool {
            self.associate_calls += 1;
            let ok = self.associate_results.pop().unwrap_or(false);
            self.link_up = ok;
            ok
        }

        fn start_provisioning(&mut self, _ap_name: &str, _passphrase: &str) {
            self.provisioning_started += 1;
        }

        fn provisioning_complete(&mut self) -> bool {
            self.provisioned
        }

        fn stop_provisioning(&mut self) {
            self.provisioning_stopped += 1;
        }

        fn is_link_up(&self) -> bool {
            self.link_up
        }

        fn reconnect(&mut self) {
            self.reconnects += 1;
            self.link_up = false;
        }
    }

    fn manager(backend: FakeBackend) -> ConnectivityManager<FakeBackend> {
        ConnectivityManager::new(
            backend,
            "airdry-esp-aabbcc".to_string(),
            "airdry-setup".to_string(),
            180_000,
        )
    }

    #[test]
    fn association_success_connects_directly() {
        let mut manager = manager(FakeBackend {
            associate_results: vec![true],
            ..FakeBackend::default()
        });

        let state = manager.ensure_connected(0).unwrap();
        assert_eq!(state, ConnectivityState::Connected);
        assert_eq!(manager.backend.provisioning_started, 0);
    }

    #[test]
    fn association_failure_opens_provisioning_window() {
        let mut manager = manager(FakeBackend::default());

        let state = manager.ensure_connected(0).unwrap();
        assert_eq!(state, ConnectivityState::Provisioning);
        assert_eq!(manager.backend.provisioning_started, 1);
    }

    #[test]
    fn provisioning_completes_into_connected() {
        let mut manager = manager(FakeBackend::default());
        manager.ensure_connected(0).unwrap();

        manager.backend.provisioned = true;
        manager.backend.link_up = true;
        let state = manager.ensure_connected(10_000).unwrap();

        assert_eq!(state, ConnectivityState::Connected);
        assert_eq!(manager.backend.provisioning_stopped, 1);
    }

    #[test]
    fn provisioning_timeout_is_terminal() {
        let mut manager = manager(FakeBackend::default());
        manager.ensure_connected(0).unwrap();

        assert!(manager.ensure_connected(179_999).is_ok());
        assert!(matches!(
            manager.ensure_connected(180_000),
            Err(ConnectivityError::ProvisioningTimeout(180_000))
        ));

        // Still terminal on a later call; no association is retried.
        assert!(manager.ensure_connected(200_000).is_err());
        assert_eq!(manager.backend.associate_calls, 1);
    }

    #[test]
    fn poll_notices_dropped_link_without_repairing_it() {
        let mut manager = manager(FakeBackend {
            associate_results: vec![true],
            ..FakeBackend::default()
        });
        manager.ensure_connected(0).unwrap();

        manager.backend.link_up = false;
        assert_eq!(manager.poll(), ConnectivityState::Disconnected);
        assert_eq!(manager.backend.associate_calls, 1);
    }

    #[test]
    fn forced_reconnect_restarts_association() {
        let mut manager = manager(FakeBackend {
            associate_results: vec![true, true],
            ..FakeBackend::default()
        });
        manager.ensure_connected(0).unwrap();

        manager.request_reconnect();
        assert_eq!(manager.state(), ConnectivityState::Disconnected);
        assert_eq!(manager.backend.reconnects, 1);

        let state = manager.ensure_connected(1_000).unwrap();
        assert_eq!(state, ConnectivityState::Connected);
        assert_eq!(manager.backend.associate_calls, 2);
    }
}
