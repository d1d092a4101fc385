use crate::automation::{AutomationEngine, RelayChange};
use crate::config::{ControlTuning, DeviceConfig};
use crate::indicator::{led_signal, LedSignal};
use crate::input::InputDispatcher;
use crate::sensor::{SensorReader, SensorSource};
use crate::telemetry::{build_request, TelemetryError, TelemetryRequest, TelemetryTracker};
use crate::types::{
    ButtonEvent, ButtonId, ConnectivityState, RelayId, RelayTargets, RemoteDirectives,
    SensorSample, StatusPayload, FIRMWARE_VERSION,
};

/// Last-fire interval gate against the monotonic clock. Fires on the first
/// tick so the device has a sample before the first telemetry exchange.
#[derive(Debug, Clone)]
struct IntervalGate {
    period_ms: u64,
    last_fire_ms: Option<u64>,
}

impl IntervalGate {
    fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_fire_ms: None,
        }
    }

    fn ready(&mut self, now_ms: u64) -> bool {
        let due = self
            .last_fire_ms
            .map(|last| now_ms.saturating_sub(last) >= self.period_ms)
            .unwrap_or(true);
        if due {
            self.last_fire_ms = Some(now_ms);
        }
        due
    }
}

/// Canonical device state. Relay hardware output is always a pure function
/// of `relays`; only the loop's sink writes it.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub config: DeviceConfig,
    pub sample: SensorSample,
    pub relays: RelayTargets,
    pub connectivity: ConnectivityState,
}

/// Side effects one tick asks the runtime to perform.
#[derive(Debug, Default)]
pub struct TickEffects {
    pub relay_changes: Vec<RelayChange>,
    pub led: Option<LedSignal>,
    pub telemetry: Option<TelemetryRequest>,
    pub reconnect: bool,
    pub save_config: bool,
}

/// Ticks sensing, telemetry and the status LED on independent intervals,
/// holds canonical state, and sequences every relay write through the
/// automation engine.
pub struct ControlLoop {
    state: DeviceState,
    tuning: ControlTuning,
    reader: SensorReader,
    automation: AutomationEngine,
    tracker: TelemetryTracker,
    dispatcher: InputDispatcher,
    sensor_gate: IntervalGate,
    telemetry_gate: IntervalGate,
    led_gate: IntervalGate,
    telemetry_in_flight: bool,
}

impl ControlLoop {
    pub fn new(
        config: DeviceConfig,
        tuning: ControlTuning,
        source: Box<dyn SensorSource + Send>,
    ) -> Self {
        Self {
            state: DeviceState {
                config,
                sample: SensorSample::default(),
                relays: RelayTargets::default(),
                connectivity: ConnectivityState::Disconnected,
            },
            reader: SensorReader::new(source),
            automation: AutomationEngine::default(),
            tracker: TelemetryTracker::new(tuning.failure_threshold),
            dispatcher: InputDispatcher::new(tuning.debounce_ms, tuning.long_press_ms),
            sensor_gate: IntervalGate::new(tuning.sensor_interval_ms),
            telemetry_gate: IntervalGate::new(tuning.telemetry_interval_ms),
            led_gate: IntervalGate::new(tuning.led_interval_ms),
            tuning,
            telemetry_in_flight: false,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.state.config
    }

    /// One cooperative loop iteration. Input polling runs on every tick;
    /// sensing, telemetry and LED refresh each on their own interval.
    pub fn tick(
        &mut self,
        now_ms: u64,
        analog_raw: Option<u16>,
        connectivity: ConnectivityState,
    ) -> TickEffects {
        self.state.connectivity = connectivity;
        let mut effects = TickEffects::default();

        if let Some(raw) = analog_raw {
            for event in self.dispatcher.poll(raw, now_ms) {
                self.apply_button(event, &mut effects);
            }
        }

        if self.sensor_gate.ready(now_ms) {
            let sample = self.reader.sample(self.state.relays.relay1.is_on(), now_ms);
            self.state.sample = sample;
            // Automation runs right after sensing, so relay latency is
            // bounded by the sensing interval.
            self.recompute(&mut effects);
        }

        if connectivity.is_connected()
            && !self.telemetry_in_flight
            && self.telemetry_gate.ready(now_ms)
        {
            effects.telemetry = Some(build_request(
                &self.state.config,
                &self.state.sample,
                self.state.relays,
            ));
            self.telemetry_in_flight = true;
        }

        if self.led_gate.ready(now_ms) {
            effects.led = Some(led_signal(
                connectivity,
                self.tracker.health(),
                self.state.relays,
                now_ms,
            ));
        }

        effects
    }

    /// Feeds back the outcome of an exchange started by `tick`.
    pub fn complete_telemetry(
        &mut self,
        result: Result<RemoteDirectives, TelemetryError>,
    ) -> TickEffects {
        self.telemetry_in_flight = false;
        let mut effects = TickEffects::default();

        match result {
            Ok(directives) => {
                self.tracker.record(true);
                self.automation.apply_directives(directives);
                self.recompute(&mut effects);
            }
            Err(_) => {
                effects.reconnect = self.tracker.record(false);
            }
        }

        effects
    }

    /// Debounced button semantics: Ok toggles relay1 as a manual override,
    /// a long Ok press returns both relays to automation, Up/Down nudge the
    /// humidity threshold and request a config save.
    pub fn handle_button(&mut self, event: ButtonEvent) -> TickEffects {
        let mut effects = TickEffects::default();
        self.apply_button(event, &mut effects);
        effects
    }

    /// Manual relay override from the local HTTP surface.
    pub fn toggle_relay(&mut self, relay: RelayId) -> TickEffects {
        let mut effects = TickEffects::default();
        self.toggle_manual(relay, &mut effects);
        effects
    }

    /// Replaces the mutable config fields; the device identity survives any
    /// payload.
    pub fn update_config(&mut self, mut config: DeviceConfig) -> TickEffects {
        config.device_id = self.state.config.device_id.clone();
        config.sanitize();
        self.state.config = config;

        let mut effects = TickEffects::default();
        self.recompute(&mut effects);
        effects.save_config = true;
        effects
    }

    /// Factory defaults, keeping the generated identity.
    pub fn reset_config(&mut self) -> TickEffects {
        let mut defaults = DeviceConfig::default();
        defaults.device_id = self.state.config.device_id.clone();
        self.automation.clear_to_automatic();
        self.update_config(defaults)
    }

    pub fn status(&self, now_ms: u64) -> StatusPayload {
        let health = self.tracker.health();
        StatusPayload {
            device_id: self.state.config.device_id.clone(),
            temperature: self.state.sample.temperature_c,
            humidity: self.state.sample.humidity,
            power: self.state.sample.power_w,
            energy: self.state.sample.energy_kwh,
            relay1_state: self.state.relays.relay1.is_on(),
            relay2_state: self.state.relays.relay2.is_on(),
            runtime: now_ms / 1_000,
            connectivity: self.state.connectivity.as_str(),
            api_healthy: health.last_success,
            api_failures: health.consecutive_failures,
            version: FIRMWARE_VERSION,
        }
    }

    fn apply_button(&mut self, event: ButtonEvent, effects: &mut TickEffects) {
        match event {
            ButtonEvent::ShortPress(ButtonId::Ok) => {
                self.toggle_manual(RelayId::Relay1, effects);
            }
            ButtonEvent::LongPress(ButtonId::Ok) => {
                self.automation.clear_to_automatic();
                self.recompute(effects);
            }
            ButtonEvent::ShortPress(ButtonId::Up) => {
                self.nudge_threshold(self.tuning.threshold_step, effects);
            }
            ButtonEvent::ShortPress(ButtonId::Down) => {
                self.nudge_threshold(-self.tuning.threshold_step, effects);
            }
            ButtonEvent::LongPress(ButtonId::Up) => {
                self.nudge_threshold(self.tuning.threshold_step_long, effects);
            }
            ButtonEvent::LongPress(ButtonId::Down) => {
                self.nudge_threshold(-self.tuning.threshold_step_long, effects);
            }
        }
    }

    fn toggle_manual(&mut self, relay: RelayId, effects: &mut TickEffects) {
        let target = self.state.relays.get(relay).toggled();
        self.automation.set_manual(relay, Some(target));
        self.recompute(effects);
    }

    fn nudge_threshold(&mut self, delta: f32, effects: &mut TickEffects) {
        self.state.config.humid_threshold += delta;
        self.state.config.sanitize();
        effects.save_config = true;
        self.recompute(effects);
    }

    fn recompute(&mut self, effects: &mut TickEffects) {
        let changes = self.automation.decide(
            &self.state.sample,
            &self.state.config,
            self.tuning.sticky_directives,
        );
        self.state.relays = self.automation.latched();
        effects.relay_changes.extend(changes);
    }
}
