use crate::types::{ApiHealth, ConnectivityState, RelayTargets};

const FAST_BLINK_HALF_MS: u64 = 200;
const SLOW_BLINK_HALF_MS: u64 = 1_000;
const BREATHE_PERIOD_MS: u64 = 2_000;
const BINARY_LIT_THRESHOLD: u8 = 64;

/// Brightness for the status output. Devices without PWM threshold it to a
/// binary signal via `is_lit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedSignal {
    pub brightness: u8,
}

impl LedSignal {
    pub const OFF: Self = Self { brightness: 0 };
    pub const ON: Self = Self { brightness: 255 };

    pub fn is_lit(self) -> bool {
        self.brightness >= BINARY_LIT_THRESHOLD
    }
}

/// Maps system state to the one-output status signal. Pure function of its
/// inputs and the clock; priority order, first match wins:
/// no connectivity -> fast blink, API unhealthy -> slow blink, any relay On
/// -> steady, otherwise a breathing pulse.
pub fn led_signal(
    connectivity: ConnectivityState,
    api: ApiHealth,
    relays: RelayTargets,
    now_ms: u64,
) -> LedSignal {
    if !connectivity.is_connected() {
        return blink(now_ms, FAST_BLINK_HALF_MS);
    }
    if !api.last_success {
        return blink(now_ms, SLOW_BLINK_HALF_MS);
    }
    if relays.any_on() {
        return LedSignal::ON;
    }
    LedSignal {
        brightness: breathe_brightness(now_ms),
    }
}

fn blink(now_ms: u64, half_period_ms: u64) -> LedSignal {
    if (now_ms / half_period_ms) % 2 == 0 {
        LedSignal::ON
    } else {
        LedSignal::OFF
    }
}

/// Triangular brightness ramp over the breathing period: up for the first
/// half, down for the second.
fn breathe_brightness(now_ms: u64) -> u8 {
    let phase = now_ms % BREATHE_PERIOD_MS;
    let half = BREATHE_PERIOD_MS / 2;
    let level = if phase < half {
        phase * 255 / half
    } else {
        (BREATHE_PERIOD_MS - phase) * 255 / half
    };
    level.min(255) as u8
}
