use crate::types::SensorSample;

/// Raw temperature/humidity reading from whatever is attached to the sensor
/// header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity: f32,
}

/// Substitution point for the physical sensor. Real drivers (DHT22, SHT31)
/// plug in here without touching any caller.
pub trait SensorSource {
    fn read(&mut self) -> Reading;
}

/// Deterministic pseudo-random source with the same bounds the hardware
/// sensor reports: temperature in [18, 30] °C, humidity in [30, 90] %RH.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    state: u64,
}

impl SimulatedSensor {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next(&mut self) -> u64 {
        // xorshift64
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(0x5eed_1234_5678_9abc)
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self) -> Reading {
        let temperature_c = 18.0 + (self.next() % 120) as f32 / 10.0;
        let humidity = 30.0 + (self.next() % 600) as f32 / 10.0;
        Reading {
            temperature_c,
            humidity,
        }
    }
}

const BASE_POWER_W: f32 = 800.0;

/// Periodic sampler. Power is derived from the relay1 state, not measured,
/// so `sample` must run after the current relay1 state is known for the
/// tick; energy integrates power over the elapsed interval.
pub struct SensorReader {
    source: Box<dyn SensorSource + Send>,
    jitter: SimulatedSensor,
    energy_kwh: f32,
    last_sample_ms: Option<u64>,
}

impl SensorReader {
    pub fn new(source: Box<dyn SensorSource + Send>) -> Self {
        Self {
            source,
            jitter: SimulatedSensor::new(0x7031_77e8),
            energy_kwh: 0.0,
            last_sample_ms: None,
        }
    }

    pub fn sample(&mut self, relay1_on: bool, now_ms: u64) -> SensorSample {
        let reading = self.source.read();

        let interval_s = self
            .last_sample_ms
            .map(|last| now_ms.saturating_sub(last) as f32 / 1_000.0)
            .unwrap_or(0.0);
        self.last_sample_ms = Some(now_ms);

        let power_w = if relay1_on {
            BASE_POWER_W + (self.jitter.next() % 100) as f32 / 10.0
        } else {
            0.0
        };
        self.energy_kwh += power_w / 3_600.0 * interval_s;

        SensorSample {
            temperature_c: reading.temperature_c,
            humidity: reading.humidity,
            power_w,
            energy_kwh: self.energy_kwh,
            runtime_s: now_ms / 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSensor;

    impl SensorSource for FixedSensor {
        fn read(&mut self) -> Reading {
            Reading {
                temperature_c: 22.5,
                humidity: 55.0,
            }
        }
    }

    #[test]
    fn simulated_readings_stay_in_bounds() {
        let mut sensor = SimulatedSensor::default();
        for _ in 0..1_000 {
            let reading = sensor.read();
            assert!((18.0..=30.0).contains(&reading.temperature_c));
            assert!((30.0..=90.0).contains(&reading.humidity));
        }
    }

    #[test]
    fn energy_is_monotonic_while_relay_on() {
        let mut reader = SensorReader::new(Box::new(FixedSensor));
        let mut previous = reader.sample(true, 0).energy_kwh;

        for tick in 1..=10u64 {
            let sample = reader.sample(true, tick * 5_000);
            assert!(sample.energy_kwh > previous);
            previous = sample.energy_kwh;
        }
    }

    #[test]
    fn energy_holds_while_relay_off() {
        let mut reader = SensorReader::new(Box::new(FixedSensor));
        reader.sample(true, 0);
        let accumulated = reader.sample(true, 5_000).energy_kwh;

        for tick in 2..=6u64 {
            let sample = reader.sample(false, tick * 5_000);
            assert_eq!(sample.energy_kwh, accumulated);
            assert_eq!(sample.power_w, 0.0);
        }
    }

    #[test]
    fn power_tracks_relay_state_of_the_same_tick() {
        let mut reader = SensorReader::new(Box::new(FixedSensor));

        let off = reader.sample(false, 0);
        assert_eq!(off.power_w, 0.0);

        let on = reader.sample(true, 5_000);
        assert!(on.power_w >= 800.0 && on.power_w < 810.0);
    }

    #[test]
    fn runtime_counts_seconds_since_boot() {
        let mut reader = SensorReader::new(Box::new(FixedSensor));
        assert_eq!(reader.sample(false, 12_500).runtime_s, 12);
    }
}
