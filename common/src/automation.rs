use crate::config::DeviceConfig;
use crate::types::{RelayId, RelayState, RelayTargets, RemoteDirectives, SensorSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayChange {
    pub relay: RelayId,
    pub state: RelayState,
}

/// Converts samples, thresholds, remote directives and manual overrides into
/// relay targets. Precedence per relay, highest first: manual override,
/// remote directive, threshold automation. A disabled relay is forced Off
/// regardless of any other input.
///
/// The engine latches the last computed targets and reports only actual
/// transitions, so the hardware sink never sees redundant writes.
#[derive(Debug, Clone, Default)]
pub struct AutomationEngine {
    latched: RelayTargets,
    manual1: Option<RelayState>,
    manual2: Option<RelayState>,
    directives: RemoteDirectives,
}

impl AutomationEngine {
    pub fn latched(&self) -> RelayTargets {
        self.latched
    }

    pub fn set_manual(&mut self, relay: RelayId, state: Option<RelayState>) {
        match relay {
            RelayId::Relay1 => self.manual1 = state,
            RelayId::Relay2 => self.manual2 = state,
        }
    }

    pub fn manual(&self, relay: RelayId) -> Option<RelayState> {
        match relay {
            RelayId::Relay1 => self.manual1,
            RelayId::Relay2 => self.manual2,
        }
    }

    /// Replaces the stored directive for every relay the response addressed;
    /// relays it did not address keep their previous directive.
    pub fn apply_directives(&mut self, directives: RemoteDirectives) {
        if directives.relay1.is_some() {
            self.directives.relay1 = directives.relay1;
        }
        if directives.relay2.is_some() {
            self.directives.relay2 = directives.relay2;
        }
    }

    /// Drops manual overrides and stored directives; threshold automation
    /// takes back over on the next decision.
    pub fn clear_to_automatic(&mut self) {
        self.manual1 = None;
        self.manual2 = None;
        self.directives = RemoteDirectives::default();
    }

    pub fn decide(
        &mut self,
        sample: &SensorSample,
        config: &DeviceConfig,
        sticky_directives: bool,
    ) -> Vec<RelayChange> {
        let targets = RelayTargets {
            relay1: self.target_relay1(sample, config),
            relay2: self.target_relay2(config),
        };

        if !sticky_directives {
            self.directives = RemoteDirectives::default();
        }

        let mut changes = Vec::new();
        if targets.relay1 != self.latched.relay1 {
            changes.push(RelayChange {
                relay: RelayId::Relay1,
                state: targets.relay1,
            });
        }
        if targets.relay2 != self.latched.relay2 {
            changes.push(RelayChange {
                relay: RelayId::Relay2,
                state: targets.relay2,
            });
        }
        self.latched = targets;
        changes
    }

    fn target_relay1(&self, sample: &SensorSample, config: &DeviceConfig) -> RelayState {
        if !config.relay1_enabled {
            return RelayState::Off;
        }
        if let Some(state) = self.manual1 {
            return state;
        }
        if let Some(on) = self.directives.relay1 {
            return RelayState::from_bool(on);
        }
        RelayState::from_bool(sample.humidity > config.humid_threshold)
    }

    // Relay2 has no threshold rule; it is purely manual/remote.
    fn target_relay2(&self, config: &DeviceConfig) -> RelayState {
        if !config.relay2_enabled {
            return RelayState::Off;
        }
        if let Some(state) = self.manual2 {
            return state;
        }
        if let Some(on) = self.directives.relay2 {
            return RelayState::from_bool(on);
        }
        RelayState::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_with_humidity(humidity: f32) -> SensorSample {
        SensorSample {
            humidity,
            ..SensorSample::default()
        }
    }

    fn config() -> DeviceConfig {
        DeviceConfig {
            humid_threshold: 60.0,
            relay1_enabled: true,
            relay2_enabled: true,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn humidity_above_threshold_turns_relay1_on() {
        let mut engine = AutomationEngine::default();
        let changes = engine.decide(&sample_with_humidity(65.0), &config(), true);

        assert_eq!(
            changes,
            vec![RelayChange {
                relay: RelayId::Relay1,
                state: RelayState::On,
            }]
        );
    }

    #[test]
    fn humidity_at_threshold_stays_off() {
        let mut engine = AutomationEngine::default();
        let changes = engine.decide(&sample_with_humidity(60.0), &config(), true);
        assert!(changes.is_empty());
    }

    #[test]
    fn humidity_jump_produces_single_transition() {
        let mut engine = AutomationEngine::default();

        assert!(engine
            .decide(&sample_with_humidity(55.0), &config(), true)
            .is_empty());

        let changes = engine.decide(&sample_with_humidity(65.0), &config(), true);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].state, RelayState::On);

        // No extra writes while humidity stays above the threshold.
        for humidity in [66.0, 70.0, 61.0] {
            assert!(engine
                .decide(&sample_with_humidity(humidity), &config(), true)
                .is_empty());
        }
    }

    #[test]
    fn disabled_relay_is_forced_off_over_everything() {
        let mut engine = AutomationEngine::default();
        engine.set_manual(RelayId::Relay1, Some(RelayState::On));
        engine.apply_directives(RemoteDirectives {
            relay1: Some(true),
            relay2: None,
        });

        let config = DeviceConfig {
            relay1_enabled: false,
            ..config()
        };
        let changes = engine.decide(&sample_with_humidity(90.0), &config, true);
        assert!(changes.is_empty());
        assert_eq!(engine.latched().relay1, RelayState::Off);
    }

    #[test]
    fn manual_override_wins_over_remote_and_threshold() {
        let mut engine = AutomationEngine::default();
        engine.apply_directives(RemoteDirectives {
            relay1: Some(true),
            relay2: None,
        });
        engine.set_manual(RelayId::Relay1, Some(RelayState::Off));

        let changes = engine.decide(&sample_with_humidity(90.0), &config(), true);
        assert!(changes.is_empty());
        assert_eq!(engine.latched().relay1, RelayState::Off);
    }

    #[test]
    fn remote_directive_wins_over_threshold() {
        let mut engine = AutomationEngine::default();
        engine.apply_directives(RemoteDirectives {
            relay1: Some(false),
            relay2: Some(true),
        });

        let changes = engine.decide(&sample_with_humidity(90.0), &config(), true);
        assert_eq!(
            changes,
            vec![RelayChange {
                relay: RelayId::Relay2,
                state: RelayState::On,
            }]
        );
        assert_eq!(engine.latched().relay1, RelayState::Off);
    }

    #[test]
    fn non_sticky_directives_last_one_pass() {
        let mut engine = AutomationEngine::default();
        engine.apply_directives(RemoteDirectives {
            relay1: Some(true),
            relay2: None,
        });

        let first = engine.decide(&sample_with_humidity(40.0), &config(), false);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].state, RelayState::On);

        // Directive consumed; threshold automation turns relay1 back off.
        let second = engine.decide(&sample_with_humidity(40.0), &config(), false);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].state, RelayState::Off);
    }

    #[test]
    fn clear_to_automatic_restores_threshold_rule() {
        let mut engine = AutomationEngine::default();
        engine.set_manual(RelayId::Relay1, Some(RelayState::On));
        engine.decide(&sample_with_humidity(40.0), &config(), true);
        assert_eq!(engine.latched().relay1, RelayState::On);

        engine.clear_to_automatic();
        let changes = engine.decide(&sample_with_humidity(40.0), &config(), true);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].state, RelayState::Off);
    }

    #[test]
    fn partial_directive_keeps_previous_one() {
        let mut engine = AutomationEngine::default();
        engine.apply_directives(RemoteDirectives {
            relay1: None,
            relay2: Some(true),
        });
        engine.apply_directives(RemoteDirectives {
            relay1: Some(true),
            relay2: None,
        });

        engine.decide(&sample_with_humidity(40.0), &config(), true);
        assert_eq!(engine.latched().relay1, RelayState::On);
        assert_eq!(engine.latched().relay2, RelayState::On);
    }
}
