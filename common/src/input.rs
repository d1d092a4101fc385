use crate::types::{ButtonEvent, ButtonId};

/// ADC bands for the shared analog line of the three-button membrane
/// switch. Bands must not overlap; anything above the last band means no
/// button is pressed.
const BAND_UP_MAX: u16 = 100;
const BAND_DOWN_MAX: u16 = 300;
const BAND_OK_MAX: u16 = 500;

pub fn classify_membrane(raw: u16) -> Option<ButtonId> {
    if raw < BAND_UP_MAX {
        Some(ButtonId::Up)
    } else if raw < BAND_DOWN_MAX {
        Some(ButtonId::Down)
    } else if raw < BAND_OK_MAX {
        Some(ButtonId::Ok)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Released,
    Pressed { since_ms: u64, long_fired: bool },
}

/// Debounce state machine for one logical button. A long press fires once
/// while the button is held past the threshold; a short press fires on
/// release, but only when the press outlived the debounce window.
#[derive(Debug, Clone)]
pub struct Debouncer {
    id: ButtonId,
    state: PressState,
    debounce_ms: u64,
    long_press_ms: u64,
}

impl Debouncer {
    pub fn new(id: ButtonId, debounce_ms: u64, long_press_ms: u64) -> Self {
        Self {
            id,
            state: PressState::Released,
            debounce_ms,
            long_press_ms,
        }
    }

    pub fn tick(&mut self, pressed: bool, now_ms: u64) -> Option<ButtonEvent> {
        match self.state {
            PressState::Released if pressed => {
                self.state = PressState::Pressed {
                    since_ms: now_ms,
                    long_fired: false,
                };
                None
            }
            PressState::Released => None,
            PressState::Pressed {
                since_ms,
                long_fired,
            } if pressed => {
                if !long_fired && now_ms.saturating_sub(since_ms) >= self.long_press_ms {
                    self.state = PressState::Pressed {
                        since_ms,
                        long_fired: true,
                    };
                    return Some(ButtonEvent::LongPress(self.id));
                }
                None
            }
            PressState::Pressed {
                since_ms,
                long_fired,
            } => {
                let held_ms = now_ms.saturating_sub(since_ms);
                self.state = PressState::Released;
                if !long_fired && (self.debounce_ms..self.long_press_ms).contains(&held_ms) {
                    return Some(ButtonEvent::ShortPress(self.id));
                }
                None
            }
        }
    }
}

/// Debounces the membrane switch into discrete per-button events. Each poll
/// first classifies the analog reading, then advances only the matching
/// button's press tracking; the other machines observe a release.
#[derive(Debug, Clone)]
pub struct InputDispatcher {
    buttons: [Debouncer; 3],
}

impl InputDispatcher {
    pub fn new(debounce_ms: u64, long_press_ms: u64) -> Self {
        Self {
            buttons: [
                Debouncer::new(ButtonId::Up, debounce_ms, long_press_ms),
                Debouncer::new(ButtonId::Down, debounce_ms, long_press_ms),
                Debouncer::new(ButtonId::Ok, debounce_ms, long_press_ms),
            ],
        }
    }

    pub fn poll(&mut self, raw: u16, now_ms: u64) -> Vec<ButtonEvent> {
        let active = classify_membrane(raw);
        self.buttons
            .iter_mut()
            .filter_map(|button| {
                let pressed = active == Some(button.id);
                button.tick(pressed, now_ms)
            })
            .collect()
    }
}
