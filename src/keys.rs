//! Trigger classification for the push-to-talk key combination
//!
//! A pure reduction over the currently-held key set: raw press/release
//! events plus the active keybinding mode map to trigger signals. The
//! classifier never starts or stops a recording itself; the session
//! coordinator consumes its signals.
//!
//! Only left-hand modifier keys participate, so the combination cannot
//! collide with right-hand modifiers grabbed by other global listeners.

use crate::error::KeyError;

/// Left-hand modifier keys usable in a trigger combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKey {
    LeftCtrl,
    LeftShift,
    LeftAlt,
}

impl std::fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKey::LeftCtrl => write!(f, "Ctrl"),
            TriggerKey::LeftShift => write!(f, "Shift"),
            TriggerKey::LeftAlt => write!(f, "Option"),
        }
    }
}

/// Key identity as seen by the classifier: a trigger key or anything else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIdentity {
    Trigger(TriggerKey),
    /// Any key outside the trigger set (including right-hand modifiers)
    Other,
}

/// A raw global key event, reduced to what the classifier needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub key: KeyIdentity,
    pub pressed: bool,
}

/// The configured push-to-talk combination
///
/// Swapped atomically with each config sync cycle; the classifier takes it
/// by reference on every event so a mid-session change takes effect on the
/// next key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeybindingMode {
    /// A single held modifier triggers recording
    SingleModifier { primary: TriggerKey },
    /// Primary plus a secondary modifier must both be held
    ModifierPlusSecondary {
        primary: TriggerKey,
        secondary: TriggerKey,
    },
}

impl KeybindingMode {
    /// Map the server's `keybinding` setting ("ctrl" or "shift") to a mode.
    ///
    /// The server setting names the primary modifier; the secondary is
    /// always left Option/Alt.
    pub fn from_server_keybinding(value: &str) -> Result<Self, KeyError> {
        let primary = match value {
            "ctrl" => TriggerKey::LeftCtrl,
            "shift" => TriggerKey::LeftShift,
            other => return Err(KeyError::UnknownKey(other.to_string())),
        };
        Ok(KeybindingMode::ModifierPlusSecondary {
            primary,
            secondary: TriggerKey::LeftAlt,
        })
    }

    pub fn primary(&self) -> TriggerKey {
        match self {
            KeybindingMode::SingleModifier { primary } => *primary,
            KeybindingMode::ModifierPlusSecondary { primary, .. } => *primary,
        }
    }

    pub fn secondary(&self) -> Option<TriggerKey> {
        match self {
            KeybindingMode::SingleModifier { .. } => None,
            KeybindingMode::ModifierPlusSecondary { secondary, .. } => Some(*secondary),
        }
    }
}

impl std::fmt::Display for KeybindingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.secondary() {
            Some(secondary) => write!(f, "{} + {}", self.primary(), secondary),
            None => write!(f, "{}", self.primary()),
        }
    }
}

/// Signals emitted by the classifier, consumed by the session coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSignal {
    /// All required keys are now held
    Satisfied,
    /// A required key was released while the combination was held
    Released,
    /// A key outside the trigger set was pressed
    ForeignKey,
}

/// Held-state of the trigger keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    primary_held: bool,
    secondary_held: bool,
}

impl KeyState {
    fn satisfied(&self, mode: &KeybindingMode) -> bool {
        match mode {
            KeybindingMode::SingleModifier { .. } => self.primary_held,
            KeybindingMode::ModifierPlusSecondary { .. } => {
                self.primary_held && self.secondary_held
            }
        }
    }
}

/// Stateful wrapper around [`KeyState`]
///
/// Owns the only mutable key flags in the system; the watchdog clears them
/// through [`TriggerClassifier::reset`] after a forced stop so a missed
/// release event cannot wedge the daemon.
#[derive(Debug, Default)]
pub struct TriggerClassifier {
    state: KeyState,
}

impl TriggerClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce one raw key event into at most one trigger signal.
    ///
    /// `Satisfied` fires only on the transition into the fully-held
    /// combination, so OS key repeat does not re-trigger it.
    pub fn classify(&mut self, event: RawKeyEvent, mode: &KeybindingMode) -> Option<TriggerSignal> {
        let role = match event.key {
            KeyIdentity::Trigger(key) => {
                if key == mode.primary() {
                    Some(Role::Primary)
                } else if Some(key) == mode.secondary() {
                    Some(Role::Secondary)
                } else {
                    None
                }
            }
            KeyIdentity::Other => None,
        };

        let Some(role) = role else {
            // Releases of unrelated keys carry no signal
            return event.pressed.then_some(TriggerSignal::ForeignKey);
        };

        let was_satisfied = self.state.satisfied(mode);
        let flag = match role {
            Role::Primary => &mut self.state.primary_held,
            Role::Secondary => &mut self.state.secondary_held,
        };

        if event.pressed {
            if *flag {
                // Key repeat
                return None;
            }
            *flag = true;
            (!was_satisfied && self.state.satisfied(mode)).then_some(TriggerSignal::Satisfied)
        } else {
            if !*flag {
                return None;
            }
            *flag = false;
            was_satisfied.then_some(TriggerSignal::Released)
        }
    }

    /// True when no trigger key is held at all.
    ///
    /// A cancelled session re-arms only once this reports true, not merely
    /// when the combination stops being satisfied.
    pub fn all_released(&self) -> bool {
        !self.state.primary_held && !self.state.secondary_held
    }

    /// True while the secondary trigger key is held (pauses raise-on-hover)
    pub fn secondary_held(&self) -> bool {
        self.state.secondary_held
    }

    /// Clear all held flags (watchdog recovery after a forced stop)
    pub fn reset(&mut self) {
        self.state = KeyState::default();
    }
}

enum Role {
    Primary,
    Secondary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl_opt() -> KeybindingMode {
        KeybindingMode::from_server_keybinding("ctrl").unwrap()
    }

    fn press(key: TriggerKey) -> RawKeyEvent {
        RawKeyEvent {
            key: KeyIdentity::Trigger(key),
            pressed: true,
        }
    }

    fn release(key: TriggerKey) -> RawKeyEvent {
        RawKeyEvent {
            key: KeyIdentity::Trigger(key),
            pressed: false,
        }
    }

    #[test]
    fn test_satisfied_only_when_both_keys_held() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        assert_eq!(classifier.classify(press(TriggerKey::LeftCtrl), &mode), None);
        assert_eq!(
            classifier.classify(press(TriggerKey::LeftAlt), &mode),
            Some(TriggerSignal::Satisfied)
        );
    }

    #[test]
    fn test_key_repeat_does_not_retrigger() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        classifier.classify(press(TriggerKey::LeftCtrl), &mode);
        classifier.classify(press(TriggerKey::LeftAlt), &mode);
        // OS auto-repeat re-sends press events for held keys
        assert_eq!(classifier.classify(press(TriggerKey::LeftAlt), &mode), None);
        assert_eq!(classifier.classify(press(TriggerKey::LeftCtrl), &mode), None);
    }

    #[test]
    fn test_released_fires_on_first_required_key_up() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        classifier.classify(press(TriggerKey::LeftCtrl), &mode);
        classifier.classify(press(TriggerKey::LeftAlt), &mode);
        assert_eq!(
            classifier.classify(release(TriggerKey::LeftAlt), &mode),
            Some(TriggerSignal::Released)
        );
        // Second key up: combination already broken, no further signal
        assert_eq!(classifier.classify(release(TriggerKey::LeftCtrl), &mode), None);
        assert!(classifier.all_released());
    }

    #[test]
    fn test_foreign_key_press_signals_only_on_press() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        let other_down = RawKeyEvent {
            key: KeyIdentity::Other,
            pressed: true,
        };
        let other_up = RawKeyEvent {
            key: KeyIdentity::Other,
            pressed: false,
        };
        assert_eq!(classifier.classify(other_down, &mode), Some(TriggerSignal::ForeignKey));
        assert_eq!(classifier.classify(other_up, &mode), None);
    }

    #[test]
    fn test_unused_trigger_key_counts_as_foreign() {
        // Shift is a trigger key in general but not part of ctrl+option
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        assert_eq!(
            classifier.classify(press(TriggerKey::LeftShift), &mode),
            Some(TriggerSignal::ForeignKey)
        );
    }

    #[test]
    fn test_all_released_tracks_partial_holds() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        assert!(classifier.all_released());
        classifier.classify(press(TriggerKey::LeftCtrl), &mode);
        assert!(!classifier.all_released());
        classifier.classify(release(TriggerKey::LeftCtrl), &mode);
        assert!(classifier.all_released());
    }

    #[test]
    fn test_reset_clears_stuck_flags() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        classifier.classify(press(TriggerKey::LeftCtrl), &mode);
        classifier.classify(press(TriggerKey::LeftAlt), &mode);
        classifier.reset();
        assert!(classifier.all_released());
        // A fresh press sequence must still satisfy normally
        classifier.classify(press(TriggerKey::LeftCtrl), &mode);
        assert_eq!(
            classifier.classify(press(TriggerKey::LeftAlt), &mode),
            Some(TriggerSignal::Satisfied)
        );
    }

    #[test]
    fn test_single_modifier_mode() {
        let mode = KeybindingMode::SingleModifier {
            primary: TriggerKey::LeftCtrl,
        };
        let mut classifier = TriggerClassifier::new();

        assert_eq!(
            classifier.classify(press(TriggerKey::LeftCtrl), &mode),
            Some(TriggerSignal::Satisfied)
        );
        assert_eq!(
            classifier.classify(release(TriggerKey::LeftCtrl), &mode),
            Some(TriggerSignal::Released)
        );
    }

    #[test]
    fn test_secondary_held_flag() {
        let mode = ctrl_opt();
        let mut classifier = TriggerClassifier::new();

        assert!(!classifier.secondary_held());
        classifier.classify(press(TriggerKey::LeftAlt), &mode);
        assert!(classifier.secondary_held());
        classifier.classify(release(TriggerKey::LeftAlt), &mode);
        assert!(!classifier.secondary_held());
    }

    #[test]
    fn test_unknown_server_keybinding_rejected() {
        assert!(KeybindingMode::from_server_keybinding("caps").is_err());
        assert!(KeybindingMode::from_server_keybinding("").is_err());
    }

    #[test]
    fn test_keybinding_display() {
        assert_eq!(ctrl_opt().to_string(), "Ctrl + Option");
        let shift = KeybindingMode::from_server_keybinding("shift").unwrap();
        assert_eq!(shift.to_string(), "Shift + Option");
    }
}
