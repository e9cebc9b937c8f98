//! Global key event listener
//!
//! `rdev::listen` parks its thread for the life of the process, so the
//! listener runs on a dedicated thread and forwards reduced key events
//! into an mpsc channel the daemon loop consumes. Mouse events are
//! filtered out before they reach the channel.

use crate::error::KeyError;
use crate::keys::{KeyIdentity, RawKeyEvent, TriggerKey};
use tokio::sync::mpsc;

/// Start the global key listener on its own thread
pub fn spawn_listener() -> Result<mpsc::Receiver<RawKeyEvent>, KeyError> {
    let (tx, rx) = mpsc::channel(256);

    std::thread::Builder::new()
        .name("key-listener".to_string())
        .spawn(move || {
            let result = rdev::listen(move |event| {
                if let Some(raw) = reduce(&event) {
                    // try_send: the callback must never block on the daemon
                    if tx.try_send(raw).is_err() {
                        tracing::trace!("Key event dropped, channel full");
                    }
                }
            });
            if let Err(e) = result {
                tracing::error!("Global key listener failed: {:?}", e);
            }
        })
        .map_err(|e| KeyError::ListenFailed(e.to_string()))?;

    Ok(rx)
}

fn reduce(event: &rdev::Event) -> Option<RawKeyEvent> {
    let (key, pressed) = match event.event_type {
        rdev::EventType::KeyPress(key) => (key, true),
        rdev::EventType::KeyRelease(key) => (key, false),
        _ => return None,
    };
    Some(RawKeyEvent {
        key: identify(key),
        pressed,
    })
}

/// Left-hand modifiers are trigger candidates; everything else, including
/// the right-hand variants, is foreign
fn identify(key: rdev::Key) -> KeyIdentity {
    match key {
        rdev::Key::ControlLeft => KeyIdentity::Trigger(TriggerKey::LeftCtrl),
        rdev::Key::ShiftLeft => KeyIdentity::Trigger(TriggerKey::LeftShift),
        rdev::Key::Alt => KeyIdentity::Trigger(TriggerKey::LeftAlt),
        _ => KeyIdentity::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(event_type: rdev::EventType) -> rdev::Event {
        rdev::Event {
            time: std::time::SystemTime::now(),
            name: None,
            event_type,
        }
    }

    #[test]
    fn test_left_modifiers_map_to_trigger_keys() {
        assert_eq!(
            identify(rdev::Key::ControlLeft),
            KeyIdentity::Trigger(TriggerKey::LeftCtrl)
        );
        assert_eq!(
            identify(rdev::Key::ShiftLeft),
            KeyIdentity::Trigger(TriggerKey::LeftShift)
        );
        assert_eq!(
            identify(rdev::Key::Alt),
            KeyIdentity::Trigger(TriggerKey::LeftAlt)
        );
    }

    #[test]
    fn test_right_modifiers_and_letters_are_foreign() {
        assert_eq!(identify(rdev::Key::ControlRight), KeyIdentity::Other);
        assert_eq!(identify(rdev::Key::ShiftRight), KeyIdentity::Other);
        assert_eq!(identify(rdev::Key::AltGr), KeyIdentity::Other);
        assert_eq!(identify(rdev::Key::KeyA), KeyIdentity::Other);
    }

    #[test]
    fn test_mouse_events_filtered_out() {
        let event = key_event(rdev::EventType::MouseMove { x: 1.0, y: 2.0 });
        assert!(reduce(&event).is_none());
    }

    #[test]
    fn test_press_and_release_reduced() {
        let down = reduce(&key_event(rdev::EventType::KeyPress(rdev::Key::ControlLeft))).unwrap();
        assert!(down.pressed);
        let up = reduce(&key_event(rdev::EventType::KeyRelease(rdev::Key::KeyA))).unwrap();
        assert!(!up.pressed);
        assert_eq!(up.key, KeyIdentity::Other);
    }
}
