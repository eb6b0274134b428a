//! Debounced button callbacks and the encoder direction decoder.
//!
//! The hardware edge-detection primitive itself (interrupt-on-press/release)
//! is an external collaborator per `spec.md` §1; this module only holds the
//! software edge-guard, quadrature decode, and pair-button FSM that sit on
//! top of whatever raw edges the `hardware` layer reports.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum time between repeated fires of the same logical button.
const EDGE_GUARD: Duration = Duration::from_millis(250);
/// Minimum time between any two encoder direction events.
const ENCODER_COOLDOWN: Duration = Duration::from_millis(120);
/// A direction reversal inside this window is treated as contact glitch.
const REVERSAL_GLITCH_WINDOW: Duration = Duration::from_millis(30);
/// How long the pair switch must be held to fire the force-unpair action.
const PAIR_HOLD_THRESHOLD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Go,
    Pause,
    Panic,
}

/// Software edge-guard on top of the hardware-debounced press callback.
#[derive(Default)]
pub struct ButtonDebouncer {
    last_fire: HashMap<ButtonId, Instant>,
}

impl ButtonDebouncer {
    pub fn new() -> Self {
        ButtonDebouncer::default()
    }

    /// Returns whether this press should actually fire, recording the time
    /// if so.
    pub fn should_fire(&mut self, button: ButtonId, now: Instant) -> bool {
        if let Some(&last) = self.last_fire.get(&button) {
            if now.saturating_duration_since(last) < EDGE_GUARD {
                return false;
            }
        }
        self.last_fire.insert(button, now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderDirection {
    Next,
    Previous,
}

/// Quadrature decoder: polls both channels at 1 kHz in the caller's loop;
/// `poll` should be invoked on every sample with the current channel levels.
pub struct EncoderDecoder {
    last_primary: bool,
    last_direction: Option<EncoderDirection>,
    last_event: Option<Instant>,
}

impl EncoderDecoder {
    pub fn new(initial_primary: bool) -> Self {
        EncoderDecoder {
            last_primary: initial_primary,
            last_direction: None,
            last_event: None,
        }
    }

    /// Feeds one sample of (primary channel, secondary channel). Returns a
    /// direction only when a clean, non-glitched step is detected.
    pub fn poll(&mut self, primary: bool, secondary: bool, now: Instant) -> Option<EncoderDirection> {
        if primary == self.last_primary {
            return None;
        }
        self.last_primary = primary;

        // Standard quadrature read: the secondary channel's level at the
        // moment the primary channel transitions gives rotation direction.
        let direction = if secondary == primary {
            EncoderDirection::Next
        } else {
            EncoderDirection::Previous
        };

        if let Some(last_event) = self.last_event {
            if now.saturating_duration_since(last_event) < ENCODER_COOLDOWN {
                return None;
            }
            if let Some(last_direction) = self.last_direction {
                if direction != last_direction
                    && now.saturating_duration_since(last_event) < REVERSAL_GLITCH_WINDOW
                {
                    return None;
                }
            }
        }

        self.last_event = Some(now);
        self.last_direction = Some(direction);
        Some(direction)
    }
}

/// What the pair switch's state machine wants done right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairAction {
    ForceUnpairAndRepair,
    RunHeal,
    RunPairing,
}

/// The encoder's integrated push switch: pair (pressed/held/released).
#[derive(Default)]
pub struct PairSwitch {
    pressed_at: Option<Instant>,
    held_fired: bool,
}

impl PairSwitch {
    pub fn new() -> Self {
        PairSwitch::default()
    }

    pub fn on_press(&mut self, now: Instant) {
        self.pressed_at = Some(now);
        self.held_fired = false;
    }

    /// Call periodically while the switch is held down. Fires exactly once
    /// per press, when the hold threshold is crossed.
    pub fn poll_hold(&mut self, now: Instant) -> Option<PairAction> {
        let pressed_at = self.pressed_at?;
        if !self.held_fired && now.saturating_duration_since(pressed_at) >= PAIR_HOLD_THRESHOLD {
            self.held_fired = true;
            return Some(PairAction::ForceUnpairAndRepair);
        }
        None
    }

    pub fn on_release(&mut self, currently_paired: bool) -> Option<PairAction> {
        let held_fired = self.held_fired;
        self.pressed_at = None;
        self.held_fired = false;

        if held_fired {
            None
        } else if currently_paired {
            Some(PairAction::RunHeal)
        } else {
            Some(PairAction::RunPairing)
        }
    }
}
