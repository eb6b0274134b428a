//! Top-level 20 Hz loop: reload state, refresh the reverse map, select the
//! LED sequence, fire heartbeats, reconcile offline roles, and throttle the
//! status log. See `spec.md` §4.10.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use tracing::info;

use crate::clock::Clock;
use crate::discovery::{self, PairingContext};
use crate::endpoints::EndpointRegistry;
use crate::led::LedRenderer;
use crate::liveness::Liveness;
use crate::model::{PairingRecord, Role};
use crate::roles::DecisionError;
use crate::store::Store;

pub const TICK_HZ: u32 = 20;
const RECENTLY_MISSING_WINDOW: Duration = Duration::from_secs(10);
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);
const FAST_BLINK: Duration = Duration::from_millis(250);
const SLOW_BLINK: Duration = Duration::from_secs(1);
const OFFLINE_BLINK: Duration = Duration::from_millis(500);

const COLOR_GREEN: Rgb888 = Rgb888::new(0, 255, 0);
const COLOR_RED: Rgb888 = Rgb888::new(255, 0, 0);
const COLOR_BLUE: Rgb888 = Rgb888::new(0, 0, 255);
const COLOR_VIOLET: Rgb888 = Rgb888::new(138, 43, 226);
const COLOR_OFF: Rgb888 = Rgb888::BLACK;

/// Pairing-active guard: dedicated mutex so concurrent pair-button events
/// cannot start two discoveries at once (`spec.md` §5).
#[derive(Default)]
struct PairingGuard {
    active: Mutex<bool>,
}

impl PairingGuard {
    fn try_begin(&self) -> bool {
        let mut guard = self.active.lock().expect("pairing guard mutex poisoned");
        if *guard {
            false
        } else {
            *guard = true;
            true
        }
    }

    fn end(&self) {
        *self.active.lock().expect("pairing guard mutex poisoned") = false;
    }

    fn is_active(&self) -> bool {
        *self.active.lock().expect("pairing guard mutex poisoned")
    }
}

pub struct Supervisor {
    store: Arc<Store>,
    endpoints: Arc<EndpointRegistry>,
    liveness: Arc<Liveness>,
    led: Mutex<LedRenderer>,
    clock: Arc<dyn Clock>,
    pairing: PairingGuard,
    pairing_ctx: PairingContext,
    discovery_wait: Duration,
    pair_fatal: AtomicBool,
    pair_conflict: AtomicBool,
    restart_requested: AtomicBool,
    last_status_log: Mutex<Option<Instant>>,
    last_logged_state: Mutex<Option<(bool, bool)>>,
    paired_since: Mutex<Option<Instant>>,
}

impl Supervisor {
    pub fn new(
        store: Arc<Store>,
        endpoints: Arc<EndpointRegistry>,
        liveness: Arc<Liveness>,
        led: LedRenderer,
        clock: Arc<dyn Clock>,
        pairing_ctx: PairingContext,
        discovery_wait: Duration,
        startup_force_unpair: bool,
    ) -> Self {
        if startup_force_unpair {
            let _ = store.force_unpair();
        }
        Supervisor {
            store,
            endpoints,
            liveness,
            led: Mutex::new(led),
            clock,
            pairing: PairingGuard::default(),
            pairing_ctx,
            discovery_wait,
            pair_fatal: AtomicBool::new(false),
            pair_conflict: AtomicBool::new(false),
            restart_requested: AtomicBool::new(false),
            last_status_log: Mutex::new(None),
            last_logged_state: Mutex::new(None),
            paired_since: Mutex::new(None),
        }
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }

    /// One 20 Hz tick.
    pub async fn tick(&self) {
        let record = self.store.load();
        self.endpoints.refresh_from_record(&record);
        if record.paired {
            self.paired_since.lock().expect("supervisor mutex poisoned").get_or_insert_with(|| self.clock.now());
        } else {
            *self.paired_since.lock().expect("supervisor mutex poisoned") = None;
        }

        if record.paired && !record.paused && !self.pairing.is_active() {
            for role in Role::ALL {
                self.liveness.thump_fire(role).await;
            }
            for role in Role::ALL {
                self.liveness.maybe_reconcile(role).await;
            }
        }

        self.render_leds(&record);
        self.maybe_log_status(&record);
    }

    /// Kicks off `pair_auto` on a background task if one isn't already
    /// running. Non-blocking: the caller (pair-button release handler) must
    /// not wait on network I/O.
    pub fn trigger_pairing(self: &Arc<Self>) {
        if !self.pairing.try_begin() {
            return;
        }
        self.pair_fatal.store(false, Ordering::SeqCst);
        self.pair_conflict.store(false, Ordering::SeqCst);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = discovery::pair_auto(&this.pairing_ctx, this.discovery_wait).await;
            match result {
                Ok(_) => {
                    info!("pairing succeeded");
                }
                Err(DecisionError::NoResponders) => {
                    this.pair_fatal.store(true, Ordering::SeqCst);
                    tracing::warn!("pairing failed: no responders");
                }
                Err(DecisionError::Conflict(reason)) => {
                    this.pair_conflict.store(true, Ordering::SeqCst);
                    tracing::warn!(reason, "pairing failed: conflict");
                }
            }
            this.pairing.end();
        });
    }

    pub fn trigger_force_unpair_and_repair(self: &Arc<Self>) {
        let _ = self.store.force_unpair();
        self.restart_requested.store(true, Ordering::SeqCst);
    }

    pub fn trigger_heal(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.liveness.heal().await;
        });
    }

    /// Requests the acknowledgement flash on a role's pixel.
    pub fn flash_ack(&self, role: Role) {
        self.led.lock().expect("supervisor mutex poisoned").request_flash(role_index(role));
    }

    /// Forwards a cue action to every currently assigned role in parallel.
    /// Non-blocking: `send_action` only enqueues onto the send worker.
    pub fn dispatch_action(&self, suffix: &str) {
        for ep in self.endpoints.all() {
            if let Some(workspace_id) = ep.workspace_id.as_deref() {
                self.pairing_ctx.protocol.send_action(&ep.address, workspace_id, suffix);
            }
        }
    }

    /// Toggles the persisted pause state and forwards the matching
    /// `/pause` or `/resume` action, per `spec.md`'s pause-toggle lifecycle.
    pub fn toggle_pause(&self) {
        let mut record = self.store.load();
        self.dispatch_action(if record.paused { "resume" } else { "pause" });
        record.paused = !record.paused;
        if let Err(e) = self.store.save(&record) {
            tracing::warn!(error = %e, "failed to persist pause toggle");
        }
    }

    /// Whether an absent role is merely "not expected" rather than
    /// "configured but missing" (`SPEC_FULL.md` §B); primary is never
    /// optional.
    fn role_optional(&self, role: Role) -> bool {
        match role {
            Role::Primary => false,
            Role::Backup => self.pairing_ctx.naming.backup_optional,
            Role::Auxiliary => self.pairing_ctx.naming.aux_optional,
        }
    }

    fn render_leds(&self, record: &PairingRecord) {
        let mut led = self.led.lock().expect("supervisor mutex poisoned");

        if self.pair_conflict.load(Ordering::SeqCst) {
            for idx in 0..3 {
                led.set_steady(idx, COLOR_VIOLET);
                led.set_blink(idx, false, SLOW_BLINK);
            }
            return;
        }
        if self.pair_fatal.load(Ordering::SeqCst) {
            for idx in 0..3 {
                led.set_steady(idx, COLOR_RED);
                led.set_blink(idx, false, SLOW_BLINK);
            }
            return;
        }
        if self.pairing.is_active() {
            for idx in 0..3 {
                led.set_steady(idx, COLOR_BLUE);
                led.set_blink(idx, true, FAST_BLINK);
            }
            return;
        }
        if !record.paired {
            for idx in 0..3 {
                led.set_steady(idx, COLOR_BLUE);
                led.set_blink(idx, true, SLOW_BLINK);
            }
            return;
        }

        let now = self.clock.now();
        let paired_since = *self.paired_since.lock().expect("supervisor mutex poisoned");
        for role in Role::ALL {
            let idx = role_index(role);
            if self.liveness.heal_mismatch_active(role) {
                led.set_steady(idx, COLOR_RED);
                led.set_blink(idx, false, SLOW_BLINK);
                continue;
            }
            match self.endpoints.snapshot(role) {
                Some(ep) if ep.online(now) => {
                    led.set_steady(idx, COLOR_GREEN);
                    led.set_blink(idx, false, SLOW_BLINK);
                }
                Some(_) => {
                    led.set_steady(idx, COLOR_RED);
                    led.set_blink(idx, true, OFFLINE_BLINK);
                }
                None => {
                    let recently_missing = !self.role_optional(role)
                        && paired_since
                            .is_some_and(|since| now.saturating_duration_since(since) < RECENTLY_MISSING_WINDOW);
                    if recently_missing {
                        led.set_steady(idx, COLOR_RED);
                        led.set_blink(idx, false, SLOW_BLINK);
                    } else {
                        led.set_steady(idx, COLOR_OFF);
                        led.set_blink(idx, false, SLOW_BLINK);
                    }
                }
            }
        }
    }

    /// Emits a status line on a `paired`/`paused` transition, or every 60 s,
    /// never every tick.
    fn maybe_log_status(&self, record: &PairingRecord) {
        let now = self.clock.now();
        let state = (record.paired, record.paused);

        let mut last_state = self.last_logged_state.lock().expect("supervisor mutex poisoned");
        let changed = *last_state != Some(state);

        let mut last = self.last_status_log.lock().expect("supervisor mutex poisoned");
        let heartbeat_due = match *last {
            Some(t) => now.saturating_duration_since(t) >= STATUS_LOG_INTERVAL,
            None => true,
        };

        if changed || heartbeat_due {
            info!(paired = record.paired, paused = record.paused, "status");
            *last = Some(now);
            *last_state = Some(state);
        }
    }
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Primary => 0,
        Role::Backup => 1,
        Role::Auxiliary => 2,
    }
}
