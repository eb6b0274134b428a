//! Tick-driven LED compositor: steady color, blink, acknowledgement flash,
//! and fade-out, ticking at 20 Hz per `spec.md` §4.8.

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

pub const TICK_HZ: u32 = 20;
const FADE_DURATION: Duration = Duration::from_millis(250);
const FLASH_DURATION: Duration = Duration::from_millis(250);

fn dim(color: Rgb888, factor: f32) -> Rgb888 {
    let factor = factor.clamp(0.0, 1.0);
    let scale = |c: u8| (f32::from(c) * factor).round() as u8;
    Rgb888::new(scale(color.r()), scale(color.g()), scale(color.b()))
}

fn lerp(a: Rgb888, b: Rgb888, t: f32) -> Rgb888 {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (f32::from(x) + (f32::from(y) - f32::from(x)) * t).round() as u8;
    Rgb888::new(mix(a.r(), b.r()), mix(a.g(), b.g()), mix(a.b(), b.b()))
}

/// Per-pixel render state, owned exclusively by the renderer. Supervisors
/// mutate it only through `LedRenderer`'s typed setters.
struct LedCell {
    steady: Rgb888,
    blink_enabled: bool,
    blink_half_period: Duration,
    flash_expiry: Option<Instant>,
    flash_was_active: bool,
    fade_source: Option<Rgb888>,
    fade_start: Option<Instant>,
    last_rendered: Rgb888,
}

impl LedCell {
    fn new() -> Self {
        LedCell {
            steady: Rgb888::BLACK,
            blink_enabled: false,
            blink_half_period: Duration::from_millis(500),
            flash_expiry: None,
            flash_was_active: false,
            fade_source: None,
            fade_start: None,
            last_rendered: Rgb888::BLACK,
        }
    }
}

pub struct LedRenderer {
    clock: Arc<dyn Clock>,
    epoch: Instant,
    master_dim: f32,
    flash_color: Rgb888,
    cells: Vec<LedCell>,
}

impl LedRenderer {
    pub fn new(clock: Arc<dyn Clock>, pixel_count: usize, master_dim: f32) -> Self {
        let epoch = clock.now();
        let flash_color = dim(Rgb888::new(0, 0, 255), master_dim);
        LedRenderer {
            clock,
            epoch,
            master_dim,
            flash_color,
            cells: (0..pixel_count).map(|_| LedCell::new()).collect(),
        }
    }

    pub fn set_steady(&mut self, idx: usize, raw_color: Rgb888) {
        self.cells[idx].steady = dim(raw_color, self.master_dim);
    }

    pub fn set_blink(&mut self, idx: usize, enabled: bool, half_period: Duration) {
        self.cells[idx].blink_enabled = enabled;
        self.cells[idx].blink_half_period = half_period;
    }

    /// Requests a 0.25 s blue flash on pixel `idx`, used for cue-action
    /// acknowledgements.
    pub fn request_flash(&mut self, idx: usize) {
        let now = self.clock.now();
        self.cells[idx].flash_expiry = Some(now + FLASH_DURATION);
    }

    /// Advances one tick and returns the rendered color of every pixel.
    pub fn tick(&mut self) -> Vec<Rgb888> {
        let now = self.clock.now();
        let epoch = self.epoch;
        let flash_color = self.flash_color;
        self.cells
            .iter_mut()
            .map(|cell| render_one(cell, now, epoch, flash_color))
            .collect()
    }
}

fn render_one(cell: &mut LedCell, now: Instant, epoch: Instant, flash_color: Rgb888) -> Rgb888 {
    // Step 1: active flash takes total priority.
    if let Some(expiry) = cell.flash_expiry {
        if now < expiry {
            cell.flash_was_active = true;
            cell.last_rendered = flash_color;
            return flash_color;
        }
        cell.flash_expiry = None;
    }

    // Step 2: flash just ended this tick — arm the fade from its last color.
    if cell.flash_was_active {
        cell.flash_was_active = false;
        cell.fade_start = Some(now);
        cell.fade_source = Some(cell.last_rendered);
    }

    // Step 3: compute the target (blink or steady).
    let target = if cell.blink_enabled {
        let half = cell.blink_half_period.as_secs_f64().max(0.001);
        let elapsed = now.saturating_duration_since(epoch).as_secs_f64();
        let parity = (elapsed / half).floor() as i64;
        if parity % 2 == 0 {
            cell.steady
        } else {
            Rgb888::BLACK
        }
    } else {
        cell.steady
    };

    // Step 4: fade from the flash color into the target, if still within window.
    let rendered = match (cell.fade_source, cell.fade_start) {
        (Some(source), Some(start)) => {
            let elapsed = now.saturating_duration_since(start);
            if elapsed < FADE_DURATION {
                let t = elapsed.as_secs_f64() / FADE_DURATION.as_secs_f64();
                lerp(source, target, t as f32)
            } else {
                cell.fade_source = None;
                cell.fade_start = None;
                target
            }
        }
        _ => target,
    };

    cell.last_rendered = rendered;
    rendered
}
