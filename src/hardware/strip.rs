use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use tracing::{debug, warn};

use super::{HardwareError, LedStrip};

/// Logs every write instead of driving a strip. Used when the `hardware`
/// feature is off, or when opening the real driver failed at startup.
pub struct NoOpLedStrip;

impl LedStrip for NoOpLedStrip {
    fn write(&mut self, colors: &[Rgb888]) -> Result<(), HardwareError> {
        debug!(?colors, "no-op LED strip write");
        Ok(())
    }
}

#[cfg(feature = "hardware")]
pub struct Ws2812Strip {
    spi: rppal::spi::Spi,
}

#[cfg(feature = "hardware")]
impl Ws2812Strip {
    pub fn open() -> Result<Self, HardwareError> {
        let spi = rppal::spi::Spi::new(
            rppal::spi::Bus::Spi0,
            rppal::spi::SlaveSelect::Ss0,
            3_000_000,
            rppal::spi::Mode::Mode0,
        )
        .map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        Ok(Ws2812Strip { spi })
    }
}

#[cfg(feature = "hardware")]
impl LedStrip for Ws2812Strip {
    fn write(&mut self, colors: &[Rgb888]) -> Result<(), HardwareError> {
        use smart_leds_trait::{SmartLedsWrite, RGB8};
        use ws2812_spi::Ws2812;

        let mut driver = Ws2812::new(&mut self.spi);
        let pixels: Vec<RGB8> = colors.iter().map(|c| RGB8::new(c.r(), c.g(), c.b())).collect();
        driver
            .write(pixels.into_iter())
            .map_err(|e| HardwareError::Write(format!("{e:?}")))
    }
}

/// Opens the real strip when the `hardware` feature is enabled, falling
/// back to the no-op stub (and logging once) when it isn't or opening
/// fails (`spec.md` §7 `HardwareMissing`).
pub fn open_strip() -> Box<dyn LedStrip> {
    #[cfg(feature = "hardware")]
    {
        match Ws2812Strip::open() {
            Ok(strip) => return Box::new(strip),
            Err(e) => warn!(error = %e, "LED strip unavailable, falling back to no-op"),
        }
    }
    #[cfg(not(feature = "hardware"))]
    {
        debug!("hardware feature disabled, using no-op LED strip");
    }
    Box::new(NoOpLedStrip)
}
