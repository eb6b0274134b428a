use tracing::{debug, warn};

use super::{ButtonSource, HardwareError, RawEdge};
use crate::config::GpioConfig;

/// Always reports "released" / no rotation. Used when the `hardware`
/// feature is off, or when opening the real GPIO lines failed at startup.
pub struct NoOpButtons;

impl ButtonSource for NoOpButtons {
    fn poll_go(&mut self) -> Result<RawEdge, HardwareError> {
        Ok(RawEdge::Released)
    }

    fn poll_pause(&mut self) -> Result<RawEdge, HardwareError> {
        Ok(RawEdge::Released)
    }

    fn poll_panic(&mut self) -> Result<RawEdge, HardwareError> {
        Ok(RawEdge::Released)
    }

    fn poll_encoder(&mut self) -> Result<(bool, bool, RawEdge), HardwareError> {
        Ok((false, false, RawEdge::Released))
    }
}

#[cfg(feature = "hardware")]
pub struct RppalButtons {
    go: rppal::gpio::InputPin,
    pause: rppal::gpio::InputPin,
    panic: rppal::gpio::InputPin,
    enc_clk: rppal::gpio::InputPin,
    enc_dt: rppal::gpio::InputPin,
    enc_sw: rppal::gpio::InputPin,
}

#[cfg(feature = "hardware")]
impl RppalButtons {
    pub fn open(cfg: &GpioConfig) -> Result<Self, HardwareError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        let pull_up_input = |pin: u8| -> Result<rppal::gpio::InputPin, HardwareError> {
            gpio.get(pin)
                .map_err(|e| HardwareError::Unavailable(e.to_string()))
                .map(|p| p.into_input_pullup())
        };
        Ok(RppalButtons {
            go: pull_up_input(cfg.btn_go_pin)?,
            pause: pull_up_input(cfg.btn_pause_pin)?,
            panic: pull_up_input(cfg.btn_panic_pin)?,
            enc_clk: pull_up_input(cfg.enc_clk_pin)?,
            enc_dt: pull_up_input(cfg.enc_dt_pin)?,
            enc_sw: pull_up_input(cfg.enc_sw_pin)?,
        })
    }

    fn edge(pin: &rppal::gpio::InputPin) -> RawEdge {
        if pin.is_low() {
            RawEdge::Pressed
        } else {
            RawEdge::Released
        }
    }
}

#[cfg(feature = "hardware")]
impl ButtonSource for RppalButtons {
    fn poll_go(&mut self) -> Result<RawEdge, HardwareError> {
        Ok(Self::edge(&self.go))
    }

    fn poll_pause(&mut self) -> Result<RawEdge, HardwareError> {
        Ok(Self::edge(&self.pause))
    }

    fn poll_panic(&mut self) -> Result<RawEdge, HardwareError> {
        Ok(Self::edge(&self.panic))
    }

    fn poll_encoder(&mut self) -> Result<(bool, bool, RawEdge), HardwareError> {
        Ok((self.enc_clk.is_high(), self.enc_dt.is_high(), Self::edge(&self.enc_sw)))
    }
}

pub fn open_buttons(_cfg: &GpioConfig) -> Box<dyn ButtonSource> {
    #[cfg(feature = "hardware")]
    {
        match RppalButtons::open(_cfg) {
            Ok(buttons) => return Box::new(buttons),
            Err(e) => warn!(error = %e, "GPIO buttons unavailable, falling back to no-op"),
        }
    }
    #[cfg(not(feature = "hardware"))]
    {
        debug!("hardware feature disabled, using no-op buttons");
    }
    Box::new(NoOpButtons)
}
