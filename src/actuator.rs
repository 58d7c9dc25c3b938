//! Physical actuator interface.
//!
//! The core only needs to drive one binary output and read it back. The
//! default backend keeps the level in memory; the `peripheral-rpi` feature
//! adds a Raspberry Pi GPIO backend.

use crate::config::{ActuatorConfig, ActuatorKind};
use std::fmt;

/// Level of the actuator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorState {
    On,
    Off,
}

impl ActuatorState {
    /// Upper-case form used on the wire and in the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for ActuatorState {
    fn from(high: bool) -> Self {
        if high {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary output the service can drive.
pub trait Actuator {
    /// Human-readable backend name (e.g. "memory", "rpi-gpio").
    fn name(&self) -> &str;

    fn write_state(&mut self, high: bool);

    fn read_state(&self) -> bool;
}

/// Output level held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryActuator {
    high: bool,
}

impl MemoryActuator {
    pub fn new(initially_on: bool) -> Self {
        Self { high: initially_on }
    }
}

impl Actuator for MemoryActuator {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_state(&mut self, high: bool) {
        self.high = high;
    }

    fn read_state(&self) -> bool {
        self.high
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_state(&mut self, high: bool) {
        (**self).write_state(high);
    }

    fn read_state(&self) -> bool {
        (**self).read_state()
    }
}

/// Factory: create the configured actuator backend, driven to its initial level.
pub fn create_actuator(config: &ActuatorConfig) -> anyhow::Result<Box<dyn Actuator>> {
    match config.kind {
        ActuatorKind::Memory => Ok(Box::new(MemoryActuator::new(config.initially_on))),
        ActuatorKind::RpiGpio => open_gpio(config),
    }
}

#[cfg(all(feature = "peripheral-rpi", target_os = "linux"))]
fn open_gpio(config: &ActuatorConfig) -> anyhow::Result<Box<dyn Actuator>> {
    Ok(Box::new(GpioActuator::open(config.pin, config.initially_on)?))
}

#[cfg(not(all(feature = "peripheral-rpi", target_os = "linux")))]
fn open_gpio(_config: &ActuatorConfig) -> anyhow::Result<Box<dyn Actuator>> {
    anyhow::bail!(
        "actuator.kind = \"rpi-gpio\" requires a Linux build with `--features peripheral-rpi`"
    )
}

#[cfg(all(feature = "peripheral-rpi", target_os = "linux"))]
pub use rpi::GpioActuator;

#[cfg(all(feature = "peripheral-rpi", target_os = "linux"))]
mod rpi {
    use super::Actuator;
    use anyhow::{Context, Result};
    use rppal::gpio::{Gpio, OutputPin};

    /// BCM GPIO pin configured as an output.
    pub struct GpioActuator {
        pin: OutputPin,
    }

    impl GpioActuator {
        pub fn open(bcm_pin: u8, initially_on: bool) -> Result<Self> {
            let gpio = Gpio::new().context("Failed to open GPIO controller")?;
            let mut pin = gpio
                .get(bcm_pin)
                .with_context(|| format!("Failed to claim GPIO pin {bcm_pin}"))?
                .into_output();
            if initially_on {
                pin.set_high();
            } else {
                pin.set_low();
            }
            Ok(Self { pin })
        }
    }

    impl Actuator for GpioActuator {
        fn name(&self) -> &str {
            "rpi-gpio"
        }

        fn write_state(&mut self, high: bool) {
            if high {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        }

        fn read_state(&self) -> bool {
            self.pin.is_set_high()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_level() {
        assert_eq!(ActuatorState::from(true), ActuatorState::On);
        assert_eq!(ActuatorState::from(false), ActuatorState::Off);
        assert!(ActuatorState::On.is_on());
    }

    #[test]
    fn state_wire_names() {
        assert_eq!(ActuatorState::On.to_string(), "ON");
        assert_eq!(ActuatorState::Off.as_str(), "OFF");
    }

    #[test]
    fn memory_actuator_reads_back_writes() {
        let mut led = MemoryActuator::new(false);
        assert!(!led.read_state());
        led.write_state(true);
        assert!(led.read_state());
        assert_eq!(led.name(), "memory");
    }

    #[test]
    fn factory_memory() {
        let config = ActuatorConfig {
            initially_on: true,
            ..ActuatorConfig::default()
        };
        let led = create_actuator(&config).unwrap();
        assert_eq!(led.name(), "memory");
        assert!(led.read_state());
    }

    #[cfg(not(all(feature = "peripheral-rpi", target_os = "linux")))]
    #[test]
    fn factory_gpio_without_feature_errors() {
        let config = ActuatorConfig {
            kind: ActuatorKind::RpiGpio,
            ..ActuatorConfig::default()
        };
        match create_actuator(&config) {
            Err(err) => assert!(err.to_string().contains("peripheral-rpi")),
            Ok(_) => panic!("gpio actuator should need the feature"),
        }
    }

    #[test]
    fn boxed_actuator_delegates() {
        let mut led: Box<dyn Actuator> = Box::new(MemoryActuator::new(true));
        assert!(led.read_state());
        led.write_state(false);
        assert!(!led.read_state());
    }
}
