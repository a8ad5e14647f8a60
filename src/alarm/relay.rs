// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Relay outputs - GPIO, USB serial relay boards, I2C expanders, simulation

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, VigilError};

/// A switchable relay channel
pub trait RelayOutput: Send {
    /// Identifier for logs
    fn describe(&self) -> String;

    /// Energize or release the relay
    fn set_active(&mut self, active: bool) -> Result<()>;

    /// Hold the relay on for `duration`, then release it
    fn pulse(&mut self, duration: Duration) -> Result<()> {
        self.set_active(true)?;
        thread::sleep(duration);
        self.set_active(false)
    }
}

/// Parsed relay identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTarget {
    /// Linux sysfs GPIO line, e.g. `17` or `gpio:17`
    Gpio(u32),
    /// LCUS-style USB serial relay, e.g. `serial:/dev/ttyUSB0` or `serial:/dev/ttyUSB0#2`
    Serial { path: String, channel: u8 },
    /// PCF8574-style I2C expander bit, e.g. `i2c:/dev/i2c-1:0x20:3`
    I2c { bus: String, address: u16, bit: u8 },
}

impl RelayTarget {
    pub fn parse(identifier: &str) -> Result<Self> {
        let identifier = identifier.trim();
        let invalid = || VigilError::Config(format!("invalid relay identifier '{identifier}'"));

        if let Some(rest) = identifier.strip_prefix("serial:") {
            let (path, channel) = match rest.rsplit_once('#') {
                Some((path, channel)) => (path, channel.parse::<u8>().map_err(|_| invalid())?),
                None => (rest, 1),
            };
            if path.is_empty() || channel == 0 {
                return Err(invalid());
            }
            return Ok(Self::Serial {
                path: path.to_string(),
                channel,
            });
        }

        if let Some(rest) = identifier.strip_prefix("i2c:") {
            let mut parts = rest.rsplitn(3, ':');
            let bit = parts.next().and_then(|b| b.parse::<u8>().ok()).ok_or_else(invalid)?;
            let address = parts.next().and_then(parse_address).ok_or_else(invalid)?;
            let bus = parts.next().filter(|b| !b.is_empty()).ok_or_else(invalid)?;
            if bit > 7 {
                return Err(invalid());
            }
            return Ok(Self::I2c {
                bus: bus.to_string(),
                address,
                bit,
            });
        }

        let pin = identifier.strip_prefix("gpio:").unwrap_or(identifier);
        pin.parse::<u32>().map(Self::Gpio).map_err(|_| invalid())
    }
}

fn parse_address(text: &str) -> Option<u16> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Build the relay output for an optional identifier.
///
/// Anything that cannot be opened becomes a simulated relay so the
/// alarm sequence keeps its timing.
pub fn relay_output(identifier: Option<&str>) -> Box<dyn RelayOutput> {
    let Some(identifier) = identifier.filter(|id| !id.trim().is_empty()) else {
        return Box::new(SimulatedRelay);
    };

    let opened = RelayTarget::parse(identifier).and_then(open_target);
    match opened {
        Ok(relay) => {
            info!("Relay output ready: {}", relay.describe());
            relay
        }
        Err(e) => {
            warn!("Relay '{}' unavailable ({}); relay output will be simulated", identifier, e);
            Box::new(SimulatedRelay)
        }
    }
}

fn open_target(target: RelayTarget) -> Result<Box<dyn RelayOutput>> {
    match target {
        RelayTarget::Gpio(pin) => Ok(Box::new(SysfsGpioRelay::open(pin)?)),
        #[cfg(feature = "serial")]
        RelayTarget::Serial { path, channel } => Ok(Box::new(SerialRelay::open(&path, channel)?)),
        #[cfg(not(feature = "serial"))]
        RelayTarget::Serial { .. } => Err(VigilError::Hardware(
            "serial relay support requires the 'serial' feature".into(),
        )),
        #[cfg(feature = "hardware")]
        RelayTarget::I2c { bus, address, bit } => Ok(Box::new(I2cExpanderRelay::open(&bus, address, bit)?)),
        #[cfg(not(feature = "hardware"))]
        RelayTarget::I2c { .. } => Err(VigilError::Hardware(
            "I2C relay support requires the 'hardware' feature".into(),
        )),
    }
}

/// No hardware; waits out the pulse so timing matches a real relay
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedRelay;

impl RelayOutput for SimulatedRelay {
    fn describe(&self) -> String {
        "simulated".to_string()
    }

    fn set_active(&mut self, _active: bool) -> Result<()> {
        Ok(())
    }

    fn pulse(&mut self, duration: Duration) -> Result<()> {
        info!("Simulated relay activation for {:.1} seconds", duration.as_secs_f64());
        thread::sleep(duration);
        Ok(())
    }
}

/// Relay driven through the Linux sysfs GPIO interface
#[derive(Debug)]
pub struct SysfsGpioRelay {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsGpioRelay {
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at(Path::new("/sys/class/gpio"), pin)
    }

    /// Open a pin under an alternative sysfs root
    pub fn open_at(root: &Path, pin: u32) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{pin}"));
        if !pin_dir.exists() {
            std::fs::write(root.join("export"), pin.to_string())?;
        }
        std::fs::write(pin_dir.join("direction"), "out")?;
        let relay = Self {
            pin,
            value_path: pin_dir.join("value"),
        };
        std::fs::write(&relay.value_path, "0")?;
        Ok(relay)
    }
}

impl RelayOutput for SysfsGpioRelay {
    fn describe(&self) -> String {
        format!("gpio{}", self.pin)
    }

    fn set_active(&mut self, active: bool) -> Result<()> {
        std::fs::write(&self.value_path, if active { "1" } else { "0" })?;
        Ok(())
    }
}

/// LCUS command frame: header, channel, state, checksum
pub fn lcus_frame(channel: u8, active: bool) -> [u8; 4] {
    let state = u8::from(active);
    [0xA0, channel, state, 0xA0u8.wrapping_add(channel).wrapping_add(state)]
}

/// USB serial relay board speaking the LCUS protocol
#[cfg(feature = "serial")]
pub struct SerialRelay {
    path: String,
    channel: u8,
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl SerialRelay {
    pub fn open(path: &str, channel: u8) -> Result<Self> {
        let port = serialport::new(path, 9600)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(|e| VigilError::Hardware(format!("{path}: {e}")))?;
        Ok(Self {
            path: path.to_string(),
            channel,
            port,
        })
    }
}

#[cfg(feature = "serial")]
impl RelayOutput for SerialRelay {
    fn describe(&self) -> String {
        format!("{}#{}", self.path, self.channel)
    }

    fn set_active(&mut self, active: bool) -> Result<()> {
        use std::io::Write;
        self.port.write_all(&lcus_frame(self.channel, active))?;
        self.port.flush()?;
        Ok(())
    }
}

/// One bit of a PCF8574 I/O expander relay board (active low)
#[cfg(feature = "hardware")]
pub struct I2cExpanderRelay {
    bus: String,
    address: u16,
    bit: u8,
    latch: u8,
    device: i2cdev::linux::LinuxI2CDevice,
}

#[cfg(feature = "hardware")]
impl I2cExpanderRelay {
    pub fn open(bus: &str, address: u16, bit: u8) -> Result<Self> {
        use i2cdev::core::I2CDevice;

        let mut device = i2cdev::linux::LinuxI2CDevice::new(bus, address)
            .map_err(|e| VigilError::Hardware(format!("{bus}@{address:#04x}: {e}")))?;
        device
            .smbus_write_byte(0xFF)
            .map_err(|e| VigilError::Hardware(e.to_string()))?;
        Ok(Self {
            bus: bus.to_string(),
            address,
            bit,
            latch: 0xFF,
            device,
        })
    }
}

#[cfg(feature = "hardware")]
impl RelayOutput for I2cExpanderRelay {
    fn describe(&self) -> String {
        format!("{}@{:#04x}:{}", self.bus, self.address, self.bit)
    }

    fn set_active(&mut self, active: bool) -> Result<()> {
        use i2cdev::core::I2CDevice;

        let mask = 1u8 << self.bit;
        let latch = if active { self.latch & !mask } else { self.latch | mask };
        self.device
            .smbus_write_byte(latch)
            .map_err(|e| VigilError::Hardware(e.to_string()))?;
        self.latch = latch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(RelayTarget::parse("17").unwrap(), RelayTarget::Gpio(17));
        assert_eq!(RelayTarget::parse("gpio:4").unwrap(), RelayTarget::Gpio(4));
        assert_eq!(
            RelayTarget::parse("serial:/dev/ttyUSB0").unwrap(),
            RelayTarget::Serial { path: "/dev/ttyUSB0".into(), channel: 1 }
        );
        assert_eq!(
            RelayTarget::parse("serial:/dev/ttyUSB1#2").unwrap(),
            RelayTarget::Serial { path: "/dev/ttyUSB1".into(), channel: 2 }
        );
        assert_eq!(
            RelayTarget::parse("i2c:/dev/i2c-1:0x20:3").unwrap(),
            RelayTarget::I2c { bus: "/dev/i2c-1".into(), address: 0x20, bit: 3 }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for spec in ["", "relay", "gpio:x", "serial:", "serial:/dev/tty#0", "i2c:/dev/i2c-1:0x20:9", "i2c::32:1"] {
            assert!(RelayTarget::parse(spec).is_err(), "{spec}");
        }
    }

    #[test]
    fn test_lcus_frames() {
        assert_eq!(lcus_frame(1, true), [0xA0, 0x01, 0x01, 0xA2]);
        assert_eq!(lcus_frame(1, false), [0xA0, 0x01, 0x00, 0xA1]);
    }

    #[test]
    fn test_unopenable_relay_is_simulated() {
        assert_eq!(relay_output(None).describe(), "simulated");
        assert_eq!(relay_output(Some("not-a-pin")).describe(), "simulated");
    }

    #[test]
    fn test_sysfs_gpio_pulse() {
        let root = std::env::temp_dir().join(format!("vigil-gpio-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("gpio5")).unwrap();

        let mut relay = SysfsGpioRelay::open_at(&root, 5).unwrap();
        assert_eq!(std::fs::read_to_string(root.join("gpio5/direction")).unwrap(), "out");

        relay.set_active(true).unwrap();
        assert_eq!(std::fs::read_to_string(root.join("gpio5/value")).unwrap(), "1");
        relay.pulse(Duration::from_millis(1)).unwrap();
        assert_eq!(std::fs::read_to_string(root.join("gpio5/value")).unwrap(), "0");

        std::fs::remove_dir_all(&root).ok();
    }
}
