//! Addressable LED strips on serial or UDP links.
//!
//! Strips take one packet per update:
//!
//! ```text
//! 0xAA | r g b × num_leds | checksum_hi checksum_lo
//! ```
//!
//! The checksum is the 16-bit wrapping sum of every preceding byte.

use std::io::Write;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace};

use crate::color::Color;
use crate::controller::{check_led_count, Controller, DeviceType, Zone, ZoneType};
use crate::error::{Error, Result};
use crate::protocol::MAX_WIRE_COUNT;

/// First byte of every strip packet.
pub const STRIP_PACKET_START: u8 = 0xAA;

const SERIAL_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte sink a strip is driven through.
pub trait StripPort: Send {
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// Strip on a serial port.
pub struct SerialStripPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialStripPort {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(SERIAL_WRITE_TIMEOUT)
            .open()
            .map_err(|e| Error::DeviceNotFound(format!("serial port {path}: {e}")))?;
        Ok(Self { port })
    }
}

impl StripPort for SerialStripPort {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        Ok(())
    }
}

/// Strip behind a UDP receiver.
pub struct UdpStripPort {
    socket: UdpSocket,
}

impl UdpStripPort {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(addr)?;
        Ok(Self { socket })
    }
}

impl StripPort for UdpStripPort {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.socket.send(packet)?;
        Ok(())
    }
}

/// Encode one strip update.
pub fn encode_strip_packet(colors: &[Color]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(colors.len() * 3 + 3);
    packet.push(STRIP_PACKET_START);
    for c in colors {
        packet.extend_from_slice(&[c.r, c.g, c.b]);
    }
    let sum = packet
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    packet.extend_from_slice(&sum.to_be_bytes());
    packet
}

/// A single-zone strip controller.
pub struct LedStrip {
    port: Box<dyn StripPort>,
    name: String,
    location: String,
    zones: Vec<Zone>,
    led_names: Vec<String>,
    colors: Vec<Color>,
}

impl LedStrip {
    pub fn new(
        port: Box<dyn StripPort>,
        name: impl Into<String>,
        location: impl Into<String>,
        num_leds: usize,
    ) -> Result<Self> {
        let name = name.into();
        if num_leds > MAX_WIRE_COUNT {
            return Err(Error::TooMany {
                what: "strip LEDs",
                count: num_leds,
                max: MAX_WIRE_COUNT,
            });
        }
        debug!(strip = %name, num_leds, "LED strip registered");
        Ok(Self {
            port,
            zones: vec![Zone::new(name.clone(), ZoneType::Linear, num_leds)],
            name,
            location: location.into(),
            led_names: (1..=num_leds).map(|i| format!("LED {i}")).collect(),
            colors: vec![Color::BLACK; num_leds],
        })
    }
}

impl Controller for LedStrip {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::LedStrip
    }

    fn description(&self) -> &str {
        "Addressable LED strip"
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn zones(&self) -> &[Zone] {
        &self.zones
    }

    fn led_names(&self) -> &[String] {
        &self.led_names
    }

    fn colors(&self) -> &[Color] {
        &self.colors
    }

    fn set_leds(&mut self, colors: &[Color]) -> Result<()> {
        check_led_count(self.colors.len(), colors)?;
        let packet = encode_strip_packet(colors);
        trace!(strip = %self.name, len = packet.len(), "strip TX");
        self.port.send(&packet)?;
        self.colors.copy_from_slice(colors);
        Ok(())
    }
}
