//! SDK wire protocol between the hub server and remote clients.
//!
//! Every packet is a 16-byte little-endian header followed by a payload:
//!
//! ```text
//! "ORGB" | device_index: u32 | packet_id: u32 | payload_len: u32 | payload
//! ```
//!
//! Requests that fail while framing is intact get an [`packet_id::ERROR`]
//! reply carrying an [`ErrorCode`] and the id of the failed request. A bad
//! magic or an oversized length means framing is lost; the connection is
//! dropped instead.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::color::Color;
use crate::controller::{ControllerInfo, DeviceType, Zone, ZoneType};
use crate::error::{Error, Result};

/// Default TCP port of the SDK server.
pub const DEFAULT_PORT: u16 = 6742;

pub const MAGIC: [u8; 4] = *b"ORGB";
pub const HEADER_LEN: usize = 16;
/// Largest payload a peer may declare.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;
/// Largest zone, LED, color or string-byte count a 16-bit field can carry.
pub const MAX_WIRE_COUNT: usize = u16::MAX as usize;

/// Packet ids.
pub mod packet_id {
    pub const REQUEST_CONTROLLER_COUNT: u32 = 0;
    pub const REQUEST_CONTROLLER_DATA: u32 = 1;
    pub const SET_CLIENT_NAME: u32 = 50;
    pub const UPDATE_LEDS: u32 = 1050;
    pub const UPDATE_ZONE_LEDS: u32 = 1051;
    pub const UPDATE_SINGLE_LED: u32 = 1052;
    /// Reply only.
    pub const ERROR: u32 = 9000;
}

/// Error codes carried by an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ControllerIndex = 1,
    Malformed = 2,
    Layout = 3,
    Device = 4,
    UnknownPacket = 5,
}

impl ErrorCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::ControllerIndex),
            2 => Some(Self::Malformed),
            3 => Some(Self::Layout),
            4 => Some(Self::Device),
            5 => Some(Self::UnknownPacket),
            _ => None,
        }
    }

    /// Map a failed request to the code reported to the client.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::ControllerIndex { .. } => Self::ControllerIndex,
            Error::Protocol(_) => Self::Malformed,
            Error::UnknownPacket(_) => Self::UnknownPacket,
            Error::LedCountMismatch { .. }
            | Error::LayoutIndex { .. }
            | Error::TooMany { .. } => Self::Layout,
            _ => Self::Device,
        }
    }
}

/// A raw packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub device_index: u32,
    pub packet_id: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(device_index: u32, packet_id: u32, payload: Vec<u8>) -> Self {
        Self {
            device_index,
            packet_id,
            payload,
        }
    }

    fn encode_header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[4..8].copy_from_slice(&self.device_index.to_le_bytes());
        header[8..12].copy_from_slice(&self.packet_id.to_le_bytes());
        header[12..16].copy_from_slice(&(self.payload.len() as u32).to_le_bytes());
        header
    }
}

/// Outgoing payloads obey the same cap incoming ones are checked against.
fn check_payload_len(len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_LEN {
        return Err(Error::TooMany {
            what: "payload bytes",
            count: len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(())
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one packet. `Ok(None)` means the peer closed cleanly between packets.
pub fn read_packet(reader: &mut impl Read) -> Result<Option<Packet>> {
    let mut header = [0u8; HEADER_LEN];
    match read_full(reader, &mut header)? {
        0 => return Ok(None),
        HEADER_LEN => {}
        n => return Err(Error::Protocol(format!("connection closed mid-header ({n} bytes)"))),
    }

    if header[..4] != MAGIC {
        return Err(Error::Protocol(format!("bad magic {:02X?}", &header[..4])));
    }
    let mut fields = &header[4..];
    let device_index = fields.get_u32_le();
    let packet_id = fields.get_u32_le();
    let payload_len = fields.get_u32_le() as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::Protocol(format!(
            "declared payload of {payload_len} bytes exceeds {MAX_PAYLOAD_LEN}"
        )));
    }

    let mut payload = vec![0u8; payload_len];
    let n = read_full(reader, &mut payload)?;
    if n != payload_len {
        return Err(Error::Protocol(format!(
            "connection closed mid-payload ({n} of {payload_len} bytes)"
        )));
    }

    Ok(Some(Packet {
        device_index,
        packet_id,
        payload,
    }))
}

/// Write one packet as a single buffer.
pub fn write_packet(writer: &mut impl Write, packet: &Packet) -> Result<()> {
    check_payload_len(packet.payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_LEN + packet.payload.len());
    buf.extend_from_slice(&packet.encode_header());
    buf.extend_from_slice(&packet.payload);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

fn ensure(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::Protocol(format!(
            "truncated {what}: need {needed} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

/// Checked conversion of a count into its 16-bit wire field.
fn wire_count(count: usize, what: &'static str) -> Result<u16> {
    u16::try_from(count).map_err(|_| Error::TooMany {
        what,
        count,
        max: MAX_WIRE_COUNT,
    })
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    buf.put_u16_le(wire_count(s.len() + 1, "string bytes")?);
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    ensure(buf, 2, "string length")?;
    let len = buf.get_u16_le() as usize;
    ensure(buf, len, "string")?;
    let raw = &buf[..len];
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    let s = String::from_utf8_lossy(raw).into_owned();
    buf.advance(len);
    Ok(s)
}

fn put_color(buf: &mut BytesMut, c: &Color) {
    buf.put_slice(&[c.r, c.g, c.b, 0]);
}

fn get_color(buf: &mut &[u8]) -> Result<Color> {
    ensure(buf, 4, "color")?;
    let color = Color::new(buf[0], buf[1], buf[2]);
    buf.advance(4);
    Ok(color)
}

fn put_colors(buf: &mut BytesMut, colors: &[Color]) -> Result<()> {
    buf.put_u16_le(wire_count(colors.len(), "colors")?);
    for c in colors {
        put_color(buf, c);
    }
    Ok(())
}

fn get_colors(buf: &mut &[u8]) -> Result<Vec<Color>> {
    ensure(buf, 2, "color count")?;
    let n = buf.get_u16_le() as usize;
    ensure(buf, n * 4, "colors")?;
    (0..n).map(|_| get_color(buf)).collect()
}

/// Prefix a body with its total size (including the 4-byte prefix).
fn sized(body: BytesMut) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(body.len() + 4);
    out.put_u32_le((body.len() + 4) as u32);
    out.put_slice(&body);
    out.to_vec()
}

/// Strip and check the size prefix of a sized block.
fn unsized_block<'a>(buf: &mut &'a [u8], what: &str) -> Result<&'a [u8]> {
    ensure(buf, 4, what)?;
    let total = buf.get_u32_le() as usize;
    let rest: &'a [u8] = *buf;
    if total < 4 || total - 4 > rest.len() {
        return Err(Error::Protocol(format!("{what} size {total} does not match payload")));
    }
    let (body, tail) = rest.split_at(total - 4);
    *buf = tail;
    Ok(body)
}

/// Serialize controller metadata and colors.
///
/// Fails with [`Error::TooMany`] when a zone, LED, color or string count
/// does not fit its 16-bit field.
pub fn encode_controller_data(info: &ControllerInfo) -> Result<Vec<u8>> {
    let mut body = BytesMut::new();
    body.put_i32_le(info.device_type.as_raw());
    for s in [
        &info.name,
        &info.description,
        &info.version,
        &info.serial,
        &info.location,
    ] {
        put_string(&mut body, s)?;
    }

    body.put_u16_le(wire_count(info.zones.len(), "zones")?);
    for zone in &info.zones {
        put_string(&mut body, &zone.name)?;
        body.put_u32_le(zone.zone_type.as_raw());
        body.put_u32_le(u32::from(wire_count(zone.leds, "zone LEDs")?));
    }

    body.put_u16_le(wire_count(info.leds.len(), "LED names")?);
    for led in &info.leds {
        put_string(&mut body, led)?;
    }

    put_colors(&mut body, &info.colors)?;
    Ok(sized(body))
}

pub fn decode_controller_data(payload: &[u8]) -> Result<ControllerInfo> {
    let mut outer = payload;
    let mut buf = unsized_block(&mut outer, "controller data")?;

    ensure(&buf, 4, "device type")?;
    let device_type = DeviceType::from_raw(buf.get_i32_le());
    let name = get_string(&mut buf)?;
    let description = get_string(&mut buf)?;
    let version = get_string(&mut buf)?;
    let serial = get_string(&mut buf)?;
    let location = get_string(&mut buf)?;

    ensure(&buf, 2, "zone count")?;
    let zone_count = buf.get_u16_le();
    let mut zones = Vec::with_capacity(zone_count as usize);
    for _ in 0..zone_count {
        let name = get_string(&mut buf)?;
        ensure(&buf, 8, "zone")?;
        let zone_type = ZoneType::from_raw(buf.get_u32_le());
        let leds = buf.get_u32_le() as usize;
        zones.push(Zone {
            name,
            zone_type,
            leds,
        });
    }

    ensure(&buf, 2, "led count")?;
    let led_count = buf.get_u16_le();
    let leds = (0..led_count)
        .map(|_| get_string(&mut buf))
        .collect::<Result<Vec<_>>>()?;

    let colors = get_colors(&mut buf)?;

    Ok(ControllerInfo {
        device_type,
        name,
        description,
        version,
        serial,
        location,
        zones,
        leds,
        colors,
    })
}

/// Client → server requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ControllerCount,
    ControllerData { index: u32 },
    SetClientName { name: String },
    UpdateLeds { index: u32, colors: Vec<Color> },
    UpdateZoneLeds { index: u32, zone: u32, colors: Vec<Color> },
    UpdateSingleLed { index: u32, led: i32, color: Color },
}

impl Request {
    pub fn packet_id(&self) -> u32 {
        match self {
            Self::ControllerCount => packet_id::REQUEST_CONTROLLER_COUNT,
            Self::ControllerData { .. } => packet_id::REQUEST_CONTROLLER_DATA,
            Self::SetClientName { .. } => packet_id::SET_CLIENT_NAME,
            Self::UpdateLeds { .. } => packet_id::UPDATE_LEDS,
            Self::UpdateZoneLeds { .. } => packet_id::UPDATE_ZONE_LEDS,
            Self::UpdateSingleLed { .. } => packet_id::UPDATE_SINGLE_LED,
        }
    }

    /// Fails with [`Error::TooMany`] when a color array does not fit the
    /// 16-bit count field.
    pub fn encode(&self) -> Result<Packet> {
        let mut body = BytesMut::new();
        let (index, payload) = match self {
            Self::ControllerCount => (0, Vec::new()),
            Self::ControllerData { index } => (*index, Vec::new()),
            Self::SetClientName { name } => {
                let mut payload = name.as_bytes().to_vec();
                payload.push(0);
                (0, payload)
            }
            Self::UpdateLeds { index, colors } => {
                put_colors(&mut body, colors)?;
                (*index, sized(body))
            }
            Self::UpdateZoneLeds {
                index,
                zone,
                colors,
            } => {
                body.put_u32_le(*zone);
                put_colors(&mut body, colors)?;
                (*index, sized(body))
            }
            Self::UpdateSingleLed { index, led, color } => {
                body.put_i32_le(*led);
                put_color(&mut body, color);
                (*index, body.to_vec())
            }
        };
        check_payload_len(payload.len())?;
        Ok(Packet::new(index, self.packet_id(), payload))
    }

    pub fn decode(packet: &Packet) -> Result<Self> {
        let index = packet.device_index;
        let mut buf = packet.payload.as_slice();

        match packet.packet_id {
            packet_id::REQUEST_CONTROLLER_COUNT => Ok(Self::ControllerCount),
            packet_id::REQUEST_CONTROLLER_DATA => Ok(Self::ControllerData { index }),
            packet_id::SET_CLIENT_NAME => {
                let raw = buf.split(|&b| b == 0).next().unwrap_or_default();
                Ok(Self::SetClientName {
                    name: String::from_utf8_lossy(raw).into_owned(),
                })
            }
            packet_id::UPDATE_LEDS => {
                let mut body = unsized_block(&mut buf, "LED update")?;
                let colors = get_colors(&mut body)?;
                Ok(Self::UpdateLeds { index, colors })
            }
            packet_id::UPDATE_ZONE_LEDS => {
                let mut body = unsized_block(&mut buf, "zone update")?;
                ensure(&body, 4, "zone index")?;
                let zone = body.get_u32_le();
                let colors = get_colors(&mut body)?;
                Ok(Self::UpdateZoneLeds {
                    index,
                    zone,
                    colors,
                })
            }
            packet_id::UPDATE_SINGLE_LED => {
                ensure(&buf, 4, "LED index")?;
                let led = buf.get_i32_le();
                let color = get_color(&mut buf)?;
                Ok(Self::UpdateSingleLed { index, led, color })
            }
            other => Err(Error::UnknownPacket(other)),
        }
    }
}

/// Server → client replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ControllerCount(u32),
    ControllerData { index: u32, info: ControllerInfo },
    Error {
        index: u32,
        code: ErrorCode,
        request_id: u32,
    },
}

impl Reply {
    pub fn encode(&self) -> Result<Packet> {
        let packet = match self {
            Self::ControllerCount(count) => Packet::new(
                0,
                packet_id::REQUEST_CONTROLLER_COUNT,
                count.to_le_bytes().to_vec(),
            ),
            Self::ControllerData { index, info } => Packet::new(
                *index,
                packet_id::REQUEST_CONTROLLER_DATA,
                encode_controller_data(info)?,
            ),
            Self::Error {
                index,
                code,
                request_id,
            } => {
                let mut body = BytesMut::with_capacity(8);
                body.put_u32_le(*code as u32);
                body.put_u32_le(*request_id);
                Packet::new(*index, packet_id::ERROR, body.to_vec())
            }
        };
        check_payload_len(packet.payload.len())?;
        Ok(packet)
    }

    pub fn decode(packet: &Packet) -> Result<Self> {
        let mut buf = packet.payload.as_slice();
        match packet.packet_id {
            packet_id::REQUEST_CONTROLLER_COUNT => {
                ensure(&buf, 4, "controller count")?;
                Ok(Self::ControllerCount(buf.get_u32_le()))
            }
            packet_id::REQUEST_CONTROLLER_DATA => Ok(Self::ControllerData {
                index: packet.device_index,
                info: decode_controller_data(buf)?,
            }),
            packet_id::ERROR => {
                ensure(&buf, 8, "error reply")?;
                let raw = buf.get_u32_le();
                let request_id = buf.get_u32_le();
                let code = ErrorCode::from_raw(raw)
                    .ok_or_else(|| Error::Protocol(format!("unknown error code {raw}")))?;
                Ok(Self::Error {
                    index: packet.device_index,
                    code,
                    request_id,
                })
            }
            other => Err(Error::UnknownPacket(other)),
        }
    }
}
