//! Corsair RGB peripheral protocol: keyboards, mice, mousemats and the
//! ST100 headset stand.
//!
//! All traffic is 64-byte frames built by [`crate::codec`]. Per-key color
//! data is larger than one frame, so it is streamed in numbered chunks and
//! then committed with a submit command:
//!
//! ```text
//! STREAM 1 (60 B) -> STREAM 2 (60 B) -> STREAM 3 (24 B) -> SUBMIT(channel, 3, finish)
//! ```
//!
//! The submit's finish byte is 1 while more channels follow and 2 on the
//! last one. Mice take one frame of `(zone, r, g, b)` quadruplets;
//! mousemats and the headset stand take `(r, g, b)` triplets over feature
//! reports, since plain writes do not fully apply on the ST100.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{build_frame, split_into_chunks, Frame, FRAME_LEN, PAYLOAD_CAPACITY};
use crate::color::Color;
use crate::controller::{check_led_count, Controller, DeviceType, Zone, ZoneType};
use crate::error::{Error, Result};
use crate::pids;
use crate::transport::{send_feature, send_frame, HidTransport};

/// Command byte (frame offset 0).
pub mod command {
    pub const WRITE: u8 = 0x07;
    pub const READ: u8 = 0x0E;
    pub const STREAM: u8 = 0x7F;
}

/// Property byte (frame offset 1) for READ/WRITE commands.
pub mod property {
    pub const FIRMWARE_INFO: u8 = 0x01;
    pub const SPECIAL_FUNCTION: u8 = 0x04;
    pub const LIGHTING_CONTROL: u8 = 0x05;
    pub const SUBMIT_MOUSE_COLOR: u8 = 0x22;
    pub const SUBMIT_KEYBOARD_COLOR_9: u8 = 0x27;
    pub const SUBMIT_KEYBOARD_COLOR_24: u8 = 0x28;
}

/// Lighting control owner: software (host) rather than onboard hardware.
const LIGHTING_CONTROL_SOFTWARE: u8 = 0x02;

/// Timeout for the plain-read attempt of the firmware query.
pub const FIRMWARE_QUERY_TIMEOUT_MS: i32 = 1000;

// Firmware info reply offsets.
const REPLY_FW_MINOR: usize = 0x08;
const REPLY_FW_MAJOR: usize = 0x09;
const REPLY_PID_LO: usize = 0x0E;
const REPLY_PID_HI: usize = 0x0F;
const REPLY_DEVICE_CLASS: usize = 0x14;

const CLASS_KEYBOARD: u8 = 0xC0;
const CLASS_MOUSE: u8 = 0xC1;
const CLASS_MOUSEMAT_OR_STAND: u8 = 0xC2;

/// Per-channel key buffer length.
const CHANNEL_LEN: usize = 144;
const FULL_COLOR_CHUNKS: [usize; 3] = [60, 60, 24];

/// Packed 4-bit channel length (two LEDs per byte).
const LIMITED_CHANNEL_LEN: usize = CHANNEL_LEN / 2;
const LIMITED_LEN: usize = LIMITED_CHANNEL_LEN * 3;
const LIMITED_CHUNKS: [usize; 4] = [60, 60, 60, 36];
const LIMITED_MAX: u8 = 7;

/// Physical key position for each logical keyboard LED.
pub const KEY_MAP: [u8; 111] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0C, 0x0D, 0x0E, 0x0F, 0x11, 0x12,
    0x14, 0x15, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21, 0x24, 0x25, 0x26, 0x27,
    0x28, 0x2A, 0x2B, 0x2C, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3C, 0x3D,
    0x3E, 0x3F, 0x40, 0x42, 0x43, 0x44, 0x45, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4E, 0x4F, 0x50, 0x51,
    0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x5B, 0x5C, 0x5D, 0x60, 0x61, 0x62, 0x63, 0x64, 0x65,
    0x66, 0x67, 0x68, 0x69, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x73, 0x74, 0x75, 0x78, 0x79, 0x7A,
    0x7B, 0x7C, 0x7E, 0x7F, 0x80, 0x81, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8B, 0x8C, 0x8D,
];

/// ST100 wire position for each logical LED. The logo sits mid-strip on the
/// device but is last in the logical order.
pub const HEADSET_STAND_REMAP: [usize; 9] = [0, 1, 2, 3, 5, 6, 7, 8, 4];

const MOUSE_ZONES: [&str; 4] = ["Logo", "Scroll Wheel", "Front", "DPI Indicator"];
const MOUSEMAT_LEDS: usize = 15;
const HEADSET_STAND_LEDS: usize = 9;

/// Keyboard color encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// 8 bits per channel, one streamed buffer per channel.
    #[default]
    Full,
    /// 3 bits per channel, inverted, packed two LEDs per byte.
    Limited,
}

/// What the firmware info query reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_type: DeviceType,
    pub product_id: u16,
    /// `major.minor`; `None` when the category is unknown.
    pub firmware: Option<String>,
}

impl DeviceIdentity {
    pub fn unknown() -> Self {
        Self {
            device_type: DeviceType::Unknown,
            product_id: 0,
            firmware: None,
        }
    }

    /// Decode a firmware info reply.
    pub fn parse(reply: &[u8; FRAME_LEN]) -> Self {
        let product_id = u16::from_le_bytes([reply[REPLY_PID_LO], reply[REPLY_PID_HI]]);

        let device_type = match reply[REPLY_DEVICE_CLASS] {
            CLASS_KEYBOARD => DeviceType::Keyboard,
            CLASS_MOUSE => DeviceType::Mouse,
            CLASS_MOUSEMAT_OR_STAND if product_id == pids::ST100 => DeviceType::HeadsetStand,
            CLASS_MOUSEMAT_OR_STAND => DeviceType::Mousemat,
            _ => DeviceType::Unknown,
        };

        let firmware = (device_type != DeviceType::Unknown)
            .then(|| format!("{}.{}", reply[REPLY_FW_MAJOR], reply[REPLY_FW_MINOR]));

        Self {
            device_type,
            product_id,
            firmware,
        }
    }
}

/// Lighting-control enable value for a category. Unknown devices get the
/// keyboard value, the firmware default.
fn lighting_control_value(device_type: DeviceType) -> u8 {
    match device_type {
        DeviceType::Mouse => 0x01,
        DeviceType::Mousemat => 0x04,
        _ => 0x03,
    }
}

/// Send the firmware info query and decode the reply.
///
/// Tries a plain read first; if nothing arrives within
/// [`FIRMWARE_QUERY_TIMEOUT_MS`], re-sends the query once and reads the
/// reply as a feature report instead.
pub fn query_identity(transport: &dyn HidTransport) -> Result<DeviceIdentity> {
    let query = build_frame(command::READ, &[property::FIRMWARE_INFO], &[])?;
    send_frame(transport, &query)?;

    let mut reply = [0u8; FRAME_LEN];
    let n = transport.read_timeout(&mut reply, FIRMWARE_QUERY_TIMEOUT_MS)?;

    if n == 0 {
        debug!("no firmware reply on plain read, retrying via feature report");
        send_frame(transport, &query)?;
        reply = query;
        transport.get_feature_report(&mut reply)?;
    }

    let identity = DeviceIdentity::parse(&reply);
    debug!(
        device_type = %identity.device_type,
        pid = format_args!("0x{:04X}", identity.product_id),
        firmware = ?identity.firmware,
        "firmware info"
    );
    Ok(identity)
}

/// Scatter colors into per-channel key buffers.
fn scatter_channels(colors: &[Color], map: impl Fn(u8) -> u8) -> [[u8; CHANNEL_LEN]; 3] {
    let mut channels = [[0u8; CHANNEL_LEN]; 3];
    for (color, &pos) in colors.iter().zip(KEY_MAP.iter()) {
        let pos = pos as usize;
        channels[0][pos] = map(color.r);
        channels[1][pos] = map(color.g);
        channels[2][pos] = map(color.b);
    }
    channels
}

/// Encode keyboard colors for the limited (9-bit) path.
///
/// Each channel is clamped to 7 and inverted; buffers are packed low nibble
/// first and concatenated red, green, blue.
pub fn pack_limited(colors: &[Color]) -> [u8; LIMITED_LEN] {
    let channels = scatter_channels(colors, |v| LIMITED_MAX - v.min(LIMITED_MAX));

    let mut packed = [0u8; LIMITED_LEN];
    for (c, channel) in channels.iter().enumerate() {
        for i in 0..LIMITED_CHANNEL_LEN {
            packed[c * LIMITED_CHANNEL_LEN + i] = (channel[i * 2 + 1] << 4) | channel[i * 2];
        }
    }
    packed
}

/// Driver and [`Controller`] for one Corsair peripheral.
pub struct CorsairPeripheral {
    transport: Box<dyn HidTransport>,
    identity: DeviceIdentity,
    color_mode: ColorMode,
    name: String,
    location: String,
    zones: Vec<Zone>,
    led_names: Vec<String>,
    colors: Vec<Color>,
}

impl CorsairPeripheral {
    /// Identify the device and take over its lighting.
    ///
    /// The identity must be known before lighting control is enabled, since
    /// the enable value depends on the category. A failed or unrecognized
    /// query leaves the device [`DeviceType::Unknown`]; callers should check
    /// [`Self::device_type`] before registering it.
    pub fn initialize(
        transport: Box<dyn HidTransport>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let identity = match query_identity(transport.as_ref()) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(device = %name, error = %e, "firmware query failed");
                DeviceIdentity::unknown()
            }
        };

        let special = build_frame(
            command::WRITE,
            &[property::SPECIAL_FUNCTION, LIGHTING_CONTROL_SOFTWARE],
            &[],
        )?;
        send_feature(transport.as_ref(), &special)?;

        let lighting = build_frame(
            command::WRITE,
            &[property::LIGHTING_CONTROL, LIGHTING_CONTROL_SOFTWARE],
            &[lighting_control_value(identity.device_type)],
        )?;
        send_feature(transport.as_ref(), &lighting)?;

        let (zones, led_names) = layout(identity.device_type);
        let led_count = led_names.len();

        info!(
            device = %name,
            device_type = %identity.device_type,
            firmware = identity.firmware.as_deref().unwrap_or("-"),
            "Corsair peripheral initialized"
        );

        Ok(Self {
            transport,
            identity,
            color_mode: ColorMode::default(),
            name,
            location: location.into(),
            zones,
            led_names,
            colors: vec![Color::BLACK; led_count],
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// Select the keyboard encoding. Other categories ignore it.
    pub fn set_color_mode(&mut self, mode: ColorMode) {
        self.color_mode = mode;
    }

    fn stream(&self, buffer: &[u8], chunk_sizes: &[usize]) -> Result<()> {
        for (i, (offset, len)) in split_into_chunks(buffer, chunk_sizes)?
            .into_iter()
            .enumerate()
        {
            let frame = build_frame(
                command::STREAM,
                &[i as u8 + 1, len as u8],
                &buffer[offset..offset + len],
            )?;
            send_frame(self.transport.as_ref(), &frame)?;
        }
        Ok(())
    }

    fn set_leds_keyboard_full(&self, colors: &[Color]) -> Result<()> {
        let channels = scatter_channels(colors, |v| v);
        let packet_count = FULL_COLOR_CHUNKS.len() as u8;

        for (i, channel) in channels.iter().enumerate() {
            self.stream(channel, &FULL_COLOR_CHUNKS)?;

            let finish = if i == channels.len() - 1 { 2 } else { 1 };
            let submit = build_frame(
                command::WRITE,
                &[property::SUBMIT_KEYBOARD_COLOR_24, i as u8 + 1, packet_count],
                &[finish],
            )?;
            send_frame(self.transport.as_ref(), &submit)?;
        }
        Ok(())
    }

    fn set_leds_keyboard_limited(&self, colors: &[Color]) -> Result<()> {
        let packed = pack_limited(colors);
        self.stream(&packed, &LIMITED_CHUNKS)?;

        let submit = build_frame(
            command::WRITE,
            &[property::SUBMIT_KEYBOARD_COLOR_9],
            &[LIMITED_LEN as u8],
        )?;
        send_frame(self.transport.as_ref(), &submit)
    }

    fn set_leds_mouse(&self, colors: &[Color]) -> Result<()> {
        let payload: Vec<u8> = colors
            .iter()
            .enumerate()
            .flat_map(|(zone, c)| [zone as u8, c.r, c.g, c.b])
            .collect();
        let frame = zone_frame(colors.len(), &payload)?;
        send_frame(self.transport.as_ref(), &frame)
    }

    fn set_leds_mousemat(&self, colors: &[Color]) -> Result<()> {
        let payload: Vec<u8> = colors.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
        let frame = zone_frame(colors.len(), &payload)?;
        send_feature(self.transport.as_ref(), &frame)
    }

    fn set_leds_headset_stand(&self, colors: &[Color]) -> Result<()> {
        self.set_leds_mousemat(&remap_headset_stand(colors))
    }
}

/// Reorder logical headset stand colors into wire order.
pub fn remap_headset_stand(colors: &[Color]) -> Vec<Color> {
    let mut remapped = vec![Color::BLACK; colors.len()];
    for (color, &pos) in colors.iter().zip(HEADSET_STAND_REMAP.iter()) {
        remapped[pos] = *color;
    }
    remapped
}

fn zone_frame(zone_count: usize, payload: &[u8]) -> Result<Frame> {
    if payload.len() > PAYLOAD_CAPACITY {
        return Err(Error::FrameOverflow {
            len: payload.len(),
            capacity: PAYLOAD_CAPACITY,
        });
    }
    build_frame(
        command::WRITE,
        &[property::SUBMIT_MOUSE_COLOR, zone_count as u8, 0x00],
        payload,
    )
}

/// Zones and LED names for a category.
fn layout(device_type: DeviceType) -> (Vec<Zone>, Vec<String>) {
    let numbered = |prefix: &str, n: usize| -> Vec<String> {
        (1..=n).map(|i| format!("{prefix} {i}")).collect()
    };

    match device_type {
        DeviceType::Keyboard => (
            vec![Zone::new("Keyboard", ZoneType::Matrix, KEY_MAP.len())],
            numbered("Key", KEY_MAP.len()),
        ),
        DeviceType::Mouse => (
            MOUSE_ZONES
                .iter()
                .map(|&name| Zone::new(name, ZoneType::Single, 1))
                .collect(),
            MOUSE_ZONES.iter().map(|s| s.to_string()).collect(),
        ),
        DeviceType::Mousemat => (
            vec![Zone::new("Mousemat", ZoneType::Linear, MOUSEMAT_LEDS)],
            numbered("LED", MOUSEMAT_LEDS),
        ),
        DeviceType::HeadsetStand => {
            let mut names = numbered("LED", HEADSET_STAND_LEDS - 1);
            names.push("Logo".to_string());
            (
                vec![Zone::new("Headset Stand", ZoneType::Linear, HEADSET_STAND_LEDS)],
                names,
            )
        }
        DeviceType::LedStrip | DeviceType::Unknown => (Vec::new(), Vec::new()),
    }
}

impl Controller for CorsairPeripheral {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        self.identity.device_type
    }

    fn description(&self) -> &str {
        "Corsair RGB Peripheral"
    }

    fn version(&self) -> &str {
        self.identity.firmware.as_deref().unwrap_or("")
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
        if self.identity.device_type == DeviceType::Unknown {
            return Err(Error::UnsupportedDevice(self.name.clone()));
        }
        check_led_count(self.led_count(), colors)?;

        match (self.identity.device_type, self.color_mode) {
            (DeviceType::Keyboard, ColorMode::Full) => self.set_leds_keyboard_full(colors)?,
            (DeviceType::Keyboard, ColorMode::Limited) => {
                self.set_leds_keyboard_limited(colors)?
            }
            (DeviceType::Mouse, _) => self.set_leds_mouse(colors)?,
            (DeviceType::Mousemat, _) => self.set_leds_mousemat(colors)?,
            (DeviceType::HeadsetStand, _) => self.set_leds_headset_stand(colors)?,
            (DeviceType::LedStrip | DeviceType::Unknown, _) => {
                return Err(Error::UnsupportedDevice(self.name.clone()))
            }
        }

        self.colors.copy_from_slice(colors);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, Sent};

    /// Build a firmware info reply.
    pub(crate) fn firmware_reply(class: u8, pid: u16, major: u8, minor: u8) -> Vec<u8> {
        let mut reply = vec![0u8; FRAME_LEN];
        reply[0] = command::READ;
        reply[1] = property::FIRMWARE_INFO;
        reply[REPLY_FW_MINOR] = minor;
        reply[REPLY_FW_MAJOR] = major;
        reply[REPLY_PID_LO..=REPLY_PID_HI].copy_from_slice(&pid.to_le_bytes());
        reply[REPLY_DEVICE_CLASS] = class;
        reply
    }

    fn parse(reply: Vec<u8>) -> DeviceIdentity {
        let mut buf = [0u8; FRAME_LEN];
        buf.copy_from_slice(&reply);
        DeviceIdentity::parse(&buf)
    }

    /// Initialize a driver against a mock that answers the plain read.
    pub(crate) fn init_device(class: u8, pid: u16) -> (CorsairPeripheral, MockTransport) {
        let mock = MockTransport::new();
        mock.queue_read(firmware_reply(class, pid, 2, 5));
        let dev = CorsairPeripheral::initialize(Box::new(mock.clone()), "test", "mock").unwrap();
        mock.clear_sent();
        (dev, mock)
    }

    fn frames(mock: &MockTransport) -> Vec<Vec<u8>> {
        mock.sent().iter().map(|s| s.frame().to_vec()).collect()
    }

    fn rainbow(n: usize) -> Vec<Color> {
        (0..n)
            .map(|i| Color::new(i as u8, (i * 2) as u8, 255 - i as u8))
            .collect()
    }

    #[test]
    fn parse_device_classes() {
        assert_eq!(parse(firmware_reply(0xC0, 0x1B13, 1, 0)).device_type, DeviceType::Keyboard);
        assert_eq!(parse(firmware_reply(0xC1, 0x1B2E, 1, 0)).device_type, DeviceType::Mouse);
        assert_eq!(parse(firmware_reply(0xC2, 0x1B3B, 1, 0)).device_type, DeviceType::Mousemat);
        assert_eq!(
            parse(firmware_reply(0xC2, pids::ST100, 1, 0)).device_type,
            DeviceType::HeadsetStand
        );
    }

    #[test]
    fn parse_firmware_version_major_minor() {
        let identity = parse(firmware_reply(0xC0, 0x1B13, 3, 12));
        assert_eq!(identity.firmware.as_deref(), Some("3.12"));
        assert_eq!(identity.product_id, 0x1B13);
    }

    #[test]
    fn parse_unknown_class_has_no_firmware() {
        let identity = parse(firmware_reply(0x42, 0x1B13, 3, 12));
        assert_eq!(identity.device_type, DeviceType::Unknown);
        assert_eq!(identity.firmware, None);
    }

    #[test]
    fn query_uses_plain_read_when_answered() {
        let mock = MockTransport::new();
        mock.queue_read(firmware_reply(0xC1, 0x1B2E, 1, 0));
        let identity = query_identity(&mock).unwrap();
        assert_eq!(identity.device_type, DeviceType::Mouse);
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn query_falls_back_to_feature_report() {
        let mock = MockTransport::new();
        mock.queue_feature_read(firmware_reply(0xC2, pids::ST100, 1, 0));
        let identity = query_identity(&mock).unwrap();
        assert_eq!(identity.device_type, DeviceType::HeadsetStand);

        // Query written twice, both as plain writes.
        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|s| matches!(s, Sent::Write(_))));
        assert_eq!(sent[0], sent[1]);
        assert_eq!(&sent[0].frame()[..2], &[command::READ, property::FIRMWARE_INFO]);
    }

    #[test]
    fn initialize_sends_enables_after_identity() {
        for (class, pid, value) in [
            (0xC0, 0x1B13, 0x03),
            (0xC1, 0x1B2E, 0x01),
            (0xC2, 0x1B3B, 0x04),
            (0xC2, pids::ST100, 0x03),
        ] {
            let mock = MockTransport::new();
            mock.queue_read(firmware_reply(class, pid, 1, 0));
            CorsairPeripheral::initialize(Box::new(mock.clone()), "dev", "mock").unwrap();

            let sent = mock.sent();
            assert_eq!(sent.len(), 3);
            assert!(matches!(sent[0], Sent::Write(_)));
            assert!(matches!(sent[1], Sent::Feature(_)));
            assert!(matches!(sent[2], Sent::Feature(_)));
            assert_eq!(
                &sent[1].frame()[..3],
                &[command::WRITE, property::SPECIAL_FUNCTION, LIGHTING_CONTROL_SOFTWARE]
            );
            let lighting = sent[2].frame();
            assert_eq!(
                &lighting[..3],
                &[command::WRITE, property::LIGHTING_CONTROL, LIGHTING_CONTROL_SOFTWARE]
            );
            assert_eq!(lighting[4], value);
        }
    }

    #[test]
    fn failed_query_leaves_device_unknown() {
        // No read reply and no feature reply queued.
        let mock = MockTransport::new();
        let mut dev = CorsairPeripheral::initialize(Box::new(mock.clone()), "dev", "mock").unwrap();
        assert_eq!(dev.device_type(), DeviceType::Unknown);
        assert_eq!(dev.led_count(), 0);
        assert!(matches!(dev.set_leds(&[]), Err(Error::UnsupportedDevice(_))));
    }

    #[test]
    fn keyboard_full_frame_sequence() {
        let (mut dev, mock) = init_device(0xC0, 0x1B13);
        dev.set_leds(&rainbow(KEY_MAP.len())).unwrap();

        let frames = frames(&mock);
        assert_eq!(frames.len(), 12);
        assert!(mock.sent().iter().all(|s| matches!(s, Sent::Write(_))));

        for channel in 0..3 {
            let group = &frames[channel * 4..channel * 4 + 4];
            for (i, len) in FULL_COLOR_CHUNKS.iter().enumerate() {
                assert_eq!(group[i][0], command::STREAM);
                assert_eq!(group[i][1], i as u8 + 1);
                assert_eq!(group[i][2] as usize, *len);
            }
            assert_eq!(group[3][1], property::SUBMIT_KEYBOARD_COLOR_24);
            assert_eq!(group[3][2], channel as u8 + 1);
            assert_eq!(group[3][3], 3);
        }

        let finish: Vec<u8> = frames
            .iter()
            .filter(|f| f[1] == property::SUBMIT_KEYBOARD_COLOR_24)
            .map(|f| f[4])
            .collect();
        assert_eq!(finish, vec![1, 1, 2]);
    }

    #[test]
    fn keyboard_full_finish_markers_ignore_colors() {
        let (mut dev, mock) = init_device(0xC0, 0x1B13);
        for fill in [Color::BLACK, Color::WHITE, Color::new(1, 2, 3)] {
            mock.clear_sent();
            dev.set_leds(&vec![fill; KEY_MAP.len()]).unwrap();
            let finish: Vec<u8> = frames(&mock)
                .iter()
                .filter(|f| f[0] == command::WRITE)
                .map(|f| f[4])
                .collect();
            assert_eq!(finish, vec![1, 1, 2]);
        }
    }

    #[test]
    fn keyboard_full_scatters_to_key_positions() {
        let (mut dev, mock) = init_device(0xC0, 0x1B13);
        let mut colors = vec![Color::BLACK; KEY_MAP.len()];
        colors[0] = Color::new(0x11, 0x22, 0x33);
        colors[110] = Color::new(0xAA, 0xBB, 0xCC);
        dev.set_leds(&colors).unwrap();

        let frames = frames(&mock);
        let channel = |c: usize| -> Vec<u8> {
            frames[c * 4..c * 4 + 3]
                .iter()
                .flat_map(|f| f[4..4 + f[2] as usize].to_vec())
                .collect()
        };
        let red = channel(0);
        let blue = channel(2);
        assert_eq!(red.len(), CHANNEL_LEN);
        assert_eq!(red[0x00], 0x11);
        assert_eq!(red[0x8D], 0xAA);
        assert_eq!(blue[0x8D], 0xCC);
        // Gap in the key map stays dark.
        assert_eq!(red[0x0A], 0);
        assert_eq!(red.iter().filter(|&&b| b != 0).count(), 2);
        assert_eq!(dev.colors(), &colors[..]);
    }

    #[test]
    fn keyboard_limited_frame_sequence() {
        let (mut dev, mock) = init_device(0xC0, 0x1B13);
        dev.set_color_mode(ColorMode::Limited);
        dev.set_leds(&rainbow(KEY_MAP.len())).unwrap();

        let frames = frames(&mock);
        assert_eq!(frames.len(), 5);
        for (i, len) in LIMITED_CHUNKS.iter().enumerate() {
            assert_eq!(frames[i][0], command::STREAM);
            assert_eq!(frames[i][1], i as u8 + 1);
            assert_eq!(frames[i][2] as usize, *len);
        }
        assert_eq!(&frames[4][..2], &[command::WRITE, property::SUBMIT_KEYBOARD_COLOR_9]);
        assert_eq!(frames[4][4], 216);
    }

    #[test]
    fn limited_packing_clamps_before_inverting() {
        let mut colors = vec![Color::BLACK; KEY_MAP.len()];
        for v in [7u8, 8, 100, 255] {
            colors[0] = Color::new(v, v, v);
            let packed = pack_limited(&colors);
            colors[0] = Color::new(7, 7, 7);
            assert_eq!(packed, pack_limited(&colors));
        }
    }

    #[test]
    fn limited_packing_inverts_and_nibbles() {
        let mut colors = vec![Color::BLACK; KEY_MAP.len()];
        // Keys 0 and 1 sit at positions 0 and 1: one packed byte.
        colors[0] = Color::new(7, 0, 3);
        colors[1] = Color::new(0, 7, 5);
        let packed = pack_limited(&colors);
        assert_eq!(packed[0], (7 << 4) | 0);
        assert_eq!(packed[LIMITED_CHANNEL_LEN], (0 << 4) | 7);
        assert_eq!(packed[2 * LIMITED_CHANNEL_LEN], (2 << 4) | 4);
        // Unmapped positions are zero, not inverted.
        assert_eq!(packed[5], 0);
    }

    #[test]
    fn mouse_frame_has_zone_quadruplets() {
        let (mut dev, mock) = init_device(0xC1, 0x1B2E);
        let colors = vec![
            Color::new(1, 2, 3),
            Color::new(4, 5, 6),
            Color::new(7, 8, 9),
            Color::new(10, 11, 12),
        ];
        dev.set_leds(&colors).unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Sent::Write(_)));
        let f = sent[0].frame();
        assert_eq!(&f[..4], &[command::WRITE, property::SUBMIT_MOUSE_COLOR, 4, 0]);
        assert_eq!(&f[4..20], &[0, 1, 2, 3, 1, 4, 5, 6, 2, 7, 8, 9, 3, 10, 11, 12]);
        assert!(f[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn mousemat_frame_uses_feature_report_triplets() {
        let (mut dev, mock) = init_device(0xC2, 0x1B3B);
        let colors = rainbow(MOUSEMAT_LEDS);
        dev.set_leds(&colors).unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Sent::Feature(_)));
        let f = sent[0].frame();
        assert_eq!(&f[..4], &[command::WRITE, property::SUBMIT_MOUSE_COLOR, 15, 0]);
        assert_eq!(&f[4..7], &[colors[0].r, colors[0].g, colors[0].b]);
        assert_eq!(&f[46..49], &[colors[14].r, colors[14].g, colors[14].b]);
    }

    #[test]
    fn headset_stand_remap_is_bijection() {
        let mut inverse = [0usize; 9];
        for (logical, &wire) in HEADSET_STAND_REMAP.iter().enumerate() {
            inverse[wire] = logical;
        }
        let colors = rainbow(9);
        let remapped = remap_headset_stand(&colors);
        let restored: Vec<Color> = (0..9).map(|i| remapped[HEADSET_STAND_REMAP[i]]).collect();
        assert_eq!(restored, colors);
        let back: Vec<Color> = (0..9).map(|wire| colors[inverse[wire]]).collect();
        assert_eq!(back, remapped);
    }

    #[test]
    fn headset_stand_logo_lands_mid_strip() {
        let (mut dev, mock) = init_device(0xC2, pids::ST100);
        let mut colors = vec![Color::BLACK; 9];
        colors[8] = Color::new(0xAA, 0xBB, 0xCC);
        dev.set_leds(&colors).unwrap();

        let f = mock.sent()[0].frame().to_vec();
        assert_eq!(&f[4 + 4 * 3..4 + 5 * 3], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(dev.led_names().last().map(String::as_str), Some("Logo"));
    }

    #[test]
    fn wrong_color_count_sends_nothing() {
        let (mut dev, mock) = init_device(0xC1, 0x1B2E);
        assert!(matches!(
            dev.set_leds(&[Color::WHITE; 3]),
            Err(Error::LedCountMismatch { expected: 4, actual: 3 })
        ));
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn transport_failure_surfaces() {
        let (mut dev, mock) = init_device(0xC1, 0x1B2E);
        mock.fail_writes();
        assert!(dev.set_leds(&[Color::WHITE; 4]).is_err());
        // Failed submission does not update the cached colors.
        assert_eq!(dev.colors(), &[Color::BLACK; 4]);
    }
}
