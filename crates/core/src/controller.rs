//! Uniform controller interface and the registry the server reads from.
//!
//! Every lighting device, whatever its transport, is exposed as a
//! [`Controller`]: a device type, a zone layout, and a color-set operation.
//! The [`ControllerRegistry`] is append-only; an index handed out by
//! [`ControllerRegistry::push`] stays valid for the registry's lifetime and
//! is the identifier used on the wire.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{Error, Result};

/// Device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    LedStrip,
    Keyboard,
    Mouse,
    Mousemat,
    HeadsetStand,
    Unknown,
}

impl DeviceType {
    /// Wire value.
    pub fn as_raw(self) -> i32 {
        match self {
            Self::LedStrip => 4,
            Self::Keyboard => 5,
            Self::Mouse => 6,
            Self::Mousemat => 7,
            Self::HeadsetStand => 9,
            Self::Unknown => 10,
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            4 => Self::LedStrip,
            5 => Self::Keyboard,
            6 => Self::Mouse,
            7 => Self::Mousemat,
            9 => Self::HeadsetStand,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::LedStrip => "LED Strip",
            Self::Keyboard => "Keyboard",
            Self::Mouse => "Mouse",
            Self::Mousemat => "Mousemat",
            Self::HeadsetStand => "Headset Stand",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Shape of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneType {
    Single,
    Linear,
    Matrix,
}

impl ZoneType {
    pub fn as_raw(self) -> u32 {
        match self {
            Self::Single => 0,
            Self::Linear => 1,
            Self::Matrix => 2,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            2 => Self::Matrix,
            1 => Self::Linear,
            _ => Self::Single,
        }
    }
}

/// A logical, independently addressable lighting region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub zone_type: ZoneType,
    /// Number of LEDs in this zone.
    pub leds: usize,
}

impl Zone {
    pub fn new(name: impl Into<String>, zone_type: ZoneType, leds: usize) -> Self {
        Self {
            name: name.into(),
            zone_type,
            leds,
        }
    }
}

/// Snapshot of a controller's metadata and current colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    pub device_type: DeviceType,
    pub name: String,
    pub description: String,
    pub version: String,
    pub serial: String,
    pub location: String,
    pub zones: Vec<Zone>,
    pub leds: Vec<String>,
    pub colors: Vec<Color>,
}

impl ControllerInfo {
    pub fn led_count(&self) -> usize {
        self.zones.iter().map(|z| z.leds).sum()
    }
}

/// A lighting device the hub can drive.
///
/// `colors()` always has exactly `led_count()` entries: the last array
/// applied, or black before the first `set_leds`.
pub trait Controller: Send {
    fn name(&self) -> &str;

    fn device_type(&self) -> DeviceType;

    fn description(&self) -> &str {
        ""
    }

    /// Firmware or protocol version string.
    fn version(&self) -> &str {
        ""
    }

    fn serial(&self) -> &str {
        ""
    }

    /// Where the device is attached (HID path, serial port, UDP address).
    fn location(&self) -> &str;

    fn zones(&self) -> &[Zone];

    fn led_names(&self) -> &[String];

    fn colors(&self) -> &[Color];

    /// Apply one color per LED, in zone order.
    fn set_leds(&mut self, colors: &[Color]) -> Result<()>;

    fn led_count(&self) -> usize {
        self.zones().iter().map(|z| z.leds).sum()
    }

    /// Replace the colors of one zone, keeping every other LED as it was.
    fn update_zone_leds(&mut self, zone: usize, colors: &[Color]) -> Result<()> {
        let zones = self.zones();
        let target = zones.get(zone).ok_or(Error::LayoutIndex {
            field: "zone",
            index: zone,
        })?;
        if colors.len() != target.leds {
            return Err(Error::LedCountMismatch {
                expected: target.leds,
                actual: colors.len(),
            });
        }
        let start: usize = zones[..zone].iter().map(|z| z.leds).sum();

        let mut all = self.colors().to_vec();
        all[start..start + colors.len()].copy_from_slice(colors);
        self.set_leds(&all)
    }

    /// Replace a single LED's color.
    fn update_single_led(&mut self, led: usize, color: Color) -> Result<()> {
        if led >= self.led_count() {
            return Err(Error::LayoutIndex {
                field: "led",
                index: led,
            });
        }
        let mut all = self.colors().to_vec();
        all[led] = color;
        self.set_leds(&all)
    }

    fn info(&self) -> ControllerInfo {
        ControllerInfo {
            device_type: self.device_type(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            version: self.version().to_string(),
            serial: self.serial().to_string(),
            location: self.location().to_string(),
            zones: self.zones().to_vec(),
            leds: self.led_names().to_vec(),
            colors: self.colors().to_vec(),
        }
    }
}

/// Reject a color array that does not cover every LED exactly once.
pub fn check_led_count(expected: usize, colors: &[Color]) -> Result<()> {
    if colors.len() != expected {
        return Err(Error::LedCountMismatch {
            expected,
            actual: colors.len(),
        });
    }
    Ok(())
}

/// A controller behind its own lock. Holding the lock is what serializes
/// concurrent sessions driving the same device.
pub type SharedController = Arc<Mutex<Box<dyn Controller>>>;

/// Ordered, append-only set of controllers.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: RwLock<Vec<SharedController>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a controller and return its permanent index.
    pub fn push(&self, controller: Box<dyn Controller>) -> usize {
        let mut controllers = self
            .controllers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        controllers.push(Arc::new(Mutex::new(controller)));
        controllers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<SharedController> {
        let controllers = self
            .controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        controllers
            .get(index)
            .cloned()
            .ok_or(Error::ControllerIndex {
                index,
                count: controllers.len(),
            })
    }

    /// Run `op` with exclusive access to controller `index`.
    ///
    /// The registry lock is released before the controller lock is taken, so
    /// a slow device only blocks callers of that same device.
    pub fn with_controller<R>(
        &self,
        index: usize,
        op: impl FnOnce(&mut dyn Controller) -> Result<R>,
    ) -> Result<R> {
        let shared = self.get(index)?;
        let mut controller = shared.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut **controller)
    }

    pub fn info(&self, index: usize) -> Result<ControllerInfo> {
        self.with_controller(index, |c| Ok(c.info()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingController;
    use super::*;

    const RED: Color = Color::new(0xFF, 0, 0);
    const BLUE: Color = Color::new(0, 0, 0xFF);

    #[test]
    fn device_type_raw_roundtrip() {
        for t in [
            DeviceType::LedStrip,
            DeviceType::Keyboard,
            DeviceType::Mouse,
            DeviceType::Mousemat,
            DeviceType::HeadsetStand,
            DeviceType::Unknown,
        ] {
            assert_eq!(DeviceType::from_raw(t.as_raw()), t);
        }
        assert_eq!(DeviceType::from_raw(-1), DeviceType::Unknown);
    }

    #[test]
    fn registry_indices_are_stable() {
        let registry = ControllerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.push(Box::new(RecordingController::new("a", &[1]))), 0);
        assert_eq!(registry.push(Box::new(RecordingController::new("b", &[2]))), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.info(1).unwrap().name, "b");
    }

    #[test]
    fn registry_rejects_out_of_range() {
        let registry = ControllerRegistry::new();
        registry.push(Box::new(RecordingController::new("a", &[1])));
        assert!(matches!(
            registry.info(1),
            Err(Error::ControllerIndex { index: 1, count: 1 })
        ));
    }

    #[test]
    fn set_leds_rejects_wrong_length() {
        let mut ctrl = RecordingController::new("a", &[2, 3]);
        assert!(matches!(
            ctrl.set_leds(&[RED; 4]),
            Err(Error::LedCountMismatch { expected: 5, actual: 4 })
        ));
        assert!(ctrl.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn update_zone_touches_only_that_zone() {
        let mut ctrl = RecordingController::new("a", &[2, 3]);
        ctrl.update_zone_leds(1, &[BLUE; 3]).unwrap();
        assert_eq!(
            ctrl.colors(),
            &[Color::BLACK, Color::BLACK, BLUE, BLUE, BLUE]
        );
        assert!(ctrl.update_zone_leds(2, &[BLUE]).is_err());
        assert!(ctrl.update_zone_leds(0, &[BLUE; 3]).is_err());
    }

    #[test]
    fn update_single_led() {
        let mut ctrl = RecordingController::new("a", &[3]);
        ctrl.update_single_led(1, RED).unwrap();
        assert_eq!(ctrl.colors(), &[Color::BLACK, RED, Color::BLACK]);
        assert!(ctrl.update_single_led(3, RED).is_err());
    }

    #[test]
    fn info_reflects_layout_and_colors() {
        let registry = ControllerRegistry::new();
        registry.push(Box::new(RecordingController::new("strip", &[4])));
        registry
            .with_controller(0, |c| c.set_leds(&[RED; 4]))
            .unwrap();
        let info = registry.info(0).unwrap();
        assert_eq!(info.led_count(), 4);
        assert_eq!(info.leds.len(), 4);
        assert_eq!(info.colors, vec![RED; 4]);
    }
}
