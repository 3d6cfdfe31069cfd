//! Device model: known Corsair peripherals and one-shot discovery.

use crate::corsair::CorsairPeripheral;
use crate::error::{Error, Result};
use crate::transport::HidapiTransport;
use crate::{pids, CORSAIR_VID};
use tracing::{debug, info};

/// HID interface that carries the lighting protocol.
pub const LIGHTING_INTERFACE: i32 = 1;

/// Supported Corsair peripheral models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralModel {
    K65Rgb,
    K70Rgb,
    K70LuxRgb,
    K70RgbRapidfire,
    K95Rgb,
    K95Platinum,
    Strafe,
    M65Pro,
    Glaive,
    Scimitar,
    Mm800,
    St100,
}

impl PeripheralModel {
    pub const ALL: &'static [PeripheralModel] = &[
        Self::K65Rgb,
        Self::K70Rgb,
        Self::K70LuxRgb,
        Self::K70RgbRapidfire,
        Self::K95Rgb,
        Self::K95Platinum,
        Self::Strafe,
        Self::M65Pro,
        Self::Glaive,
        Self::Scimitar,
        Self::Mm800,
        Self::St100,
    ];

    /// Look up model from USB product ID.
    pub fn from_pid(pid: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.pid() == pid)
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::K65Rgb => "Corsair K65 RGB",
            Self::K70Rgb => "Corsair K70 RGB",
            Self::K70LuxRgb => "Corsair K70 LUX RGB",
            Self::K70RgbRapidfire => "Corsair K70 RGB RAPIDFIRE",
            Self::K95Rgb => "Corsair K95 RGB",
            Self::K95Platinum => "Corsair K95 RGB PLATINUM",
            Self::Strafe => "Corsair STRAFE RGB",
            Self::M65Pro => "Corsair M65 PRO RGB",
            Self::Glaive => "Corsair Glaive RGB",
            Self::Scimitar => "Corsair Scimitar RGB",
            Self::Mm800 => "Corsair MM800 RGB Polaris",
            Self::St100 => "Corsair ST100 RGB",
        }
    }

    /// USB Product ID.
    pub fn pid(&self) -> u16 {
        match self {
            Self::K65Rgb => pids::K65_RGB,
            Self::K70Rgb => pids::K70_RGB,
            Self::K70LuxRgb => pids::K70_LUX_RGB,
            Self::K70RgbRapidfire => pids::K70_RGB_RAPIDFIRE,
            Self::K95Rgb => pids::K95_RGB,
            Self::K95Platinum => pids::K95_PLATINUM,
            Self::Strafe => pids::STRAFE,
            Self::M65Pro => pids::M65_PRO,
            Self::Glaive => pids::GLAIVE,
            Self::Scimitar => pids::SCIMITAR,
            Self::Mm800 => pids::MM800,
            Self::St100 => pids::ST100,
        }
    }
}

/// Information about a discovered Corsair device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub model: PeripheralModel,
    pub vid: u16,
    pub pid: u16,
    pub path: String,
    pub serial: Option<String>,
}

impl DeviceInfo {
    /// Open the device and run the identity/lighting-enable handshake.
    pub fn open(&self) -> Result<CorsairPeripheral> {
        let transport = HidapiTransport::open(&self.path)?;
        CorsairPeripheral::initialize(Box::new(transport), self.model.name(), &self.path)
    }
}

/// Discover all connected Corsair RGB peripherals.
///
/// Enumerates USB HID devices once and returns the lighting interface of
/// every recognized model.
pub fn discover_devices() -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let mut devices = Vec::new();
    for info in api.device_list() {
        if info.vendor_id() != CORSAIR_VID || info.interface_number() != LIGHTING_INTERFACE {
            continue;
        }

        if let Some(model) = PeripheralModel::from_pid(info.product_id()) {
            info!(
                model = model.name(),
                vid = format_args!("0x{:04X}", info.vendor_id()),
                pid = format_args!("0x{:04X}", info.product_id()),
                path = %info.path().to_string_lossy(),
                "Found Corsair device"
            );
            devices.push(DeviceInfo {
                model,
                vid: info.vendor_id(),
                pid: info.product_id(),
                path: info.path().to_string_lossy().into_owned(),
                serial: info.serial_number().map(|s| s.to_string()),
            });
        }
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}
