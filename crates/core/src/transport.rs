//! HID transport abstraction for device communication.
//!
//! Provides a trait-based transport layer so that real HID devices and
//! mock devices share the same interface.

use std::ffi::CString;
use std::thread;
use std::time::Duration;

use crate::codec::{build_feature_frame, Frame};
use crate::error::{Error, Result};
use tracing::trace;

/// Pause required after every feature report. The firmware drops reports
/// that arrive faster than this.
pub const FEATURE_REPORT_DELAY: Duration = Duration::from_millis(1);

/// Abstraction over raw HID read/write.
pub trait HidTransport: Send {
    /// Write one output report. Returns bytes written.
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Blocking read with timeout. `Ok(0)` means nothing arrived in time.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;

    /// Send a feature report. `data[0]` is the report ID.
    fn send_feature_report(&self, data: &[u8]) -> Result<()>;

    /// Read a feature report into `buf`. `buf[0]` selects the report ID.
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Send a frame as a plain output report.
pub fn send_frame(transport: &dyn HidTransport, frame: &Frame) -> Result<()> {
    trace!(
        command = format_args!("0x{:02X}", frame[0]),
        report_hex = format_args!("{:02X?}", &frame[..]),
        "HID TX"
    );
    transport.write(frame)?;
    Ok(())
}

/// Send a frame as a feature report, then hold off for [`FEATURE_REPORT_DELAY`].
pub fn send_feature(transport: &dyn HidTransport, frame: &Frame) -> Result<()> {
    let report = build_feature_frame(frame);
    trace!(
        command = format_args!("0x{:02X}", frame[0]),
        report_hex = format_args!("{:02X?}", &report[..]),
        "HID feature TX"
    );
    transport.send_feature_report(&report)?;
    thread::sleep(FEATURE_REPORT_DELAY);
    Ok(())
}

/// Transport over a real device opened through hidapi.
pub struct HidapiTransport {
    device: hidapi::HidDevice,
}

impl HidapiTransport {
    /// Open a device by its platform path (as reported by enumeration).
    pub fn open(path: &str) -> Result<Self> {
        let api = hidapi::HidApi::new().map_err(|e| Error::Hid(format!("hidapi init: {e}")))?;
        let c_path = CString::new(path)
            .map_err(|_| Error::DeviceNotFound(format!("invalid device path {path:?}")))?;
        let device = api
            .open_path(&c_path)
            .map_err(|e| Error::Hid(format!("open {path}: {e}")))?;
        Ok(Self { device })
    }
}

impl HidTransport for HidapiTransport {
    fn write(&self, data: &[u8]) -> Result<usize> {
        self.device
            .write(data)
            .map_err(|e| Error::Hid(format!("write: {e}")))
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        self.device
            .read_timeout(buf, timeout_ms)
            .map_err(|e| Error::Hid(format!("read_timeout: {e}")))
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        self.device
            .send_feature_report(data)
            .map_err(|e| Error::Hid(format!("send_feature_report: {e}")))
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize> {
        self.device
            .get_feature_report(buf)
            .map_err(|e| Error::Hid(format!("get_feature_report: {e}")))
    }
}
