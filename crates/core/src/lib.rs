//! rgb-hub-core: Corsair RGB drivers, LED strips and the SDK server.
//!
//! Every lighting device is wrapped in a [`controller::Controller`] and
//! appended to a [`controller::ControllerRegistry`]. The
//! [`server::DistributionServer`] exposes that registry to local control
//! programs over TCP; [`client::HubClient`] is the matching client.

pub mod client;
pub mod codec;
pub mod color;
pub mod config;
pub mod controller;
pub mod corsair;
pub mod device;
pub mod error;
pub mod notifier;
pub mod protocol;
pub mod server;
pub mod session;
pub mod strip;
pub mod transport;

/// Corsair USB Vendor ID.
pub const CORSAIR_VID: u16 = 0x1B1C;

/// Known Corsair RGB product IDs.
pub mod pids {
    pub const K65_RGB: u16 = 0x1B17;
    pub const K70_RGB: u16 = 0x1B13;
    pub const K70_LUX_RGB: u16 = 0x1B33;
    pub const K70_RGB_RAPIDFIRE: u16 = 0x1B38;
    pub const K95_RGB: u16 = 0x1B11;
    pub const K95_PLATINUM: u16 = 0x1B2D;
    pub const STRAFE: u16 = 0x1B20;
    pub const M65_PRO: u16 = 0x1B2E;
    pub const GLAIVE: u16 = 0x1B34;
    pub const SCIMITAR: u16 = 0x1B1E;
    /// MM800 RGB Polaris mousemat.
    pub const MM800: u16 = 0x1B3B;
    /// ST100 headset stand. Reports the mousemat device class.
    pub const ST100: u16 = 0x0A34;
}
