pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::time::Duration;

/// Register-level access to a chamber controller.
///
/// Implementations speak whatever wire protocol the controller understands;
/// the core only deals in unit ids, register addresses and 16-bit words.
pub trait RegisterBus {
    fn read_holding(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, Box<dyn std::error::Error + Send + Sync>>;

    fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn write_coil(
        &mut self,
        unit_id: u8,
        address: u16,
        value: bool,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Opens a [`RegisterBus`] to a controller at `host:port`.
pub trait Connector {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn RegisterBus>, Box<dyn std::error::Error + Send + Sync>>;
}
