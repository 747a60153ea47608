pub mod error;
pub mod modbus;
pub mod sim;
pub mod tcp;

pub use error::HwError;
pub use sim::{SimConnector, SimWrite, SimulatedController};
pub use tcp::{TcpConnector, TcpRegisterBus};
