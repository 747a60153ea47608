use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("controller timeout")]
    Timeout,
    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },
    #[error("modbus exception: function 0x{function:02x}, code 0x{code:02x}")]
    Exception { function: u8, code: u8 },
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    /// Fold socket timeouts into the dedicated variant.
    pub fn from_io(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => HwError::Timeout,
            _ => HwError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
