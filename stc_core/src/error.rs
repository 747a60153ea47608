use thiserror::Error;

use crate::types::Position;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StcError {
    #[error("insufficient data: {found} usable rows, at least {required} required")]
    InsufficientData { found: usize, required: usize },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("machine {0} not found")]
    MachineNotFound(u32),
    #[error("network error: {0}")]
    Network(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("machine {machine_id} ({position}) already has a run in progress")]
    Busy { machine_id: u32, position: Position },
}

impl StcError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing record store")]
    MissingStore,
    #[error("missing controller connector")]
    MissingConnector,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StcError>;
pub use eyre::Report;
