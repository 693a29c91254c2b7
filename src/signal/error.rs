use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("constellation {0} has no signal profile")]
    UnknownConstellation(String),
    #[error("constellation {0} has no time grid")]
    MissingGrid(String),
}
