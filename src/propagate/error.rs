use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropagateError {
    #[error("invalid tle: {0}")]
    InvalidTle(#[from] sgp4::TleError),
    #[error("elements error: {0}")]
    Elements(#[from] sgp4::ElementsError),
    #[error("invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error("epoch conversion error: {0}")]
    Epoch(String),
    #[error("propagation error: {0}")]
    Model(String),
    #[error("non-finite state at sample {0}")]
    NonFinite(usize),
    #[error("no time grid for constellation {0}")]
    MissingGrid(String),
}

impl From<sgp4::Error> for PropagateError {
    fn from(err: sgp4::Error) -> Self {
        PropagateError::Model(err.to_string())
    }
}
