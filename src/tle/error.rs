use thiserror::Error;

#[derive(Debug, Error)]
pub enum TleError {
    #[error("TLE source not found: {0}")]
    SourceNotFound(String),
    #[error("TLE file read error: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("invalid tle: {0}")]
    InvalidTle(#[from] sgp4::TleError),
    #[error("elements error: {0}")]
    Elements(#[from] sgp4::ElementsError),
    #[error("catalog number {0} does not fit a NORAD id")]
    CatalogNumber(u64),
}
