mod error;
mod loader;
mod types;

pub use error::TleError;
pub use loader::{parse_multi_tle, ParsedTle, TleEntry, TleLoader};
pub use types::{MalformedTle, OrbitalElements, PipelineInput, SatelliteRecord};
