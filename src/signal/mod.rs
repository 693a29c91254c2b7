mod analyzer;
mod error;
pub mod events;
pub mod link_budget;
pub mod rain;
mod types;

pub use analyzer::SignalAnalyzer;
pub use error::SignalError;
pub use events::{EventType, MeasurementEvent, Measurement, Transition};
pub use link_budget::{free_space_path_loss_db, LinkBudget, LinkSample};
pub use rain::RainModel;
pub use types::{ObservationSample, SignalArtifact, SignalSample, SignalSeries, SIGNAL_SCHEMA_VERSION};
