pub mod abort;
pub mod config;
pub mod filter;
pub mod geometry;
pub mod integrate;
pub mod pipeline;
pub mod pool;
pub mod propagate;
pub mod signal;
pub mod timeseries;
pub mod tle;

#[cfg(test)]
pub(crate) mod testutil;
