//! Service Configuration Module
//!
//! TOML configuration for thresholds, clustering, storage, the HTTP server
//! and API keys. See [`RoadPulseConfig`] for the search order.
//!
//! The loaded config is passed explicitly to the components that need it;
//! there is no process-wide instance.
//!
//! ```ignore
//! let config = RoadPulseConfig::load(args.config.as_deref())?;
//! let pipeline = IngestPipeline::new(store, &config);
//! ```

mod roadpulse_config;
pub mod defaults;
pub mod validation;

pub use roadpulse_config::*;
