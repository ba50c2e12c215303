//! Request and response types

pub mod features;
pub mod koi;
pub mod prediction;

pub use features::ExoplanetFeatures;
pub use koi::KoiRow;
pub use prediction::{ErrorResponse, PredictionResponse, PredictionResult};
