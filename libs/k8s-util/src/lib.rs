pub mod error;
pub mod image;
pub mod registry;
pub mod telemetry;
