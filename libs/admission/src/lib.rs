pub mod attributes;
pub mod config;
pub mod error;
pub mod object;
pub mod plugin;
pub mod plugins;

pub use attributes::{Attributes, GroupVersionResource, Operation};
pub use config::AdmissionConfig;
pub use error::{Error, Result};
pub use object::AdmissionObject;
pub use plugin::{Chain, Plugin, Plugins};
