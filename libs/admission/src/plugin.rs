use crate::attributes::{Attributes, Operation};
use crate::config::AdmissionConfig;
use crate::error::{Error, Result};
use crate::plugins::{image_regexp, require_resources, ss_fixup, ss_ordinal};

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span};

/// A single admission rule.
///
/// Plugins may mutate the object in `attributes`; returning an error rejects the request
/// and stops the chain.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, operation: Operation) -> bool;

    fn admit<'a>(&'a self, attributes: &'a mut Attributes) -> BoxFuture<'a, Result<()>>;
}

pub type PluginFactory = fn(Option<Value>) -> Result<Box<dyn Plugin>>;

/// Registry of plugin factories by name.
pub struct Plugins {
    factories: BTreeMap<&'static str, PluginFactory>,
}

impl Default for Plugins {
    fn default() -> Self {
        let mut plugins = Self::empty();
        plugins.register(image_regexp::PLUGIN_NAME, image_regexp::factory);
        plugins.register(require_resources::PLUGIN_NAME, require_resources::factory);
        plugins.register(ss_fixup::PLUGIN_NAME, ss_fixup::factory);
        plugins.register(ss_ordinal::PLUGIN_NAME, ss_ordinal::factory);
        plugins
    }
}

impl Plugins {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, factory: PluginFactory) {
        if self.factories.insert(name, factory).is_some() {
            debug!(msg = "admission plugin registered twice, keeping the latest", name);
        }
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn new_plugin(&self, name: &str, config: Option<Value>) -> Result<Box<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))?;
        factory(config)
    }
}

/// Ordered list of plugins applied to every request.
#[derive(Default)]
pub struct Chain {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Chain {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn from_config(config: &AdmissionConfig, registry: &Plugins) -> Result<Self> {
        let plugins = config
            .plugins
            .iter()
            .map(|p| {
                info!(msg = "enabling admission plugin", name = %p.name);
                registry.new_plugin(&p.name, p.configuration.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(plugins))
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn admit(&self, attributes: &mut Attributes) -> Result<()> {
        for plugin in &self.plugins {
            if !plugin.handles(attributes.operation) {
                continue;
            }
            let span = info_span!("admit", plugin = plugin.name());
            plugin.admit(attributes).instrument(span).await?;
        }
        Ok(())
    }
}
