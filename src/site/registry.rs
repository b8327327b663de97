//! Explicit lookup from a configured kind to a site constructor

use crate::config::SiteConfig;
use crate::site::{ExampleSite, SiteCapability, SiteError};
use std::collections::BTreeMap;

/// Builds a site capability from its configuration section
pub type SiteConstructor = fn(&SiteConfig) -> Result<Box<dyn SiteCapability>, SiteError>;

/// Table of known site kinds, populated at startup
#[derive(Default)]
pub struct SiteRegistry {
    constructors: BTreeMap<String, SiteConstructor>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every site kind shipped with the crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("example", ExampleSite::construct);
        registry
    }

    /// Registers (or replaces) a site kind
    pub fn register(&mut self, kind: impl Into<String>, constructor: SiteConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Builds the capability named by `config.kind`
    pub fn build(&self, config: &SiteConfig) -> Result<Box<dyn SiteCapability>, SiteError> {
        let constructor = self
            .constructors
            .get(&config.kind)
            .ok_or_else(|| SiteError::UnknownKind(config.kind.clone()))?;
        constructor(config)
    }
}
