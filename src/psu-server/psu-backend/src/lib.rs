// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;

use psu_core::{DynResult, PsuAccessMethod, PsuTransport};

mod dummy;

pub use dummy::DummyPsu;
#[cfg(feature = "kwr103")]
use psu_backend_kwr103::Kwr103;

pub type BackendFactory = fn(PsuAccessMethod) -> DynResult<Box<dyn PsuTransport>>;

/// Context for registering and instantiating transport backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Context with every backend enabled by features.
    pub fn with_builtin_backends() -> Self {
        let mut context = Self::new();
        register_builtin_backends_on(&mut context);
        context
    }

    /// Register a backend factory under a stable name (e.g. "kwr103").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        let key = normalize_name(name);
        self.factories.insert(key, factory);
    }

    /// Check whether a backend name is registered.
    pub fn is_backend_registered(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.factories.contains_key(&key)
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Open a transport for the selected model and access method.
    pub fn build_transport(
        &self,
        name: &str,
        access: PsuAccessMethod,
    ) -> DynResult<Box<dyn PsuTransport>> {
        let key = normalize_name(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| format!("Unknown PSU backend: {}", name))?;
        factory(access)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Register all built-in backends enabled by features on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("dummy", dummy_factory);
    #[cfg(feature = "kwr103")]
    context.register_backend("kwr103", kwr103_factory);
}

fn dummy_factory(_access: PsuAccessMethod) -> DynResult<Box<dyn PsuTransport>> {
    Ok(Box::new(DummyPsu::new()))
}

#[cfg(feature = "kwr103")]
fn kwr103_factory(access: PsuAccessMethod) -> DynResult<Box<dyn PsuTransport>> {
    match access {
        PsuAccessMethod::Serial { path, baud } => Ok(Box::new(Kwr103::new(&path, baud)?)),
        PsuAccessMethod::Simulated => Err("KWR103 only supports serial access".into()),
    }
}
