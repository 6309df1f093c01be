//! Building Transporters by name.
//!
//! Backends are registered under a name with one or more constructors
//! (`make` by default) and, optionally, connection hooks. A [`Registry`]
//! resolves a tag to a [`RegistryEntry`], runs the entry's hook, calls its
//! constructor, and wraps the result in a band restriction when the entry
//! names `in_bands` or `out_bands`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, Span};
use transporter_access::{Access, Restrict};
use transporter_core::{Document, Result, TransportError};
use transporter_store::{memory, MemoryBackend, SharedTransporter, Transport};

use crate::config::{default_entries, RegistryConfig, RegistryEntry, DEFAULT_MAKE};

/// Name of the built-in in-memory backend.
pub const MEMORY_BACKEND: &str = "memory";

/// Handed to constructors and hooks in place of a global logger.
#[derive(Debug, Clone)]
pub struct Context {
    name: String,
    span: Span,
}

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let span = tracing::info_span!("transporter", name = %name);
        Self { name, span }
    }

    /// A context for something built under this one.
    pub fn child(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            span: tracing::info_span!(parent: &self.span, "transporter", name = %name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new("transporter")
    }
}

/// A backend constructor: settings, the connection hook's result (if the
/// entry named one), and the context to log under.
pub type MakeFn = Arc<
    dyn Fn(&Document, Option<Document>, &Context) -> anyhow::Result<SharedTransporter>
        + Send
        + Sync,
>;

/// Runs before a constructor, typically to establish or verify a
/// connection. What it returns is handed to the constructor.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &Document, context: &Context) -> anyhow::Result<Document>;
}

#[derive(Default)]
struct Registration {
    makers: HashMap<String, MakeFn>,
    connectors: HashMap<String, Arc<dyn Connector>>,
}

/// Tag-to-Transporter factory.
pub struct Registry {
    entries: Vec<RegistryEntry>,
    backends: HashMap<String, Registration>,
    context: Context,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut backends: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        backends.sort_unstable();

        f.debug_struct("Registry")
            .field("tags", &self.tags().collect::<Vec<_>>())
            .field("backends", &backends)
            .field("context", &self.context.name)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Context::default())
    }
}

impl Registry {
    /// A registry holding the built-in entries and the memory backend.
    ///
    /// The memory backend's `make` honours an `inline_updates` setting.
    pub fn new(context: Context) -> Self {
        let mut registry = Self {
            entries: default_entries(),
            backends: HashMap::new(),
            context,
        };
        registry.register(MEMORY_BACKEND, |settings, _, _| {
            let inline = settings
                .get("inline_updates")
                .and_then(|value| value.as_bool())
                .unwrap_or(false);
            Ok(if inline {
                Transport::shared(MemoryBackend::new().with_inline_updates())
            } else {
                memory()
            })
        });
        registry
    }

    /// Configured entries take precedence over the built-in ones.
    pub fn with_config(config: RegistryConfig, context: Context) -> Self {
        let mut registry = Self::new(context);
        let mut entries = config.transporters;
        entries.append(&mut registry.entries);
        registry.entries = entries;
        registry
    }

    /// Register `make` as the default constructor of `backend`.
    pub fn register<F>(&mut self, backend: &str, make: F) -> &mut Self
    where
        F: Fn(&Document, Option<Document>, &Context) -> anyhow::Result<SharedTransporter>
            + Send
            + Sync
            + 'static,
    {
        self.register_make(backend, DEFAULT_MAKE, make)
    }

    /// Register a named constructor of `backend`.
    pub fn register_make<F>(&mut self, backend: &str, name: &str, make: F) -> &mut Self
    where
        F: Fn(&Document, Option<Document>, &Context) -> anyhow::Result<SharedTransporter>
            + Send
            + Sync
            + 'static,
    {
        self.backends
            .entry(backend.to_string())
            .or_default()
            .makers
            .insert(name.to_string(), Arc::new(make));
        self
    }

    /// Register a named connection hook of `backend`.
    pub fn register_connector(
        &mut self,
        backend: &str,
        name: &str,
        connector: impl Connector + 'static,
    ) -> &mut Self {
        self.backends
            .entry(backend.to_string())
            .or_default()
            .connectors
            .insert(name.to_string(), Arc::new(connector));
        self
    }

    /// Add an entry in front of the existing ones.
    pub fn add_entry(&mut self, entry: RegistryEntry) -> &mut Self {
        self.entries.insert(0, entry);
        self
    }

    /// The first entry with this tag.
    pub fn entry(&self, tag: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.tag.as_str())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Build the Transporter registered under `tag`.
    ///
    /// Unknown tags are `NotFound`. A backend, constructor, or hook that
    /// is not registered is `SetupRequired`.
    pub async fn create(&self, tag: &str) -> Result<SharedTransporter> {
        let entry = self
            .entry(tag)
            .ok_or_else(|| TransportError::not_found(format!("no transporter tagged '{tag}'")))?;
        self.create_entry(entry).await
    }

    /// Build a Transporter from an entry that need not be registered.
    pub async fn create_entry(&self, entry: &RegistryEntry) -> Result<SharedTransporter> {
        let backend = &entry.transporter;
        let registration = self.backends.get(backend).ok_or_else(|| {
            TransportError::SetupRequired(format!("no backend registered as '{backend}'"))
        })?;
        let make = registration.makers.get(&entry.make).ok_or_else(|| {
            TransportError::SetupRequired(format!(
                "backend '{backend}' has no constructor '{}'",
                entry.make
            ))
        })?;

        let context = self.context.child(&entry.tag);
        let connection = match &entry.connect {
            Some(name) => {
                let connector = registration.connectors.get(name).ok_or_else(|| {
                    TransportError::SetupRequired(format!(
                        "backend '{backend}' has no connection hook '{name}'"
                    ))
                })?;
                let connected = connector
                    .connect(&entry.initd, &context)
                    .instrument(context.span().clone())
                    .await
                    .map_err(setup_error)?;
                Some(connected)
            }
            None => None,
        };

        let transporter = context
            .span()
            .in_scope(|| make(&entry.initd, connection, &context))
            .map_err(setup_error)?;
        tracing::debug!(tag = %entry.tag, %backend, "transporter created");

        Ok(restrict(entry, transporter))
    }
}

/// Keep a `TransportError` raised by a constructor, wrap anything else.
fn setup_error(error: anyhow::Error) -> TransportError {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<TransportError>())
        .cloned()
        .unwrap_or_else(|| TransportError::SetupRequired(format!("{error:#}")))
}

fn restrict(entry: &RegistryEntry, transporter: SharedTransporter) -> SharedTransporter {
    if !entry.is_restricted() {
        return transporter;
    }

    let mut policy = Restrict::new();
    if let Some(bands) = &entry.in_bands {
        policy = policy.in_bands(bands.iter().cloned());
    }
    if let Some(bands) = &entry.out_bands {
        policy = policy.out_bands(bands.iter().cloned());
    }
    Access::with_policy(transporter, policy).into_shared()
}
