//! Explicit plugin registry.
//!
//! Formats and processors are registered on a value owned by the caller; the
//! crate keeps no global plugin state.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::LoadOptions;
use crate::disasm::{Decoder, IcedDecoder};
use crate::error::{LoupeError, Result};
use crate::formats::pe::PeFormat;
use crate::formats::FormatPlugin;

/// Creates an empty format plugin
pub type FormatFactory = Box<dyn Fn(&LoadOptions) -> Box<dyn FormatPlugin> + Send + Sync>;

/// Creates a decoder for one processor
pub type ProcessorFactory = Box<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;

/// Format and processor plugins known to a loader
pub struct Registry {
    options: LoadOptions,
    formats: Vec<(String, FormatFactory)>,
    processors: BTreeMap<String, ProcessorFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.options)
            .field("formats", &self.format_names())
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::with_options(LoadOptions::default())
    }

    /// An empty registry passing `options` to every format it creates
    pub fn with_options(options: LoadOptions) -> Self {
        Self {
            options,
            formats: Vec::new(),
            processors: BTreeMap::new(),
        }
    }

    /// PE format plus iced-x86 backed `x86_32` and `x86_64` processors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    pub fn register_defaults(&mut self) -> &mut Self {
        self.register_format("pe", |options| {
            Box::new(PeFormat::with_options(options.clone()))
        })
        .register_processor("x86_32", || Box::new(IcedDecoder::x86_32()))
        .register_processor("x86_64", || Box::new(IcedDecoder::x86_64()))
    }

    /// Add a format; formats are tried in registration order.
    /// Registering a name again replaces the earlier factory in place.
    pub fn register_format<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&LoadOptions) -> Box<dyn FormatPlugin> + Send + Sync + 'static,
    {
        match self.formats.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = Box::new(factory),
            None => self.formats.push((name.to_string(), Box::new(factory))),
        }
        self
    }

    /// Add or replace the decoder factory for a processor
    pub fn register_processor<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        self.processors.insert(name.to_string(), Box::new(factory));
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn format_names(&self) -> Vec<&str> {
        self.formats.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.keys().map(String::as_str).collect()
    }

    /// Load `data` with the first format that accepts it.
    ///
    /// When every format rejects the data, the last rejection is returned.
    pub fn load(&self, data: &[u8]) -> Result<Box<dyn FormatPlugin>> {
        let span = crate::span_trace!("load", size = data.len());
        let _guard = span.enter();
        let mut last_error = None;

        for (name, factory) in &self.formats {
            let mut format = factory(&self.options);
            match format.load(data) {
                Ok(()) => {
                    info!(format = %name, "Image accepted");
                    return Ok(format);
                }
                Err(e) => {
                    debug!(format = %name, error = %e, "Format rejected image");
                    last_error = Some(e);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| {
            LoupeError::UnsupportedFormat("no formats registered".to_string())
        });
        Err(crate::log_error!(err, "No format accepted the image"))
    }

    /// Decoder registered for a processor identifier
    pub fn decoder_for(&self, processor: &str) -> Result<Box<dyn Decoder>> {
        self.processors
            .get(processor)
            .map(|factory| factory())
            .ok_or_else(|| LoupeError::UnsupportedProcessor(processor.to_string()))
    }
}
