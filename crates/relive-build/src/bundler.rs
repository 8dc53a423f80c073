//! Bundler abstraction.
//!
//! The bundling engine is an external collaborator. A [`Bundler`] turns an
//! [`InputOptions`] description into an [`Artifact`], which can then be
//! written according to an [`OutputOptions`] description.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use relive_config::ModuleFormat;

/// Input side of a bundler invocation.
#[derive(Clone, Debug, Default)]
pub struct InputOptions {
    /// Entry module path.
    pub entry: PathBuf,
    /// Bundler-specific plugin arguments, passed through untouched.
    pub plugins: Vec<String>,
    /// Module ids that must not be bundled.
    pub external: Vec<String>,
}

impl InputOptions {
    /// Whether `id` is excluded from the bundle.
    #[must_use]
    pub fn is_external(&self, id: &str) -> bool {
        self.external.iter().any(|e| e == id)
    }
}

/// Output side of a bundler invocation.
#[derive(Clone, Debug, Default)]
pub struct OutputOptions {
    /// Module format of the emitted bundle.
    pub format: ModuleFormat,
    /// Global name for `iife`/`amd` bundles.
    pub name: Option<String>,
    /// Destination file.
    pub file: PathBuf,
    /// Emit a source map next to the bundle.
    pub sourcemap: bool,
    /// Module id to global variable mapping.
    pub globals: BTreeMap<String, String>,
}

impl OutputOptions {
    /// Global variable name for an external module id.
    #[must_use]
    pub fn global_for(&self, id: &str) -> Option<&str> {
        self.globals.get(id).map(String::as_str)
    }
}

/// Source location attached to a bundler error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// File the error points into.
    pub file: Option<String>,
    /// One-based line number.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
}

/// Structured error reported by a bundler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleError {
    /// Human-readable message.
    pub message: String,
    /// Location of the failure, if known.
    pub loc: Option<Location>,
    /// Source excerpt around the failure.
    pub frame: Option<String>,
    /// Module id the failure belongs to.
    pub id: Option<String>,
    /// Machine-readable error code.
    pub code: Option<String>,
}

impl BundleError {
    /// Create an error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BundleError {}

/// A built bundle that has not necessarily been written yet.
#[async_trait]
pub trait Artifact: Send + Sync {
    /// Write the bundle to the destination described by `output`.
    async fn write(&self, output: &OutputOptions) -> Result<(), BundleError>;

    /// Downcast hook so a bundler can inspect its own previous artifact.
    fn as_any(&self) -> &dyn Any;
}

/// The external bundling engine.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Build the module graph rooted at `input.entry`.
    ///
    /// `previous` is the last successful artifact produced for the same build
    /// and may be used as an incremental cache.
    async fn bundle(
        &self,
        input: &InputOptions,
        previous: Option<&dyn Artifact>,
    ) -> Result<Arc<dyn Artifact>, BundleError>;
}
