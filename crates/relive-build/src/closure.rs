//! Reusable build actions.
//!
//! A [`BuildClosure`] wraps one bundler configuration. Each [`run`](BuildClosure::run)
//! performs one build, passing the previous successful artifact back to the
//! bundler as a cache hint. Bundler failures never escape: they are formatted
//! and persisted to a sibling `<output>.error` marker file (or handed to an
//! override [`ErrorHandler`]).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use relive_config::BuildConfig;
use tokio::sync::Mutex;

use crate::bundler::{Artifact, BundleError, Bundler, InputOptions, OutputOptions};
use crate::format::error_lines;

/// Suffix appended to the output file to form the error marker path.
pub const ERROR_MARKER_SUFFIX: &str = ".error";

/// Everything a build knows about itself, handed to error handlers.
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Input description.
    pub input: &'a InputOptions,
    /// Output description.
    pub output: &'a OutputOptions,
    /// Error marker path the default handler would write.
    pub error_file: &'a Path,
}

/// Override for the default error reporting.
///
/// Receives the raw error, the formatted diagnostic lines and the build
/// context, and is fully responsible for surfacing the failure.
pub type ErrorHandler = Arc<dyn Fn(&BundleError, &[String], &BuildContext<'_>) + Send + Sync>;

/// Options bag of a build.
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Replaces marker-file reporting when set.
    pub on_error: Option<ErrorHandler>,
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOptions")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Full description of a build.
#[derive(Clone, Debug, Default)]
pub struct BuildSpec {
    /// Input description.
    pub input: InputOptions,
    /// Output description.
    pub output: OutputOptions,
    /// Options bag.
    pub options: BuildOptions,
}

impl BuildSpec {
    /// Derive a build from the `[build]` configuration section.
    ///
    /// The output file is `<out_dir>/<entry stem><suffix>.js`, where the
    /// suffix defaults to `.min` in production and to nothing otherwise.
    #[must_use]
    pub fn from_config(config: &BuildConfig, production: bool) -> Self {
        let suffix = config
            .suffix
            .clone()
            .unwrap_or_else(|| if production { ".min" } else { "" }.to_owned());
        let stem = config
            .entry
            .file_stem()
            .map_or_else(|| "bundle".into(), |s| s.to_string_lossy());

        Self {
            input: InputOptions {
                entry: config.entry.clone(),
                plugins: Vec::new(),
                external: config.external.clone(),
            },
            output: OutputOptions {
                format: config.format,
                name: config.name.clone(),
                file: config.out_dir.join(format!("{stem}{suffix}.js")),
                sourcemap: config.sourcemap,
                globals: config.globals.clone(),
            },
            options: BuildOptions::default(),
        }
    }
}

/// Build closure error.
///
/// Bundler failures are not errors at this level; only misconfiguration and
/// failures to persist the error marker are.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Invalid build specification.
    #[error("Invalid build specification: {0}")]
    Validation(String),

    /// The error marker could not be written.
    #[error("Failed to write error marker {}: {source}", path.display())]
    Marker {
        /// Marker path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result of one build invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The bundle was written and the error marker cleared.
    Built,
    /// The bundler failed; the failure has been reported.
    Failed,
}

/// A reusable build action over one bundler configuration.
pub struct BuildClosure {
    input: InputOptions,
    output: OutputOptions,
    on_error: Option<ErrorHandler>,
    timed: bool,
    error_file: PathBuf,
    bundler: Arc<dyn Bundler>,
    previous: Mutex<Option<Arc<dyn Artifact>>>,
}

impl BuildClosure {
    /// Create a plain build closure.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Validation` if the entry or output path is empty.
    pub fn plain(spec: BuildSpec, bundler: Arc<dyn Bundler>) -> Result<Self, BuildError> {
        Self::new(spec, bundler, false)
    }

    /// Create a build closure that logs compile and total build timings.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Validation` if the entry or output path is empty.
    pub fn timed(spec: BuildSpec, bundler: Arc<dyn Bundler>) -> Result<Self, BuildError> {
        Self::new(spec, bundler, true)
    }

    fn new(spec: BuildSpec, bundler: Arc<dyn Bundler>, timed: bool) -> Result<Self, BuildError> {
        if spec.input.entry.as_os_str().is_empty() {
            return Err(BuildError::Validation(
                "entry module path must be a non-empty string".to_owned(),
            ));
        }
        if spec.output.file.as_os_str().is_empty() {
            return Err(BuildError::Validation(
                "output file must be a non-empty path".to_owned(),
            ));
        }

        let error_file = error_marker_path(&spec.output.file);
        Ok(Self {
            input: spec.input,
            output: spec.output,
            on_error: spec.options.on_error,
            timed,
            error_file,
            bundler,
            previous: Mutex::new(None),
        })
    }

    /// Path of the error marker written on failure.
    #[must_use]
    pub fn error_file(&self) -> &Path {
        &self.error_file
    }

    /// Output description of this build.
    #[must_use]
    pub fn output(&self) -> &OutputOptions {
        &self.output
    }

    /// Perform one build.
    ///
    /// Concurrent invocations of the same closure run one after another so the
    /// cache hint always reflects the latest successful build.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Marker` if the error marker cannot be written.
    pub async fn run(&self) -> Result<BuildOutcome, BuildError> {
        let started = Instant::now();
        if self.timed {
            tracing::info!(entry = %self.input.entry.display(), "Build started");
        }

        let mut previous = self.previous.lock().await;

        let compile_started = Instant::now();
        let bundled = self.bundler.bundle(&self.input, previous.as_deref()).await;
        if self.timed {
            tracing::info!(
                entry = %self.input.entry.display(),
                elapsed_ms = compile_started.elapsed().as_secs_f64() * 1000.0,
                "Compile finished"
            );
        }

        let written = match bundled {
            Ok(artifact) => artifact.write(&self.output).await.map(|()| artifact),
            Err(err) => Err(err),
        };

        let outcome = match written {
            Ok(artifact) => {
                *previous = Some(artifact);
                self.write_marker("").await?;
                BuildOutcome::Built
            }
            Err(err) => {
                self.report(&err).await?;
                BuildOutcome::Failed
            }
        };

        if self.timed {
            tracing::info!(
                output = %self.output.file.display(),
                ?outcome,
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Build finished"
            );
        }

        Ok(outcome)
    }

    /// Surface a bundler failure through the handler or the marker file.
    async fn report(&self, err: &BundleError) -> Result<(), BuildError> {
        let lines = error_lines(err).unwrap_or_else(|| vec![format!("Error: {}", err.message)]);

        if let Some(handler) = &self.on_error {
            let context = BuildContext {
                input: &self.input,
                output: &self.output,
                error_file: &self.error_file,
            };
            handler(err, &lines, &context);
            return Ok(());
        }

        let text = lines.join("\n");
        tracing::error!(output = %self.output.file.display(), "Build failed\n{text}");
        self.write_marker(&text).await
    }

    async fn write_marker(&self, content: &str) -> Result<(), BuildError> {
        let marker_error = |source| BuildError::Marker {
            path: self.error_file.clone(),
            source,
        };

        if let Some(parent) = self.error_file.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(marker_error)?;
        }
        tokio::fs::write(&self.error_file, content)
            .await
            .map_err(marker_error)
    }
}

/// Error marker path for an output file (`app.js` -> `app.js.error`).
#[must_use]
pub fn error_marker_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(ERROR_MARKER_SUFFIX);
    PathBuf::from(path)
}
