//! Build closures for relive.
//!
//! This crate wraps an external bundler into reusable build actions:
//!
//! - [`Bundler`] / [`Artifact`]: the seam to the bundling engine
//! - [`BuildClosure`]: one build configuration, run as often as needed, with
//!   the previous artifact passed back as a cache hint
//! - [`format_error`]: deterministic multi-line diagnostics for bundler errors
//! - [`CommandBundler`]: a bundler backed by an esbuild-compatible executable
//!
//! Bundler failures never propagate out of [`BuildClosure::run`]. They are
//! written to `<output>.error`, which the live asset registry watches and
//! forwards to connected browsers. A successful build empties that file.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relive_build::{BuildClosure, BuildSpec, CommandBundler};
//!
//! let spec = BuildSpec::from_config(config.require_build()?, false);
//! let bundler = Arc::new(CommandBundler::new("esbuild", &spec.output));
//! let build = BuildClosure::timed(spec, bundler)?;
//! build.run().await?;
//! ```

mod bundler;
mod closure;
mod command;
mod format;

pub use bundler::{Artifact, BundleError, Bundler, InputOptions, Location, OutputOptions};
pub use closure::{
    BuildClosure, BuildContext, BuildError, BuildOptions, BuildOutcome, BuildSpec,
    ERROR_MARKER_SUFFIX, ErrorHandler, error_marker_path,
};
pub use command::{CommandBundler, local_bin};
pub use format::{Formatted, Join, error_lines, format_error};
pub use relive_config::ModuleFormat;
