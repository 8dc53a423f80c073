//! Bundler backed by an esbuild-compatible executable.
//!
//! The executable is run once per build with the bundle printed to stdout.
//! Its stderr report (`✘ [ERROR] message`, `file:line:col:`, excerpt) is
//! parsed into a structured [`BundleError`]. AMD output is produced by
//! wrapping a `CommonJS` bundle.

use std::any::Any;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use relive_config::ModuleFormat;
use tokio::process::Command;

use crate::bundler::{Artifact, BundleError, Bundler, InputOptions, Location, OutputOptions};

static MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ERROR\]\s+(.+)").unwrap());

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+([^\s:][^:]*):(\d+):(\d+):\s*$").unwrap());

/// Bundler that shells out to an esbuild-compatible executable.
///
/// `amd` bundles are built as `CommonJS` and wrapped in a `define` call.
/// `iife` bundles with externals get a `require` banner that resolves each
/// external through the configured globals.
#[derive(Clone, Debug)]
pub struct CommandBundler {
    program: String,
    output: OutputOptions,
}

impl CommandBundler {
    /// Create a bundler running `program` for the given output shape.
    ///
    /// The module format, global name, globals and source map flag are fixed
    /// at construction because the executable needs them while bundling.
    #[must_use]
    pub fn new(program: impl Into<String>, output: &OutputOptions) -> Self {
        Self {
            program: program.into(),
            output: output.clone(),
        }
    }

    /// Command-line arguments for one invocation.
    fn args(&self, input: &InputOptions) -> Result<Vec<String>, BundleError> {
        let format = match self.output.format {
            ModuleFormat::Iife => "iife",
            ModuleFormat::Es => "esm",
            ModuleFormat::Cjs | ModuleFormat::Amd => "cjs",
        };

        let mut args = vec![
            input.entry.to_string_lossy().into_owned(),
            "--bundle".to_owned(),
            format!("--format={format}"),
            "--log-level=error".to_owned(),
            "--color=false".to_owned(),
        ];
        if self.output.format == ModuleFormat::Iife
            && let Some(name) = &self.output.name
        {
            args.push(format!("--global-name={name}"));
        }
        if self.output.sourcemap {
            args.push("--sourcemap=inline".to_owned());
        }
        args.extend(input.external.iter().map(|id| format!("--external:{id}")));
        if let Some(shim) = self.require_shim(input)? {
            args.push(format!("--banner:js={shim}"));
        }
        args.extend(input.plugins.iter().cloned());
        Ok(args)
    }

    /// `require` replacement mapping externals of an `iife` bundle to globals.
    fn require_shim(&self, input: &InputOptions) -> Result<Option<String>, BundleError> {
        if self.output.format != ModuleFormat::Iife || input.external.is_empty() {
            return Ok(None);
        }

        for id in self.output.globals.keys().filter(|id| !input.is_external(id)) {
            tracing::warn!(id = %id, "Global configured for a bundled module");
        }

        let mut cases = String::new();
        for id in &input.external {
            let Some(global) = self.output.global_for(id) else {
                return Err(BundleError::new(format!(
                    "no global configured for external module {id:?}"
                ))
                .with_code("MISSING_GLOBAL"));
            };
            cases.push_str(&format!("case {}:return {global};", js_string(id)));
        }
        Ok(Some(format!(
            "var require=function(id){{switch(id){{{cases}default:throw new Error(\"Cannot find module \"+id);}}}};"
        )))
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn bundle(
        &self,
        input: &InputOptions,
        _previous: Option<&dyn Artifact>,
    ) -> Result<Arc<dyn Artifact>, BundleError> {
        let args = self.args(input)?;
        tracing::debug!(program = %self.program, ?args, "Running bundler");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BundleError::new(format!("failed to run {}: {e}", self.program))
                    .with_code("SPAWN_FAILED")
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut err = parse_stderr(&stderr);
            err.id = Some(input.entry.to_string_lossy().into_owned());
            return Err(err);
        }

        let code = match self.output.format {
            ModuleFormat::Amd => {
                amd_module(self.output.name.as_deref(), &input.external, &output.stdout)
            }
            _ => output.stdout,
        };
        Ok(Arc::new(CommandArtifact { code }))
    }
}

/// Wrap a `CommonJS` bundle in an AMD `define` call.
///
/// Externals become dependencies and are handed to the bundle's `require`.
fn amd_module(name: Option<&str>, external: &[String], code: &[u8]) -> Vec<u8> {
    let deps: Vec<String> = external.iter().map(|id| js_string(id)).collect();
    let params: Vec<String> = (0..external.len()).map(|i| format!("__dep{i}")).collect();
    let table: Vec<String> = deps
        .iter()
        .zip(&params)
        .map(|(dep, param)| format!("{dep}:{param}"))
        .collect();
    let id = name.map(|n| format!("{},", js_string(n))).unwrap_or_default();

    // Header stays on one line so source map line numbers are unchanged.
    let header = format!(
        "define({id}[{}],function({}){{var __deps={{{}}};\
         var require=function(id){{if(id in __deps)return __deps[id];throw new Error(\"Cannot find module \"+id);}};\
         var module={{exports:{{}}}},exports=module.exports;",
        deps.join(","),
        params.join(","),
        table.join(","),
    );

    let mut wrapped = header.into_bytes();
    wrapped.extend_from_slice(code);
    wrapped.extend_from_slice(b"\nreturn module.exports;\n});\n");
    wrapped
}

/// JavaScript string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Bundle captured from the executable's stdout.
struct CommandArtifact {
    code: Vec<u8>,
}

#[async_trait]
impl Artifact for CommandArtifact {
    async fn write(&self, output: &OutputOptions) -> Result<(), BundleError> {
        let io_error = |e: std::io::Error| {
            BundleError::new(format!("failed to write {}: {e}", output.file.display()))
                .with_code("WRITE_FAILED")
        };

        if let Some(parent) = output.file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(&output.file, &self.code)
            .await
            .map_err(io_error)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parse the executable's error report.
fn parse_stderr(stderr: &str) -> BundleError {
    let message = MESSAGE_RE
        .captures(stderr)
        .map(|c| c[1].trim().to_owned())
        .or_else(|| {
            stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "bundler exited with an error".to_owned());

    let mut err = BundleError::new(message);

    let mut lines = stderr.lines();
    let location = lines.by_ref().find_map(|line| {
        let caps = LOCATION_RE.captures(line)?;
        Some(Location {
            file: Some(caps[1].to_owned()),
            line: caps[2].parse().ok()?,
            column: caps[3].parse().ok()?,
        })
    });

    if let Some(loc) = location {
        let frame: Vec<&str> = lines.take_while(|l| !l.trim().is_empty()).collect();
        if !frame.is_empty() {
            err.frame = Some(frame.join("\n"));
        }
        err.loc = Some(loc);
    }

    err
}

/// Path of the executable relative to a project's `node_modules`.
#[must_use]
pub fn local_bin(project_dir: &std::path::Path, program: &str) -> PathBuf {
    project_dir.join("node_modules").join(".bin").join(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = "✘ [ERROR] Could not resolve \"foo\"\n\
                          \n    src/main.js:1:7:\n      1 │ import \"foo\"\n        ╵        ~~~~~\n\
                          \n1 error\n";

    fn output(format: ModuleFormat) -> OutputOptions {
        OutputOptions {
            format,
            name: Some("app".to_owned()),
            file: PathBuf::from("out/app.js"),
            sourcemap: true,
            ..OutputOptions::default()
        }
    }

    #[test]
    fn test_parse_full_report() {
        let err = parse_stderr(REPORT);
        assert_eq!(err.message, "Could not resolve \"foo\"");
        assert_eq!(
            err.loc,
            Some(Location {
                file: Some("src/main.js".to_owned()),
                line: 1,
                column: 7,
            })
        );
        assert_eq!(
            err.frame.as_deref(),
            Some("      1 │ import \"foo\"\n        ╵        ~~~~~")
        );
    }

    #[test]
    fn test_parse_unstructured_report() {
        let err = parse_stderr("\nsomething went badly\nmore\n");
        assert_eq!(err.message, "something went badly");
        assert_eq!(err.loc, None);
        assert_eq!(err.frame, None);
    }

    #[test]
    fn test_parse_empty_report() {
        let err = parse_stderr("");
        assert_eq!(err.message, "bundler exited with an error");
    }

    #[test]
    fn test_args_iife() {
        let mut out = output(ModuleFormat::Iife);
        out.globals.insert("jquery".to_owned(), "$".to_owned());
        let bundler = CommandBundler::new("esbuild", &out);
        let input = InputOptions {
            entry: PathBuf::from("src/main.js"),
            plugins: vec!["--target=es2017".to_owned()],
            external: vec!["jquery".to_owned()],
        };

        let args = bundler.args(&input).unwrap();
        assert_eq!(
            args,
            vec![
                "src/main.js",
                "--bundle",
                "--format=iife",
                "--log-level=error",
                "--color=false",
                "--global-name=app",
                "--sourcemap=inline",
                "--external:jquery",
                "--banner:js=var require=function(id){switch(id){case \"jquery\":return $;\
                 default:throw new Error(\"Cannot find module \"+id);}};",
                "--target=es2017",
            ]
        );
    }

    #[test]
    fn test_args_iife_without_externals_has_no_banner() {
        let mut out = output(ModuleFormat::Iife);
        out.globals.insert("jquery".to_owned(), "$".to_owned());
        let bundler = CommandBundler::new("esbuild", &out);

        let args = bundler
            .args(&InputOptions {
                entry: PathBuf::from("main.js"),
                ..InputOptions::default()
            })
            .unwrap();
        assert!(!args.iter().any(|a| a.starts_with("--banner")));
    }

    #[test]
    fn test_args_iife_external_without_global() {
        let bundler = CommandBundler::new("esbuild", &output(ModuleFormat::Iife));
        let input = InputOptions {
            entry: PathBuf::from("main.js"),
            external: vec!["jquery".to_owned()],
            ..InputOptions::default()
        };

        let err = bundler.args(&input).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("MISSING_GLOBAL"));
    }

    #[test]
    fn test_args_cjs_keeps_require() {
        let mut out = output(ModuleFormat::Cjs);
        out.globals.insert("jquery".to_owned(), "$".to_owned());
        let bundler = CommandBundler::new("esbuild", &out);
        let input = InputOptions {
            entry: PathBuf::from("main.js"),
            external: vec!["jquery".to_owned()],
            ..InputOptions::default()
        };

        let args = bundler.args(&input).unwrap();
        assert!(args.contains(&"--format=cjs".to_owned()));
        assert!(!args.iter().any(|a| a.starts_with("--banner")));
    }

    #[test]
    fn test_args_es_has_no_global_name() {
        let bundler = CommandBundler::new("esbuild", &output(ModuleFormat::Es));
        let args = bundler
            .args(&InputOptions {
                entry: PathBuf::from("main.js"),
                ..InputOptions::default()
            })
            .unwrap();
        assert!(args.contains(&"--format=esm".to_owned()));
        assert!(!args.iter().any(|a| a.starts_with("--global-name")));
    }

    #[test]
    fn test_args_amd_builds_commonjs() {
        let bundler = CommandBundler::new("esbuild", &output(ModuleFormat::Amd));
        let input = InputOptions {
            entry: PathBuf::from("main.js"),
            external: vec!["jquery".to_owned()],
            ..InputOptions::default()
        };

        let args = bundler.args(&input).unwrap();
        assert!(args.contains(&"--format=cjs".to_owned()));
        assert!(args.contains(&"--external:jquery".to_owned()));
        assert!(!args.iter().any(|a| a.starts_with("--global-name")));
        assert!(!args.iter().any(|a| a.starts_with("--banner")));
    }

    #[test]
    fn test_amd_module_wraps_bundle() {
        let external = vec!["jquery".to_owned(), "lodash".to_owned()];
        let code = amd_module(Some("app"), &external, b"module.exports=require(\"jquery\");");
        let text = String::from_utf8(code).unwrap();

        assert_eq!(
            text,
            "define(\"app\",[\"jquery\",\"lodash\"],function(__dep0,__dep1){\
             var __deps={\"jquery\":__dep0,\"lodash\":__dep1};\
             var require=function(id){if(id in __deps)return __deps[id];\
             throw new Error(\"Cannot find module \"+id);};\
             var module={exports:{}},exports=module.exports;\
             module.exports=require(\"jquery\");\n\
             return module.exports;\n});\n"
        );
    }

    #[test]
    fn test_amd_module_anonymous_without_deps() {
        let text = String::from_utf8(amd_module(None, &[], b"exports.a=1;")).unwrap();

        assert!(text.starts_with("define([],function(){var __deps={};"));
        assert!(text.contains("exports.a=1;\nreturn module.exports;"));
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_missing_program_reports_spawn_failure() {
        let bundler = CommandBundler::new(
            "relive-definitely-not-a-real-bundler",
            &output(ModuleFormat::Iife),
        );
        let input = InputOptions {
            entry: PathBuf::from("main.js"),
            ..InputOptions::default()
        };

        let err = bundler.bundle(&input, None).await.err().unwrap();
        assert_eq!(err.code.as_deref(), Some("SPAWN_FAILED"));
    }

    #[test]
    fn test_local_bin() {
        assert_eq!(
            local_bin(std::path::Path::new("/p"), "esbuild"),
            PathBuf::from("/p/node_modules/.bin/esbuild")
        );
    }
}
