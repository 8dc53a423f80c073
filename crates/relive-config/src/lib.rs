//! Configuration management for relive.
//!
//! Parses `relive.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `live.web_root`
//! - `build.command`
//!
//! ## Toggle Options
//!
//! `live.route` and `live.view` accept either a string or a boolean. They are
//! resolved once at load time: `true` selects the default value, `false`
//! disables the feature, and a string is used verbatim.

mod expand;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override web root directory.
    pub web_root: Option<PathBuf>,
    /// Force production (or development) mode.
    pub production: Option<bool>,
}

/// Configuration filename to search for.
pub const CONFIG_FILENAME: &str = "relive.toml";

/// Default route of the live notification endpoint.
pub const DEFAULT_LIVE_ROUTE: &str = "/__live__";

/// Default template extension handled by the render hook.
pub const DEFAULT_VIEW_EXTENSION: &str = "html";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Live asset configuration (paths and toggles as written in TOML).
    live: LiveConfigRaw,
    /// Build configuration (optional section).
    build: Option<BuildConfigRaw>,
    /// Watch configuration.
    pub watch: WatchConfig,

    /// Resolved live configuration (set after loading).
    #[serde(skip)]
    pub live_resolved: LiveConfig,
    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: Option<BuildConfig>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8035,
        }
    }
}

/// A value that is either a boolean switch or an explicit string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
enum Toggle {
    Flag(bool),
    Value(String),
}

impl Toggle {
    /// Resolve into the canonical representation.
    fn resolve(toggle: Option<&Self>, default: &str) -> Option<String> {
        match toggle {
            None | Some(Self::Flag(true)) => Some(default.to_owned()),
            Some(Self::Flag(false)) => None,
            Some(Self::Value(value)) => Some(value.clone()),
        }
    }
}

/// Raw live configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LiveConfigRaw {
    web_root: Option<String>,
    production: Option<bool>,
    route: Option<Toggle>,
    view: Option<Toggle>,
}

/// Resolved live asset configuration.
#[derive(Debug, Default, Clone)]
pub struct LiveConfig {
    /// Directory served to browsers and scanned for marker files.
    pub web_root: PathBuf,
    /// Explicit production flag (`None` falls back to the environment).
    pub production: Option<bool>,
    /// Route of the live notification endpoint (`None` disables it).
    pub route: Option<String>,
    /// Template extension for the render hook (`None` disables it).
    pub view: Option<String>,
}

/// Output module format of a bundle.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// Immediately-invoked function expression assigning a global.
    #[default]
    Iife,
    /// Asynchronous module definition.
    Amd,
    /// ECMAScript module.
    Es,
    /// `CommonJS` module.
    Cjs,
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Iife => "iife",
            Self::Amd => "amd",
            Self::Es => "es",
            Self::Cjs => "cjs",
        };
        f.write_str(name)
    }
}

/// Raw build configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    entry: Option<String>,
    out_dir: Option<String>,
    name: Option<String>,
    format: ModuleFormat,
    suffix: Option<String>,
    sourcemap: Option<bool>,
    globals: BTreeMap<String, String>,
    external: Vec<String>,
    command: Option<String>,
}

/// Resolved build configuration with absolute paths.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Entry module path.
    pub entry: PathBuf,
    /// Directory receiving the bundle.
    pub out_dir: PathBuf,
    /// Global name for `iife`/`amd` bundles.
    pub name: Option<String>,
    /// Output module format.
    pub format: ModuleFormat,
    /// Filename suffix (`None` picks `.min` in production).
    pub suffix: Option<String>,
    /// Whether to emit source maps.
    pub sourcemap: bool,
    /// Module id to global variable mapping.
    pub globals: BTreeMap<String, String>,
    /// Module ids left out of the bundle.
    pub external: Vec<String>,
    /// External bundler executable.
    pub command: String,
}

/// Watch configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Glob patterns (relative to the config directory) triggering rebuilds.
    pub patterns: Vec<String>,
    /// Use polling instead of native filesystem events.
    pub use_polling: bool,
    /// Polling interval in milliseconds.
    pub interval_ms: u64,
    /// Rebuild coalescing window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["src/**/*".to_owned()],
            use_polling: false,
            interval_ms: 100,
            debounce_ms: 50,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`build.command`").
        field: String,
        /// Error message (e.g., "${`BUNDLER`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `relive.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(web_root) = &settings.web_root {
            self.live_resolved.web_root.clone_from(web_root);
        }
        if let Some(production) = settings.production {
            self.live_resolved.production = Some(production);
        }
    }

    /// Get the build configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the `[build]` section is missing.
    pub fn require_build(&self) -> Result<&BuildConfig, ConfigError> {
        self.build_resolved
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("[build] section required in config".into()))
    }

    /// Directory that relative watch patterns are evaluated against.
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default()
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            live: LiveConfigRaw::default(),
            build: None,
            watch: WatchConfig::default(),
            live_resolved: LiveConfig {
                web_root: base.join("public"),
                production: None,
                route: Some(DEFAULT_LIVE_ROUTE.to_owned()),
                view: Some(DEFAULT_VIEW_EXTENSION.to_owned()),
            },
            build_resolved: None,
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        if let Some(route) = &self.live_resolved.route
            && !route.starts_with('/')
        {
            return Err(ConfigError::Validation(format!(
                "live.route must start with '/', got {route:?}"
            )));
        }
        if let Some(view) = &self.live_resolved.view {
            require_non_empty(view, "live.view")?;
        }

        if let Some(build) = &self.build_resolved {
            require_non_empty(&build.command, "build.command")?;
        }

        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref web_root) = self.live.web_root {
            self.live.web_root = Some(expand::expand_env(web_root, "live.web_root")?);
        }

        if let Some(ref mut build) = self.build
            && let Some(ref command) = build.command
        {
            build.command = Some(expand::expand_env(command, "build.command")?);
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    ///
    /// Validates that `entry` is provided when the `[build]` section exists.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.live_resolved = LiveConfig {
            web_root: resolve(self.live.web_root.as_deref(), "public"),
            production: self.live.production,
            route: Toggle::resolve(self.live.route.as_ref(), DEFAULT_LIVE_ROUTE),
            view: Toggle::resolve(self.live.view.as_ref(), DEFAULT_VIEW_EXTENSION),
        };

        self.build_resolved = match &self.build {
            Some(build) => {
                let entry = build.entry.as_deref().filter(|e| !e.is_empty()).ok_or_else(|| {
                    ConfigError::Validation("[build] section requires entry to be set".to_owned())
                })?;
                Some(BuildConfig {
                    entry: config_dir.join(entry),
                    out_dir: resolve(build.out_dir.as_deref(), "public/build"),
                    name: build.name.clone(),
                    format: build.format,
                    suffix: build.suffix.clone(),
                    sourcemap: build.sourcemap.unwrap_or(true),
                    globals: build.globals.clone(),
                    external: build.external.clone(),
                    command: build.command.clone().unwrap_or_else(|| "esbuild".to_owned()),
                })
            }
            None => None,
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8035);
        assert_eq!(config.live_resolved.web_root, PathBuf::from("/test/public"));
        assert_eq!(config.live_resolved.route.as_deref(), Some("/__live__"));
        assert_eq!(config.live_resolved.view.as_deref(), Some("html"));
        assert_eq!(config.live_resolved.production, None);
        assert!(config.build_resolved.is_none());
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn test_parse_minimal_config() {
        let mut config: Config = toml::from_str("").unwrap();
        config.resolve_paths(Path::new("/project")).unwrap();
        assert_eq!(config.server.port, 8035);
        assert_eq!(config.live_resolved.web_root, PathBuf::from("/project/public"));
    }

    #[test]
    fn test_toggle_false_disables_route_and_view() {
        let toml = r"
[live]
route = false
view = false
";
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project")).unwrap();
        assert_eq!(config.live_resolved.route, None);
        assert_eq!(config.live_resolved.view, None);
    }

    #[test]
    fn test_toggle_true_selects_defaults() {
        let toml = r"
[live]
route = true
view = true
";
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project")).unwrap();
        assert_eq!(config.live_resolved.route.as_deref(), Some("/__live__"));
        assert_eq!(config.live_resolved.view.as_deref(), Some("html"));
    }

    #[test]
    fn test_toggle_string_used_verbatim() {
        let toml = r#"
[live]
web_root = "site"
production = true
route = "/live"
view = "htm"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project")).unwrap();
        assert_eq!(config.live_resolved.web_root, PathBuf::from("/project/site"));
        assert_eq!(config.live_resolved.production, Some(true));
        assert_eq!(config.live_resolved.route.as_deref(), Some("/live"));
        assert_eq!(config.live_resolved.view.as_deref(), Some("htm"));
    }

    #[test]
    fn test_parse_build_config() {
        let toml = r#"
[build]
entry = "src/main.js"
out_dir = "public/js"
name = "app"
format = "amd"
external = ["jquery"]

[build.globals]
jquery = "$"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project")).unwrap();

        let build = config.require_build().unwrap();
        assert_eq!(build.entry, PathBuf::from("/project/src/main.js"));
        assert_eq!(build.out_dir, PathBuf::from("/project/public/js"));
        assert_eq!(build.name.as_deref(), Some("app"));
        assert_eq!(build.format, ModuleFormat::Amd);
        assert_eq!(build.suffix, None);
        assert!(build.sourcemap);
        assert_eq!(build.external, vec!["jquery".to_owned()]);
        assert_eq!(build.globals.get("jquery").map(String::as_str), Some("$"));
        assert_eq!(build.command, "esbuild");
    }

    #[test]
    fn test_build_section_requires_entry() {
        let toml = r#"
[build]
out_dir = "dist"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.resolve_paths(Path::new("/project")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("entry"));
    }

    #[test]
    fn test_unknown_format_is_parse_error() {
        let toml = r#"
[build]
entry = "main.js"
format = "umd"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_require_build_missing() {
        let config = Config::default_with_base(Path::new("/test"));
        let err = config.require_build().unwrap_err();
        assert!(err.to_string().contains("[build]"));
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            port: Some(9000),
            web_root: Some(PathBuf::from("/srv/www")),
            production: Some(true),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.live_resolved.web_root, PathBuf::from("/srv/www"));
        assert_eq!(config.live_resolved.production, Some(true));
    }

    #[test]
    fn test_validate_rejects_relative_route() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_resolved.route = Some("live".to_owned());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_debounce() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.watch.debounce_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_sets_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[server]\nport = 9100\n\n[watch]\npatterns = [\"js/**/*.js\"]\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.base_dir(), dir.path());
        assert_eq!(config.watch.patterns, vec!["js/**/*.js".to_owned()]);
        assert_eq!(config.live_resolved.web_root, dir.path().join("public"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/relive.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
