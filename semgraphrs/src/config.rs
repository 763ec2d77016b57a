//! Configuration system for semgraph.
//!
//! TOML-based, every section optional with built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dialect::{Dialect, DialectKind};
use crate::error::{Result, SemgraphError};
use crate::join_graph::PathMode;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SemgraphConfig {
    pub compiler: CompilerConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub model: ModelConfig,
}

/// Query compilation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Dialect used when a request names none (default: duckdb).
    pub default_dialect: String,
    /// Fail on equally short join paths instead of tie-breaking.
    pub strict_join_paths: bool,
    /// Row limit applied when the request has none (0 = no limit).
    pub default_row_limit: u64,
    /// Upper bound for any requested limit (0 = unlimited).
    pub max_row_limit: u64,
}

/// Execution boundary settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum concurrent queries per executor (default: 16).
    pub max_concurrency: usize,
    /// Query timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Include targets in formatted output.
    pub with_target: bool,
    pub ansi: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory of YAML definition files.
    pub dir: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_dialect: "duckdb".to_string(),
            strict_join_paths: false,
            default_row_limit: 0,
            max_row_limit: 0,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            timeout_ms: 30_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl CompilerConfig {
    pub fn path_mode(&self) -> PathMode {
        if self.strict_join_paths {
            PathMode::Strict
        } else {
            PathMode::TieBreak
        }
    }

    pub fn dialect(&self) -> Result<&'static dyn Dialect> {
        Ok(self.default_dialect.parse::<DialectKind>()?.dialect())
    }

    /// Effective limit for a request: defaulted, then clamped to the maximum.
    pub fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        let limit = requested.or((self.default_row_limit > 0).then_some(self.default_row_limit));
        let max = self.max_row_limit;
        match limit {
            _ if max == 0 => limit,
            Some(l) if l > max => {
                tracing::warn!(
                    requested = l,
                    max,
                    "row limit clamped to configured maximum"
                );
                Some(max)
            }
            Some(l) => Some(l),
            None => Some(max),
        }
    }
}

impl SemgraphConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SemgraphError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| SemgraphError::Config(format!("failed to parse config: {e}")))?;
        config.compiler.dialect()?;
        Ok(config)
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `SEMGRAPH_CONFIG` environment variable
    /// 2. `./semgraph.toml` (current directory)
    /// 3. `~/.config/semgraph/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("SEMGRAPH_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from SEMGRAPH_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring SEMGRAPH_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("semgraph.toml") {
            tracing::info!("loaded config from ./semgraph.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("semgraph").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_default_config() {
        let config = SemgraphConfig::default();
        assert_eq!(config.compiler.default_dialect, "duckdb");
        assert!(!config.compiler.strict_join_paths);
        assert_eq!(config.execution.max_concurrency, 16);
        assert_eq!(config.compiler.effective_limit(None), None);
    }

    #[test]
    fn test_parse_toml() {
        let config = SemgraphConfig::from_toml(
            r#"
[compiler]
default_dialect = "postgres"
strict_join_paths = true
default_row_limit = 100
max_row_limit = 500

[model]
dir = "models"
"#,
        )
        .unwrap();
        assert_eq!(config.compiler.dialect().unwrap().name(), "postgres");
        assert_eq!(config.compiler.path_mode(), PathMode::Strict);
        assert_eq!(config.compiler.effective_limit(None), Some(100));
        assert_eq!(config.compiler.effective_limit(Some(50)), Some(50));
        assert_eq!(config.compiler.effective_limit(Some(10_000)), Some(500));
        assert_eq!(config.model.dir, Some(PathBuf::from("models")));
        assert_eq!(config.logging.level, "info");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_during(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_limit_clamp_warns_only_when_exceeded() {
        let config = CompilerConfig {
            max_row_limit: 500,
            ..CompilerConfig::default()
        };

        let quiet = logs_during(|| {
            assert_eq!(config.effective_limit(None), Some(500));
            assert_eq!(config.effective_limit(Some(20)), Some(20));
            assert_eq!(config.effective_limit(Some(500)), Some(500));
        });
        assert!(quiet.is_empty(), "unexpected log output: {quiet}");

        let clamped = logs_during(|| {
            assert_eq!(config.effective_limit(Some(501)), Some(500));
        });
        assert!(clamped.contains("row limit clamped"), "{clamped}");
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let err = SemgraphConfig::from_toml("[compiler]\ndefault_dialect = \"oracle\"").unwrap_err();
        assert!(matches!(err, SemgraphError::UnknownDialect(_)));
    }
}
