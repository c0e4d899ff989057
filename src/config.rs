use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::catalog::{Answerer, Catalog, Unavailable};
use crate::error::{Result, VerbumError};
use crate::http::HttpBackend;
use crate::layout::LayoutConfig;
use crate::library::LocalLibrary;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the hierarchy, distances, documents and answers come from.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Backend base URL [default: http://127.0.0.1:5000]
    #[arg(long)]
    pub server: Option<String>,

    /// Browse a local documents directory instead of the server's catalog
    #[arg(long)]
    pub library: Option<PathBuf>,

    /// Reload the local library when files change
    #[arg(long, requires = "library")]
    pub watch: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// JSON file overriding layout parameters
    #[arg(long)]
    pub layout: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long = "log-level")]
    pub level: Option<String>,

    /// Append logs to this file
    #[arg(long = "log-file")]
    pub file: Option<PathBuf>,
}

/// Resolved source configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub server: String,
    /// True when `--server` was given rather than defaulted.
    pub server_explicit: bool,
    pub library: Option<PathBuf>,
    pub watch: bool,
    pub timeout: Duration,
    pub layout_file: Option<PathBuf>,
}

impl From<SourceArgs> for SourceConfig {
    fn from(args: SourceArgs) -> Self {
        let server_explicit = args.server.is_some();
        Self {
            server: args.server.unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            server_explicit,
            library: args.library,
            watch: args.watch,
            timeout: Duration::from_secs(args.timeout.max(1)),
            layout_file: args.layout,
        }
    }
}

/// The catalog and answerer a session talks to.
pub struct Backends {
    pub catalog: Arc<dyn Catalog>,
    pub answerer: Arc<dyn Answerer>,
    /// Set when browsing a local directory; the watcher's target.
    pub library_root: Option<PathBuf>,
}

impl SourceConfig {
    pub fn connect(&self) -> Result<Backends> {
        match &self.library {
            Some(root) => {
                let library = Arc::new(LocalLibrary::open(root)?);
                let answerer: Arc<dyn Answerer> = if self.server_explicit {
                    Arc::new(HttpBackend::new(&self.server, self.timeout)?)
                } else {
                    tracing::info!("No --server given; questions are disabled");
                    Arc::new(Unavailable)
                };
                Ok(Backends {
                    catalog: library,
                    answerer,
                    library_root: Some(root.clone()),
                })
            }
            None => {
                let backend = Arc::new(HttpBackend::new(&self.server, self.timeout)?);
                Ok(Backends {
                    catalog: backend.clone(),
                    answerer: backend,
                    library_root: None,
                })
            }
        }
    }

    pub fn layout_config(&self) -> Result<LayoutConfig> {
        match &self.layout_file {
            Some(path) => load_layout_config(path),
            None => Ok(LayoutConfig::default()),
        }
    }
}

/// Read layout overrides; missing fields keep their defaults.
pub fn load_layout_config(path: &Path) -> Result<LayoutConfig> {
    if !path.is_file() {
        return Err(VerbumError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path)?;
    let config: LayoutConfig = serde_json::from_str(&text)?;
    config.validate()?;
    tracing::debug!("Layout overrides from {}: {:?}", path.display(), config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        log: LogArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["verbum"]).unwrap();
        let config = SourceConfig::from(cli.source);
        assert_eq!(config.server, DEFAULT_SERVER);
        assert!(!config.server_explicit);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.library.is_none());
        assert!(cli.log.level.is_none());
    }

    #[test]
    fn test_watch_requires_library() {
        assert!(Cli::try_parse_from(["verbum", "--watch"]).is_err());
        let cli = Cli::try_parse_from(["verbum", "--library", "/docs", "--watch"]).unwrap();
        assert!(cli.source.watch);
    }

    #[test]
    fn test_local_library_without_server_has_no_answerer() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(["verbum", "--library", dir.path().to_str().unwrap()])
            .unwrap();
        let backends = SourceConfig::from(cli.source).connect().unwrap();
        assert_eq!(backends.library_root.as_deref(), Some(dir.path()));
        let request = crate::catalog::AskRequest {
            question: "why?".into(),
            document: "a.pdf".into(),
        };
        assert!(matches!(
            backends.answerer.ask(&request),
            Err(VerbumError::AnswererUnavailable)
        ));
    }

    #[test]
    fn test_layout_overrides_merge_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        fs::write(&path, r#"{ "iterations": 120, "distance_scale": 150.0 }"#).unwrap();

        let config = load_layout_config(&path).unwrap();
        assert_eq!(config.iterations, 120);
        assert_eq!(config.distance_scale, 150.0);
        assert_eq!(config.charge_strength, LayoutConfig::default().charge_strength);
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        fs::write(&path, r#"{ "iterations": 0 }"#).unwrap();
        assert!(load_layout_config(&path).is_err());
        assert!(load_layout_config(&dir.path().join("absent.json")).is_err());
    }
}
