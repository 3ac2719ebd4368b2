use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub mod themes;

pub use themes::{Palette, ThemeName};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Notedeck";
const APP_NAME: &str = "notedeck";

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_UPLOADS_URL: &str = "http://localhost:5000/uploads";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
    pub session_file: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        Self::resolve(None, None)
    }

    /// Like [`ConfigPaths::discover`], with explicit overrides taking
    /// precedence over the environment.
    pub fn resolve(config: Option<PathBuf>, data: Option<PathBuf>) -> Result<Self> {
        let override_config = config.or_else(|| env::var("NOTEDECK_CONFIG").ok().map(PathBuf::from));
        let override_data = data.or_else(|| env::var("NOTEDECK_DATA").ok().map(PathBuf::from));

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let (data_dir, cache_dir, state_dir) = match override_data {
            Some(root) => (root.clone(), root.join("cache"), root.join("state")),
            None => {
                let data_root = project_dirs.data_dir().to_path_buf();
                let state_dir = project_dirs
                    .state_dir()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| data_root.join("state"));
                (data_root, project_dirs.cache_dir().to_path_buf(), state_dir)
            }
        };
        let log_dir = state_dir.join("logs");
        let session_file = state_dir.join("session.json");

        Ok(Self {
            config_dir,
            config_file,
            data_dir,
            cache_dir,
            log_dir,
            state_dir,
            session_file,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.cache_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: ThemeName,
    pub preview_lines: u16,
    pub remote: RemoteOptions,
    pub dashboard: DashboardOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            preview_lines: 3,
            remote: RemoteOptions::default(),
            dashboard: DashboardOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self) {
        self.remote.normalize();
        if self.preview_lines == 0 {
            tracing::warn!("preview_lines must be at least 1, using 1");
            self.preview_lines = 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteOptions {
    pub base_url: String,
    pub uploads_url: String,
    /// Per-request timeout in seconds (0 = wait indefinitely)
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            uploads_url: DEFAULT_UPLOADS_URL.to_string(),
            timeout_secs: 30,
            workers: 2,
        }
    }
}

impl RemoteOptions {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    fn normalize(&mut self) {
        for (field, default) in [
            (&mut self.base_url, DEFAULT_BASE_URL),
            (&mut self.uploads_url, DEFAULT_UPLOADS_URL),
        ] {
            let trimmed = field.trim().trim_end_matches('/');
            *field = if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            };
        }
        if self.workers == 0 {
            tracing::warn!("remote.workers must be at least 1, using 1");
            self.workers = 1;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardOptions {
    pub show_archived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths_in(dir: &TempDir) -> anyhow::Result<ConfigPaths> {
        ConfigPaths::resolve(
            Some(dir.path().join("config.toml")),
            Some(dir.path().join("data")),
        )
    }

    #[test]
    fn first_run_writes_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let loader = ConfigLoader::with_paths(paths_in(&dir)?);
        let cfg = loader.load_or_init()?;
        assert_eq!(cfg.remote.base_url, DEFAULT_BASE_URL);
        assert!(loader.paths().config_file.exists());
        assert_eq!(
            loader.paths().session_file,
            dir.path().join("data/state/session.json")
        );

        let reloaded = loader.load()?;
        assert_eq!(reloaded.remote.workers, 2);
        assert_eq!(reloaded.theme, ThemeName::Dark);
        Ok(())
    }

    #[test]
    fn partial_config_is_normalised() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let paths = paths_in(&dir)?;
        fs::write(
            &paths.config_file,
            "theme = \"light\"\n[remote]\nbase_url = \"https://notes.example.com/api/\"\ntimeout_secs = 0\nworkers = 0\n",
        )?;
        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.theme, ThemeName::Light);
        assert_eq!(cfg.remote.base_url, "https://notes.example.com/api");
        assert_eq!(cfg.remote.uploads_url, DEFAULT_UPLOADS_URL);
        assert_eq!(cfg.remote.timeout(), None);
        assert_eq!(cfg.remote.workers, 1);
        assert!(!cfg.dashboard.show_archived);
        Ok(())
    }
}
