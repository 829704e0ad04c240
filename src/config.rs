use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::candidates::{BocmConventions, DEFAULT_MAX_ISSUE};
use crate::documents::BOCM_SOURCE_ID;
use crate::error::Result;
use crate::reconcile::STALE_AFTER_DAYS;
use crate::resolver::ResolverOptions;

pub const CONFIG_FILE: &str = "bocm.toml";
pub const ENV_PREFIX: &str = "BOCM";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Runtime settings: defaults, then `bocm.toml`, then `BOCM_*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub max_issue: u32,
    pub batch_size: usize,
    pub max_workers: usize,
    pub probe_timeout_ms: u64,
    pub batch_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub knowledge_path: PathBuf,
    pub documents_dir: PathBuf,
    pub stale_after_days: i64,
    pub source_id: u32,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://www.bocm.es".into(),
            max_issue: DEFAULT_MAX_ISSUE,
            batch_size: 100,
            max_workers: 50,
            probe_timeout_ms: 2000,
            batch_timeout_secs: 20,
            download_timeout_secs: 30,
            knowledge_path: PathBuf::from("codigos_convenios.json"),
            documents_dir: PathBuf::from("convenios_bocm"),
            stale_after_days: STALE_AFTER_DAYS,
            source_id: BOCM_SOURCE_ID,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl Settings {
    /// `bocm.toml` in the working directory (optional) plus environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(file: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            batch_size: self.batch_size.max(1),
            max_workers: self.max_workers.max(1),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
        }
    }

    pub fn conventions(&self) -> BocmConventions {
        BocmConventions::new(&self.base_url, self.max_issue)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
