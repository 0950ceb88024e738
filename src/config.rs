//! Effective configuration: command line over config file over built-in defaults.

use crate::bootstrap::{
    BootstrapSource, FileBootstrapSource, HttpBootstrapSource, RetryPolicy, StaticBootstrapSource,
};
use crate::cli::Cli;
use crate::model::{GlobalData, Props, ViewHandle};
use crate::router::loader::{FixtureLoader, HttpLoader};
use crate::router::{PageDescriptor, RouteTable};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LOADER_TIMEOUT: Duration = Duration::from_secs(10);

/// On-disk config (`config.toml`). Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_base: Option<String>,
    /// The user's `general.theme` setting.
    pub theme: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub loader_timeout: Option<Duration>,
    pub support_app_id: Option<String>,
    pub global_data: Option<PathBuf>,
    #[serde(default)]
    pub bootstrap: BootstrapFileConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapFileConfig {
    pub attempts: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub backoff: Option<Duration>,
}

/// Extra route appended after the built-in ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub path: String,
    pub view: String,
    #[serde(default)]
    pub loader: Option<LoaderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoaderConfig {
    Fixture {
        #[serde(default, with = "humantime_serde")]
        delay: Duration,
        #[serde(default)]
        props: Props,
        #[serde(default)]
        fail: Option<String>,
    },
    /// Fetch props from `{api_base}/api/pages{pathname}{search}`.
    Http,
}

/// Resolved settings for a session.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base: Option<String>,
    pub theme: Option<String>,
    pub loader_timeout: Option<Duration>,
    pub support_app_id: Option<String>,
    pub global_data: Option<PathBuf>,
    pub bootstrap: RetryPolicy,
    pub routes: Vec<RouteConfig>,
    pub user_agent: String,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("navctl").join("config.toml"))
}

pub fn parse_file_config(raw: &str) -> Result<FileConfig> {
    toml::from_str(raw).context("invalid config")
}

/// Explicit `--config` must exist; the default location is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(FileConfig::default()),
        },
    };
    let raw =
        std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    parse_file_config(&raw).with_context(|| format!("in {}", path.display()))
}

/// Merge command line and file config.
pub fn build_config(args: &Cli, file: FileConfig) -> AppConfig {
    let defaults = RetryPolicy::default();
    // "0s" on the command line or in the file disables the timeout.
    let loader_timeout = args
        .loader_timeout
        .map(Duration::from)
        .or(file.loader_timeout)
        .unwrap_or(DEFAULT_LOADER_TIMEOUT);

    AppConfig {
        api_base: args.api_base.clone().or(file.api_base),
        theme: args.theme.clone().or(file.theme),
        loader_timeout: (!loader_timeout.is_zero()).then_some(loader_timeout),
        support_app_id: args.support_app_id.clone().or(file.support_app_id),
        global_data: args.global_data.clone().or(file.global_data),
        bootstrap: RetryPolicy {
            attempts: args
                .bootstrap_attempts
                .or(file.bootstrap.attempts)
                .unwrap_or(defaults.attempts)
                .max(1),
            backoff: args
                .bootstrap_backoff
                .map(Duration::from)
                .or(file.bootstrap.backoff)
                .unwrap_or(defaults.backoff),
        },
        routes: file.routes,
        user_agent: format!("navctl/{}", env!("CARGO_PKG_VERSION")),
    }
}

impl AppConfig {
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .build()
            .context("build HTTP client")
    }

    /// Built-in routes followed by configured ones.
    pub fn route_table(&self, http: &reqwest::Client) -> Result<RouteTable> {
        let mut builder = RouteTable::defaults();
        for route in &self.routes {
            if !route.path.starts_with('/') {
                bail!("route path {:?} must start with '/'", route.path);
            }
            let mut descriptor = PageDescriptor::new(ViewHandle::new(route.view.clone()));
            match &route.loader {
                None => {}
                Some(LoaderConfig::Fixture { delay, props, fail }) => {
                    descriptor = descriptor.with_loader(Arc::new(FixtureLoader {
                        delay: *delay,
                        props: props.clone(),
                        fail: fail.clone(),
                    }));
                }
                Some(LoaderConfig::Http) => {
                    let Some(base) = self.api_base.as_deref() else {
                        bail!("route {} uses an http loader but no api_base is set", route.path);
                    };
                    descriptor =
                        descriptor.with_loader(Arc::new(HttpLoader::new(http.clone(), base)));
                }
            }
            builder = builder.route(&route.path, descriptor);
        }
        Ok(builder.build())
    }

    /// Fixture file beats the API; with neither the session is anonymous.
    pub fn bootstrap_source(&self, http: &reqwest::Client) -> Arc<dyn BootstrapSource> {
        match (&self.global_data, &self.api_base) {
            (Some(path), _) => Arc::new(FileBootstrapSource::new(path)),
            (None, Some(base)) => Arc::new(HttpBootstrapSource::new(http.clone(), base.clone())),
            (None, None) => Arc::new(StaticBootstrapSource(GlobalData::default())),
        }
    }
}
