//! Contains the system configuration.
//!
//! Provides access to the system configuration which is loaded from the **config/settings.yml**
//! file. Note that we observe this file for changes and reload it once a change is detected.
//! Components which can react on changes (like the [Server](crate::server::Server) which re-binds
//! its socket if the address changes) attach themselves to [Config::notifier](Config::notifier).
//!
//! All settings are optional. The following keys are recognized:
//!
//! ```yaml
//! server:
//!     # The IP to bind the server socket to.
//!     host: 0.0.0.0
//!     # The port to listen on (the port given on the command line takes precedence).
//!     port: 2410
//!     # Closes a connection which didn't send a complete request within this period.
//!     read_timeout: 30s
//! cache:
//!     # The capacity of the file cache (only read during startup).
//!     max_memory: 64m
//! ```
//!
//! Note that the **Config** struct itself can be obtained from the **Platform** once and then kept
//! around. However, the **Handle** returned by [Config::current](Config::current) should not be
//! stored, as it will not be updated once a new config has been loaded.
//!
//! # Examples
//!
//! ```
//! # use filecache::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! server:
//!     port: 12345
//!     read_timeout: 5s
//! ", None).unwrap();
//!
//! let handle = config.current();
//! assert_eq!(handle.query("server.port").as_i64(), Some(12345));
//! assert_eq!(handle.duration("server.read_timeout").unwrap().unwrap().as_secs(), 5);
//! assert_eq!(handle.query("server.host").as_str(), None);
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context};
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::{parse_duration, parse_size};
use crate::platform::Platform;

/// Provides access to the system configuration.
///
/// Most probably a config instance is installed by the [Builder](crate::builder::Builder) and
/// can be obtained via `platform.require::<Config>()`.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// Internally this is simply the receiver of a broadcast. The actual message being broadcast
/// can and should be ignored. All that matters is, once a message has been received, the config
/// was changed and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be stored or kept around for long, as it will not be updated
/// if the underlying config changed.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates a new config reading the given file.
    ///
    /// Note that this will neither load the file nor install a change listener. This is done by
    /// the [install](install) function.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// Within docker, the file is presented as volume. An unmounted volume shows up as directory,
    /// therefore we only accept regular files.
    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Forces the config to read the underlying file.
    ///
    /// A missing file is not an error, as all settings have sensible defaults.
    pub async fn load(&self) -> anyhow::Result<()> {
        let metadata = match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                log::info!(
                    "Config file {} doesn't exist - using default settings.",
                    &self.filename
                );
                return Ok(());
            }
        };

        log::info!("Loading config file {}...", &self.filename);
        let config_data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        self.load_from_string(config_data.as_str(), metadata.modified().ok())
    }

    /// Validates and writes the given config data into the underlying file.
    ///
    /// The change itself is picked up by the change monitor (or by calling [load](Config::load)).
    ///
    /// # Example
    ///
    /// ```
    /// # use filecache::config::Config;
    /// # #[tokio::main]
    /// # async fn main() {
    /// let config = Config::new("filecache_test_config.yml");
    ///
    /// assert_eq!(config.store("cache:\n    max_memory: 1m\n").await.is_ok(), true);
    /// assert_eq!(config.load().await.is_ok(), true);
    /// assert_eq!(config.current().size("cache.max_memory").unwrap(), Some(1024 * 1024));
    ///
    /// // Writing an invalid config file is prevented...
    /// assert_eq!(config.store("cache: \"test").await.is_err(), true);
    /// assert_eq!(config.load().await.is_ok(), true);
    /// assert_eq!(config.current().size("cache.max_memory").unwrap(), Some(1024 * 1024));
    ///
    /// # let _ = std::fs::remove_file("filecache_test_config.yml");
    /// # }
    /// ```
    pub async fn store(&self, config: &str) -> anyhow::Result<()> {
        log::info!(
            "Programmatically updating the config file {}...",
            &self.filename
        );

        let _ = YamlLoader::load_from_str(config)
            .map_err(|error| anyhow!("Cannot parse config data: {}", error))?;

        tokio::fs::write(&self.filename, config)
            .await
            .context("Failed to write to config file!")?;
        log::info!("Config has been updated successfully!");

        Ok(())
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// This is intended to be used in test environments where we cannot / do not want to load
    /// a config file from disk. A malformed document is rejected and the previous config remains
    /// active.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data)
            .map_err(|error| anyhow!("Cannot parse config file {}: {}", &self.filename, error))?;

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            None | Some(Yaml::Null) => Yaml::Null,
            Some(_) => {
                return Err(anyhow!(
                    "The config file {} has to contain an object at the top level.",
                    &self.filename
                ))
            }
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the currently loaded configuration.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Resolves a dotted path like **server.port** in the currently loaded configuration.
    ///
    /// Returns **Yaml::BadValue** if any part of the path is missing.
    pub fn query(&self, path: &str) -> &Yaml {
        path.split('.')
            .fold(&self.config.0, |node, segment| &node[segment])
    }

    /// Reads a size (like **64m** or a plain number of bytes) from the given path.
    ///
    /// Returns **Ok(None)** if no value is present and an error if the value cannot be parsed.
    pub fn size(&self, path: &str) -> anyhow::Result<Option<usize>> {
        match self.query(path) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            Yaml::Integer(value) => usize::try_from(*value)
                .map(Some)
                .map_err(|_| anyhow!("{} must not be negative", path)),
            Yaml::String(value) => parse_size(value).map(Some),
            other => Err(anyhow!("{} contains an invalid size: {:?}", path, other)),
        }
    }

    /// Reads a duration (like **30s**, or a plain number of milliseconds) from the given path.
    ///
    /// Returns **Ok(None)** if no value is present and an error if the value cannot be parsed.
    pub fn duration(&self, path: &str) -> anyhow::Result<Option<Duration>> {
        match self.query(path) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            Yaml::Integer(value) => u64::try_from(*value)
                .map(|millis| Some(Duration::from_millis(millis)))
                .map_err(|_| anyhow!("{} must not be negative", path)),
            Yaml::String(value) => parse_duration(value).map(Some),
            other => Err(anyhow!("{} contains an invalid duration: {:?}", path, other)),
        }
    }
}

/// Creates and installs a **Config** for the given platform.
///
/// This will read its contents from **config/settings.yml** and also install a change listener
/// for this file. Note that this listener will only watch the "last modified" date of the file.
///
/// Note that this method is also called by the [Builder](crate::builder::Builder) unless the
/// **Config** part is disabled.
pub async fn install(platform: Arc<Platform>) -> Arc<Config> {
    let path = Path::new("config");
    if let Err(error) = tokio::fs::create_dir_all(path).await {
        log::warn!(
            "Failed to create config base directory {}: {}",
            path.to_string_lossy(),
            error
        )
    }

    let config = Arc::new(Config::new("config/settings.yml"));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    run_config_change_monitor(platform, config.clone());

    config
}

#[cfg(test)]
fn run_config_change_monitor(_platform: Arc<Platform>, _config: Arc<Config>) {
    // No automatic updates during testing...
}

#[cfg(not(test))]
fn run_config_change_monitor(platform: Arc<Platform>, config: Arc<Config>) {
    crate::spawn!(async move {
        while platform.is_running() {
            tokio::time::sleep(Duration::from_secs(2)).await;

            let last_modified = config.last_modified().await;
            let last_loaded = config.config.load().1;

            // Reload if a file is present and either newer than the one previously loaded or if
            // none has been loaded so far...
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("System configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load system config: {:#}", error),
                }
            }
        }
    });
}
