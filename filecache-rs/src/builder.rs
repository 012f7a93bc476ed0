//! Provides a builder which can be used to setup and initialize the framework.
//!
//! This can be used to create and setup central parts of the framework. As some parts are
//! optional (e.g. a library user might only want the cache), a builder permits to selectively
//! enable or disable them.
//!
//! # Example
//! Setting up the framework with all features enabled:
//! ```no_run
//! # use filecache::builder::Builder;
//! # use filecache::files::ServingRoot;
//! # use filecache::server::Server;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Enable all features and build the platform...
//!     let platform = Builder::new()
//!         .enable_all()
//!         .serve(ServingRoot::new("/var/www")?)
//!         .build()
//!         .await;
//!
//!     // Start the main event loop of the server...
//!     platform.require::<Server>().event_loop().await;
//!
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use crate::files::ServingRoot;
use crate::platform::Platform;
use crate::{init_logging, FILECACHE_REVISION, FILECACHE_VERSION};

/// Initializes the framework by creating and initializing all core components.
///
/// Note that the [Server](crate::server::Server) can only serve requests if a root directory has
/// been provided via [serve](Builder::serve).
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_cache: bool,
    setup_server: bool,
    root: Option<ServingRoot>,
    port: Option<u16>,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    ///
    /// Note that using this method (and then maybe disabling selected components) is quite
    /// convenient, but be aware that new components which might be added in a library update
    /// will then also be enabled by default.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_cache = true;
        self.setup_server = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// Using this, we properly initialize **simplelog** to log to stdout. As we intend the
    /// server to be run in docker containers, this is all that is needed for proper logging.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the framework once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs [config::Config](crate::config::Config) and loads the **settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables setting up a **Config** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Creates and installs a [FileCache](crate::lru::cache::FileCache).
    ///
    /// Its capacity is read from **cache.max_memory** if a config is present.
    pub fn enable_cache(mut self) -> Self {
        self.setup_cache = true;
        self
    }

    /// Disables setting up the cache after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_cache(mut self) -> Self {
        self.setup_cache = false;
        self
    }

    /// Creates and installs a [Server](crate::server::Server) instance.
    ///
    /// Note that still, the main event loop has to be invoked manually via:
    /// `platform.require::<Server>().event_loop().await`.
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables setting up a **Server** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Specifies the directory from which files are served.
    pub fn serve(mut self, root: ServingRoot) -> Self {
        self.root = Some(root);
        self
    }

    /// Specifies the port to listen on. This takes precedence over **server.port** in the config.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builds the [Platform](crate::platform::Platform) registry with all the enabled components
    /// being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. FILECACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            FILECACHE_VERSION,
            FILECACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            let _ = crate::config::install(platform.clone()).await;
        }

        if let Some(root) = self.root {
            let _ = crate::files::install(&platform, root);
        }

        if self.setup_cache {
            let _ = crate::lru::cache::install(&platform);
        }

        if self.setup_server {
            let _ = crate::server::Server::install(&platform, self.port);
        }

        platform
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::files::ServingRoot;
    use crate::lru::cache::FileCache;
    use crate::server::Server;
    use crate::testing::test_async;

    #[test]
    fn only_enabled_components_are_installed() {
        test_async(async {
            let platform = Builder::new().enable_cache().build().await;
            assert_eq!(platform.find::<FileCache>().is_some(), true);
            assert_eq!(platform.find::<Server>().is_none(), true);
            assert_eq!(platform.find::<ServingRoot>().is_none(), true);

            let dir = tempfile::tempdir().unwrap();
            let platform = Builder::new()
                .enable_all()
                .disable_config()
                .disable_signals()
                .disable_server()
                .serve(ServingRoot::new(dir.path()).unwrap())
                .build()
                .await;
            assert_eq!(platform.find::<FileCache>().is_some(), true);
            assert_eq!(platform.find::<Server>().is_none(), true);
            assert_eq!(platform.find::<ServingRoot>().is_some(), true);
        });
    }
}
