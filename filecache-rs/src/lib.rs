//! Filecache is a library for serving files from a directory via a minimal TCP protocol, backed by
//! a size bounded in-memory LRU cache.
//!
//! # Introduction
//! A client connects, sends the name of a file (relative to the serving root) terminated by a
//! newline and receives the raw contents of the file. Afterwards the connection is closed. There is
//! no status code and no length prefix - an empty response simply means that the file wasn't
//! found. This permits to use the most simple tools as clients, e.g.
//! `echo "index.html" | nc localhost 2410`.
//!
//! Frequently requested files are kept in memory. The cache is limited by the total size of its
//! contents (64,000,000 bytes by default, see **cache.max_memory**). Once it is full, the least
//! recently used files are evicted.
//!
//! # Features
//! * **100% Async/Await** - the whole server builds upon [tokio](https://tokio.rs/). Each
//!   connection is handled in its own task. The cache is maintained by an actor, therefore no
//!   locks are held while talking to clients.
//! * **Traversal safe** - requested names are treated as untrusted input. Names which would leave
//!   the serving root (via `..`, absolute paths or symbolic links) are rejected and logged. See
//!   [files](crate::files).
//! * **Reload-aware config facility** which permits to update the configuration during operation.
//!   Even the IP binding or port can be changed without a restart.
//!
//! # Modules
//! * **LRU-Cache**: A size constrained cache for file contents. See [crate::lru].
//! * **Files**: Maps requested names onto files below the serving root. See [crate::files].
//! * **Server**: Accepts connections and processes requests. See [crate::server] and
//!   [crate::handler].
//! * **Client**: Fetches a single file from a server. See [crate::client].
//!
//! # Examples
//! A short example on how to initialize the library can be found here [Builder](builder::Builder).
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod client;
pub mod config;
pub mod files;
pub mod fmt;
pub mod handler;
pub mod lru;
pub mod platform;
pub mod request;
pub mod server;
pub mod signals;

/// Contains the version of the Filecache library.
pub const FILECACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Filecache build being used.
pub const FILECACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// framework, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the integration tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned handle to make
/// clippy happy.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate filecache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}

#[cfg(test)]
mod testing {
    use std::sync::Mutex;

    lazy_static::lazy_static! {
        /// Provides a global lock which has to be acquired if a test operates on shared
        /// resources. This is our test port (1503) on which we start our local server for
        /// integrations tests. Using this lock, we can still execute all other tests in
        /// parallel and only block if required.
        pub static ref SHARED_TEST_RESOURCES: Mutex<()> = Mutex::new(());
    }

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }
}
