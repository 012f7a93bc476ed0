//! Contains the server component which accepts client connections.
//!
//! Opens a server socket on the selected port (the port passed to
//! [Builder::port](crate::builder::Builder::port), **server.port** in the config or 2410 as
//! fallback) and binds it to the selected IP (**server.host** in the config or 0.0.0.0 as
//! fallback). Each accepted connection is handed over to its own task which processes exactly one
//! request (see [handler](crate::handler)).
//!
//! Just like any other part, the server will periodically try to bind the socket to the selected
//! port if it is in use. Therefore a "new" instance can be started while the "old" one bleeds
//! out. Also, this will listen to change events of the config and will relocate to another port or
//! host if changed (unless a port has been given explicitly).
//!
//! # Example
//!
//! ```no_run
//! use filecache::builder::Builder;
//! use filecache::files::ServingRoot;
//! use filecache::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let platform = Builder::new()
//!         .enable_all()
//!         .serve(ServingRoot::new("/var/www")?)
//!         .port(8080)
//!         .build()
//!         .await;
//!
//!     // Run the platform...
//!     platform.require::<Server>().event_loop().await;
//!
//!     Ok(())
//! }
//! ```
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};

use crate::config::{ChangeNotifier, Config};
use crate::handler::handle_connection;
use crate::lru::cache::FileCache;
use crate::platform::Platform;
use crate::spawn;

/// Specifies the timeout when waiting for a new incoming connection.
///
/// When waiting for a new connection we need to interrupt this every once in a while so that
/// we can check if the platform has been shut down.
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies the pause after a failed accept, so that a persistent problem (e.g. running out of
/// file handles) doesn't result in a busy loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Contains the port being used if neither an explicit port nor **server.port** is given.
pub const DEFAULT_PORT: u16 = 2410;

/// Represents a server which manages all TCP connections.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    platform: Arc<Platform>,
    port: Option<u16>,
    active_connections: AtomicUsize,
}

impl Server {
    /// Creates and installs a **Server** into the given **Platform**.
    ///
    /// If a **port** is given, it takes precedence over **server.port** in the config.
    ///
    /// Note that this is called by the [Builder](crate::builder::Builder) unless disabled.
    ///
    /// Also note, that this will not technically start the server. This has to be done manually
    /// via [event_loop](Server::event_loop) as it is most probably done in the main thread.
    pub fn install(platform: &Arc<Platform>, port: Option<u16>) -> Arc<Self> {
        let server = Arc::new(Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            platform: platform.clone(),
            port,
            active_connections: AtomicUsize::new(0),
        });

        platform.register::<Server>(server.clone());

        server
    }

    /// Returns the number of connections which are currently being processed.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Returns the address the server socket is currently bound to (if any).
    pub fn local_address(&self) -> Option<String> {
        self.current_address
            .lock()
            .ok()
            .and_then(|address| address.clone())
    }

    /// Determines if the server socket should keep listening for incoming connections.
    ///
    /// In contrast to **Platform::is_running** this is not used to control the shutdown of the
    /// server. Rather we toggle this flag to false if a config and therefore address change was
    /// detected. This way **server_loop** will exit and a new server socket for the appropriate
    /// address will be setup by the **event_loop**.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Determines the server address based on the current configuration.
    ///
    /// If no, an invalid or a partial config is present, fallback values are used. By default we
    /// use port 2410 and bind to "0.0.0.0".
    fn address(&self) -> String {
        let config = self.platform.find::<Config>().map(|config| config.current());
        let host = config
            .as_ref()
            .and_then(|handle| handle.query("server.host").as_str().map(str::to_owned))
            .unwrap_or_else(|| "0.0.0.0".to_owned());
        let port = self
            .port
            .or_else(|| {
                config.as_ref().and_then(|handle| {
                    handle
                        .query("server.port")
                        .as_i64()
                        .filter(|port| port > &0 && port <= &(u16::MAX as i64))
                        .map(|port| port as u16)
                })
            })
            .unwrap_or(DEFAULT_PORT);

        format!("{}:{}", host, port)
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the tests itself run in the main thread.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is bound.
    ///
    /// Just like **fork** this is intended to be used in test environments.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while server.local_address().is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Tries to open a server socket on the specified address to serve incoming client connections.
    ///
    /// The task of this loop is to bind the server socket to the specified address. Once this was
    /// successful, we enter the [server_loop](Server::server_loop) to actually handle incoming
    /// connections. Once this loop returns, either the platform is no longer running and we should
    /// exit, or the config has changed and we should try to bind the server to the new address.
    pub async fn event_loop(&self) {
        let cache = self.platform.find::<FileCache>();
        let mut address = String::new();
        let mut last_bind_error_reported: Option<Instant> = None;

        while self.platform.is_running() {
            // If the sever is started for the first time or if it has been restarted due to a
            // config change, we need to reload the address...
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            match TcpListener::bind(&address).await {
                Ok(mut listener) => {
                    log::info!("Opened server socket on {}...", &address);
                    if let Ok(mut current_address) = self.current_address.lock() {
                        *current_address = Some(address.clone());
                    }
                    self.server_loop(&mut listener).await;
                    log::info!("Closing server socket on {}.", &address);
                }
                Err(error) => {
                    // If we were unable to bind to the server, we log this every once in a while
                    // (every 5s). Otherwise we would jam the log as re retry every 500ms.
                    if last_bind_error_reported
                        .map(|last| last.elapsed().as_secs() > 5)
                        .unwrap_or(true)
                    {
                        log::error!(
                            "Cannot open server address {}: {}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Some(Instant::now());
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }

        if let Some(cache) = cache {
            if let Some(stats) = cache.stats().await {
                log::info!("Final cache utilization: {}", stats);
            }
        }
    }

    /// Runs the main server loop which processes incoming connections.
    ///
    /// This also listens on config changes and exits to the event_loop if necessary (server
    /// address changed...).
    async fn server_loop(&self, listener: &mut TcpListener) {
        let mut config_changed_flag = self.platform.find::<Config>().map(|config| config.notifier());

        while self.platform.is_running() && self.is_running() {
            tokio::select! {
                // We use a timeout here so that the while condition (esp. platform.is_running())
                // is checked every once in a while...
                timeout_stream = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()) => {
                    match timeout_stream {
                        Ok(Ok((stream, peer))) => self.handle_new_connection(stream, peer.to_string()),
                        Ok(Err(error)) => {
                            // A failed accept only affects the one connection, therefore we keep
                            // on listening...
                            log::warn!("Failed to accept a connection: {}", error);
                            tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                        }
                        Err(_) => (),
                    }
                }
                _ = config_changed(&mut config_changed_flag) => {
                    // If the config was changed, we need to check if the address itself changed...
                    let new_address = self.address();
                    if self.local_address().map(|current| current != new_address).unwrap_or(false) {
                        log::info!("Server address has changed. Restarting server socket...");

                        // Force the event_loop to re-evaluate the expected server address...
                        self.running.store(false, Ordering::Release);

                        // Return to event_loop so that the server socket is re-created...
                        return;
                    }
                }
            }
        }
    }

    /// Handles a new incoming connection by forking a task which processes its request.
    fn handle_new_connection(&self, stream: TcpStream, peer_address: String) {
        let platform = self.platform.clone();
        let server = platform.find::<Server>();
        spawn!(async move {
            // Mark the connection as nodelay, as the whole response is written at once anyway.
            let _ = stream.set_nodelay(true);

            log::debug!("Opened connection from {}...", peer_address);
            if let Some(server) = &server {
                let _ = server.active_connections.fetch_add(1, Ordering::AcqRel);
            }

            if let Err(error) = handle_connection(platform, stream, &peer_address).await {
                log::debug!(
                    "An error occurred in connection {}: {}",
                    peer_address,
                    error
                );
            }

            log::debug!("Closed connection to {}.", peer_address);
            if let Some(server) = &server {
                let _ = server.active_connections.fetch_sub(1, Ordering::AcqRel);
            }
        });
    }
}

/// Completes once the config has changed. Never completes if there is no config.
async fn config_changed(notifier: &mut Option<ChangeNotifier>) {
    match notifier {
        Some(notifier) => {
            let _ = notifier.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::client::fetch;
    use crate::files::ServingRoot;
    use crate::lru::cache::FileCache;
    use crate::server::Server;
    use crate::testing::{test_async, SHARED_TEST_RESOURCES};

    #[test]
    fn integration_test() {
        // We want exclusive access to the test port on 1503...
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();

        test_async(async {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("test.txt"), "123456789\n").unwrap();
            std::fs::create_dir(dir.path().join("docs")).unwrap();
            std::fs::write(dir.path().join("docs").join("index.html"), "<html/>").unwrap();

            let platform = Builder::new()
                .enable_all()
                .disable_config()
                .disable_signals()
                .serve(ServingRoot::new(dir.path()).unwrap())
                .port(1503)
                .build()
                .await;
            let server = platform.require::<Server>();
            Server::fork_and_await(&server).await;
            assert_eq!(server.local_address().unwrap(), "0.0.0.0:1503");

            let mut output = Vec::new();
            assert_eq!(
                fetch("127.0.0.1:1503", "test.txt", &mut output)
                    .await
                    .unwrap(),
                10
            );
            assert_eq!(output, b"123456789\n");

            let mut output = Vec::new();
            let _ = fetch("127.0.0.1:1503", "docs/index.html", &mut output)
                .await
                .unwrap();
            assert_eq!(output, b"<html/>");

            // Traversal attempts and missing files both yield an empty response...
            let mut output = Vec::new();
            assert_eq!(
                fetch("127.0.0.1:1503", "../../../etc/passwd", &mut output)
                    .await
                    .unwrap(),
                0
            );
            assert_eq!(
                fetch("127.0.0.1:1503", "non_existent.txt", &mut output)
                    .await
                    .unwrap(),
                0
            );
            assert_eq!(output.is_empty(), true);

            let stats = platform.require::<FileCache>().stats().await.unwrap();
            assert_eq!(stats.entries, 2);

            platform.terminate();
        });
    }

    #[test]
    fn concurrent_clients_are_served_independently() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();

        test_async(async {
            let dir = tempfile::tempdir().unwrap();
            for index in 0..8 {
                std::fs::write(
                    dir.path().join(format!("{}.txt", index)),
                    format!("File {}", index),
                )
                .unwrap();
            }

            let platform = Builder::new()
                .enable_all()
                .disable_config()
                .disable_signals()
                .serve(ServingRoot::new(dir.path()).unwrap())
                .port(1503)
                .build()
                .await;
            let server = platform.require::<Server>();
            Server::fork_and_await(&server).await;

            let mut clients = Vec::new();
            for round in 0..32 {
                clients.push(tokio::spawn(async move {
                    let index = round % 8;
                    let mut output = Vec::new();
                    let _ = fetch("127.0.0.1:1503", &format!("{}.txt", index), &mut output)
                        .await
                        .unwrap();
                    assert_eq!(output, format!("File {}", index).as_bytes());
                }));
            }
            for client in clients {
                client.await.unwrap();
            }

            platform.terminate();

            // Give the server loop a chance to notice the shutdown and release the port...
            tokio::time::sleep(std::time::Duration::from_millis(700)).await;
        });
    }
}
