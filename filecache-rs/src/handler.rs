//! Handles a single client connection.
//!
//! Each connection carries exactly one request and one response:
//! 1. **Await request**: read a single line containing the file name (see
//!    [Request](crate::request::Request)). If the client closes the connection early, sends
//!    garbage or doesn't complete its request within **server.read_timeout**, the connection is
//!    closed without a response.
//! 2. **Lookup**: see [lookup](lookup).
//! 3. **Respond**: write the raw file contents - no length prefix, no envelope. An empty response
//!    means "not found".
//! 4. **Close**: the connection is closed in any case, which signals the end of the transfer.
//!
//! The protocol has no error channel. Any problem while processing a request (an invalid or
//! malicious name, a missing or empty file, a disk error) results in an empty response. Therefore
//! a client cannot tell "not found" and "not permitted" apart.
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::files::{load, LoadError, PathError, ServingRoot};
use crate::fmt::{format_short_duration, format_size};
use crate::lru::cache::FileCache;
use crate::platform::Platform;
use crate::request::{Request, MAX_REQUEST_LEN};

/// Specifies the timeout when waiting for incoming data on a client connection.
///
/// When waiting for incoming data we need to interrupt this every once in a while to check
/// if either the platform is being shut down or if the read deadline has been reached.
const READ_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies the time a client has to send its request unless **server.read_timeout** is given.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Enumerates the reasons why a lookup didn't yield any content.
#[derive(Debug)]
pub enum LookupError {
    /// The name was rejected or couldn't be resolved below the serving root.
    Path(PathError),

    /// The file couldn't be loaded.
    Load(LoadError),
}

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LookupError::Path(error) => write!(f, "{}", error),
            LookupError::Load(error) => write!(f, "{}", error),
        }
    }
}

impl Error for LookupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LookupError::Path(error) => Some(error),
            LookupError::Load(error) => Some(error),
        }
    }
}

/// Determines the contents of the requested file.
///
/// The name is lexically checked first. Then the cache is consulted. On a miss, the name is
/// resolved below the serving root, the file is loaded and the cache is asked to store it. Whether
/// the cache accepts the content or not doesn't affect the result.
pub async fn lookup(
    cache: &FileCache,
    root: &ServingRoot,
    name: &str,
) -> Result<Bytes, LookupError> {
    root.check(name).map_err(LookupError::Path)?;

    if let Some(content) = cache.get(name).await {
        log::debug!("Cache hit for {}.", name);
        return Ok(content);
    }

    let path = root.resolve(name).await.map_err(LookupError::Path)?;
    let content = load(&path).await.map_err(LookupError::Load)?;
    let _ = cache.put(name, content.clone()).await;
    log::debug!("Cache miss for {} - loaded {}.", name, format_size(content.len()));

    Ok(content)
}

/// Processes the one and only request of the given connection.
///
/// Per-request problems never end up in an **Err** as they are answered with an empty response.
/// An **Err** therefore indicates a connection level problem (a malformed request or an IO error
/// when reading or writing). Note that the stream is closed in all cases once this returns.
pub async fn handle_connection(
    platform: Arc<Platform>,
    mut stream: TcpStream,
    peer_address: &str,
) -> anyhow::Result<()> {
    let request = match read_request(&platform, &mut stream).await? {
        Some(request) => request,
        None => return Ok(()),
    };

    let (cache, root) = match (
        platform.find::<FileCache>(),
        platform.find::<ServingRoot>(),
    ) {
        (Some(cache), Some(root)) => (cache, root),
        _ => return Ok(()),
    };

    let watch = Instant::now();
    let payload = match lookup(&cache, &root, request.filename()).await {
        Ok(content) => content,
        Err(error) => {
            report_failed_lookup(request.filename(), peer_address, &error);
            Bytes::new()
        }
    };

    stream.write_all(&payload).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;

    log::debug!(
        "Sent {} ({}) to {} in {}.",
        request.filename(),
        format_size(payload.len()),
        peer_address,
        format_short_duration(watch.elapsed().as_micros())
    );

    Ok(())
}

fn report_failed_lookup(name: &str, peer_address: &str, error: &LookupError) {
    match error {
        LookupError::Path(error) if error.is_traversal() => log::warn!(
            "Rejected request for '{}' from {}: {}",
            name,
            peer_address,
            error
        ),
        LookupError::Load(LoadError::IOError(error)) => log::warn!(
            "Sending an empty response for {} to {} as reading the file failed: {}",
            name,
            peer_address,
            error
        ),
        _ => log::debug!("{} was not found ({}).", name, error),
    }
}

/// Reads until a complete request line is present.
///
/// Returns **None** if the connection was closed by the client (or the platform is shutting
/// down) before a complete request was received.
async fn read_request(
    platform: &Arc<Platform>,
    stream: &mut TcpStream,
) -> anyhow::Result<Option<Request>> {
    let now = Instant::now();
    let deadline = now
        .checked_add(read_timeout(platform))
        .unwrap_or(now + DEFAULT_READ_TIMEOUT);
    let mut input_buffer = BytesMut::with_capacity(MAX_REQUEST_LEN);

    while platform.is_running() {
        if Instant::now() >= deadline {
            return Err(anyhow!("No complete request was received in time."));
        }

        // We apply a timeout here, so that the condition of the while loop is checked every once
        // in a while...
        match tokio::time::timeout(READ_WAIT_TIMEOUT, stream.read_buf(&mut input_buffer)).await {
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(_)) => {
                if let Some(request) = Request::parse(&input_buffer)? {
                    return Ok(Some(request));
                }
            }
            Ok(Err(error)) => {
                return Err(anyhow!(
                    "An error occurred while reading from the client: {}",
                    error
                ));
            }
            Err(_) => (),
        }
    }

    Ok(None)
}

fn read_timeout(platform: &Arc<Platform>) -> Duration {
    platform
        .find::<Config>()
        .and_then(|config| match config.current().duration("server.read_timeout") {
            Ok(timeout) => timeout,
            Err(error) => {
                log::error!("Ignoring invalid server.read_timeout: {}", error);
                None
            }
        })
        .filter(|timeout| !timeout.is_zero())
        .unwrap_or(DEFAULT_READ_TIMEOUT)
}
