//! Provides a minimal client which fetches a single file from a server.
//!
//! As the protocol has no framing, the client simply sends the name followed by a newline, closes
//! its writing side and then copies everything it receives until the server closes the
//! connection. Receiving zero bytes therefore means that the file was not found (or was not
//! permitted).
//!
//! # Example
//!
//! ```no_run
//! # use filecache::client::fetch;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut contents = Vec::new();
//!     let bytes = fetch("127.0.0.1:2410", "docs/index.html", &mut contents).await?;
//!     println!("Received {} bytes", bytes);
//!
//!     Ok(())
//! }
//! ```
use anyhow::{anyhow, Context};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::request::MAX_REQUEST_LEN;

/// Requests the given file from the server at **address** and copies the response into **writer**.
///
/// Returns the number of bytes received.
pub async fn fetch<W>(address: &str, filename: &str, writer: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if filename.is_empty() || filename.contains('\n') {
        return Err(anyhow!("Invalid file name: {:?}", filename));
    }
    if filename.len() >= MAX_REQUEST_LEN {
        return Err(anyhow!(
            "The file name must be shorter than {} bytes.",
            MAX_REQUEST_LEN
        ));
    }

    let mut stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("Cannot connect to {}", address))?;

    let mut request = String::with_capacity(filename.len() + 1);
    request.push_str(filename);
    request.push('\n');
    stream
        .write_all(request.as_bytes())
        .await
        .context("Failed to send the request")?;
    stream.flush().await?;

    // Half-close our side, the server still answers but sees that nothing else is coming...
    stream.shutdown().await?;

    let bytes = tokio::io::copy(&mut stream, writer)
        .await
        .context("Failed to receive the response")?;
    writer.flush().await?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use crate::client::fetch;
    use crate::testing::test_async;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn the_response_is_read_until_the_connection_is_closed() {
        test_async(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap().to_string();

            crate::spawn!(async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 9];
                let _ = stream.read_exact(&mut request).await.unwrap();
                assert_eq!(&request, b"test.txt\n");
                stream.write_all(b"Hello").await.unwrap();
                stream.write_all(b" World").await.unwrap();
            });

            let mut output = Vec::new();
            assert_eq!(fetch(&address, "test.txt", &mut output).await.unwrap(), 11);
            assert_eq!(output, b"Hello World");
        });
    }

    #[test]
    fn invalid_names_are_not_sent() {
        test_async(async {
            let mut output = Vec::new();
            assert_eq!(
                fetch("127.0.0.1:1", "a\nb", &mut output).await.is_err(),
                true
            );
            assert_eq!(fetch("127.0.0.1:1", "", &mut output).await.is_err(), true);
            assert_eq!(
                fetch("127.0.0.1:1", &"x".repeat(1000), &mut output)
                    .await
                    .is_err(),
                true
            );
        });
    }
}
