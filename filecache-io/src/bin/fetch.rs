//! Fetches a single file from a server and stores it in the current directory.
//!
//! ```bash
//! filecache-fetch 127.0.0.1 2410 docs/index.html
//! ```
//!
//! The file is stored under its last path component (**index.html** in the example above). If the
//! server sends an empty response (or cannot be reached), the process exits with code 1 and no
//! local file is created or modified.
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{anyhow, Context};
use clap::Parser;
use filecache::client::fetch;
use filecache::fmt::format_size;

#[derive(Parser)]
#[command(name = "filecache-fetch")]
#[command(about = "Downloads a file from a filecache server", long_about = None)]
#[command(version)]
struct Cli {
    /// IP (or host name) of the server
    #[arg(value_name = "IP")]
    ip: String,

    /// Port of the server
    #[arg(value_name = "PORT")]
    port: u16,

    /// Name of the file relative to the serving directory
    #[arg(value_name = "FILENAME")]
    filename: String,
}

impl Cli {
    fn address(&self) -> String {
        match self.ip.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.ip, self.port),
        }
    }
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            let _ = error.print();
            process::exit(1);
        }
        Err(error) => error.exit(),
    }
}

#[tokio::main]
async fn main() {
    let cli = parse_cli();
    filecache::init_logging();

    match download(&cli.address(), &cli.filename, Path::new(".")).await {
        Ok((target, bytes)) => log::info!(
            "{} saved ({}).",
            target.display(),
            format_size(bytes)
        ),
        Err(error) => {
            log::error!("{:#}", error);
            process::exit(1);
        }
    }
}

/// Fetches the given file and stores it in **directory** under its last path component.
///
/// The local file is only written once a non-empty response has been received completely. An
/// existing local file is left untouched if the server is unreachable or doesn't know the file.
async fn download(
    address: &str,
    filename: &str,
    directory: &Path,
) -> anyhow::Result<(PathBuf, usize)> {
    let target = Path::new(filename)
        .file_name()
        .map(|name| directory.join(name))
        .ok_or_else(|| anyhow!("Cannot derive a local file name from {}", filename))?;

    let mut contents = Vec::new();
    let _ = fetch(address, filename, &mut contents).await?;
    if contents.is_empty() {
        return Err(anyhow!("File {} does not exist on the server", filename));
    }

    tokio::fs::write(&target, &contents)
        .await
        .with_context(|| format!("Cannot write {}", target.display()))?;

    Ok((target, contents.len()))
}

#[cfg(test)]
mod tests {
    use crate::download;
    use std::future::Future;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn test_async<F: Future>(future: F) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }

    /// Answers a single request with the given response.
    async fn respond_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        filecache::spawn!(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(stream);
            let mut line = String::new();
            let _ = stream.read_line(&mut line).await.unwrap();
            stream.get_mut().write_all(response).await.unwrap();
        });

        address
    }

    #[test]
    fn a_non_empty_response_is_stored() {
        test_async(async {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("notes.txt"), "old contents").unwrap();

            let address = respond_once(b"new contents").await;
            let (target, bytes) = download(&address, "docs/notes.txt", dir.path())
                .await
                .unwrap();
            assert_eq!(target, dir.path().join("notes.txt"));
            assert_eq!(bytes, 12);
            assert_eq!(std::fs::read(&target).unwrap(), b"new contents");
        });
    }

    #[test]
    fn an_empty_response_keeps_an_existing_file() {
        test_async(async {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("notes.txt"), "precious local data\n").unwrap();

            let address = respond_once(b"").await;
            assert_eq!(
                download(&address, "notes.txt", dir.path()).await.is_err(),
                true
            );
            assert_eq!(
                std::fs::read(dir.path().join("notes.txt")).unwrap(),
                b"precious local data\n"
            );

            // Nothing is created if there was no file before...
            let address = respond_once(b"").await;
            assert_eq!(
                download(&address, "other.txt", dir.path()).await.is_err(),
                true
            );
            assert_eq!(dir.path().join("other.txt").exists(), false);
        });
    }

    #[test]
    fn an_unreachable_server_keeps_an_existing_file() {
        test_async(async {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("report.txt"), "precious local data\n").unwrap();

            // Obtain a free port and close it again, so that nobody is listening...
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap().to_string();
            drop(listener);

            assert_eq!(
                download(&address, "report.txt", dir.path()).await.is_err(),
                true
            );
            assert_eq!(
                std::fs::read(dir.path().join("report.txt")).unwrap(),
                b"precious local data\n"
            );
        });
    }
}
