//! Runs a file server for a given directory.
//!
//! ```bash
//! filecache-server 2410 /var/www
//! ```
//!
//! Additional settings (e.g. **cache.max_memory**) are read from **config/settings.yml**.
use std::path::PathBuf;
use std::process;

use clap::Parser;
use filecache::builder::Builder;
use filecache::files::ServingRoot;
use filecache::server::Server;

#[derive(Parser)]
#[command(name = "filecache-server")]
#[command(about = "Serves the files of a directory from an in-memory LRU cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(value_name = "PORT")]
    port: u16,

    /// Directory containing the files to serve
    #[arg(value_name = "DIR")]
    directory: PathBuf,
}

/// Parses the command line and exits with code 1 on invalid arguments.
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

    let root = match ServingRoot::new(&cli.directory) {
        Ok(root) => root,
        Err(error) => {
            log::error!("Cannot serve {}: {:#}", cli.directory.display(), error);
            eprintln!("Usage: filecache-server <PORT> <DIR>");
            process::exit(1);
        }
    };

    let platform = Builder::new()
        .enable_all()
        .serve(root)
        .port(cli.port)
        .build()
        .await;

    platform.require::<Server>().event_loop().await;

    log::info!("Server has been shut down.");
}
