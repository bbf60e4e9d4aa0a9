//! roomstage CLI
//!
//! Command-line front end for the room staging pipeline.

#[cfg(feature = "cli")]
use roomstage::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("roomstage was built without the `cli` feature; rebuild with --features cli");
    std::process::exit(2);
}
