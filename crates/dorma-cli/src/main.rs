//! dorma - fetch today's come/leave bookings from a Dorma
//! time-tracking portal.
//!
//! Resolves the portal host and credentials from the local store
//! (prompting for anything missing), runs one login/fetch/logout
//! session and prints the entries.

use std::io;
use std::path::Path;

use anyhow::Result;
use dorma_core::{DormaClient, LocalStore};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
/// Use the RUST_LOG env var to control the log level.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn usage(program: &str) {
    eprintln!("Usage: {program} [--json] [APP_ID]");
    eprintln!();
    eprintln!("Fetches today's attendance bookings from the Dorma portal");
    eprintln!("configured for APP_ID (defaults to the binary name).");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("dorma");

    let mut json = false;
    let mut app_id: Option<String> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                usage(program);
                return Ok(());
            }
            other => app_id = Some(other.to_string()),
        }
    }

    // The app id keys the host mapping; callers that do not pass one
    // are identified by their binary name.
    let app_id = app_id.unwrap_or_else(|| {
        Path::new(program)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dorma")
            .to_string()
    });
    debug!(app_id = %app_id, "resolving host and credentials");

    let store = LocalStore::from_home()?;
    let host = store.resolve_host(&app_id)?;
    let credential = store.resolve_credentials(&host)?;

    let client = DormaClient::new()?;
    let entries = client
        .fetch_entries(&host, &credential.user, &credential.pass)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No bookings for today.");
    } else {
        for entry in &entries {
            println!(
                "{}  {}",
                entry.time.format("%d.%m.%Y %H:%M"),
                entry.entry_type
            );
        }
    }

    Ok(())
}
