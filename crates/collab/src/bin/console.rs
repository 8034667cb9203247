//! Collaboration console
//!
//! Connects to a collaboration server and tails decoded events; the
//! operational smoke test for the sync client.
//!
//! Usage: sitecraft-collab <PROJECT_ID> [--url BASE_URL] [--name NAME]

use anyhow::Result;
use sitecraft_collab::{CollabClient, CollabConfig, PresenceTracker};
use tokio::signal;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("sitecraft-collab - collaboration event console");
    println!();
    println!("USAGE:");
    println!("    sitecraft-collab <PROJECT_ID> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --url URL        Base API URL (overrides config file)");
    println!("    --name NAME      Display name for this session");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version");
    println!();
    println!("CONFIG:");
    println!("    ~/.config/sitecraft/config.toml");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut project_id: Option<String> = None;
    let mut url_override: Option<String> = None;
    let mut name: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("sitecraft-collab {VERSION}");
                return Ok(());
            }
            "--url" if i + 1 < args.len() => {
                url_override = Some(args[i + 1].clone());
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                name = Some(args[i + 1].clone());
                i += 2;
            }
            arg if !arg.starts_with('-') => {
                project_id = Some(arg.to_string());
                i += 1;
            }
            _ => i += 1,
        }
    }

    let Some(project_id) = project_id else {
        print_help();
        anyhow::bail!("missing PROJECT_ID");
    };

    let mut config = CollabConfig::load();
    if let Some(url) = url_override {
        config.api_base_url = url;
    }
    let endpoint = config.websocket_endpoint()?;
    tracing::info!(endpoint = %endpoint, "connecting");

    let user_id = uuid::Uuid::new_v4().to_string();
    let user_name = name.unwrap_or_else(|| format!("console-{}", &user_id[..8]));

    let client = CollabClient::new(config);
    let tracker = PresenceTracker::attach(&client);

    client.on_any(|message| {
        tracing::info!(
            kind = %message.payload.kind(),
            user = message.user_id.as_deref().unwrap_or("-"),
            name = message.user_name.as_deref().unwrap_or("-"),
            "event"
        );
    });

    client.connect(&project_id, &user_id, &user_name)?;
    client.start_heartbeat();

    signal::ctrl_c().await?;
    tracing::info!(
        participants = tracker.participant_count(),
        "shutting down"
    );
    client.disconnect();
    Ok(())
}
