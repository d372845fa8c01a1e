/// Travel concierge - interactive command line client
///
/// Reads travel requests from stdin, dispatches each one to the hotel or
/// flight search and prints the normalized response.
/// When the concierge asks for missing details, the next line is read as
/// the answer and appended to the pending request.
///
/// Requires: SERP_API_KEY environment variable (or in .env file)

use std::io::{self, BufRead, Write};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use concierge::{AppState, ConciergeConfig, Request, ResponseStatus};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = ConciergeConfig::from_env()?;
    let state = AppState::from_config(&config)?;

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║           Travel Concierge - Interactive Client            ║");
    println!("║              (Hotel and flight search)                     ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    println!("Capabilities:");
    for (i, descriptor) in state.dispatcher().registry().descriptors().enumerate() {
        println!(
            "  {}. {} - {} (needs: {})",
            i + 1,
            descriptor.name,
            descriptor.description,
            descriptor.required_names().join(", ")
        );
    }
    println!();

    println!("Examples:");
    println!("  'Hotel in Berlin from 2025-08-01 to 2025-08-03 for 2 adults'");
    println!("  'Flights from PEK to AUS on 2025-07-19 returning 2025-07-25'\n");

    println!("Type 'exit' or 'quit' to end.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut pending: Option<String> = None;

    loop {
        print!("\nYou: ");
        stdout.flush()?;

        let mut user_input = String::new();
        if reader.read_line(&mut user_input)? == 0 {
            break; // EOF
        }

        let input = user_input.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            println!("\nGoodbye!");
            break;
        }

        let text = match pending.take() {
            Some(previous) => format!("{} {}", previous, input),
            None => input.to_string(),
        };

        let cancel = CancellationToken::new();
        let (_, response) = state.process(Request::new(text.clone()), &cancel).await;

        if response.status == ResponseStatus::NeedsClarification {
            pending = Some(text);
        }
        if let Some(answer) = &response.answer {
            println!("\nConcierge: {}", answer);
        } else if let Some(message) = &response.message {
            println!("\nConcierge: {}", message);
        }
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
