//! Agent command handlers (interactive + single-message mode).

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use femtoclaw::bus::MessageBus;
use femtoclaw::config::Config;
use femtoclaw::session::SessionKey;

use super::common::create_agent;

/// Interactive or single-message agent mode.
pub(crate) async fn cmd_agent(message: Option<String>, session: String) -> Result<()> {
    session
        .parse::<SessionKey>()
        .with_context(|| format!("Invalid --session '{}'", session))?;

    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let bus = Arc::new(MessageBus::from_config(&config.bus));
    let runtime = create_agent(config, bus).await?;
    let agent = runtime.agent;

    if let Some(msg) = message {
        match agent.process_direct(&msg, &session).await {
            Ok(response) => println!("{}", response),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    println!("femtoclaw interactive agent (session {})", session);
    println!("Type your message and press Enter. Type 'quit' or 'exit' to stop.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "quit" || input == "exit" {
                    println!("Goodbye!");
                    break;
                }

                match agent.process_direct(input, &session).await {
                    Ok(response) => {
                        println!();
                        println!("{}", response);
                        println!();
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        eprintln!();
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    Ok(())
}
