//! AutoPilot CLI
//!
//! Terminal front end for the email assistant: Google consent and logout,
//! unread listing, single-message summaries and an interactive chat.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use autopilot_core::agent::Agent;
use autopilot_core::config::{get_config_dir, Config};
use autopilot_core::gmail::GmailClient;
use autopilot_core::llm::OllamaClient;
use autopilot_core::oauth::{parse_oauth_callback, OAuthManager};
use autopilot_core::token_provider::create_token_provider;
use autopilot_core::tools::{MailTools, UnreadListing, PREVIEW_TARGET};
use autopilot_core::Conversation;

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(about = "AutoPilot - personal email assistant backed by a local language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output in human-readable format instead of JSON
    #[arg(long, global = true)]
    human: bool,

    /// Log at the configured level instead of warnings only
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize Gmail access in the browser and store the refresh token
    Auth,
    /// Delete the stored OAuth tokens
    Logout,
    /// List the IDs of unread messages
    Unread {
        /// Maximum number of messages
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Summarize one message by ID
    Summarize {
        /// Message ID as returned by `unread`
        id: String,
    },
    /// Talk to the assistant interactively
    Chat,
}

fn init_logging(config: &Config, verbose: bool) {
    // Unread previews are always shown
    let default = if verbose {
        config.general.log_level.clone()
    } else {
        format!("warn,{}=info", PREVIEW_TARGET)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

/// Wire the mail tools and the agent from configuration
fn build(config: &Config) -> Result<(Arc<MailTools>, Arc<Agent>)> {
    let oauth = Arc::new(OAuthManager::new(
        config.google.clone(),
        create_token_provider(config),
    ));
    let mail = Arc::new(GmailClient::new(config.google.api_base.clone(), oauth));
    let completion = Arc::new(OllamaClient::new(&config.model)?);

    let tools = Arc::new(MailTools::new(mail, completion.clone(), config.mail.clone()));
    let agent = Arc::new(Agent::new(completion, tools.clone(), config.agent.clone()));
    Ok((tools, agent))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| get_config_dir().join("config.toml"));
    let config = Config::load_with_env(&config_path)?;
    init_logging(&config, cli.verbose);

    let result = match cli.command {
        Commands::Auth => auth(&config).await,
        Commands::Logout => logout(&config).await,
        Commands::Unread { limit } => unread(&config, limit, cli.human).await,
        Commands::Summarize { ref id } => summarize(&config, id).await,
        Commands::Chat => chat(&config).await,
    };

    if let Err(e) = &result {
        if let Some(hint) = e
            .downcast_ref::<autopilot_core::Error>()
            .and_then(|e| e.action_hint())
        {
            eprintln!("Hint: {}", hint);
        }
    }
    result
}

/// Run the OAuth consent flow on a loopback listener
async fn auth(config: &Config) -> Result<()> {
    if config.google.client_id.is_empty() || config.google.client_secret.is_empty() {
        eprintln!("\n❌ OAuth credentials not configured!\n");
        eprintln!("Set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET (or add them to .env),");
        eprintln!("or fill in the [google] section of config.toml.");
        eprintln!("\nThe OAuth client must allow this redirect URI:");
        eprintln!("  {}\n", config.google.redirect_uri());
        return Ok(());
    }

    let oauth = OAuthManager::new(config.google.clone(), create_token_provider(config));

    let state = format!("autopilot_{}", uuid::Uuid::new_v4());
    let auth_url = oauth.authorization_url(&state);

    println!("\n🔐 Opening browser for Google authentication...\n");
    println!("If the browser doesn't open, visit this URL manually:");
    println!("{}\n", auth_url);

    if let Err(e) = open::that(&auth_url) {
        warn!("Failed to open browser: {}", e);
    }

    let listener = TcpListener::bind(("127.0.0.1", config.google.redirect_port)).await?;
    println!(
        "⏳ Waiting for authentication callback on http://localhost:{} ...\n",
        config.google.redirect_port
    );

    let (mut socket, _) = listener.accept().await?;
    let mut reader = BufReader::new(&mut socket);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let (code, received_state) = match parse_oauth_callback(&request_line) {
        Ok(parsed) => parsed,
        Err(e) => {
            let response = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n<h1>Authentication failed</h1>";
            socket.write_all(response.as_bytes()).await?;
            return Err(e.into());
        }
    };

    if received_state != state {
        let response = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n<h1>Error: Invalid state</h1>";
        socket.write_all(response.as_bytes()).await?;
        bail!("OAuth state mismatch");
    }

    let success_html = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <!DOCTYPE html><html><head><title>AutoPilot - Success</title></head>\
        <body style=\"font-family: sans-serif; padding: 40px; text-align: center;\">\
        <h1>✅ Authentication Successful!</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>";
    socket.write_all(success_html.as_bytes()).await?;
    drop(socket);

    println!("✅ Received authorization code, exchanging for tokens...\n");
    let tokens = oauth.exchange_code(&code).await?;

    println!("✅ Tokens stored in {}\n", config.token_file().display());
    println!("Refresh token (for GOOGLE_REFRESH_TOKEN):");
    println!("{}\n", tokens.refresh_token);
    Ok(())
}

async fn logout(config: &Config) -> Result<()> {
    let token_provider = create_token_provider(config);
    if !token_provider.has_tokens().await? {
        println!("No stored tokens at {}", config.token_file().display());
        return Ok(());
    }

    token_provider.delete_tokens().await?;
    println!("✅ Deleted tokens at {}", config.token_file().display());
    if config.google.refresh_token.is_some() {
        println!("GOOGLE_REFRESH_TOKEN is still set and grants access until removed.");
    }
    Ok(())
}

async fn unread(config: &Config, limit: Option<u32>, human: bool) -> Result<()> {
    let (tools, _) = build(config)?;
    let listing = tools
        .list_unread(limit.unwrap_or_else(|| tools.default_limit()))
        .await?;

    if !human {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    match listing {
        UnreadListing::Empty => println!("{}", autopilot_core::tools::NO_UNREAD_MESSAGES),
        UnreadListing::Messages(ids) if ids.is_empty() => println!("No messages requested."),
        UnreadListing::Messages(ids) => {
            println!("\n📧 Unread messages:\n");
            for id in ids {
                println!("  {}", id);
            }
            println!();
        }
    }
    Ok(())
}

async fn summarize(config: &Config, id: &str) -> Result<()> {
    let (tools, _) = build(config)?;
    let summary = tools.summarize(id).await?;
    println!("{}", summary);
    Ok(())
}

/// Read instructions until `q`, keeping one conversation for the session
async fn chat(config: &Config) -> Result<()> {
    let (_, agent) = build(config)?;
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(b"Type an instruction (q to quit):\n\n> ")
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let instruction = line.trim();
        if instruction.eq_ignore_ascii_case("q") {
            break;
        }
        if instruction.is_empty() {
            continue;
        }

        conversation.push_user(instruction);
        match agent.run(&mut conversation).await {
            Ok(()) => {
                let answer = conversation
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                println!("{}\n", answer);
            }
            // The session survives a failed turn
            Err(e) => eprintln!("❌ {}\n", e),
        }
    }
    Ok(())
}
