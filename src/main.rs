use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use oauth_relay::{
    Access, BrowserSink, CallbackServer, ConsoleSink, MessageSink, PendingAction, Relay,
    RelayError,
};

#[derive(Parser)]
#[command(name = "oauth-relay", version, about = "Out-of-band OAuth handshake with resumable actions")]
struct Cli {
    /// Config file (overrides discovery)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh state key for OAUTH_RELAY_STATE_KEY
    #[command(name = "gen-key")]
    GenKey,

    /// Authorize an identity and wait for the provider callback
    Authorize {
        /// Identity to authorize (falls back to the configured default)
        identity: Option<String>,

        /// Intent recorded on the paused action
        #[arg(long, default_value = "authorize")]
        intent: String,

        /// Open the authorization link in the browser
        #[arg(long)]
        open: bool,

        /// How long to wait for the callback, in milliseconds
        #[arg(long, env = "OAUTH_RELAY_CALLBACK_TIMEOUT_MS", default_value_t = 300_000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("OAUTH_RELAY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RelayError> {
    match cli.command {
        Commands::GenKey => {
            println!("{}", oauth_relay::oauth::generate_key());
            Ok(())
        }
        Commands::Authorize {
            identity,
            intent,
            open,
            timeout_ms,
        } => {
            let config = oauth_relay::load_config(cli.config.as_deref())?;
            let sink: Arc<dyn MessageSink> = if open {
                Arc::new(BrowserSink)
            } else {
                Arc::new(ConsoleSink)
            };
            let relay = Arc::new(Relay::from_config(&config, sink)?);

            // Bind before the link goes out so a fast callback cannot be missed.
            let listener = tokio::net::TcpListener::bind(&config.callback.bind).await?;
            let server = CallbackServer::new(Arc::clone(&relay), &config.provider.redirect_uri);
            tracing::info!(bind = %config.callback.bind, path = server.path(), "waiting for callback");

            match relay
                .credential_for(identity.as_deref(), PendingAction::new(intent))
                .await?
            {
                Access::Granted(_) => {
                    println!("{} already authorized", "✓".green());
                    Ok(())
                }
                Access::Pending { .. } => {
                    let timeout = std::time::Duration::from_millis(timeout_ms);
                    let resumed = server.listen_once(&listener, timeout).await?;
                    println!(
                        "{} {} authorized; resuming '{}'",
                        "✓".green(),
                        resumed.identity.bold(),
                        resumed.action.intent
                    );
                    match resumed.credential.expires_at {
                        Some(expires) => println!("Credential expires: {expires}"),
                        None => println!("Credential does not expire"),
                    }
                    Ok(())
                }
            }
        }
    }
}
