pub mod ask;
pub mod completion;
pub mod config;
pub mod credential;
pub mod logging;
pub mod model;
pub mod providers;
pub mod repl;
pub mod session;

use anyhow::{Context, Result};
use reqwest::Client;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{error, info, warn};

use config::Config;
use credential::{API_KEY_VAR, Credential, CredentialError, StdinPrompt};
use providers::anthropic::AnthropicClient;
use repl::run_repl;
use session::Session;

/// Process outcome of either entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure,
}

impl Exit {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

fn load_config() -> Config {
    dotenvy::dotenv().ok();
    let cfg = Config::from_env();
    info!(
        model = %cfg.model,
        base_url = %cfg.base_url,
        max_output_tokens = cfg.max_output_tokens,
        model_timeout_secs = cfg.model_timeout_secs,
        "loaded runtime configuration"
    );
    cfg
}

fn http_client(cfg: &Config) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.model_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")
}

fn fatal(err: anyhow::Error) -> Exit {
    let message = format!("{err:#}");
    error!(error = %message, "fatal error");
    println!();
    println!("Fatal error: {message}");
    println!();
    Exit::Failure
}

/// Interactive multi-turn chat on stdin/stdout.
pub async fn run_chat() -> Exit {
    match chat().await {
        Ok(exit) => exit,
        Err(err) => fatal(err),
    }
}

async fn chat() -> Result<Exit> {
    let cfg = load_config();

    let credential = match credential::resolve(Some(&mut StdinPrompt)) {
        Ok(credential) => credential,
        Err(CredentialError::Missing) => {
            println!("No API key provided. Exiting.");
            return Ok(Exit::Failure);
        }
        Err(err) => return Err(err).context("Failed to resolve API key"),
    };

    let http = http_client(&cfg)?;
    let client = AnthropicClient::new(&http, &cfg, &credential);
    let mut session = Session::new(client, &cfg);

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut out = io::stdout();
    let exit = run_repl(&mut session, input, &mut out, interrupt_signal()).await?;
    out.flush().context("Failed to flush stdout")?;

    info!(reason = ?exit, turns = session.log().len(), "chat finished");
    Ok(if exit.is_success() {
        Exit::Success
    } else {
        Exit::Failure
    })
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupt_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
}

/// Single-shot question built from `args` (program name excluded).
pub async fn run_ask(args: Vec<String>) -> Exit {
    match ask_once(args).await {
        Ok(exit) => exit,
        Err(err) => fatal(err),
    }
}

async fn ask_once(args: Vec<String>) -> Result<Exit> {
    let mut out = io::stdout();

    let Some(question) = ask::question_from_args(&args) else {
        ask::print_usage(&mut out)?;
        return Ok(Exit::Failure);
    };

    let cfg = load_config();
    let credential = match credential::resolve(None) {
        Ok(credential) => credential,
        Err(err) => {
            print_missing_key_help(&mut out, &err)?;
            return Ok(Exit::Failure);
        }
    };

    answer(&cfg, &credential, &question, &mut out).await
}

async fn answer<W: Write>(
    cfg: &Config,
    credential: &Credential,
    question: &str,
    out: &mut W,
) -> Result<Exit> {
    let http = http_client(cfg)?;
    let client = AnthropicClient::new(&http, cfg, credential);
    let answered = ask::ask(&client, cfg, question, out).await?;
    out.flush().context("Failed to flush stdout")?;
    Ok(if answered { Exit::Success } else { Exit::Failure })
}

fn print_missing_key_help<W: Write>(out: &mut W, err: &CredentialError) -> Result<()> {
    writeln!(out, "Error: {err}")?;
    writeln!(out)?;
    writeln!(out, "To set your API key:")?;
    writeln!(out, "  export {API_KEY_VAR}=your-key-here")?;
    writeln!(out, "  or add {API_KEY_VAR}=your-key-here to a .env file")?;
    writeln!(out)?;
    writeln!(out, "Get an API key from: https://console.anthropic.com/")?;
    Ok(())
}
