use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::Config;
use crate::model::Turn;

const RULE_WIDTH: usize = 60;

/// Joins the command-line arguments into a question. `None` means there is
/// nothing to ask and the caller should print usage.
pub fn question_from_args<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = args
        .into_iter()
        .map(|arg| arg.as_ref().to_string())
        .collect();
    let question = parts.join(" ");
    if question.trim().is_empty() {
        None
    } else {
        Some(question)
    }
}

pub fn print_usage<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "Claude CLI - Single Question Mode")?;
    writeln!(out)?;
    writeln!(out, "Usage:")?;
    writeln!(out, "  parley-ask \"Your question here\"")?;
    writeln!(out)?;
    writeln!(out, "Examples:")?;
    writeln!(out, "  parley-ask \"Explain recursion\"")?;
    writeln!(out, "  parley-ask Write a Rust function to sort a list")?;
    writeln!(out)?;
    writeln!(out, "For interactive chat, use: parley-chat")?;
    Ok(())
}

/// Asks one question and prints the answer. Returns whether an answer was
/// printed; every provider failure is reported on `out` and is final.
pub async fn ask<C, W>(client: &C, cfg: &Config, question: &str, out: &mut W) -> Result<bool>
where
    C: CompletionClient,
    W: Write,
{
    let rule = "-".repeat(RULE_WIDTH);
    writeln!(out, "Asking Claude...")?;
    writeln!(out)?;
    writeln!(out, "{rule}")?;
    out.flush().context("Failed to flush stdout")?;

    let messages = [Turn::user(question)];
    let result = client
        .complete(CompletionRequest {
            messages: &messages,
            model: &cfg.model,
            max_output_tokens: cfg.max_output_tokens,
        })
        .await;

    match result {
        Ok(completion) => {
            writeln!(out, "{}", completion.text.trim())?;
            writeln!(out, "{rule}")?;
            if let Some(usage) = completion.usage {
                writeln!(out)?;
                writeln!(
                    out,
                    "Tokens used: {} input, {} output",
                    usage.input_tokens, usage.output_tokens
                )?;
            }
            info!(
                model = %cfg.model,
                response_len = completion.text.len(),
                "answered question"
            );
            Ok(true)
        }
        Err(CompletionError::AuthenticationFailed(_)) => {
            writeln!(out, "Authentication failed. Check your API key.")?;
            Ok(false)
        }
        Err(err) => {
            writeln!(out, "Error: {err}")?;
            Ok(false)
        }
    }
}
