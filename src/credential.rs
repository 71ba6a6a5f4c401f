use std::env;
use std::fmt;
use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::{debug, warn};

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Secret token sent to the provider. Never printed or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("ANTHROPIC_API_KEY is not set and no API key was provided")]
    Missing,
    #[error("Failed to read API key from stdin")]
    Prompt(#[from] io::Error),
}

/// Interactive fallback consulted when the environment has no credential.
pub trait CredentialPrompt {
    fn prompt(&mut self) -> io::Result<Option<String>>;
}

/// Prints setup guidance on stdout and reads one line from stdin.
pub struct StdinPrompt;

impl CredentialPrompt for StdinPrompt {
    fn prompt(&mut self) -> io::Result<Option<String>> {
        let mut out = io::stdout().lock();
        writeln!(out, "API key not found!")?;
        writeln!(out)?;
        writeln!(out, "Please set your API key:")?;
        writeln!(out, "1. Get a key from: https://console.anthropic.com/")?;
        writeln!(out, "2. Run: export {API_KEY_VAR}='your-key-here'")?;
        writeln!(out, "3. Or put {API_KEY_VAR}=your-key-here in a .env file")?;
        writeln!(out)?;
        write!(out, "Or enter your API key now: ")?;
        out.flush()?;
        drop(out);

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

pub fn resolve(prompt: Option<&mut dyn CredentialPrompt>) -> Result<Credential, CredentialError> {
    resolve_with(|key| env::var(key).ok(), prompt)
}

pub(crate) fn resolve_with(
    mut get_var: impl FnMut(&str) -> Option<String>,
    prompt: Option<&mut dyn CredentialPrompt>,
) -> Result<Credential, CredentialError> {
    if let Some(credential) = get_var(API_KEY_VAR).as_deref().and_then(Credential::new) {
        debug!(source = "environment", "resolved API credential");
        return Ok(credential);
    }

    let Some(prompt) = prompt else {
        warn!(var = API_KEY_VAR, "API credential missing from environment");
        return Err(CredentialError::Missing);
    };

    match prompt.prompt()?.as_deref().and_then(Credential::new) {
        Some(credential) => {
            debug!(source = "prompt", "resolved API credential");
            Ok(credential)
        }
        None => {
            warn!(var = API_KEY_VAR, "no API credential entered at prompt");
            Err(CredentialError::Missing)
        }
    }
}
