use tracing::{debug, info, warn};

use crate::completion::{CompletionClient, CompletionError, CompletionFuture, CompletionRequest};
use crate::config::Config;
use crate::model::{Completion, Turn};

const EXIT_KEYWORDS: &[&str] = &["exit", "quit", "bye", "q"];
const RESET_KEYWORDS: &[&str] = &["clear", "reset", "new"];
const HELP_KEYWORDS: &[&str] = &["help", "?"];

/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Exit,
    Reset,
    Help,
    Prompt(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        let is_one_of = |keywords: &[&str]| {
            keywords
                .iter()
                .any(|keyword| trimmed.eq_ignore_ascii_case(keyword))
        };
        if is_one_of(EXIT_KEYWORDS) {
            Self::Exit
        } else if is_one_of(RESET_KEYWORDS) {
            Self::Reset
        } else if is_one_of(HELP_KEYWORDS) {
            Self::Help
        } else {
            Self::Prompt(trimmed.to_string())
        }
    }
}

/// Ordered history replayed to the provider on every call. Turns are only
/// appended; the log is only ever emptied as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Terminated,
}

pub struct Session<C> {
    client: C,
    model: String,
    max_output_tokens: u32,
    log: ConversationLog,
    state: SessionState,
}

impl<C> Session<C>
where
    C: CompletionClient,
{
    pub fn new(client: C, cfg: &Config) -> Self {
        Self {
            client,
            model: cfg.model.clone(),
            max_output_tokens: cfg.max_output_tokens,
            log: ConversationLog::new(),
            state: SessionState::Active,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reset(&mut self) {
        debug!(discarded_turns = self.log.len(), "conversation reset");
        self.log.clear();
    }

    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }

    /// Appends the user's turn so the provider sees it as context.
    pub fn begin_turn(&mut self, text: impl Into<String>) {
        self.log.push(Turn::user(text));
    }

    /// Calls the provider with the whole log. Does not touch the log, so the
    /// returned future can be dropped without leaving a partial turn behind.
    pub fn request(&self) -> CompletionFuture<'_> {
        debug!(
            model = %self.model,
            message_count = self.log.len(),
            "requesting completion"
        );
        self.client.complete(CompletionRequest {
            messages: self.log.turns(),
            model: &self.model,
            max_output_tokens: self.max_output_tokens,
        })
    }

    /// Applies the result of [`Session::request`]. Failed turns are not rolled
    /// back: the user turn stays and is resent as context on the next call.
    pub fn record(
        &mut self,
        result: Result<Completion, CompletionError>,
    ) -> Result<Completion, CompletionError> {
        match &result {
            Ok(completion) => {
                self.log.push(Turn::assistant(completion.text.clone()));
                info!(
                    log_len = self.log.len(),
                    input_tokens = completion.usage.map(|usage| usage.input_tokens),
                    output_tokens = completion.usage.map(|usage| usage.output_tokens),
                    "turn completed"
                );
            }
            Err(err) if err.is_fatal() => {
                warn!(error = %err, "terminating session after fatal completion error");
                self.terminate();
            }
            Err(err) => {
                warn!(log_len = self.log.len(), error = %err, "turn failed, keeping user turn");
            }
        }
        result
    }

    pub async fn send(&mut self, text: impl Into<String>) -> Result<Completion, CompletionError> {
        self.begin_turn(text);
        let result = self.request().await;
        self.record(result)
    }
}
