use anyhow::{Context, Result};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::completion::{CompletionClient, CompletionError};
use crate::model::Completion;
use crate::session::{Command, Session};

const THINKING: &str = "Claude is thinking...";
const RULE_WIDTH: usize = 60;

/// Why the interactive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    Farewell,
    EndOfInput,
    Interrupted,
    AuthenticationFailed,
}

impl ReplExit {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::AuthenticationFailed)
    }
}

/// Drives `session` from `input` until an exit keyword, end of input, a fatal
/// provider error, or `interrupt` resolving. `interrupt` is polled first at
/// both suspension points, so it wins over pending input or a pending call.
pub async fn run_repl<C, R, W, I>(
    session: &mut Session<C>,
    input: R,
    out: &mut W,
    interrupt: I,
) -> Result<ReplExit>
where
    C: CompletionClient,
    R: AsyncBufRead + Unpin,
    W: Write,
    I: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    print_banner(out, session.model())?;

    loop {
        write!(out, "You: ")?;
        out.flush().context("Failed to flush stdout")?;

        let line = tokio::select! {
            biased;
            _ = &mut interrupt => return interrupted(session, out, Pending::Input),
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            writeln!(out)?;
            writeln!(out, "Goodbye! Thanks for chatting with Claude.")?;
            session.terminate();
            info!("input closed, ending chat");
            return Ok(ReplExit::EndOfInput);
        };

        match Command::parse(&line) {
            Command::Empty => continue,
            Command::Exit => {
                writeln!(out)?;
                writeln!(out, "Goodbye! Thanks for chatting with Claude.")?;
                writeln!(out)?;
                session.terminate();
                return Ok(ReplExit::Farewell);
            }
            Command::Reset => {
                session.reset();
                writeln!(out)?;
                writeln!(out, "Conversation cleared. Starting fresh!")?;
                writeln!(out)?;
            }
            Command::Help => print_help(out)?,
            Command::Prompt(text) => {
                session.begin_turn(text);

                writeln!(out)?;
                write!(out, "{THINKING}")?;
                out.flush().context("Failed to flush stdout")?;

                let result = tokio::select! {
                    biased;
                    _ = &mut interrupt => None,
                    result = session.request() => Some(result),
                };
                clear_thinking(out)?;

                let Some(result) = result else {
                    debug!(log_len = session.log().len(), "interrupted during completion");
                    return interrupted(session, out, Pending::Completion);
                };

                match session.record(result) {
                    Ok(completion) => print_reply(out, &completion)?,
                    Err(CompletionError::AuthenticationFailed(_)) => {
                        writeln!(out, "Authentication failed. Check your API key.")?;
                        writeln!(out, "Get a key from: https://console.anthropic.com/")?;
                        writeln!(out)?;
                        return Ok(ReplExit::AuthenticationFailed);
                    }
                    Err(CompletionError::RateLimited { retry_after, .. }) => {
                        match retry_after {
                            Some(wait) => writeln!(
                                out,
                                "Rate limit reached. Please wait {}s and try again.",
                                wait.as_secs()
                            )?,
                            None => writeln!(out, "Rate limit reached. Please wait a moment.")?,
                        }
                        writeln!(out)?;
                    }
                    Err(err) => {
                        writeln!(out, "Error: {err}")?;
                        writeln!(out)?;
                    }
                }
            }
        }
    }
}

/// Where the loop was suspended when the interrupt arrived.
#[derive(Clone, Copy)]
enum Pending {
    /// Cursor sits after the `You: ` prompt.
    Input,
    /// Cursor sits at the start of the blanked thinking line.
    Completion,
}

fn interrupted<C, W>(session: &mut Session<C>, out: &mut W, pending: Pending) -> Result<ReplExit>
where
    C: CompletionClient,
    W: Write,
{
    session.terminate();
    if let Pending::Input = pending {
        writeln!(out)?;
    }
    writeln!(out)?;
    writeln!(out, "Chat interrupted. Goodbye!")?;
    writeln!(out)?;
    out.flush().context("Failed to flush stdout")?;
    info!("chat interrupted");
    Ok(ReplExit::Interrupted)
}

fn print_banner<W: Write>(out: &mut W, model: &str) -> Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "{:^RULE_WIDTH$}", "Claude Terminal Chat")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "model: {model}")?;
    writeln!(out)?;
    writeln!(out, "Commands:")?;
    writeln!(out, "  - Type your message to chat")?;
    writeln!(out, "  - 'clear', 'reset' or 'new' - Start new conversation")?;
    writeln!(out, "  - 'exit', 'quit' or 'bye' - Exit chat")?;
    writeln!(out, "  - 'help' - Show commands")?;
    writeln!(out, "{rule}")?;
    writeln!(out)?;
    Ok(())
}

fn print_help<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "Commands:")?;
    writeln!(out, "  - clear/reset/new - Start new conversation")?;
    writeln!(out, "  - exit/quit/bye/q - Exit chat")?;
    writeln!(out, "  - help/? - Show this message")?;
    writeln!(out)?;
    Ok(())
}

fn clear_thinking<W: Write>(out: &mut W) -> Result<()> {
    write!(out, "\r{}\r", " ".repeat(THINKING.len()))?;
    Ok(())
}

fn print_reply<W: Write>(out: &mut W, completion: &Completion) -> Result<()> {
    writeln!(out, "Claude:")?;
    writeln!(out, "{}", completion.text.trim())?;
    writeln!(out)?;
    if let Some(usage) = completion.usage {
        writeln!(
            out,
            "   Tokens: {} in, {} out",
            usage.input_tokens, usage.output_tokens
        )?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::time::Duration;

    use super::{ReplExit, THINKING, run_repl};
    use crate::completion::CompletionError;
    use crate::model::{Completion, Turn};
    use crate::session::tests::{Scripted, StubClient, test_config};
    use crate::session::{Session, SessionState};

    async fn drive(
        session: &mut Session<StubClient>,
        input: &str,
    ) -> (ReplExit, String) {
        let mut out = Vec::new();
        let exit = run_repl(session, input.as_bytes(), &mut out, pending())
            .await
            .expect("repl should not fail");
        (exit, String::from_utf8(out).expect("output should be utf-8"))
    }

    #[tokio::test]
    async fn chat_then_exit_prints_reply_and_usage() {
        let cfg = test_config();
        let client = StubClient::scripted([Scripted::Reply(
            Completion::new("Hi there").with_usage(10, 4),
        )]);
        let mut session = Session::new(client, &cfg);

        let (exit, output) = drive(&mut session, "Hello\nexit\n").await;

        assert_eq!(exit, ReplExit::Farewell);
        assert!(exit.is_success());
        assert!(output.contains("Hi there"), "output:\n{output}");
        assert!(output.contains("Tokens: 10 in, 4 out"), "output:\n{output}");
        assert!(output.contains("Goodbye!"), "output:\n{output}");
        assert_eq!(
            session.log().turns(),
            &[Turn::user("Hello"), Turn::assistant("Hi there")]
        );
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn blank_lines_and_help_never_reach_the_provider() {
        let cfg = test_config();
        let mut session = Session::new(StubClient::default(), &cfg);

        let (exit, output) = drive(&mut session, "\n   \nhelp\n?\nQUIT\n").await;

        assert_eq!(exit, ReplExit::Farewell);
        assert!(session.client().calls.borrow().is_empty());
        assert!(session.log().is_empty());
        assert!(output.contains("help/? - Show this message"), "output:\n{output}");
    }

    #[tokio::test]
    async fn reset_clears_history_between_turns() {
        let cfg = test_config();
        let mut session = Session::new(StubClient::default(), &cfg);

        let (_, output) = drive(&mut session, "A\nreset\nC\nbye\n").await;

        assert!(output.contains("Conversation cleared"), "output:\n{output}");
        assert_eq!(
            session.log().turns(),
            &[Turn::user("C"), Turn::assistant("echo: C")]
        );
        assert_eq!(session.client().calls.borrow()[1], vec![Turn::user("C")]);
    }

    #[tokio::test]
    async fn rate_limit_and_errors_keep_the_loop_running() {
        let cfg = test_config();
        let client = StubClient::scripted([
            Scripted::Fail(CompletionError::rate_limited(
                "slow down",
                Some(Duration::from_secs(30)),
            )),
            Scripted::Fail(CompletionError::other("Connection refused by model API")),
            Scripted::Reply(Completion::new("finally")),
        ]);
        let mut session = Session::new(client, &cfg);

        let (exit, output) = drive(&mut session, "Q\nR\nS\nq\n").await;

        assert_eq!(exit, ReplExit::Farewell);
        assert!(
            output.contains("Rate limit reached. Please wait 30s"),
            "output:\n{output}"
        );
        assert!(
            output.contains("Error: Connection refused by model API"),
            "output:\n{output}"
        );
        assert_eq!(
            session.client().calls.borrow()[2],
            vec![Turn::user("Q"), Turn::user("R"), Turn::user("S")]
        );
        assert_eq!(session.log().len(), 4);
    }

    #[tokio::test]
    async fn authentication_failure_stops_the_loop() {
        let cfg = test_config();
        let client = StubClient::scripted([Scripted::Fail(
            CompletionError::AuthenticationFailed("invalid x-api-key".into()),
        )]);
        let mut session = Session::new(client, &cfg);

        let (exit, output) = drive(&mut session, "Hello\nnever read\n").await;

        assert_eq!(exit, ReplExit::AuthenticationFailed);
        assert!(!exit.is_success());
        assert!(output.contains("Check your API key"), "output:\n{output}");
        assert_eq!(session.client().calls.borrow().len(), 1);
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn end_of_input_ends_gracefully() {
        let cfg = test_config();
        let mut session = Session::new(StubClient::default(), &cfg);

        let (exit, _) = drive(&mut session, "Hello\n").await;

        assert_eq!(exit, ReplExit::EndOfInput);
        assert!(exit.is_success());
        assert_eq!(session.log().len(), 2);
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_input_terminates() {
        let cfg = test_config();
        let mut session = Session::new(StubClient::default(), &cfg);
        let mut out = Vec::new();

        let exit = run_repl(&mut session, "Hello\n".as_bytes(), &mut out, async {})
            .await
            .expect("repl should not fail");

        let output = String::from_utf8(out).expect("output should be utf-8");
        assert_eq!(exit, ReplExit::Interrupted);
        assert!(
            output.ends_with("You: \n\nChat interrupted. Goodbye!\n\n"),
            "output:\n{output}"
        );
        assert!(session.log().is_empty());
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn interrupt_during_call_keeps_the_user_turn() {
        let cfg = test_config();
        let client = StubClient::scripted([Scripted::Hang]);
        let mut session = Session::new(client, &cfg);
        let mut out = Vec::new();

        let exit = run_repl(
            &mut session,
            "Hello\n".as_bytes(),
            &mut out,
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .expect("repl should not fail");

        let output = String::from_utf8(out).expect("output should be utf-8");
        assert_eq!(exit, ReplExit::Interrupted);
        assert_eq!(session.log().turns(), &[Turn::user("Hello")]);
        assert_eq!(session.client().calls.borrow().len(), 1);
        assert_eq!(session.state(), SessionState::Terminated);
        let notice = format!("\r{}\r\nChat interrupted", " ".repeat(THINKING.len()));
        assert!(output.contains(&notice), "output:\n{output:?}");
    }

    #[tokio::test]
    async fn rate_limit_without_retry_hint_asks_to_wait() {
        let cfg = test_config();
        let client = StubClient::scripted([Scripted::Fail(CompletionError::rate_limited(
            "slow down",
            None,
        ))]);
        let mut session = Session::new(client, &cfg);

        let (exit, output) = drive(&mut session, "Hello
exit
").await;

        assert_eq!(exit, ReplExit::Farewell);
        assert!(
            output.contains("Rate limit reached. Please wait a moment."),
            "output:\n{output}"
        );
        assert_eq!(session.log().turns(), &[Turn::user("Hello")]);
    }
}
