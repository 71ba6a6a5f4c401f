//! Interactive chat with Claude in the terminal.
//!
//! Reads `ANTHROPIC_API_KEY` from the environment (or a `.env` file) and
//! prompts for it when missing. Type `help` inside the chat for commands.

use std::io::Write;

#[tokio::main]
async fn main() {
    parley::logging::init();
    let exit = parley::run_chat().await;
    let _ = std::io::stdout().flush();
    parley::logging::shutdown();
    // A pending stdin read would otherwise hold the runtime open on shutdown.
    std::process::exit(exit.code());
}
