//! Ask Claude a single question from the command line.
//!
//! ```bash
//! parley-ask "Explain recursion"
//! ```

use std::env;
use std::io::Write;

#[tokio::main]
async fn main() {
    parley::logging::init();
    let args: Vec<String> = env::args().skip(1).collect();
    let exit = parley::run_ask(args).await;
    let _ = std::io::stdout().flush();
    parley::logging::shutdown();
    std::process::exit(exit.code());
}
