//! # Mandi Agent Entry Point
//!
//! Background process that keeps the local price store in sync with the
//! remote endpoint. The setup lives in `lib.rs`.

use std::process::ExitCode;

use mandi_agent::{AgentArgs, USAGE};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    mandi_agent::init_tracing();

    let args = match AgentArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match mandi_agent::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Agent stopped with an error");
            ExitCode::FAILURE
        }
    }
}
