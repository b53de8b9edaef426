//! Execution process: `harness-exec <module.function> <payload>`.
//!
//! Always prints exactly one JSON result line on stdout and exits 0. Anything
//! it writes to stderr is treated by the supervisor as a transport failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use harness::{capture, encoder, sandbox};
use harness_common::ExecutionResult;

#[derive(Parser)]
#[command(name = "harness-exec", version)]
struct Args {
    /// Handler reference in `module.function` form
    handler: String,
    /// Path to the JSON payload, or `-` to read it from stdin
    payload: PathBuf,
}

fn main() -> ExitCode {
    sandbox::install_panic_hook();
    capture::install_log_sink();

    let result = match Args::try_parse() {
        Ok(args) => sandbox::execute(&functions::registry(), &args.handler, &args.payload),
        Err(e) => {
            let rendered = e.render().to_string();
            ExecutionResult::failure(
                format!("ProtocolError: {}", rendered.trim_end()),
                String::new(),
                0,
            )
        }
    };

    // A closed stdout leaves nothing to report to.
    let _ = encoder::emit(std::io::stdout().lock(), &result);
    ExitCode::SUCCESS
}
