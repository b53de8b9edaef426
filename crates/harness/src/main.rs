use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use harness::config::{self, HarnessConfig};
use harness::encoder;
use harness::error::HarnessResult;
use harness::supervisor::{Supervisor, SupervisorConfig, Termination};
use harness_common::ExecutionResult;
use tracing::Level;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

/// Run one handler in an isolated execution process and print its result.
#[derive(Parser)]
#[command(name = "harness", version)]
struct Cli {
    /// Handler reference in `module.function` form
    handler: String,
    /// Path to the JSON payload, or `-` to read it from stdin
    payload: PathBuf,
    /// YAML config file
    #[arg(long, env = "HARNESS_CONFIG")]
    config: Option<PathBuf>,
    /// Execution timeout in milliseconds (overrides the config file)
    #[arg(long, env = "HARNESS_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
    /// Execution binary (overrides the config file)
    #[arg(long, env = "HARNESS_EXEC_BIN")]
    exec_bin: Option<PathBuf>,
    /// Log supervisor activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    async fn supervisor_config(&self) -> HarnessResult<SupervisorConfig> {
        let mut harness = match &self.config {
            Some(path) => config::load(path).await?,
            None => HarnessConfig::default(),
        };
        if let Some(timeout_ms) = self.timeout_ms {
            harness.timeout_ms = timeout_ms;
        }
        if let Some(exec_bin) = &self.exec_bin {
            harness.exec_bin = Some(exec_bin.clone());
        }
        harness.supervisor_config()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let rendered = e.render().to_string();
            let result = ExecutionResult::failure(
                format!("usage error: {}", rendered.trim_end()),
                String::new(),
                0,
            );
            let _ = encoder::emit(std::io::stdout().lock(), &result);
            return ExitCode::from(2);
        }
    };

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let (result, code) = match cli.supervisor_config().await {
        Ok(config) => {
            let supervised = Supervisor::new(config).run(&cli.handler, &cli.payload).await;
            let code = match supervised.termination {
                Termination::LaunchFailed => ExitCode::FAILURE,
                Termination::Completed | Termination::TimedOut | Termination::Crashed => {
                    ExitCode::SUCCESS
                }
            };
            (supervised.result, code)
        }
        Err(e) => {
            tracing::error!("{e}");
            (
                ExecutionResult::failure(e.to_string(), String::new(), 0),
                ExitCode::FAILURE,
            )
        }
    };

    if let Err(e) = encoder::emit(std::io::stdout().lock(), &result) {
        eprintln!("error: cannot write result: {e}");
        return ExitCode::FAILURE;
    }
    code
}
