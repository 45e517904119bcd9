//! linlog: check a key-value client log for linearizability.
//!
//! # Usage
//!
//! ```bash
//! linlog run.log --timeout 10
//! ```
//!
//! Exit status: 0 linearizable, 1 not linearizable, 2 usage or fatal error,
//! 3 inconclusive, 4 no events in the log.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use linlog_check::{
    visualization_path, Reporter, Verdict, Verifier, VerifierConfig, VerifyError,
    TIMEOUT_SECONDS_DEFAULT,
};
use linlog_core::Annotation;

/// Default log filter when `RUST_LOG` is unset.
const LOG_FILTER_DEFAULT: &str = "linlog_core=info,linlog_check=info,linlog=info";

const EXIT_LINEARIZABLE: i32 = 0;
const EXIT_VIOLATION: i32 = 1;
const EXIT_FATAL: i32 = 2;
const EXIT_INCONCLUSIVE: i32 = 3;
const EXIT_NO_EVENTS: i32 = 4;

/// Check a key-value client log for linearizability.
#[derive(Parser, Debug)]
#[command(name = "linlog")]
#[command(about = "Linearizability checker for key-value register logs")]
struct Cli {
    /// Log file with worker Setting/Set/Getting/Get lines.
    log: PathBuf,

    /// Time budget for the check in seconds.
    ///
    /// When it runs out the verdict is inconclusive, never a pass.
    #[arg(long, default_value_t = TIMEOUT_SECONDS_DEFAULT)]
    timeout: u64,

    /// Do not write `<LOG>.visualization.json`.
    #[arg(long)]
    no_visualization: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LOG_FILTER_DEFAULT));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    println!("Checking linearizability of log file: {}", cli.log.display());

    let config = VerifierConfig::default()
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_visualization(!cli.no_visualization)
        .with_annotations([Annotation::new(0u64, 0, 0, "Test Start")
            .with_text_color("#ffffff")
            .with_background_color("#4CAF50")]);
    let verifier = Verifier::new(config);

    let verification = match verifier.verify_log(&cli.log) {
        Ok(v) => v,
        Err(VerifyError::NoEvents) => {
            println!("No events found in log file!");
            process::exit(EXIT_NO_EVENTS);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(EXIT_FATAL);
        }
    };

    let visualization = verifier.config().visualize.then(|| visualization_path(&cli.log));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = Reporter::new().report(&mut out, &verification, visualization.as_deref()) {
        eprintln!("Error: failed to write report: {e}");
    }
    let _ = out.flush();

    let code = match verification.verdict {
        Verdict::Linearizable => EXIT_LINEARIZABLE,
        Verdict::Violation(_) => EXIT_VIOLATION,
        Verdict::Inconclusive => EXIT_INCONCLUSIVE,
    };
    process::exit(code);
}
