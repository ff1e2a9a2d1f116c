use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "tabexec", about = "Sandboxed execution of generated data-analysis code", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the remote execution service.
    Serve {
        /// Listen address, host:port.
        #[arg(long)]
        addr: Option<String>,

        /// Dataset cache capacity. At the default of 1, concurrent
        /// sessions with distinct dataset ids evict each other.
        #[arg(long = "cache-capacity")]
        cache_capacity: Option<usize>,
    },

    /// Execute a code file once, locally or against a running service.
    Run {
        /// Path to the Python analysis code.
        code: PathBuf,

        /// CSV dataset to bind as `df` (local execution only).
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Dataset id already uploaded to the service (remote execution).
        #[arg(long = "dataset-id")]
        dataset_id: Option<String>,

        /// Execute against this service URL instead of the local sandbox.
        #[arg(long)]
        remote: Option<String>,

        /// Directory the code may write new dataset files into.
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,

        /// Directory to persist captured plot files into.
        #[arg(long = "plots-dir")]
        plots_dir: Option<PathBuf>,

        /// Plot artifact format (png|json|html).
        #[arg(long)]
        format: Option<String>,

        /// Skip chart instrumentation and artifact capture.
        #[arg(long = "no-artifacts")]
        no_artifacts: bool,
    },

    /// Upload a CSV dataset to a running service under a chosen id.
    Upload {
        /// Path to the CSV file.
        dataset: PathBuf,

        /// Caller-chosen dataset id.
        #[arg(long)]
        id: String,

        /// Service URL (defaults to EXEC_BASE_URL).
        #[arg(long)]
        remote: Option<String>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
