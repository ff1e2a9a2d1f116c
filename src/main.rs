use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use tabexec::cache::{self, DatasetCache};
use tabexec::cli::{Cli, Command};
use tabexec::config::Config;
use tabexec::dataset::Dataset;
use tabexec::envelope::{EnvelopeEvent, OutputEnvelope};
use tabexec::error::ExecError;
use tabexec::exec::sandbox::Sandbox;
use tabexec::exec::{CodeTask, ExecutionOutcome, Executor, PlotFormat};
use tabexec::remote::RemoteClient;
use tabexec::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabexec=info")),
        )
        .init();

    let args = Cli::parse();
    let cfg = Config::load();

    match args.command {
        Command::Serve {
            addr,
            cache_capacity,
        } => {
            let addr = addr
                .or_else(|| cfg.get("LISTEN_ADDR"))
                .unwrap_or_else(|| "127.0.0.1:8731".into());
            let capacity = cache_capacity
                .or_else(|| cfg.get_usize("CACHE_CAPACITY"))
                .unwrap_or(cache::DEFAULT_CAPACITY);
            let state = Arc::new(AppState {
                cache: DatasetCache::new(capacity)?,
                sandbox: Sandbox::from_config(&cfg),
            });
            server::serve(&addr, state).await
        }

        Command::Run {
            code,
            dataset,
            dataset_id,
            remote,
            output_dir,
            plots_dir,
            format,
            no_artifacts,
        } => {
            let source = std::fs::read_to_string(&code)
                .with_context(|| format!("reading code file {}", code.display()))?;
            let plot_format: PlotFormat = match format.or_else(|| cfg.get("PLOT_FORMAT")) {
                Some(s) => s.parse()?,
                None => PlotFormat::Png,
            };

            let mut task = CodeTask::new(source);
            task.capture_artifacts = !no_artifacts;
            task.plot_format = plot_format;
            task.output_dir = output_dir;
            task.plots_dir = plots_dir.clone();

            let result = match remote {
                Some(base_url) => {
                    if let Some(id) = dataset_id {
                        task = task.with_remote_dataset(id);
                    }
                    let timeout = cfg.get_usize("REQUEST_TIMEOUT").unwrap_or(60) as u64;
                    let client = RemoteClient::new(base_url, timeout)?;
                    client.execute(&task).await
                }
                None => {
                    if let Some(path) = dataset {
                        let bytes = std::fs::read(&path)
                            .with_context(|| format!("reading dataset {}", path.display()))?;
                        task = task.with_dataset(Dataset::from_csv_bytes(bytes));
                    }
                    Sandbox::from_config(&cfg).execute(&task).await
                }
            };
            // Transport-level failures still get presented, marked as such;
            // they are not attributable to the submitted code.
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(ExecError::Infrastructure(msg)) => {
                    ExecutionOutcome::infrastructure_error(format!("InfrastructureError: {msg}"))
                }
                Err(e) => return Err(e.into()),
            };

            render_envelope(OutputEnvelope::from_outcome(&outcome), plots_dir)?;
            Ok(())
        }

        Command::Upload {
            dataset,
            id,
            remote,
        } => {
            let client = match remote {
                Some(base_url) => {
                    let timeout = cfg.get_usize("REQUEST_TIMEOUT").unwrap_or(60) as u64;
                    RemoteClient::new(base_url, timeout)?
                }
                None => RemoteClient::from_config(&cfg)?,
            };
            let bytes = std::fs::read(&dataset)
                .with_context(|| format!("reading dataset {}", dataset.display()))?;
            let info = client.upload_dataset(&id, bytes).await?;
            println!("{} rows, {} columns", info.rows, info.columns.len());
            for col in info.columns {
                println!("  {}  {}", col.name, col.dtype);
            }
            Ok(())
        }
    }
}

/// Print the envelope's event stream; plot payloads go to files when a
/// plots directory was given, otherwise only their presence is reported.
fn render_envelope(envelope: OutputEnvelope, plots_dir: Option<PathBuf>) -> Result<()> {
    let exhausted = envelope.exhausted;
    for event in envelope.into_events() {
        match event {
            EnvelopeEvent::Text(text) => {
                if exhausted {
                    eprintln!("{}", "automatic correction budget exhausted".red());
                    eprintln!("{text}");
                } else {
                    print!("{text}");
                }
            }
            EnvelopeEvent::Plot(plot) => match &plots_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    let path = dir.join(format!(
                        "artifact_{}.{}",
                        plot.sequence_index,
                        plot.format.as_str()
                    ));
                    std::fs::write(&path, &plot.payload)?;
                    eprintln!("{} {}", "plot:".green(), path.display());
                }
                None => eprintln!(
                    "{} artifact {} ({} bytes)",
                    "plot:".green(),
                    plot.sequence_index,
                    plot.payload.len()
                ),
            },
            EnvelopeEvent::DatasetPath(path) => {
                eprintln!("{} {}", "dataset:".cyan(), path.display());
            }
            EnvelopeEvent::Done => {}
        }
    }
    Ok(())
}
