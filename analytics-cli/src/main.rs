//! Block Analytics replay CLI
//!
//! Replays JSON-lines event files through the analytics-engine library. It
//! adds what the library leaves out:
//! - TOML configuration of the engine, the output and the deployed models
//! - Event file parsing
//! - Output writing (JSON lines or text, stdout or one file per event file)
//! - A replay summary per event file (stderr, plus JSON next to the outputs)
//!
//! Event files are independent: each one gets its own model registry and
//! they are replayed in parallel.

use analytics_engine::{
    EngineConfig, ModelDescriptor, ModelRegistry, OutputEmitter, OutputFormat, Scheduler,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

mod config;
mod events;
mod report;

use config::AppConfig;
use events::BusEvent;
use report::RunSummary;

/// Block Analytics - replay event files through deployed analytics models
#[derive(Parser, Debug)]
#[command(name = "analytics-cli")]
#[command(about = "Replay timestamped events through block analytics models", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Event file(s) to replay (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    events: Vec<PathBuf>,

    /// Directory for output files (default: stdout)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Output format: json or text (overrides the config file)
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Write the final block state of every model after replay
    #[arg(long)]
    dump_state: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// Everything produced by replaying one event file
struct FileRun {
    path: PathBuf,
    rendered: Vec<u8>,
    state: Option<serde_json::Value>,
    summary: RunSummary,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Block Analytics CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using analytics-engine library v{}", analytics_engine::VERSION);

    log::info!("Loading configuration from: {:?}", args.config);
    let mut config = config::load_config(&args.config)?;
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(dir) = &args.output {
        config.output.output_dir = Some(dir.clone());
    }

    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let descriptors = config.descriptors(base_dir)?;

    let mut files = config.input.events.clone();
    files.extend(args.events.iter().cloned());
    if files.is_empty() {
        bail!("No event files given (use --events or [input] events in the config)");
    }

    if let Some(dir) = &config.output.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let runs: Vec<Result<FileRun>> = files
        .par_iter()
        .map(|path| replay_file(path, &config, &descriptors, args.dump_state))
        .collect();

    let mut failed = 0;
    for run in runs {
        match run {
            Ok(run) => {
                write_run(&run, &config)?;
                if run.summary.has_errors() {
                    log::warn!(
                        "{}: {} events rejected, {} malformed lines",
                        run.summary.source,
                        run.summary.error_count,
                        run.summary.malformed_lines
                    );
                }
                if !args.quiet {
                    eprint!("{}", run.summary.render_text());
                }
            }
            Err(e) => {
                log::error!("{:#}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} event files failed", failed, files.len());
    }
    Ok(())
}

/// Deploy every model into a fresh registry and replay one event file
fn replay_file(
    path: &Path,
    config: &AppConfig,
    descriptors: &[(String, ModelDescriptor)],
    dump_state: bool,
) -> Result<FileRun> {
    let source = path.display().to_string();
    log::info!("Replaying {}", source);
    let file = events::read_events(path)?;

    let mut registry = ModelRegistry::new();
    for (model_id, descriptor) in descriptors {
        registry
            .deploy(model_id, descriptor)
            .with_context(|| format!("Failed to deploy model {}", model_id))?;
    }

    let mut summary = RunSummary::new(&source, registry.len());
    summary.events = file.events.len();
    summary.malformed_lines = file.malformed;

    let engine: EngineConfig = config.engine.clone();
    let mut emitter = OutputEmitter::new(Vec::new(), config.output.format);
    let mut scheduler = Scheduler::new(&mut registry, engine);

    for event in &file.events {
        match event {
            BusEvent::Input(input) => match scheduler.dispatch(input) {
                Ok(dispatch) => {
                    emitter.emit_all(&dispatch.outputs)?;
                    if config.output.include_signals {
                        for signal in &dispatch.signals {
                            emitter.emit_signal(input.timestamp, signal)?;
                        }
                    }
                    summary.record_outputs(&dispatch.outputs);
                }
                Err(e) => {
                    log::warn!("{}: model {} t={}: {}", source, input.model_id, input.timestamp, e);
                    summary.record_error(input.timestamp, &e);
                }
            },
            BusEvent::Signal { timestamp, signal } => {
                let outputs = scheduler.broadcast(*timestamp, signal.clone());
                emitter.emit_all(&outputs)?;
                summary.record_outputs(&outputs);
            }
        }
    }
    summary.stats = scheduler.stats().clone();

    let state = dump_state.then(|| {
        let models: Vec<serde_json::Value> = registry
            .ids()
            .filter_map(|id| registry.get(id))
            .map(|model| model.snapshot())
            .collect();
        serde_json::Value::Array(models)
    });

    Ok(FileRun {
        path: path.to_path_buf(),
        rendered: emitter.into_inner(),
        state,
        summary,
    })
}

/// Write the outputs, summary and state dump of one replay
fn write_run(run: &FileRun, config: &AppConfig) -> Result<()> {
    let Some(dir) = &config.output.output_dir else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&run.rendered)?;
        if let Some(state) = &run.state {
            writeln!(stdout, "{}", serde_json::to_string_pretty(state)?)?;
        }
        return Ok(());
    };

    let stem = run
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "events".to_string());
    let extension = match config.output.format {
        OutputFormat::JsonLines => "jsonl",
        OutputFormat::Text => "txt",
    };

    let output_path = dir.join(format!("{}.out.{}", stem, extension));
    fs::write(&output_path, &run.rendered)
        .with_context(|| format!("Failed to write output file: {:?}", output_path))?;
    log::info!("Wrote {} bytes to {:?}", run.rendered.len(), output_path);

    let summary_path = dir.join(format!("{}.summary.json", stem));
    fs::write(&summary_path, run.summary.render_json()?)
        .with_context(|| format!("Failed to write summary file: {:?}", summary_path))?;

    if let Some(state) = &run.state {
        let state_path = dir.join(format!("{}.state.json", stem));
        fs::write(&state_path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Failed to write state file: {:?}", state_path))?;
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        fs::write(
            &path,
            r#"
            [engine]
            correlation_id = "test"

            [[models]]
            id = "model_0"
            blocks = [{ id = "band", type = "AlarmBand", parameters = { upper = 10.0, lower = 5.0 } }]
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_replay_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config::load_config(&write_config(dir.path())).unwrap();
        let descriptors = config.descriptors(dir.path()).unwrap();

        let events_path = dir.path().join("band.jsonl");
        let lines: Vec<String> = [3.0, 5.5, 7.5, 12.0, 6.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                format!(
                    r#"{{"timestamp": {}, "model": "model_0", "input": "value", "value": {}}}"#,
                    i + 1,
                    v
                )
            })
            .chain(std::iter::once(
                r#"{"timestamp": 0.5, "model": "model_0", "input": "value", "value": 1}"#.to_string(),
            ))
            .collect();
        fs::write(&events_path, lines.join("\n")).unwrap();

        let run = replay_file(&events_path, &config, &descriptors, true).unwrap();
        assert_eq!(run.summary.events, 7);
        assert_eq!(run.summary.stats.delivered, 6);
        assert_eq!(run.summary.stats.rejected, 1);
        assert_eq!(run.summary.outputs_by_id["model_0/entered"], 4);

        let text = String::from_utf8(run.rendered).unwrap();
        assert_eq!(text.lines().count(), 16);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["output_id"], "entered");
        assert_eq!(first["correlation_id"], "test");
        assert_eq!(first["timestamp"], 2.0);

        let state = run.state.unwrap();
        assert_eq!(state[0]["model_id"], "model_0");
        assert_eq!(state[0]["clock"], 6.0);
    }

    #[test]
    fn test_write_run_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config::load_config(&write_config(dir.path())).unwrap();
        config.output.format = OutputFormat::Text;
        config.output.output_dir = Some(dir.path().join("out"));
        fs::create_dir_all(dir.path().join("out")).unwrap();

        let run = FileRun {
            path: PathBuf::from("trace.jsonl"),
            rendered: b"Output(\"entered\")\n".to_vec(),
            state: Some(serde_json::json!([])),
            summary: RunSummary::new("trace.jsonl", 1),
        };
        write_run(&run, &config).unwrap();

        let written = fs::read_to_string(dir.path().join("out/trace.out.txt")).unwrap();
        assert_eq!(written, "Output(\"entered\")\n");
        assert!(dir.path().join("out/trace.state.json").exists());

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("out/trace.summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["source"], "trace.jsonl");
    }
}
