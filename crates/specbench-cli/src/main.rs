//! Specbench CLI
//!
//! Commands:
//! - `specbench run <template>` - Resolve a template and benchmark it
//! - `specbench snapshot <template>` - Freeze a template (and optional report) into the store
//! - `specbench verify <path>...` - Check stored snapshots for tampering
//! - `specbench list <name>` - List stored versions of a template
//! - `specbench compare <name> <from> <to>` - Diff two stored versions

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use specbench_core::metrics::METRICS;
use specbench_core::obs::RunSpan;
use specbench_core::{
    compare, format_report, render_report_md, GeneratorOptions, Pipeline, ResolutionCache,
    RunReport, SnapshotGenerator, SnapshotStore, SpecbenchConfig, StoredSnapshot,
};
use tracing::{info, warn, Level};

/// Specbench - benchmark specialist templates and keep immutable snapshots
#[derive(Parser)]
#[command(name = "specbench")]
#[command(author = "Specbench Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Specialist template benchmarking with immutable snapshots", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// JSON configuration file
    #[arg(long, global = true, env = "SPECBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Benchmark harness executable
    #[arg(long, global = true, env = "SPECBENCH_HARNESS")]
    harness: Option<String>,

    /// Snapshot store root directory
    #[arg(long, global = true, env = "SPECBENCH_STORE")]
    store: Option<PathBuf>,

    /// Number of concurrent harness executions
    #[arg(long, global = true, env = "SPECBENCH_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Per-execution timeout in seconds
    #[arg(long, global = true, env = "SPECBENCH_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a template and run its benchmarks
    Run {
        /// Template file
        template: PathBuf,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Retry failed executions up to this many times
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Save a snapshot of the run to the store
        #[arg(long)]
        save: bool,

        /// Allow snapshotting a prerelease version
        #[arg(long)]
        allow_prerelease: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Snapshot a template without running it
    Snapshot {
        /// Template file
        template: PathBuf,

        /// JSON report from a previous `run --format json` to include
        #[arg(long)]
        report: Option<PathBuf>,

        /// Allow snapshotting a prerelease version
        #[arg(long)]
        allow_prerelease: bool,
    },

    /// Verify stored snapshot files
    Verify {
        /// Snapshot files (relative paths resolve against the store root)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List stored versions of a template, highest first
    List {
        /// Template name
        name: String,
    },

    /// Compare two stored versions of a template
    Compare {
        /// Template name
        name: String,

        /// Baseline version
        from: String,

        /// Candidate version
        to: String,

        /// Print the comparison as JSON
        #[arg(long)]
        as_json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    specbench_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(&cli)?;

    let outcome = match cli.command {
        Commands::Run {
            template,
            format,
            retries,
            save,
            allow_prerelease,
            output,
        } => {
            cmd_run(
                &config,
                &template,
                format,
                retries,
                save,
                allow_prerelease,
                output.as_deref(),
            )
            .await
        }
        Commands::Snapshot {
            template,
            report,
            allow_prerelease,
        } => cmd_snapshot(&config, &template, report.as_deref(), allow_prerelease),
        Commands::Verify { paths } => cmd_verify(&config, &paths),
        Commands::List { name } => cmd_list(&config, &name),
        Commands::Compare {
            name,
            from,
            to,
            as_json,
        } => cmd_compare(&config, &name, &from, &to, as_json),
    };

    METRICS.flush();
    outcome
}

/// File config (or defaults) with flag and environment overrides applied.
fn load_config(cli: &Cli) -> Result<SpecbenchConfig> {
    let mut config = match &cli.config {
        Some(path) => SpecbenchConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SpecbenchConfig::default(),
    };

    if let Some(binary) = &cli.harness {
        config.harness.binary = binary.clone();
    }
    if let Some(root) = &cli.store {
        config.store.root = root.clone();
    }
    if let Some(n) = cli.concurrency {
        config.execution.concurrency = Some(n);
    }
    if let Some(secs) = cli.timeout_secs {
        config.execution.timeout_secs = secs;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_store(config: &SpecbenchConfig) -> Result<SnapshotStore> {
    SnapshotStore::open(&config.store.root).with_context(|| {
        format!(
            "Failed to open snapshot store: {}",
            config.store.root.display()
        )
    })
}

async fn cmd_run(
    config: &SpecbenchConfig,
    template: &Path,
    format: ReportFormat,
    retries: u32,
    save: bool,
    allow_prerelease: bool,
    output: Option<&Path>,
) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
    let mut cache = ResolutionCache::new();

    let run = pipeline
        .run(template, &mut cache, None)
        .await
        .with_context(|| format!("Failed to run template: {}", template.display()))?;
    for warning in &run.warnings {
        warn!(warning = %warning, "benchmark discovery");
    }
    let run = pipeline.retry_failures(run, retries).await;

    let rendered = match format {
        ReportFormat::Markdown => render_report_md(&run.report),
        ReportFormat::Json => serde_json::to_string_pretty(&run.report)?,
    };
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write report: {}", path.display()))?,
        None => println!("{}", rendered),
    }

    if save {
        let store = open_store(config)?;
        let options = GeneratorOptions {
            allow_prerelease,
            ..GeneratorOptions::default()
        };
        let (snapshot, stored) = pipeline
            .record(&run, options, &store)
            .context("Failed to save snapshot")?;
        print_stored(snapshot.name(), snapshot.version(), &stored);
    }

    Ok(())
}

fn cmd_snapshot(
    config: &SpecbenchConfig,
    template: &Path,
    report: Option<&Path>,
    allow_prerelease: bool,
) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
    let mut cache = ResolutionCache::new();
    let resolved = pipeline
        .resolver()
        .resolve(template, &mut cache)
        .with_context(|| format!("Failed to resolve template: {}", template.display()))?;

    let _span = RunSpan::enter(&format!("{}@{}", resolved.name, resolved.version));

    let results = match report {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read report: {}", path.display()))?;
            let report: RunReport =
                serde_json::from_str(&text).context("Failed to parse report as JSON")?;
            Some(report.results)
        }
        None => None,
    };

    let generator = SnapshotGenerator::new(GeneratorOptions {
        allow_prerelease,
        include_results: results.is_some(),
        include_aggregate: results.is_some(),
    });
    let snapshot = generator
        .generate(&resolved, results.as_deref())
        .context("Failed to generate snapshot")?;

    let store = open_store(config)?;
    let stored = store.save(&snapshot).context("Failed to save snapshot")?;
    print_stored(snapshot.name(), snapshot.version(), &stored);
    Ok(())
}

fn print_stored(name: &str, version: &str, stored: &StoredSnapshot) {
    if stored.skipped {
        println!("Snapshot {} v{} already stored", name, version);
    } else {
        println!("Saved snapshot {} v{}", name, version);
    }
    println!("  Path:     {}", stored.path.display());
    println!("  Checksum: {}", stored.checksum);
    println!("  Id:       {}", stored.snapshot_id);
}

fn cmd_verify(config: &SpecbenchConfig, paths: &[PathBuf]) -> Result<()> {
    let store = open_store(config)?;
    let mut failed = 0usize;

    for path in paths {
        let report = store.verify(path);
        if !report.is_valid() {
            failed += 1;
        }
        println!("{}", report);
    }

    info!(checked = paths.len(), failed = failed, "verification complete");
    if failed > 0 {
        bail!("{} of {} snapshot(s) failed verification", failed, paths.len());
    }
    Ok(())
}

fn cmd_list(config: &SpecbenchConfig, name: &str) -> Result<()> {
    let store = open_store(config)?;
    let entries = store.list(name).context("Failed to read manifest")?;
    if entries.is_empty() {
        println!("No snapshots stored for {}", name);
        return Ok(());
    }

    let latest = store.latest(name)?.map(|e| e.version);
    for entry in entries {
        let marker = if latest.as_deref() == Some(entry.version.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} v{:<12} {} {}",
            marker,
            entry.version,
            entry.saved_at.format("%Y-%m-%d %H:%M:%S"),
            entry.path
        );
    }
    Ok(())
}

fn cmd_compare(
    config: &SpecbenchConfig,
    name: &str,
    from: &str,
    to: &str,
    as_json: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let before = store
        .load_version(name, from)
        .with_context(|| format!("Failed to load {} v{}", name, from))?;
    let after = store
        .load_version(name, to)
        .with_context(|| format!("Failed to load {} v{}", name, to))?;

    let comparison = compare(&before, &after);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    } else {
        print!("{}", format_report(&comparison));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from([
            "specbench",
            "--concurrency",
            "4",
            "run",
            "t.json",
            "--format",
            "json",
            "--retries",
            "2",
            "--save",
        ])
        .unwrap();
        assert_eq!(cli.concurrency, Some(4));
        match cli.command {
            Commands::Run {
                template,
                format,
                retries,
                save,
                ..
            } => {
                assert_eq!(template, PathBuf::from("t.json"));
                assert_eq!(format, ReportFormat::Json);
                assert_eq!(retries, 2);
                assert!(save);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("specbench.json");
        std::fs::write(&path, r#"{"execution": {"timeout_secs": 30}}"#).unwrap();

        let cli = Cli::try_parse_from([
            "specbench",
            "--config",
            path.to_str().unwrap(),
            "--harness",
            "/opt/bench/harness",
            "list",
            "t",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.execution.timeout_secs, 30);
        assert_eq!(config.harness.binary, "/opt/bench/harness");
    }

    #[test]
    fn test_zero_timeout_override_is_rejected() {
        let cli =
            Cli::try_parse_from(["specbench", "--timeout-secs", "0", "list", "t"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
