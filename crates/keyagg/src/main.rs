mod input;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use keyagg_core::accumulator::multiset::MultisetAccumulator;
use keyagg_core::config::AggregateConfig;
use keyagg_core::driver::Driver;
use keyagg_core::finalize::Median;
use keyagg_core::numeric::NumericValue;
use keyagg_core::observe::TracingObserver;
use keyagg_core::source::MemorySource;
use keyagg_error::{Result, ResultExt};
use logutil::LogFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One `key<TAB>median` line per key.
    Human,
    /// JSON array of `{"key": .., "statistic": ..}` objects.
    Json,
}

#[derive(Parser)]
#[clap(name = "keyagg")]
struct Arguments {
    /// File containing `key,value` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped. If omitted, a
    /// small built-in dataset is used.
    #[clap(short = 'f', long)]
    file: Option<PathBuf>,
    /// Number of partitions to split the input into.
    #[clap(short = 'p', long, default_value_t = 16)]
    partitions: usize,
    /// Set a configuration value, e.g. `--set merge_fan_in=4`.
    #[clap(long = "set", value_name = "NAME=VALUE", value_parser = parse_setting)]
    settings: Vec<(String, String)>,
    /// Output format. Output is always sorted by key.
    #[clap(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,
    /// Default log level. RUST_LOG takes precedence.
    #[clap(long, default_value_t = tracing::Level::ERROR)]
    log_level: tracing::Level,
    /// Emit logs as JSON.
    #[clap(long)]
    log_json: bool,
    /// Log each partition's records before processing.
    ///
    /// Logged at debug level, so needs `--log-level debug`.
    #[clap(long)]
    show_partitions: bool,
    /// Print all settings with their current values, then exit.
    #[clap(long)]
    list_settings: bool,
}

fn parse_setting(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

/// Compute the median value for every key in the input.
fn main() {
    let args = Arguments::parse();
    let log_format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::HumanReadable
    };
    logutil::configure_global_logger(args.log_level, log_format, io::stderr);

    // Nested result. Outer result for the panic, inner is the run result.
    let result = std::panic::catch_unwind(|| inner(args));

    match result {
        Ok(Err(err)) => {
            println!("ERROR: {err}");
            std::process::exit(1);
        }
        Err(err) => {
            println!("PANIC: {err:?}");
            std::process::exit(2);
        }
        Ok(Ok(())) => (),
    }
}

fn inner(args: Arguments) -> Result<()> {
    let mut conf = AggregateConfig::new();
    for (name, value) in &args.settings {
        conf.set_from_str(name, value)?;
    }

    let mut stdout = BufWriter::new(io::stdout());

    if args.list_settings {
        for (name, description) in AggregateConfig::settings() {
            let value = conf.get_as_scalar(name)?;
            writeln!(stdout, "{name} = {value}")?;
            writeln!(stdout, "    {description}")?;
        }
        stdout.flush()?;
        return Ok(());
    }

    let records = match &args.file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .context_fn(|| format!("Failed to read input file '{}'", path.display()))?;
            input::parse_records(&content)?
        }
        None => input::sample_records(),
    };

    let source = MemorySource::parallelize(records, args.partitions)?;
    let driver = Driver::new(MultisetAccumulator::<NumericValue>::new(), Median, conf);

    let mut output = if args.show_partitions {
        driver.run_with_observer(&source, &TracingObserver)?
    } else {
        driver.run(&source)?
    };
    output.sort_unstable_by(|a, b| a.key.cmp(&b.key));

    match args.format {
        OutputFormat::Human => {
            for pair in &output {
                writeln!(stdout, "{}\t{}", pair.key, pair.statistic)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut stdout, &output).context("Failed to write JSON output")?;
            writeln!(stdout)?;
        }
    }
    stdout.flush()?;

    Ok(())
}
