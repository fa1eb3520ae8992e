use anyhow::{Context, Error, Result};
use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::time::Duration;
use termcolor::{BufferedStandardStream, Color, ColorChoice, ColorSpec, WriteColor};
use tracing_subscriber::EnvFilter;

use georegion::input::FileOrStdin;
use georegion::{LookupOptions, Region, RegionResult};

const DEFAULT_DATABASE: &str = "/usr/share/GeoIP/GeoLite2-City.mmdb";

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::BrokenPipe {
                return true;
            }
        }
    }
    false
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Region-capable MMDB database to query
    #[clap(
        short,
        long,
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath,
        env = "GEOREGION_DB",
        default_value = DEFAULT_DATABASE
    )]
    database: Utf8PathBuf,

    /// Read the whole database into memory instead of memory-mapping it
    #[clap(short, long)]
    memory_cache: bool,

    /// Run lookups on a background pool and collect results through callbacks
    #[clap(short = 'a', long = "async")]
    async_mode: bool,

    /// Delay in milliseconds applied before each background lookup
    #[clap(long, value_name = "MS", default_value_t = 0, requires = "async_mode")]
    latency_ms: u64,

    /// Output one JSON object per host
    #[clap(long)]
    json: bool,

    /// Use colors for country and region codes
    #[clap(short = 'C', long, value_enum, default_value_t = ArgsColorChoice::Auto)]
    color: ArgsColorChoice,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Read hosts from file(s), one per line. Use "-" for stdin
    #[clap(short = 'f', long = "file", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    files: Vec<Utf8PathBuf>,

    /// Hosts or IPv4 addresses to look up. Leave empty to read from stdin
    #[clap(value_name = "HOST")]
    hosts: Vec<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum ArgsColorChoice {
    Always,
    Never,
    Auto,
}

/// What one host came back with.
enum Outcome {
    Found(RegionResult),
    Empty,
    NoMatch,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    host: &'a str,
    #[serde(flatten)]
    result: Option<&'a RegionResult>,
}

fn main() -> ExitCode {
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    // Handle broken pipe errors gracefully
    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut std::io::stderr(), "{:?}", err);
    } else {
        let _ = writeln!(&mut std::io::stderr(), "{:#}", err);
    }

    ExitCode::FAILURE
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,georegion={}", level)));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    // auto colors only when stdout is a tty
    let colormode = match args.color {
        ArgsColorChoice::Auto => {
            if std::io::stdout().is_terminal() {
                ColorChoice::Always
            } else {
                ColorChoice::Never
            }
        }
        ArgsColorChoice::Always => ColorChoice::Always,
        ArgsColorChoice::Never => ColorChoice::Never,
    };

    let hosts = collect_hosts(&args)?;

    let options = LookupOptions::default().with_latency(Duration::from_millis(args.latency_ms));
    let region = Region::open(&args.database, args.memory_cache)
        .with_context(|| format!("failed to open region database at {}", args.database))?
        .with_options(options);

    let outcomes = if args.async_mode {
        lookup_all_async(&region, &hosts)?
    } else {
        lookup_all_sync(&region, &hosts)?
    };
    region.close();

    let mut out = BufferedStandardStream::stdout(colormode);
    for (host, outcome) in hosts.iter().zip(&outcomes) {
        if args.json {
            write_json(&mut out, host, outcome)?;
        } else {
            write_text(&mut out, host, outcome)?;
        }
    }
    out.flush()?;

    Ok(ExitCode::SUCCESS)
}

fn collect_hosts(args: &Args) -> Result<Vec<String>> {
    let mut hosts = args.hosts.clone();

    let mut sources: Vec<FileOrStdin> = args
        .files
        .iter()
        .cloned()
        .map(FileOrStdin::from_path)
        .collect();
    if hosts.is_empty() && sources.is_empty() {
        sources.push(FileOrStdin::Stdin);
    }

    for source in sources {
        source
            .reader()?
            .for_each_host(|host| {
                hosts.push(host.to_string());
                Ok(())
            })
            .with_context(|| format!("failed to read hosts from {}", source))?;
    }
    Ok(hosts)
}

fn lookup_all_sync(region: &Region, hosts: &[String]) -> Result<Vec<Outcome>> {
    hosts
        .iter()
        .map(|host| match region.lookup_sync(host) {
            Ok(Some(found)) => Ok(Outcome::Found(found)),
            Ok(None) => Ok(Outcome::Empty),
            Err(georegion::Error::NoMatchFound { .. }) => Ok(Outcome::NoMatch),
            Err(err) => Err(err).with_context(|| format!("lookup failed for {}", host)),
        })
        .collect()
}

fn lookup_all_async(region: &Region, hosts: &[String]) -> Result<Vec<Outcome>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for (idx, host) in hosts.iter().enumerate() {
            let tx = tx.clone();
            region.lookup(host, move |found| {
                let _ = tx.send((idx, found));
            })?;
        }
        drop(tx);

        let mut outcomes: Vec<Outcome> = hosts.iter().map(|_| Outcome::Empty).collect();
        while let Some((idx, found)) = rx.recv().await {
            if let Some(found) = found {
                outcomes[idx] = Outcome::Found(found);
            }
        }
        Ok::<_, Error>(outcomes)
    })
}

fn write_text<W: WriteColor>(out: &mut W, host: &str, outcome: &Outcome) -> Result<()> {
    match outcome {
        Outcome::Found(found) => {
            write!(out, "{}\t", host)?;
            out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
            write!(out, "{}", found.country_code)?;
            out.reset()?;
            write!(out, "\t")?;
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{}", found.region)?;
            out.reset()?;
            writeln!(out)?;
        }
        Outcome::Empty => writeln!(out, "{}\t-\t-", host)?,
        Outcome::NoMatch => {
            writeln!(out, "{}\t?\t?", host)?;
            tracing::warn!(host, "can not find match data");
        }
    }
    Ok(())
}

fn write_json<W: Write>(out: &mut W, host: &str, outcome: &Outcome) -> Result<()> {
    let result = match outcome {
        Outcome::Found(found) => Some(found),
        Outcome::Empty | Outcome::NoMatch => None,
    };
    serde_json::to_writer(&mut *out, &JsonRecord { host, result })?;
    writeln!(out)?;
    Ok(())
}
