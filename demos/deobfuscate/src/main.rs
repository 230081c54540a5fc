use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use retrace::Retracer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    // `RUST_LOG` takes precedence over `--verbose`.
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .event_format(fmt::format().compact().with_target(false).without_time())
        .init();
}

fn execute(matches: &ArgMatches) -> Result<()> {
    init_logging(matches.get_flag("verbose"));

    // `required` is enforced by clap.
    let mapping_path = matches.get_one::<PathBuf>("mapping").unwrap();
    let mapping = std::fs::read(mapping_path)
        .with_context(|| format!("failed to read mapping file {}", mapping_path.display()))?;
    let retracer = Retracer::parse(&mapping).context("failed to parse mapping file")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Some(names) = matches.get_many::<String>("name") {
        for name in names {
            writeln!(out, "{}", retracer.translate_name(name))?;
        }
        return Ok(out.flush()?);
    }

    match matches.get_one::<PathBuf>("trace") {
        Some(path) => {
            let trace = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read trace {}", path.display()))?;
            write!(out, "{}", retracer.translate_str(&trace))?;
        }
        None => {
            for line in io::stdin().lock().lines() {
                let line = line.context("failed to read from stdin")?;
                writeln!(out, "{}", retracer.translate_line(&line))?;
            }
        }
    }

    Ok(out.flush()?)
}

fn main() {
    let matches = Command::new("deobfuscate")
        .about("Restores original names and line numbers in yGuard obfuscated stack traces.")
        .arg(
            Arg::new("mapping")
                .short('m')
                .long("mapping")
                .required(true)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the yGuard mapping file."),
        )
        .arg(
            Arg::new("trace")
                .value_name("TRACE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the obfuscated stack trace. Reads from standard input if omitted."),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .value_name("FQN")
                .action(ArgAction::Append)
                .conflicts_with("trace")
                .help("Translate a qualified name instead of a stack trace. May be repeated."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Print debug logs to standard error."),
        )
        .get_matches();

    if let Err(e) = execute(&matches) {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
