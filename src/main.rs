//! Binary entry point for the `tarx` command-line tool.
//!
//! Parses arguments with [`tarx::cli`], wires stdin/file archive sources
//! into [`tarx::open_archive`], and dispatches to the library's extractor or
//! a direct archive-reader walk for `list`/`test`. All decision-making
//! (security policy, ceilings, path handling) lives in the library; this
//! file only does process-boundary things: argv, stdio, exit codes.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tarx::cli::{exit_code_for_result, Cli, Command, ExtractArgs, ListArgs, TestArgs, STDIN_SENTINEL};
use tarx::{open_archive, Context, Extractor};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let exit_code = run(cli);
    std::process::exit(exit_code);
}

fn init_logging(cli: &Cli) {
    let default_level = match verbosity(cli) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn verbosity(cli: &Cli) -> u8 {
    match &cli.command {
        Command::Extract(args) => args.verbose,
        Command::List(_) | Command::Test(_) => 0,
    }
}

fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Extract(args) => run_extract(args),
        Command::List(args) => run_list(args),
        Command::Test(args) => run_test(args),
    }
}

/// Opens `archive` for reading, treating [`STDIN_SENTINEL`] as a request to
/// read from standard input instead of a named file.
fn open_input(archive: &Path) -> io::Result<Box<dyn Read>> {
    if archive.as_os_str() == STDIN_SENTINEL {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(File::open(archive)?))
    }
}

fn run_extract(args: ExtractArgs) -> i32 {
    let config = args.build_config();
    let context = Context::new().with_archive(args.archive.display().to_string());

    let source = match open_input(&args.archive) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tarx: {}: {e}", args.archive.display());
            return tarx::ErrorKind::FileNotFound.exit_code();
        }
    };

    let reader = match open_archive(source, config.max_decompressed_size, context.clone()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("tarx: {e}");
            return e.exit_code();
        }
    };

    let mut extractor = Extractor::new(reader, &args.destination, config).with_archive_context(context);

    match extractor.run() {
        Ok(result) => {
            println!(
                "{} extracted, {} failed, {} bytes written",
                result.succeeded, result.failed, result.total_bytes
            );
            for warning in &result.warnings {
                eprintln!("tarx: warning: {} [{:?}]: {}", warning.entry_path, warning.kind, warning.message);
            }
            exit_code_for_result(&result)
        }
        Err(e) => {
            eprintln!("tarx: {e}");
            e.exit_code()
        }
    }
}

fn run_list(args: ListArgs) -> i32 {
    let context = Context::new().with_archive(args.archive.display().to_string());

    let source = match open_input(&args.archive) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tarx: {}: {e}", args.archive.display());
            return tarx::ErrorKind::FileNotFound.exit_code();
        }
    };

    let mut reader = match open_archive(source, tarx::container::DEFAULT_MAX_DECOMPRESSED_SIZE, context) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("tarx: {e}");
            return e.exit_code();
        }
    };

    loop {
        match reader.next() {
            Ok(Some(entry)) => {
                println!("{:>12} {:o} {}", entry.size, entry.mode, entry.path);
            }
            Ok(None) => return 0,
            Err(e) => {
                eprintln!("tarx: {e}");
                return e.exit_code();
            }
        }
    }
}

fn run_test(args: TestArgs) -> i32 {
    let context = Context::new().with_archive(args.archive.display().to_string());

    let source = match open_input(&args.archive) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tarx: {}: {e}", args.archive.display());
            return tarx::ErrorKind::FileNotFound.exit_code();
        }
    };

    let mut reader = match open_archive(source, tarx::container::DEFAULT_MAX_DECOMPRESSED_SIZE, context) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("tarx: {e}");
            return e.exit_code();
        }
    };

    let mut buf = [0u8; 64 * 1024];
    let mut entries = 0u64;
    loop {
        match reader.next() {
            Ok(Some(entry)) => {
                entries += 1;
                let mut remaining = entry.size;
                while remaining > 0 {
                    let want = remaining.min(buf.len() as u64) as usize;
                    match reader.read(&mut buf[..want]) {
                        Ok(0) => {
                            eprintln!("tarx: {} is truncated", entry.path);
                            return tarx::ErrorKind::IncompleteArchive.exit_code();
                        }
                        Ok(n) => remaining -= n as u64,
                        Err(e) => {
                            eprintln!("tarx: {e}");
                            return e.exit_code();
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("tarx: {e}");
                return e.exit_code();
            }
        }
    }

    println!("{entries} entries OK");
    0
}
