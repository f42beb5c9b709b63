use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;

use txfile::{begin, end, TxError, TxFlags};

#[derive(Parser)]
#[command(
    name = "txf",
    version,
    about = "Atomically replace a file from stdin or another file",
    disable_version_flag = true
)]
struct Cli {
    /// Output path to replace atomically
    output: PathBuf,

    /// Read input from this file instead of stdin
    #[arg(short = 'f', long = "file", value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Permission bits to apply if OUTPUT does not already exist (octal, e.g. 644)
    #[arg(short = 'm', long = "mode", value_name = "MODE", default_value = "644")]
    mode: String,

    /// Debug logging
    #[arg(short = 'd', long)]
    debug: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    #[cfg(unix)]
    txfile::signals::install_cleanup();

    if let Err(e) = run(cli) {
        let busy = e.chain().any(|cause| matches!(cause.downcast_ref::<TxError>(), Some(te) if te.is_busy()));
        if busy {
            eprintln!("{} {e:#} (try again once the other process finishes)", "Busy:".yellow());
        } else {
            eprintln!("{} {e:#}", "Error:".red());
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mode = u32::from_str_radix(cli.mode.trim_start_matches("0o"), 8)
        .with_context(|| format!("invalid mode '{}': expected octal digits", cli.mode))?;

    let fd = begin(&cli.output, TxFlags::CREATE, mode)
        .with_context(|| format!("begin transaction on {}", cli.output.display()))?;

    match stream_input(&cli.input, fd) {
        Ok(()) => end(fd, true).with_context(|| format!("commit {}", cli.output.display())),
        Err(e) => {
            let _ = end(fd, false);
            Err(e).with_context(|| format!("stream input into {}", cli.output.display()))
        },
    }
}

fn stream_input(input: &Option<PathBuf>, fd: std::os::unix::io::RawFd) -> Result<()> {
    use std::os::unix::io::FromRawFd;

    // The transaction owns `fd`'s lifetime via the registry; dup so this
    // `File` can close its own handle without touching the original.
    let dup_fd = unsafe { libc::dup(fd) };
    if dup_fd < 0 {
        return Err(io::Error::last_os_error()).context("dup transaction fd");
    }
    let mut dst = unsafe { File::from_raw_fd(dup_fd) };

    let mut src: Box<dyn Read> = match input {
        Some(path) => Box::new(File::open(path).with_context(|| format!("open {}", path.display()))?),
        None => Box::new(io::stdin()),
    };

    let mut buffer = [0u8; 4096];
    loop {
        let n = src.read(&mut buffer).context("read input")?;
        if n == 0 {
            break;
        }
        dst.write_all(&buffer[..n]).context("write to transaction")?;
    }

    Ok(())
}
