//! # Decode a File
//!
//! Opens an audio file with the first capable backend, prints its metadata
//! and counts the decoded PCM.
//!
//! Run with: `cargo run --example decode_file --package core-decode -- <path> [--blocks N]`

use anyhow::{bail, Context};
use core_decode::{available_backends, Dispatcher, DecodeConfig};
use core_runtime::logging::{init_logging, LogLevel, LoggingConfig};

fn main() -> anyhow::Result<()> {
    let logging = LoggingConfig::from_env()
        .context("bad logging environment")?
        .with_level(LogLevel::Debug);
    init_logging(logging).context("failed to initialize logging")?;

    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut max_blocks: Option<usize> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--blocks" => {
                let value = args.next().context("--blocks needs a value")?;
                max_blocks = Some(value.parse().context("--blocks must be a number")?);
            }
            _ if path.is_none() => path = Some(arg),
            other => bail!("unexpected argument '{}'", other),
        }
    }
    let Some(path) = path else {
        bail!("usage: decode_file <path> [--blocks N]");
    };

    println!("Available backends: {:?}", available_backends());

    let config = match std::env::var("PCMTAP_CONFIG") {
        Ok(file) => DecodeConfig::from_json_file(&file)
            .with_context(|| format!("failed to load config from {}", file))?,
        Err(_) => DecodeConfig::default(),
    };

    let dispatcher = Dispatcher::with_default_registry(config)?;
    let mut stream = dispatcher
        .open(&path)
        .with_context(|| format!("failed to open {}", path))?;

    println!("Backend:     {}", stream.backend_name());
    println!("Duration:    {:.2}s", stream.duration());
    println!("Channels:    {}", stream.channels());
    println!("Sample rate: {} Hz", stream.sample_rate());

    let mut blocks = 0usize;
    let mut bytes = 0usize;
    for block in stream.blocks() {
        let block = block?;
        blocks += 1;
        bytes += block.len();
        if max_blocks.is_some_and(|max| blocks >= max) {
            break;
        }
    }
    stream.close();

    let frames = bytes / stream.info().bytes_per_frame().max(1);
    println!(
        "Decoded {} blocks, {} bytes ({:.2}s of audio)",
        blocks,
        bytes,
        frames as f64 / stream.sample_rate() as f64
    );

    Ok(())
}
