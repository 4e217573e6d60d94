// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Minimal encode loop: read a raw file, push it through a vendor codec
//! session and count the frames coming out.
//!
//! ```sh
//! cargo run --example encode_loop -- \
//!     --library libdspce.so --engine encode --codec h264enc input.yuv
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;
use dce::{CodecParams, Session, SessionConfig};

#[derive(Parser)]
#[command(about = "Push a raw file through a DSP codec session")]
struct Args {
    /// Path to the vendor codec-engine shared library.
    #[arg(long, default_value = "libdspce.so")]
    library: String,

    /// Engine name from the vendor configuration.
    #[arg(long, default_value = "encode")]
    engine: String,

    /// Codec name to create on the engine.
    #[arg(long, default_value = "h264enc")]
    codec: String,

    /// Target bitrate in bits per second.
    #[arg(long, default_value_t = 4_000_000)]
    bitrate: u32,

    /// Raw input file.
    input: std::path::PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let data = std::fs::read(&args.input)?;

    let api = dce::load_api(&args.library)?;
    let engine = dce::Engine::open(api, &args.engine)?;

    let frames = Arc::new(AtomicUsize::new(0));
    let bytes_out = Arc::new(AtomicUsize::new(0));

    let session = Session::spawn(
        SessionConfig {
            backpressure_bytes: 64 * 1024,
            ..SessionConfig::default()
        },
        Box::new({
            let codec = args.codec.clone();
            let params = CodecParams {
                bitrate: Some(args.bitrate),
                ..CodecParams::default()
            };
            move || Ok(Box::new(engine.create_codec(&codec, &params)?) as Box<_>)
        }),
        Box::new({
            let frames = Arc::clone(&frames);
            let bytes_out = Arc::clone(&bytes_out);
            move |frame| {
                frames.fetch_add(1, Ordering::Relaxed);
                bytes_out.fetch_add(frame.len, Ordering::Relaxed);
                Ok(())
            }
        }),
    )?;

    for (i, chunk) in data.chunks(8192).enumerate() {
        session.enqueue(chunk, Some(i as u64 * 1_000_000))?;
    }
    session.finish()?;

    println!(
        "{} byte(s) in, {} frame(s) / {} byte(s) out",
        data.len(),
        frames.load(Ordering::Relaxed),
        bytes_out.load(Ordering::Relaxed),
    );
    Ok(())
}
