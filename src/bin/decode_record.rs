//! decode_record - Decode one detection record offline.
//!
//! Reads a raw record (or its base64 text with --base64) from a file or stdin and prints
//! one JSON line per detection followed by the rendered labels.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::PathBuf;

use aitrios_monitor::detect::{self, DecodedRecord};
use aitrios_monitor::render;

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode an AITRIOS detection record")]
struct Args {
    /// Record file; stdin when omitted.
    input: Option<PathBuf>,

    /// Input is base64 text (the "O" field of an inference result).
    #[arg(long)]
    base64: bool,

    /// Comma separated class names used for the labels.
    #[arg(long, env = "AITRIOS_CLASSES", value_delimiter = ',', default_value = "CLASS0,CLASS1,CLASS2")]
    classes: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let raw = match args.input.as_ref() {
        Some(path) => std::fs::read(path).with_context(|| format!("read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("read stdin")?;
            buf
        }
    };

    let record: DecodedRecord = if args.base64 {
        let text = String::from_utf8(raw).context("base64 input is not utf-8")?;
        detect::decode_base64_record(&text)?
    } else {
        detect::decode_detections(&raw)?
    };

    for diagnostic in &record.diagnostics {
        log::info!("{}", diagnostic);
    }
    for detection in &record.detections {
        println!("{}", serde_json::to_string(detection)?);
    }
    for detection in &record.detections {
        println!("{}", render::detection_label(detection, &args.classes));
    }
    Ok(())
}
