//! TSD to JSON converter

use clap::Parser;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tss::tsd::TsdJson;

#[derive(Parser, Debug)]
#[command(name = "tsd2json")]
#[command(version = "0.1.0")]
#[command(about = "Convert TSD files to JSON", long_about = None)]
struct Args {
    /// Input TSD file, optionally gzip-compressed
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tss::logger::init(log::LevelFilter::Warn);

    let data = read_tsd_file(&args.input)?;
    let tsd_json = TsdJson::from_bytes(&data)?;

    let json_string = if args.compact {
        serde_json::to_string(&tsd_json)?
    } else {
        serde_json::to_string_pretty(&tsd_json)?
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json_string.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", json_string);
        }
    }

    Ok(())
}

/// Read a TSD file, decompressing it when gzip is named or detected
fn read_tsd_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;

    let named_gzip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let has_magic = data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b;

    if named_gzip || has_magic {
        let mut decompressed = Vec::new();
        GzDecoder::new(&data[..]).read_to_end(&mut decompressed)?;
        Ok(decompressed)
    } else {
        Ok(data)
    }
}
