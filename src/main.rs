use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tss")]
#[command(version = "0.1.0")]
#[command(about = "TSS to TSD compiler", long_about = None)]
struct Args {
    /// Output TSD file
    output: PathBuf,

    /// Input TSS file (reads from stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Log more details (repeat for debug and trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), tss::Error> {
    let args = Args::parse();
    tss::logger::init(tss::logger::level_from_flags(args.verbose, args.quiet));

    let mut compiler = tss::Compiler::new();

    match &args.input {
        Some(path) => compiler.compile_file(path, &args.output)?,
        None => compiler.compile(std::io::stdin(), &args.output)?,
    }

    Ok(())
}
