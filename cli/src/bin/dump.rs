use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gschema::dump_to_json;

#[derive(Parser)]
#[command(name = "gschema-dump", version)]
#[command(about = "Print a compiled schema cache as JSON", long_about = None)]
struct Cli {
    /// A `gschemas.compiled` file
    file: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = fs::read(&cli.file)
        .map_err(gschema::CacheError::from)
        .and_then(|data| dump_to_json(&data));

    match result {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}: {}", cli.file.display(), err);
            ExitCode::from(1)
        }
    }
}
