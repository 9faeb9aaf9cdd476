use clap::{error::ErrorKind, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gschema::ByteOrder;
use gschema_compiler::{compile_directory, CompileOptions};

#[derive(Parser)]
#[command(name = "gschema-compile", version)]
#[command(about = "Compile all settings schema files in a directory into a schema cache", long_about = None)]
struct Cli {
    /// Directory holding the `.gschema` files
    directory: PathBuf,

    /// Where to store the gschemas.compiled file (defaults to DIRECTORY)
    #[arg(long, value_name = "DIRECTORY")]
    targetdir: Option<PathBuf>,

    /// Byte order of the written cache: little, big, native or swapped
    #[arg(long, default_value = "little", value_parser = parse_byte_order)]
    byte_order: ByteOrder,
}

fn parse_byte_order(name: &str) -> Result<ByteOrder, String> {
    ByteOrder::from_name(name).ok_or_else(|| format!("unknown byte order '{}'", name))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    let mut options = CompileOptions::new(&cli.directory).with_byte_order(cli.byte_order);
    if let Some(targetdir) = cli.targetdir {
        options = options.with_target_dir(targetdir);
    }

    match compile_directory(&options) {
        Ok(output) => {
            tracing::debug!(output = %output.display(), "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(1)
        }
    }
}
