//! Command-line front end for the flattener. Argument parsing, temp-file
//! naming, and atomic rename live here; none of the atom-format logic does.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use qt_flatten::ErrorKind;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Rewrite a QuickTime/MP4 container so its `moov` index precedes `mdat`,
/// so streaming clients can read metadata before the media arrives.
#[derive(Parser)]
#[command(name = "qt-flatten")]
#[command(version)]
struct Cli {
    /// Allow the relocated moov to be zlib-compressed if it fits in the
    /// estimated size.
    #[arg(short = 'c', long = "compress")]
    allow_compressed_moov: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Source movie file.
    input: PathBuf,

    /// Destination path. Defaults to flattening `INPUT` in place.
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).without_time().with_target(false).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("qt-flatten: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli) -> qt_flatten::Result<()> {
    let in_place = match &cli.output {
        None => true,
        Some(output) => output == &cli.input,
    };

    if in_place {
        info!(path = %cli.input.display(), "flattening in place");
        match qt_flatten::flatten_in_place(&cli.input, cli.allow_compressed_moov) {
            Ok(()) => Ok(()),
            Err(err) if matches!(err.kind, ErrorKind::NoFreeSpace) => {
                debug!("no usable free space, falling back to a full rewrite");
                flatten_via_temp_file(&cli.input, &cli.input, cli.allow_compressed_moov)
            }
            Err(err) => Err(err),
        }
    } else {
        let output = cli.output.as_ref().unwrap();
        create_exclusive(output)?;
        flatten_via_temp_file(&cli.input, output, cli.allow_compressed_moov)
    }
}

/// Creates `path` exclusively up front, purely to surface a collision
/// before any work is done. The placeholder this leaves on disk is
/// overwritten by the final rename once the temp file is ready.
fn create_exclusive(path: &Path) -> qt_flatten::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).create_new(true).open(path).map_err(|e| {
        qt_flatten::Error::new(qt_flatten::ErrorKind::WriteError(e), format!("{} already exists", path.display()))
    })?;
    drop(file);
    Ok(())
}

fn flatten_via_temp_file(src: &Path, dst: &Path, allow_compressed_moov: bool) -> qt_flatten::Result<()> {
    let temp_path = temp_path_for(dst);
    debug!(temp = %temp_path.display(), "writing to temp file");

    qt_flatten::flatten_to_new_file(src, &temp_path, allow_compressed_moov)?;

    std::fs::rename(&temp_path, dst).map_err(|e| {
        qt_flatten::Error::new(qt_flatten::ErrorKind::WriteError(e), "Error renaming temp file into place")
    })?;

    info!(output = %dst.display(), "flatten complete");
    Ok(())
}

fn temp_path_for(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_owned();
    name.push(".temp");
    PathBuf::from(name)
}
