// Copyright 2023 Viktor Reusch
//
// This file is part of tcx_kml_convert.
//
// tcx_kml_convert is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// tcx_kml_convert is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with tcx_kml_convert. If not, see <https://www.gnu.org/licenses/>.

//! This is the command-line interface for the TCX-to-KML converter.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use tcx_kml_convert::{tcx, DocumentKind, Error, MapWriter};
use tracing_subscriber::EnvFilter;

/// Convert a TCX activity to KML using its trackpoint positions.
#[derive(Parser, Debug)]
#[command(name = "tcx2kml", version)]
struct Cli {
    /// .tcx file to convert to .kml
    file: PathBuf,
    /// Output directory, created if missing
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
    /// Do not print the activity summary
    #[arg(short, long)]
    silent: bool,
    /// Only write the points KML
    #[arg(long, conflicts_with = "path")]
    points: bool,
    /// Only write the path KML
    #[arg(long)]
    path: bool,
    /// Read the activity but do not write any KML
    #[arg(long)]
    no_write: bool,
    /// Print the KML to standard output instead of writing files, one complete
    /// document per selected kind; the summary then goes to standard error
    #[arg(long)]
    stdout: bool,
}

impl Cli {
    /// Documents selected by `--points` and `--path`.
    fn kinds(&self) -> Vec<DocumentKind> {
        match (self.points, self.path) {
            (true, false) => vec![DocumentKind::Points],
            (false, true) => vec![DocumentKind::Path],
            _ => DocumentKind::ALL.to_vec(),
        }
    }
}

fn main() -> ExitCode {
    // Logs go to STDERR so that `--stdout` output stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed arguments");
    match run(&cli, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Convert the input named by `cli`, printing to `out` what belongs on
/// standard output.
fn run(cli: &Cli, out: &mut impl Write) -> Result<(), Error> {
    if !cli.file.exists() {
        return Err(Error::FileNotFound {
            path: cli.file.clone(),
        });
    }
    if !cli.file.is_file() {
        return Err(Error::InvalidFormat {
            path: cli.file.clone(),
        });
    }

    let activity = tcx::open(&cli.file)?;
    if !cli.silent {
        if cli.stdout {
            eprintln!("{}", activity.summary());
        } else {
            writeln!(out, "{}", activity.summary())?;
        }
    }
    if cli.no_write {
        return Ok(());
    }

    let samples = activity.samples();
    if samples.is_empty() {
        return Err(Error::EmptySequence);
    }
    let name = stem(&cli.file);
    let writer = MapWriter::default();

    if cli.stdout {
        for kind in cli.kinds() {
            writer.write(kind, &name, &samples, &mut *out)?;
        }
        return Ok(());
    }

    fs::create_dir_all(&cli.output).map_err(|source| Error::WriteFailure {
        path: cli.output.clone(),
        source,
    })?;
    for kind in cli.kinds() {
        let path = cli.output.join(kind.file_name(&name));
        writer.save(kind, &name, &samples, &path)?;
        writeln!(out, "{kind} KML written to '{}'", path.display())?;
    }
    Ok(())
}

/// Name of the activity, taken from the input file.
fn stem(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
