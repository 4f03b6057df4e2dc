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

//! Library for converting from
//! [TCX](https://www8.garmin.com/xmlschemas/TrainingCenterDatabasev2.xsd) to
//! [KML](https://developers.google.com/kml).
//!
//! A TCX track log of a single activity is read with [`tcx::open`] or
//! [`tcx::read`]. The resulting [`tcx::Activity`] yields an
//! [`ActivitySummary`] for display and a sequence of positioned [`Sample`]s.
//! The samples are then turned into a points or a path KML document by a
//! [`kml::MapWriter`].
//!
//! See [`read_file`] for the shortest way in.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod kml;
pub mod summary;
pub mod tcx;

pub use kml::{path_document, points_document, DocumentKind, MapWriter, Template};
pub use summary::{ActivitySummary, HeartRate};

/// Error returned from reading TCX or writing KML.
#[derive(Error, Debug)]
pub enum Error {
    /// The input file does not exist.
    #[error("file not found: '{}'", path.display())]
    FileNotFound { path: PathBuf },
    /// The input file does not carry the TCX extension.
    #[error("invalid file format: '{}' is not a .tcx file", path.display())]
    InvalidFormat { path: PathBuf },
    /// A required TCX element or attribute is missing.
    #[error("malformed TCX document: missing <{element}>")]
    MalformedDocument { element: &'static str },
    /// A TCX value could not be parsed.
    #[error("malformed TCX document: invalid <{element}> value '{value}'")]
    InvalidValue { element: &'static str, value: String },
    /// The document ends inside an open element.
    #[error("malformed TCX document: ends inside <{element}>")]
    Truncated { element: String },
    /// There are no positioned samples to write.
    #[error("no trackpoints with a position to convert")]
    EmptySequence,
    /// Writing the KML output failed.
    #[error("writing '{}' failed: {source}", path.display())]
    WriteFailure { path: PathBuf, source: io::Error },
    /// Opening or reading the input file failed.
    #[error("reading '{}' failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The document is not well-formed XML.
    #[error("reading XML failed: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Any other I/O failure on a stream.
    #[error("I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Use double precision for coordinate values.
pub type CoordValue = f64;

/// One positioned trackpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Degrees north.
    pub latitude: CoordValue,
    /// Degrees east.
    pub longitude: CoordValue,
    /// Cumulative distance from the start in meters.
    pub distance: f64,
}

impl Sample {
    pub fn new(latitude: CoordValue, longitude: CoordValue, distance: f64) -> Self {
        Self {
            latitude,
            longitude,
            distance,
        }
    }
}

/// Read the TCX file at `path` and return its summary and samples.
///
/// The extension is checked before the file is opened. An empty sample
/// sequence is not an error here; the [`kml`] writers reject it.
///
/// # Example
/// ```no_run
/// # use tcx_kml_convert::{read_file, points_document};
/// #
/// let (summary, samples) = read_file("morning_run.tcx").expect("reading failed");
/// println!("{summary}");
/// let kml = points_document("morning_run", &samples).expect("no positions");
/// assert!(!kml.is_empty());
/// ```
pub fn read_file(path: impl AsRef<Path>) -> Result<(ActivitySummary, Vec<Sample>), Error> {
    let activity = tcx::open(path)?;
    Ok((activity.summary(), activity.samples()))
}
