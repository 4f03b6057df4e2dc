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

//! Reading of TCX track logs.
//!
//! The XML is first parsed into a small element tree. The tree is then walked
//! along the fixed element names of the Training Center schema, producing an
//! [`Activity`] with typed, optional fields.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::summary::{ActivitySummary, HeartRate};
use crate::{CoordValue, Error, Sample};

/// File extension of TCX track logs.
pub const EXTENSION: &str = "tcx";

/// Name of the TCX root element.
const ROOT: &str = "TrainingCenterDatabase";

/// The first activity of a TCX document.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    /// _Sport_ attribute, e.g. `Running` or `Biking`.
    pub sport: String,
    /// _Id_ of the activity, which is its start time.
    pub id: DateTime<Utc>,
    pub laps: Vec<Lap>,
}

/// A TCX _Lap_.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lap {
    pub start_time: Option<DateTime<Utc>>,
    pub total_time_seconds: Option<f64>,
    pub distance_meters: f64,
    pub calories: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub maximum_heart_rate: Option<f64>,
    pub cadence: Option<f64>,
    /// Trackpoints of all _Track_s in this lap.
    pub trackpoints: Vec<Trackpoint>,
}

/// A TCX _Trackpoint_.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Trackpoint {
    pub time: Option<DateTime<Utc>>,
    /// Missing for pauses and indoor recordings.
    pub position: Option<Position>,
    /// Cumulative distance in meters.
    pub distance: Option<f64>,
    pub heart_rate: Option<f64>,
}

/// Complete latitude/longitude pair of a trackpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: CoordValue,
    pub longitude: CoordValue,
}

/// Check whether `path` carries the TCX file extension.
///
/// The comparison ignores ASCII case, since devices write both `.tcx` and
/// `.TCX`.
pub fn has_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
}

/// Open and read the TCX file at `path`.
///
/// Fails with [`Error::InvalidFormat`] before touching the file if the
/// extension is not `.tcx`.
pub fn open(path: impl AsRef<Path>) -> Result<Activity, Error> {
    let path = path.as_ref();
    if !has_extension(path) {
        return Err(Error::InvalidFormat {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;
    debug!(path = %path.display(), "reading TCX file");
    read(BufReader::new(file))
}

/// Read a complete TCX document from `source`.
///
/// # Example
/// ```
/// # use tcx_kml_convert::tcx;
/// #
/// let source = r#"<?xml version="1.0" encoding="UTF-8"?>
/// <TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
///   <Activities>
///     <Activity Sport="Running">
///       <Id>2023-05-01T07:30:00Z</Id>
///       <Lap StartTime="2023-05-01T07:30:00Z">
///         <DistanceMeters>12.5</DistanceMeters>
///         <Track>
///           <Trackpoint>
///             <Position>
///               <LatitudeDegrees>48.858222</LatitudeDegrees>
///               <LongitudeDegrees>2.2945</LongitudeDegrees>
///             </Position>
///             <DistanceMeters>0.0</DistanceMeters>
///           </Trackpoint>
///         </Track>
///       </Lap>
///     </Activity>
///   </Activities>
/// </TrainingCenterDatabase>
/// "#;
///
/// let activity = tcx::read(source.as_bytes()).expect("reading failed");
/// assert_eq!(activity.sport, "Running");
///
/// let samples = activity.samples();
/// assert_eq!(samples.len(), 1);
/// assert_eq!(samples[0].longitude, 2.2945);
/// ```
pub fn read(source: impl BufRead) -> Result<Activity, Error> {
    let root = parse_tree(source)?;
    if root.name != ROOT {
        return Err(Error::MalformedDocument { element: ROOT });
    }
    Activity::from_node(&root)
}

impl Activity {
    fn from_node(root: &Node) -> Result<Self, Error> {
        let mut activities = root.require("Activities")?.children_named("Activity");
        let node = activities.next().ok_or(Error::MalformedDocument {
            element: "Activity",
        })?;
        let ignored = activities.count();
        if ignored > 0 {
            warn!(ignored, "document contains several activities, using the first");
        }

        let sport = node
            .attr("Sport")
            .ok_or(Error::MalformedDocument { element: "Sport" })?
            .to_string();
        let id = parse_time("Id", &node.require("Id")?.text)?;
        let laps = node
            .children_named("Lap")
            .map(Lap::from_node)
            .collect::<Result<Vec<_>, _>>()?;
        if laps.is_empty() {
            return Err(Error::MalformedDocument { element: "Lap" });
        }

        Ok(Self { sport, id, laps })
    }

    /// All trackpoints of all laps in recording order.
    pub fn trackpoints(&self) -> impl Iterator<Item = &Trackpoint> {
        self.laps.iter().flat_map(|lap| lap.trackpoints.iter())
    }

    /// Extract the positioned trackpoints as samples.
    ///
    /// Trackpoints without a complete position are skipped. A sample whose
    /// trackpoint has no distance inherits the last distance recorded before
    /// it, or 0 at the start.
    pub fn samples(&self) -> Vec<Sample> {
        let mut samples = vec![];
        let mut distance = 0.0;
        let mut skipped = 0usize;
        for trackpoint in self.trackpoints() {
            if let Some(d) = trackpoint.distance {
                distance = d;
            }
            match trackpoint.position {
                Some(p) => samples.push(Sample::new(p.latitude, p.longitude, distance)),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "skipped trackpoints without position");
        }
        samples
    }

    /// Aggregate the activity for display.
    pub fn summary(&self) -> ActivitySummary {
        ActivitySummary {
            activity_type: self.sport.clone(),
            start_time: self.id,
            duration: self.duration(),
            distance: self.laps.iter().map(|lap| lap.distance_meters).sum(),
            calories: self.laps.iter().filter_map(|lap| lap.calories).sum(),
            cadence: mean(self.laps.iter().filter_map(|lap| lap.cadence)),
            heart_rate: self.heart_rate(),
        }
    }

    /// Elapsed whole seconds from the laps, or from the trackpoint times if no
    /// lap records its duration.
    fn duration(&self) -> Option<u64> {
        let lap_times: Vec<f64> = self
            .laps
            .iter()
            .filter_map(|lap| lap.total_time_seconds)
            .collect();
        if !lap_times.is_empty() {
            return Some(lap_times.iter().sum::<f64>() as u64);
        }

        let mut times = self.trackpoints().filter_map(|tp| tp.time);
        let first = times.next()?;
        let last = times.last().unwrap_or(first);
        u64::try_from((last - first).num_seconds()).ok()
    }

    fn heart_rate(&self) -> HeartRate {
        let values: Vec<f64> = self.trackpoints().filter_map(|tp| tp.heart_rate).collect();
        if !values.is_empty() {
            return HeartRate {
                average: mean(values.iter().copied()),
                minimum: values.iter().copied().reduce(f64::min),
                maximum: values.iter().copied().reduce(f64::max),
            };
        }

        HeartRate {
            average: mean(self.laps.iter().filter_map(|lap| lap.average_heart_rate)),
            minimum: None,
            maximum: self
                .laps
                .iter()
                .filter_map(|lap| lap.maximum_heart_rate)
                .reduce(f64::max),
        }
    }
}

impl Lap {
    fn from_node(node: &Node) -> Result<Self, Error> {
        let distance = node.require("DistanceMeters")?;
        let trackpoints = node
            .children_named("Track")
            .flat_map(|track| track.children_named("Trackpoint"))
            .map(Trackpoint::from_node)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            start_time: node
                .attr("StartTime")
                .map(|t| parse_time("StartTime", t))
                .transpose()?,
            total_time_seconds: number(node, "TotalTimeSeconds")?,
            distance_meters: parse_number("DistanceMeters", &distance.text)?,
            calories: number(node, "Calories")?,
            average_heart_rate: bpm(node, "AverageHeartRateBpm")?,
            maximum_heart_rate: bpm(node, "MaximumHeartRateBpm")?,
            cadence: number(node, "Cadence")?,
            trackpoints,
        })
    }
}

impl Trackpoint {
    fn from_node(node: &Node) -> Result<Self, Error> {
        let position = match node.child("Position") {
            Some(position) => {
                let latitude = number(position, "LatitudeDegrees")?;
                let longitude = number(position, "LongitudeDegrees")?;
                latitude.zip(longitude).map(|(latitude, longitude)| Position {
                    latitude,
                    longitude,
                })
            }
            None => None,
        };

        Ok(Self {
            time: node
                .child("Time")
                .map(|t| parse_time("Time", &t.text))
                .transpose()?,
            position,
            distance: number(node, "DistanceMeters")?,
            heart_rate: bpm(node, "HeartRateBpm")?,
        })
    }
}

/// Parse the optional numeric child `name` of `node`.
fn number(node: &Node, name: &'static str) -> Result<Option<f64>, Error> {
    node.child(name)
        .map(|child| parse_number(name, &child.text))
        .transpose()
}

/// Parse a heart rate, which TCX nests in a _Value_ element.
fn bpm(node: &Node, name: &'static str) -> Result<Option<f64>, Error> {
    match node.child(name) {
        Some(heart_rate) => number(heart_rate, "Value"),
        None => Ok(None),
    }
}

fn parse_number(element: &'static str, text: &str) -> Result<f64, Error> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| Error::InvalidValue {
            element,
            value: text.to_string(),
        })
}

fn parse_time(element: &'static str, text: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| Error::InvalidValue {
            element,
            value: text.to_string(),
        })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Element of the parsed XML document.
#[derive(Debug, Default)]
struct Node {
    /// Local name without namespace prefix.
    name: String,
    attrs: Vec<(String, String)>,
    /// Concatenated, unescaped text content.
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn from_start(start: &BytesStart) -> Result<Self, Error> {
        let mut attrs = vec![];
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            attrs.push((key, attr.unescape_value()?.into_owned()));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attrs,
            ..Default::default()
        })
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Like [`Node::child`] but a missing child is a malformed document.
    fn require(&self, name: &'static str) -> Result<&Node, Error> {
        self.child(name)
            .ok_or(Error::MalformedDocument { element: name })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse the whole XML document from `source` into a tree and return its root.
fn parse_tree(source: impl BufRead) -> Result<Node, Error> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = vec![];
    let mut open: Vec<Node> = vec![];
    let mut root = None;
    loop {
        let closed = match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                open.push(Node::from_start(&start)?);
                None
            }
            Event::Empty(start) => Some(Node::from_start(&start)?),
            Event::End(_) => open.pop(),
            Event::Text(text) => {
                if let Some(parent) = open.last_mut() {
                    parent.text.push_str(&text.unescape()?);
                }
                None
            }
            Event::CData(data) => {
                if let Some(parent) = open.last_mut() {
                    parent.text.push_str(&String::from_utf8_lossy(&data));
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };

        if let Some(node) = closed {
            match open.last_mut() {
                Some(parent) => parent.children.push(node),
                None if root.is_none() => root = Some(node),
                None => {}
            }
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(Error::Truncated {
            element: unclosed.name.clone(),
        });
    }
    root.ok_or(Error::MalformedDocument { element: ROOT })
}
