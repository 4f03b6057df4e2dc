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

//! Human-readable activity summary.

use std::fmt;

use chrono::{DateTime, Utc};

/// Meters in a mile as used for display.
const METERS_PER_MILE: f64 = 1609.0;

/// Aggregated data of one activity.
///
/// This is only used for display and has no influence on the KML output.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    /// Elapsed whole seconds.
    pub duration: Option<u64>,
    /// Total distance in meters.
    pub distance: f64,
    /// Zero means that the device recorded no calories.
    pub calories: f64,
    /// Average cadence in RPM.
    pub cadence: Option<f64>,
    pub heart_rate: HeartRate,
}

/// Heart rate statistics in BPM.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeartRate {
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl HeartRate {
    /// Check whether no statistic is available.
    pub fn is_empty(&self) -> bool {
        self.average.is_none() && self.minimum.is_none() && self.maximum.is_none()
    }
}

impl ActivitySummary {
    /// Split the duration into hours, minutes, and seconds.
    pub fn elapsed(&self) -> Option<(u64, u64, u64)> {
        self.duration
            .map(|d| (d / 3600, d % 3600 / 60, d % 60))
    }

    pub fn distance_miles(&self) -> f64 {
        self.distance / METERS_PER_MILE
    }
}

impl fmt::Display for ActivitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Activity Type: {}", self.activity_type)?;
        writeln!(f)?;
        writeln!(
            f,
            "Start Date & Time: {}",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(
            f,
            "Total Distance: {:.2} meters ({:.2} miles)",
            self.distance,
            self.distance_miles()
        )?;
        match self.elapsed() {
            Some((h, m, s)) => writeln!(f, "Time Elapsed: {h} hours {m} minutes {s} seconds")?,
            None => writeln!(f, "Time Elapsed: No Time Data")?,
        }
        writeln!(f)?;

        if self.calories == 0.0 {
            writeln!(f, "Calories: No Calorie Data")?;
        } else {
            writeln!(f, "Calories: {:.2}", self.calories)?;
        }
        if let Some(cadence) = self.cadence {
            writeln!(f, "Average Cadence: {cadence:.0} RPM")?;
        }

        if !self.heart_rate.is_empty() {
            writeln!(f, "Heart Rate Info:")?;
            write_bpm(f, "Average", self.heart_rate.average.map(|avg| format!("{avg:.2}")))?;
            write_bpm(f, "Minimum", self.heart_rate.minimum.map(|min| min.to_string()))?;
            write_bpm(f, "Maximum", self.heart_rate.maximum.map(|max| max.to_string()))?;
        }
        Ok(())
    }
}

fn write_bpm(f: &mut fmt::Formatter<'_>, label: &str, value: Option<String>) -> fmt::Result {
    match value {
        Some(value) => writeln!(f, "\t{label}: {value} BPM"),
        None => writeln!(f, "\t{label}: No Data"),
    }
}
