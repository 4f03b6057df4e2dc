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

//! Writing of KML documents.
//!
//! Two document shapes exist: a _points_ document with one icon placemark per
//! sample and a _path_ document with a single line through all samples.

use std::fs;
use std::io;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;

use crate::{CoordValue, Error, Sample};

/// Namespace attributes for the `<kml>` tag.
const NAMESPACES: &[(&str, &str)] = &[
    ("xmlns", "http://www.opengis.net/kml/2.2"),
    ("xmlns:gx", "http://www.google.com/kml/ext/2.2"),
    ("xmlns:kml", "http://www.opengis.net/kml/2.2"),
    ("xmlns:atom", "http://www.w3.org/2005/Atom"),
];
/// File extension of the written documents.
pub const EXTENSION: &str = "kml";

/// Style of the placemarks in the points document.
const ICON_STYLE_ID: &str = "data+icon";
/// Style of the line in the path document.
const LINE_STYLE_ID: &str = "lineStyle";
const ICON_SCALE: &str = "0.25";
const ICON_HEADING: &str = "0";
/// The hot spot lies in the center of the icon.
const ICON_HOT_SPOT: &[(&str, &str)] = &[
    ("x", "0.5"),
    ("y", "0.5"),
    ("xunits", "fraction"),
    ("yunits", "fraction"),
];
const LINE_WIDTH: &str = "2";
const ALTITUDE_MODE: &str = "clampToGround";

/// White 20x20 square as PNG.
const EMBEDDED_ICON: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAABQAAAAUAQMAAAC3R49OAAAABlBMVEUAAAD///+l2Z/dAAAAEklEQVQImWNgAIL6/w+ogoEAAKI4Kp2NVIeDAAAAAElFTkSuQmCC";
/// Hosted variant of the square icon.
const LINKED_ICON: &str = "https://upload.wikimedia.org/wikipedia/commons/c/c1/20x20square.png";

/// Selects which of the two documents to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// One icon placemark per sample, labeled with its distance.
    Points,
    /// One line through all samples.
    Path,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Points, DocumentKind::Path];

    /// Name of the output file for an input named `stem`.
    ///
    /// ```
    /// # use tcx_kml_convert::DocumentKind;
    /// assert_eq!(DocumentKind::Path.file_name("run"), "run_path.kml");
    /// ```
    pub fn file_name(self, stem: &str) -> String {
        format!("{stem}_{}.{EXTENSION}", self.suffix())
    }

    fn suffix(self) -> &'static str {
        match self {
            DocumentKind::Points => "points",
            DocumentKind::Path => "path",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Points => f.write_str("Points"),
            DocumentKind::Path => f.write_str("Path"),
        }
    }
}

/// Presentation parameters shared by both documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Image of the placemark icons, either a URL or a data URI.
    pub icon_href: String,
    /// Camera distance of the placemarks in the points document in meters.
    pub points_range: u32,
    /// Camera distance of the path placemark in meters.
    pub path_range: u32,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            icon_href: EMBEDDED_ICON.to_string(),
            points_range: 1500,
            path_range: 2000,
        }
    }
}

impl Template {
    /// The default template with the icon referenced by URL instead of being
    /// embedded.
    pub fn linked() -> Self {
        Self {
            icon_href: LINKED_ICON.to_string(),
            ..Default::default()
        }
    }
}

/// Builds KML documents from samples.
#[derive(Debug, Clone, Default)]
pub struct MapWriter {
    pub template: Template,
}

impl MapWriter {
    pub fn new(template: Template) -> Self {
        Self { template }
    }

    /// Render the complete `kind` document named `name`.
    ///
    /// Fails with [`Error::EmptySequence`] if `samples` is empty, since the
    /// camera is placed at the first sample.
    pub fn render(
        &self,
        kind: DocumentKind,
        name: &str,
        samples: &[Sample],
    ) -> Result<Vec<u8>, Error> {
        let first = samples.first().ok_or(Error::EmptySequence)?;

        let mut doc = KmlBuilder::new();
        doc.start_document(name)?;
        match kind {
            DocumentKind::Points => {
                self.icon_style(&mut doc)?;
                for sample in samples {
                    doc.open("Placemark")?;
                    doc.text_element("styleUrl", &format!("#{ICON_STYLE_ID}"))?;
                    doc.text_element("name", &decimal(sample.distance))?;
                    look_at(&mut doc, first, self.template.points_range)?;
                    doc.open("Point")?;
                    doc.text_element("coordinates", &coordinates(std::slice::from_ref(sample)))?;
                    doc.close("Point")?;
                    doc.close("Placemark")?;
                }
            }
            DocumentKind::Path => {
                line_style(&mut doc)?;
                doc.open("Placemark")?;
                doc.text_element("styleUrl", &format!("#{LINE_STYLE_ID}"))?;
                look_at(&mut doc, first, self.template.path_range)?;
                doc.open("LineString")?;
                doc.text_element("coordinates", &coordinates(samples))?;
                doc.close("LineString")?;
                doc.close("Placemark")?;
            }
        }
        doc.end_document()?;

        debug!(%kind, samples = samples.len(), "rendered KML document");
        Ok(doc.finish())
    }

    /// Write the `kind` document to `sink` in a single write.
    ///
    /// # Example
    /// ```
    /// # use tcx_kml_convert::{DocumentKind, MapWriter, Sample};
    /// #
    /// let samples = [Sample::new(48.858222, 2.2945, 0.0)];
    /// let mut sink = vec![];
    ///
    /// MapWriter::default()
    ///     .write(DocumentKind::Path, "Eiffel Tower", &samples, &mut sink)
    ///     .expect("writing failed");
    ///
    /// let kml = String::from_utf8(sink).expect("KML data is not valid UTF-8");
    /// assert!(kml.contains("<name>Eiffel Tower</name>"));
    /// assert!(kml.contains("2.2945,48.858222,0 "));
    /// ```
    pub fn write(
        &self,
        kind: DocumentKind,
        name: &str,
        samples: &[Sample],
        mut sink: impl io::Write,
    ) -> Result<(), Error> {
        let document = self.render(kind, name, samples)?;
        sink.write_all(&document)?;
        sink.flush()?;
        Ok(())
    }

    /// Write the `kind` document to the file at `path`.
    ///
    /// Nothing is created if rendering fails.
    pub fn save(
        &self,
        kind: DocumentKind,
        name: &str,
        samples: &[Sample],
        path: impl AsRef<Path>,
    ) -> Result<(), Error> {
        let path = path.as_ref();
        let document = self.render(kind, name, samples)?;
        fs::write(path, document).map_err(|source| Error::WriteFailure {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(%kind, path = %path.display(), "saved KML document");
        Ok(())
    }

    /// The shared style of all placemarks in the points document.
    fn icon_style(&self, doc: &mut KmlBuilder) -> Result<(), Error> {
        doc.open_with(BytesStart::new("Style").with_attributes([("id", ICON_STYLE_ID)]))?;

        doc.open("BalloonStyle")?;
        doc.empty(BytesStart::new("text"))?;
        doc.close("BalloonStyle")?;

        doc.open("IconStyle")?;
        doc.text_element("scale", ICON_SCALE)?;
        doc.text_element("heading", ICON_HEADING)?;
        doc.open("Icon")?;
        doc.text_element("href", &self.template.icon_href)?;
        doc.close("Icon")?;
        doc.empty(BytesStart::new("hotSpot").with_attributes(ICON_HOT_SPOT.iter().copied()))?;
        doc.close("IconStyle")?;

        doc.close("Style")
    }
}

/// Render the points document with the default template.
pub fn points_document(name: &str, samples: &[Sample]) -> Result<Vec<u8>, Error> {
    MapWriter::default().render(DocumentKind::Points, name, samples)
}

/// Render the path document with the default template.
pub fn path_document(name: &str, samples: &[Sample]) -> Result<Vec<u8>, Error> {
    MapWriter::default().render(DocumentKind::Path, name, samples)
}

fn line_style(doc: &mut KmlBuilder) -> Result<(), Error> {
    doc.open_with(BytesStart::new("Style").with_attributes([("id", LINE_STYLE_ID)]))?;
    doc.open("LineStyle")?;
    doc.text_element("width", LINE_WIDTH)?;
    doc.close("LineStyle")?;
    doc.close("Style")
}

/// Camera looking straight down on `target` from `range` meters.
fn look_at(doc: &mut KmlBuilder, target: &Sample, range: u32) -> Result<(), Error> {
    doc.open("LookAt")?;
    doc.text_element("latitude", &decimal(target.latitude))?;
    doc.text_element("longitude", &decimal(target.longitude))?;
    doc.text_element("heading", "0")?;
    doc.text_element("tilt", "0")?;
    doc.text_element("range", &range.to_string())?;
    doc.text_element("altitudeMode", ALTITUDE_MODE)?;
    doc.close("LookAt")
}

/// KML coordinate tuples of `samples`.
///
/// KML orders longitude before latitude. Every tuple is followed by a space.
fn coordinates(samples: &[Sample]) -> String {
    let mut text = String::new();
    for sample in samples {
        text.push_str(&decimal(sample.longitude));
        text.push(',');
        text.push_str(&decimal(sample.latitude));
        text.push_str(",0 ");
    }
    text
}

/// Format `value` in its shortest exact decimal form with at least one
/// fractional digit, so a zero distance label reads `0.0`.
///
/// [`f64`]'s `Display` never uses an exponent, which KML viewers might not
/// understand, but it drops the fraction of whole numbers.
fn decimal(value: CoordValue) -> String {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Tab-indented XML writer for the elements used in our KML documents.
struct KmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl KmlBuilder {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(vec![], b'\t', 1),
        }
    }

    /// Write the XML declaration and open `<kml>` and `<Document>`.
    fn start_document(&mut self, name: &str) -> Result<(), Error> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.open_with(BytesStart::new("kml").with_attributes(NAMESPACES.iter().copied()))?;
        self.open("Document")?;
        self.text_element("name", name)
    }

    fn end_document(&mut self) -> Result<(), Error> {
        self.close("Document")?;
        self.close("kml")
    }

    fn open(&mut self, name: &str) -> Result<(), Error> {
        self.open_with(BytesStart::new(name))
    }

    fn open_with(&mut self, start: BytesStart) -> Result<(), Error> {
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<(), Error> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, element: BytesStart) -> Result<(), Error> {
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    /// Write `<name>content</name>` on a single line.
    fn text_element(&mut self, name: &str, content: &str) -> Result<(), Error> {
        self.open(name)?;
        self.writer.write_event(Event::Text(BytesText::new(content)))?;
        self.close(name)
    }

    fn finish(self) -> Vec<u8> {
        let mut document = self.writer.into_inner();
        document.push(b'\n');
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(10.0, 20.0, 0.0),
            Sample::new(10.001, 20.001, 5.2),
            Sample::new(10.002, 20.002, 11.0),
        ]
    }

    fn render(kind: DocumentKind, samples: &[Sample]) -> String {
        let document = MapWriter::default().render(kind, "run", samples).unwrap();
        String::from_utf8(document).unwrap()
    }

    /// Contents of all `<tag>` elements in `document`.
    fn contents<'a>(document: &'a str, tag: &str) -> Vec<&'a str> {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        document
            .split(open.as_str())
            .skip(1)
            .filter_map(|rest| rest.split(close.as_str()).next())
            .collect()
    }

    #[test]
    fn path_coordinates() {
        let kml = render(DocumentKind::Path, &samples());

        assert_eq!(
            contents(&kml, "coordinates"),
            vec!["20.0,10.0,0 20.001,10.001,0 20.002,10.002,0 "]
        );
    }

    #[test]
    fn path_structure() {
        let kml = render(DocumentKind::Path, &samples());

        assert_eq!(kml.matches("<Placemark>").count(), 1);
        assert_eq!(contents(&kml, "styleUrl"), vec!["#lineStyle"]);
        assert!(kml.contains("<Style id=\"lineStyle\">"));
        assert_eq!(contents(&kml, "width"), vec!["2"]);
        assert_eq!(contents(&kml, "range"), vec!["2000"]);
        assert_eq!(contents(&kml, "latitude"), vec!["10.0"]);
        assert_eq!(contents(&kml, "longitude"), vec!["20.0"]);
        assert_eq!(contents(&kml, "altitudeMode"), vec!["clampToGround"]);
        assert!(kml.contains("<LineString>"));
    }

    #[test]
    fn points_markers() {
        let kml = render(DocumentKind::Points, &samples());

        assert_eq!(kml.matches("<Placemark>").count(), 3);
        assert_eq!(contents(&kml, "name"), vec!["run", "0.0", "5.2", "11.0"]);
        assert_eq!(
            contents(&kml, "coordinates"),
            vec!["20.0,10.0,0 ", "20.001,10.001,0 ", "20.002,10.002,0 "]
        );
        assert_eq!(contents(&kml, "styleUrl"), vec!["#data+icon"; 3]);
    }

    #[test]
    fn points_camera_uses_first_sample() {
        let kml = render(DocumentKind::Points, &samples());

        assert_eq!(contents(&kml, "latitude"), vec!["10.0"; 3]);
        assert_eq!(contents(&kml, "longitude"), vec!["20.0"; 3]);
        assert_eq!(contents(&kml, "range"), vec!["1500"; 3]);
        assert_eq!(contents(&kml, "tilt"), vec!["0"; 3]);
    }

    #[test]
    fn points_icon_style() {
        let kml = render(DocumentKind::Points, &samples());

        assert_eq!(kml.matches("<Style ").count(), 1);
        assert!(kml.contains("<Style id=\"data+icon\">"));
        assert!(kml.contains("<text/>"));
        assert_eq!(contents(&kml, "scale"), vec!["0.25"]);
        assert_eq!(contents(&kml, "href"), vec![EMBEDDED_ICON]);
        assert!(kml.contains(
            "<hotSpot x=\"0.5\" y=\"0.5\" xunits=\"fraction\" yunits=\"fraction\"/>"
        ));
        // The icon heading precedes the placemarks.
        assert_eq!(contents(&kml, "heading")[0], "0");
    }

    #[test]
    fn linked_icon() {
        let writer = MapWriter::new(Template::linked());
        let kml = writer.render(DocumentKind::Points, "run", &samples()).unwrap();
        let kml = String::from_utf8(kml).unwrap();

        assert_eq!(contents(&kml, "href"), vec![LINKED_ICON]);
    }

    #[test]
    fn header_and_indentation() {
        let kml = render(DocumentKind::Path, &samples());

        assert!(kml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<kml xmlns=\"http://www.opengis.net/kml/2.2\" xmlns:gx=\"http://www.google.com/kml/ext/2.2\" xmlns:kml=\"http://www.opengis.net/kml/2.2\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n\t<Document>\n\t\t<name>run</name>\n"));
        assert!(kml.ends_with("\t</Document>\n</kml>\n"));
    }

    #[test]
    fn name_is_escaped() {
        let kml = String::from_utf8(path_document("a<b & c", &samples()).unwrap()).unwrap();
        assert!(kml.contains("<name>a&lt;b &amp; c</name>"));
    }

    #[test]
    fn empty_sequence() {
        for kind in DocumentKind::ALL {
            assert!(matches!(
                MapWriter::default().render(kind, "run", &[]),
                Err(Error::EmptySequence)
            ));
        }
    }

    #[test]
    fn empty_sequence_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_points.kml");

        let result = MapWriter::default().save(DocumentKind::Points, "run", &[], &path);

        assert!(matches!(result, Err(Error::EmptySequence)));
        assert!(!path.exists());
    }

    #[test]
    fn save_to_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("run_path.kml");

        match MapWriter::default().save(DocumentKind::Path, "run", &samples(), &path) {
            Err(Error::WriteFailure { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected a write failure, got {other:?}"),
        }
    }

    #[test]
    fn write_matches_render() {
        let mut sink = vec![];
        MapWriter::default()
            .write(DocumentKind::Points, "run", &samples(), &mut sink)
            .unwrap();

        assert_eq!(sink, points_document("run", &samples()).unwrap());
    }

    #[test]
    fn decimals() {
        assert_eq!(decimal(0.0), "0.0");
        assert_eq!(decimal(20.0), "20.0");
        assert_eq!(decimal(-0.5), "-0.5");
        assert_eq!(decimal(10.001), "10.001");
        assert_eq!(decimal(0.000001), "0.000001");
        assert_eq!(decimal(48.858222123456), "48.858222123456");
    }

    #[test]
    fn file_names() {
        assert_eq!(DocumentKind::Points.file_name("run"), "run_points.kml");
        assert_eq!(DocumentKind::Path.file_name("run"), "run_path.kml");
    }
}
