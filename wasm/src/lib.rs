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

//! This is a WASM wrapper for `tcx_kml_convert`.

use tcx_kml_convert::{tcx, DocumentKind, Error, MapWriter};
use wasm_bindgen::{prelude::wasm_bindgen, JsError};

/// Convert the TCX `source` to the points KML document named `name`.
#[wasm_bindgen]
pub fn points_kml(name: &str, source: &[u8]) -> Result<Box<[u8]>, JsError> {
    Ok(convert(DocumentKind::Points, name, source)?)
}

/// Convert the TCX `source` to the path KML document named `name`.
#[wasm_bindgen]
pub fn path_kml(name: &str, source: &[u8]) -> Result<Box<[u8]>, JsError> {
    Ok(convert(DocumentKind::Path, name, source)?)
}

fn convert(kind: DocumentKind, name: &str, source: &[u8]) -> Result<Box<[u8]>, Error> {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    let samples = tcx::read(source)?.samples();
    let document = MapWriter::default().render(kind, name, &samples)?;
    Ok(document.into_boxed_slice())
}
