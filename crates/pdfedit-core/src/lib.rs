//! PDF page-edit compositor
//!
//! Places text, image and shape overlays onto pages of an existing PDF
//! using lopdf. Positions arrive as fractions of the displayed page with a
//! top-left origin, pages rotated by 90 or 270 degrees included.
//!
//! - [`EditRequest`]: per-page edit lists, decoded leniently from JSON
//! - [`Compositor`]: applies a request to a document, skipping bad pages
//!   and bad edits instead of failing
//! - [`apply_edits`] / [`apply_edits_to_bytes`]: one-call entry points
//!
//! ```no_run
//! use pdfedit_core::{apply_edits, AssetMap, EditRequest};
//!
//! # fn example() -> Result<(), pdfedit_core::EditError> {
//! let request = EditRequest::from_json(
//!     r##"{"0": [{"type": "text", "text": "DRAFT", "x": 0.4, "y": 0.5,
//!                 "fontSize": 24, "color": "#ff0000"}]}"##,
//! )?;
//! apply_edits("in.pdf", "out.pdf", &request, &AssetMap::new())?;
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod render;
pub mod request;
pub mod resources;

pub use color::Color;
pub use compositor::{apply_edits, apply_edits_to_bytes, ApplyReport, Compositor, SkippedEdit};
pub use config::EditorConfig;
pub use error::EditError;
pub use fonts::{FontChoice, FontResolver, SystemFontResolver};
pub use geometry::{CoordinateUnits, PageGeometry};
pub use request::{
    AssetMap, Edit, EditKind, EditRequest, EditSlot, ImageEdit, ShapeEdit, ShapeType, TextEdit,
};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, EditError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| EditError::Open {
        path: "<memory>".into(),
        reason: e.to_string(),
    })?;
    Ok(doc.get_pages().len() as u32)
}

/// Geometry of every page, in page order
pub fn page_geometries(doc: &lopdf::Document) -> Vec<Result<PageGeometry, EditError>> {
    doc.get_pages()
        .into_values()
        .map(|page_id| PageGeometry::read(doc, page_id))
        .collect()
}
