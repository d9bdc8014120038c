//! Renderers that turn decoded edits into content operators
//!
//! Each renderer returns the operators for one edit. The dispatcher wraps
//! them in `q`/`Q` and collects them on a [`PageCanvas`], which appends
//! everything to the page once the page is done. Objects shared across
//! pages (fonts, images, graphics states) are cached in a
//! [`RenderSession`] that lives for a single document.

mod raster;
mod shape;
mod text;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use lopdf::content::Operation;
use lopdf::{dictionary, Document, Object, ObjectId};

use crate::error::EditError;
use crate::fonts::{FontChoice, FontResolver, StandardFont, TrueTypeFont};
use crate::geometry::{real, CoordinateUnits, PageGeometry};
use crate::request::{AssetMap, Edit, EditKind};
use crate::resources::{append_overlay, register_resource};

pub use self::raster::{place_image, ImagePlacement};
pub use self::text::text_anchor;

/// Opacity keys are stored in thousandths so they can be hashed.
fn opacity_key(opacity: f64) -> u16 {
    (opacity.clamp(0.0, 1.0) * 1000.0).round() as u16
}

enum FontSlot {
    Standard {
        font: StandardFont,
        id: ObjectId,
    },
    Embedded {
        font: TrueTypeFont,
        /// Reserved on first use, written by [`RenderSession::finish`]
        id: Option<ObjectId>,
        used: BTreeMap<u16, char>,
    },
}

/// A string ready for `Tj` in a specific font
pub(crate) struct ShownText {
    pub font_id: ObjectId,
    pub bytes: Vec<u8>,
    pub hex: bool,
    pub ascent: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ImageSlot {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Document-wide caches for one apply call
pub struct RenderSession<'a> {
    resolver: &'a dyn FontResolver,
    assets: &'a AssetMap,
    fonts: HashMap<FontChoice, FontSlot>,
    broken_fonts: HashMap<PathBuf, EditError>,
    images: HashMap<(String, u16), ImageSlot>,
    graphics_states: HashMap<u16, ObjectId>,
}

impl<'a> RenderSession<'a> {
    pub fn new(resolver: &'a dyn FontResolver, assets: &'a AssetMap) -> Self {
        Self {
            resolver,
            assets,
            fonts: HashMap::new(),
            broken_fonts: HashMap::new(),
            images: HashMap::new(),
            graphics_states: HashMap::new(),
        }
    }

    pub(crate) fn resolver(&self) -> &dyn FontResolver {
        self.resolver
    }

    pub(crate) fn assets(&self) -> &AssetMap {
        self.assets
    }

    /// Encode `text` in `choice`, creating the font object on first use.
    pub(crate) fn show_text(
        &mut self,
        doc: &mut Document,
        choice: &FontChoice,
        text: &str,
    ) -> Result<ShownText, EditError> {
        if !self.fonts.contains_key(choice) {
            let slot = match choice {
                FontChoice::Standard(font) => FontSlot::Standard {
                    font: *font,
                    id: doc.add_object(font.dictionary()),
                },
                FontChoice::File(path) => {
                    if let Some(err) = self.broken_fonts.get(path) {
                        return Err(err.clone());
                    }
                    match TrueTypeFont::load(path) {
                        Ok(font) => FontSlot::Embedded {
                            font,
                            id: None,
                            used: BTreeMap::new(),
                        },
                        Err(err) => {
                            self.broken_fonts.insert(path.clone(), err.clone());
                            return Err(err);
                        }
                    }
                }
            };
            self.fonts.insert(choice.clone(), slot);
        }

        match self.fonts.get_mut(choice) {
            Some(FontSlot::Standard { font, id }) => {
                let bytes = font.encode(text).ok_or_else(|| {
                    EditError::render(format!("{} cannot encode {text:?}", font.base_font()))
                })?;
                Ok(ShownText {
                    font_id: *id,
                    bytes,
                    hex: false,
                    ascent: font.ascent(),
                })
            }
            Some(FontSlot::Embedded { font, id, used }) => {
                let glyphs = font.glyphs(text).ok_or_else(|| {
                    EditError::render(format!("{} has no glyphs for {text:?}", font.name))
                })?;
                let font_id = *id.get_or_insert_with(|| doc.new_object_id());
                used.extend(glyphs.iter().copied());
                Ok(ShownText {
                    font_id,
                    bytes: crate::fonts::glyph_hex(&glyphs),
                    hex: true,
                    ascent: font.ascent(),
                })
            }
            None => Err(EditError::render("font cache lost an entry")),
        }
    }

    /// Shared /ExtGState for a fill and stroke alpha.
    pub(crate) fn graphics_state(&mut self, doc: &mut Document, opacity: f64) -> ObjectId {
        let key = opacity_key(opacity);
        *self.graphics_states.entry(key).or_insert_with(|| {
            let alpha = real(f64::from(key) / 1000.0);
            doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => alpha.clone(),
                "CA" => alpha,
            })
        })
    }

    pub(crate) fn cached_image(&self, image_id: &str, opacity: f64) -> Option<ImageSlot> {
        self.images
            .get(&(image_id.to_string(), opacity_key(opacity)))
            .copied()
    }

    pub(crate) fn cache_image(&mut self, image_id: &str, opacity: f64, slot: ImageSlot) {
        self.images
            .insert((image_id.to_string(), opacity_key(opacity)), slot);
    }

    /// Write objects that could only be built once every edit was seen.
    pub fn finish(self, doc: &mut Document) {
        for slot in self.fonts.into_values() {
            if let FontSlot::Embedded {
                font,
                id: Some(id),
                used,
            } = slot
            {
                if let Err(err) = font.write_type0(doc, id, &used) {
                    tracing::warn!(
                        font = %font.name,
                        error = %err,
                        "embedding failed, substituting Helvetica"
                    );
                    doc.objects
                        .insert(id, Object::Dictionary(StandardFont::HELVETICA.dictionary()));
                }
            }
        }
    }
}

/// Operators and resource names collected for one page
pub struct PageCanvas {
    pub page_id: ObjectId,
    pub geometry: PageGeometry,
    pub units: CoordinateUnits,
    operations: Vec<Operation>,
    names: HashMap<(&'static str, ObjectId), String>,
}

impl PageCanvas {
    pub fn new(page_id: ObjectId, geometry: PageGeometry, units: CoordinateUnits) -> Self {
        Self {
            page_id,
            geometry,
            units,
            operations: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Name under which `object_id` is reachable from this page.
    pub(crate) fn resource_name(
        &mut self,
        doc: &mut Document,
        category: &'static str,
        object_id: ObjectId,
    ) -> Result<String, EditError> {
        if let Some(name) = self.names.get(&(category, object_id)) {
            return Ok(name.clone());
        }
        let prefix = match category {
            "Font" => "FEdit",
            "XObject" => "ImEdit",
            _ => "GSEdit",
        };
        let name = register_resource(
            doc,
            self.page_id,
            category,
            prefix,
            Object::Reference(object_id),
        )?;
        self.names.insert((category, object_id), name.clone());
        Ok(name)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn push_isolated(&mut self, operations: Vec<Operation>) {
        self.operations.push(Operation::new("q", vec![]));
        self.operations.extend(operations);
        self.operations.push(Operation::new("Q", vec![]));
    }

    /// Append collected operators to the page content.
    pub fn commit(self, doc: &mut Document) -> Result<(), EditError> {
        append_overlay(doc, self.page_id, self.operations)
    }
}

/// `/Name gs` when the edit is translucent.
pub(crate) fn opacity_operation(
    doc: &mut Document,
    session: &mut RenderSession<'_>,
    canvas: &mut PageCanvas,
    opacity: f64,
) -> Result<Option<Operation>, EditError> {
    if opacity >= 1.0 {
        return Ok(None);
    }
    let state = session.graphics_state(doc, opacity);
    let name = canvas.resource_name(doc, "ExtGState", state)?;
    Ok(Some(Operation::new("gs", vec![Object::Name(name.into_bytes())])))
}

/// Render one edit onto the canvas. Nothing is added when it fails.
pub fn render_edit(
    doc: &mut Document,
    session: &mut RenderSession<'_>,
    canvas: &mut PageCanvas,
    edit: &Edit,
) -> Result<(), EditError> {
    let operations = match &edit.kind {
        EditKind::Text(text) => text::render(doc, session, canvas, edit, text)?,
        EditKind::Image(image) => raster::render(doc, session, canvas, edit, image)?,
        EditKind::Shape(shape) => shape::render(doc, session, canvas, edit, shape)?,
    };
    canvas.push_isolated(operations);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::fonts::SystemFontResolver;
    use crate::request::TextEdit;

    #[test]
    fn test_graphics_states_are_shared_per_opacity() {
        let (mut doc, _) = blank_page(612, 792, 0);
        let resolver = SystemFontResolver::new(Vec::new());
        let assets = AssetMap::new();
        let mut session = RenderSession::new(&resolver, &assets);

        let half = session.graphics_state(&mut doc, 0.5);
        assert_eq!(session.graphics_state(&mut doc, 0.5), half);
        assert_ne!(session.graphics_state(&mut doc, 0.25), half);

        let dict = doc.get_dictionary(half).unwrap();
        assert_eq!(dict.get(b"ca").unwrap(), &Object::Real(0.5));
        assert_eq!(dict.get(b"CA").unwrap(), &Object::Real(0.5));
    }

    #[test]
    fn test_resource_names_are_reused_within_a_page() {
        let (mut doc, page_id) = blank_page(612, 792, 0);
        let geometry = PageGeometry::read(&doc, page_id).unwrap();
        let mut canvas = PageCanvas::new(page_id, geometry, CoordinateUnits::Auto);
        let target = doc.add_object(Object::Null);

        let first = canvas.resource_name(&mut doc, "Font", target).unwrap();
        let second = canvas.resource_name(&mut doc, "Font", target).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "FEdit1");
    }

    #[test]
    fn test_each_edit_is_isolated_in_its_own_state() {
        let (mut doc, page_id) = blank_page(612, 792, 0);
        let resolver = SystemFontResolver::new(Vec::new());
        let assets = AssetMap::new();
        let mut session = RenderSession::new(&resolver, &assets);
        let geometry = PageGeometry::read(&doc, page_id).unwrap();
        let mut canvas = PageCanvas::new(page_id, geometry, CoordinateUnits::Auto);

        let edit = Edit::new(0.1, 0.1, EditKind::Text(TextEdit::new("one")));
        render_edit(&mut doc, &mut session, &mut canvas, &edit).unwrap();
        render_edit(&mut doc, &mut session, &mut canvas, &edit).unwrap();
        canvas.commit(&mut doc).unwrap();

        let content = doc.get_and_decode_page_content(page_id).unwrap();
        let count = |operator: &str| {
            content
                .operations
                .iter()
                .filter(|op| op.operator == operator)
                .count()
        };
        assert_eq!(count("q"), 2);
        assert_eq!(count("Q"), 2);
        assert_eq!(content.operations.first().unwrap().operator, "q");
        assert_eq!(content.operations.last().unwrap().operator, "Q");
    }

    #[test]
    fn test_unknown_font_file_is_remembered_as_broken() {
        let (mut doc, _) = blank_page(612, 792, 0);
        let resolver = SystemFontResolver::new(Vec::new());
        let assets = AssetMap::new();
        let mut session = RenderSession::new(&resolver, &assets);
        let choice = FontChoice::File(PathBuf::from("/nonexistent/Font.ttf"));

        assert!(session.show_text(&mut doc, &choice, "x").is_err());
        assert!(session
            .broken_fonts
            .contains_key(&PathBuf::from("/nonexistent/Font.ttf")));
        assert!(session.show_text(&mut doc, &choice, "x").is_err());
    }
}
