//! Font selection and embedding
//!
//! Text edits name a font family loosely ("Times New Roman", "serif",
//! "Tahoma"). A [`FontResolver`] turns that into a concrete [`FontChoice`]:
//! one of the PDF standard 14 fonts, or a TrueType file to embed. The
//! default [`SystemFontResolver`] probes a configurable list of font files
//! for Thai text and otherwise maps onto Helvetica, Times or Courier.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};

use crate::error::EditError;
use crate::resources::flate;

/// Standard 14 font families used for edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFamily {
    Helvetica,
    Times,
    Courier,
}

impl StandardFamily {
    /// Ascender from the Adobe AFM files, in 1/1000 em
    fn ascent(self) -> f64 {
        match self {
            StandardFamily::Helvetica => 0.718,
            StandardFamily::Times => 0.683,
            StandardFamily::Courier => 0.629,
        }
    }
}

/// A standard 14 font in a specific style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StandardFont {
    pub family: StandardFamily,
    pub bold: bool,
    pub italic: bool,
}

impl StandardFont {
    pub const HELVETICA: StandardFont = StandardFont {
        family: StandardFamily::Helvetica,
        bold: false,
        italic: false,
    };

    pub fn new(family: StandardFamily, bold: bool, italic: bool) -> Self {
        Self {
            family,
            bold,
            italic,
        }
    }

    /// PDF /BaseFont name for the family and style
    pub fn base_font(&self) -> &'static str {
        match self.family {
            StandardFamily::Times => match (self.bold, self.italic) {
                (true, true) => "Times-BoldItalic",
                (true, false) => "Times-Bold",
                (false, true) => "Times-Italic",
                (false, false) => "Times-Roman",
            },
            StandardFamily::Helvetica => match (self.bold, self.italic) {
                (true, true) => "Helvetica-BoldOblique",
                (true, false) => "Helvetica-Bold",
                (false, true) => "Helvetica-Oblique",
                (false, false) => "Helvetica",
            },
            StandardFamily::Courier => match (self.bold, self.italic) {
                (true, true) => "Courier-BoldOblique",
                (true, false) => "Courier-Bold",
                (false, true) => "Courier-Oblique",
                (false, false) => "Courier",
            },
        }
    }

    pub fn ascent(&self) -> f64 {
        self.family.ascent()
    }

    /// WinAnsi bytes for `text`, `None` if any character has no code.
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        text.chars().map(win_ansi_code).collect()
    }

    pub fn dictionary(&self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.base_font(),
            "Encoding" => "WinAnsiEncoding",
        }
    }
}

fn win_ansi_code(c: char) -> Option<u8> {
    let code = match c {
        ' '..='~' | '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(code)
}

/// Family requested by an edit, before any file probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyHint {
    Standard(StandardFamily),
    /// Needs a font with Thai coverage
    Thai,
}

/// Map font family name to a family hint
pub fn map_font_family(name: &str) -> FamilyHint {
    let lower = name.to_lowercase();

    // Handle CSS generic font families
    match lower.trim() {
        "serif" => return FamilyHint::Standard(StandardFamily::Times),
        "monospace" => return FamilyHint::Standard(StandardFamily::Courier),
        "sans-serif" | "cursive" | "fantasy" => {
            return FamilyHint::Standard(StandardFamily::Helvetica)
        }
        _ => {}
    }

    if lower.contains("tahoma") || lower.contains("thai") {
        return FamilyHint::Thai;
    }

    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        return FamilyHint::Standard(StandardFamily::Times);
    }

    if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        return FamilyHint::Standard(StandardFamily::Courier);
    }

    FamilyHint::Standard(StandardFamily::Helvetica)
}

/// A font file on disk with optional style variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontCandidate {
    pub regular: PathBuf,
    #[serde(default)]
    pub bold: Option<PathBuf>,
    #[serde(default)]
    pub italic: Option<PathBuf>,
    #[serde(default)]
    pub bold_italic: Option<PathBuf>,
}

impl FontCandidate {
    pub fn new(regular: impl Into<PathBuf>) -> Self {
        Self {
            regular: regular.into(),
            bold: None,
            italic: None,
            bold_italic: None,
        }
    }

    /// Requested style if that file exists, the regular file otherwise.
    pub fn variant(&self, bold: bool, italic: bool) -> &Path {
        let styled = match (bold, italic) {
            (true, true) => self.bold_italic.as_deref(),
            (true, false) => self.bold.as_deref(),
            (false, true) => self.italic.as_deref(),
            (false, false) => None,
        };
        styled
            .filter(|path| path.is_file())
            .unwrap_or(&self.regular)
    }
}

/// Built-in Thai font locations, probed in order
pub fn default_thai_candidates() -> Vec<FontCandidate> {
    let tlwg = "/usr/share/fonts/truetype/tlwg";
    let noto = "/usr/share/fonts/truetype/noto";
    vec![
        FontCandidate {
            regular: format!("{tlwg}/Garuda.ttf").into(),
            bold: Some(format!("{tlwg}/Garuda-Bold.ttf").into()),
            italic: Some(format!("{tlwg}/Garuda-Oblique.ttf").into()),
            bold_italic: Some(format!("{tlwg}/Garuda-BoldOblique.ttf").into()),
        },
        FontCandidate {
            regular: format!("{noto}/NotoSansThai-Regular.ttf").into(),
            bold: Some(format!("{noto}/NotoSansThai-Bold.ttf").into()),
            italic: None,
            bold_italic: None,
        },
        FontCandidate {
            regular: "C:\\Windows\\Fonts\\tahoma.ttf".into(),
            bold: Some("C:\\Windows\\Fonts\\tahomabd.ttf".into()),
            italic: None,
            bold_italic: None,
        },
        FontCandidate {
            regular: "/System/Library/Fonts/Supplemental/Tahoma.ttf".into(),
            bold: Some("/System/Library/Fonts/Supplemental/Tahoma Bold.ttf".into()),
            italic: None,
            bold_italic: None,
        },
    ]
}

/// Concrete font picked for a text edit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FontChoice {
    Standard(StandardFont),
    File(PathBuf),
}

/// Strategy for turning a requested family into a concrete font
pub trait FontResolver: Send + Sync {
    fn resolve(&self, family: &str, bold: bool, italic: bool) -> FontChoice;
}

/// Standard 14 fonts plus file probing for Thai families
#[derive(Debug, Clone)]
pub struct SystemFontResolver {
    thai_candidates: Vec<FontCandidate>,
}

impl SystemFontResolver {
    pub fn new(thai_candidates: Vec<FontCandidate>) -> Self {
        Self { thai_candidates }
    }
}

impl Default for SystemFontResolver {
    fn default() -> Self {
        Self::new(default_thai_candidates())
    }
}

impl FontResolver for SystemFontResolver {
    fn resolve(&self, family: &str, bold: bool, italic: bool) -> FontChoice {
        match map_font_family(family) {
            FamilyHint::Standard(family) => {
                FontChoice::Standard(StandardFont::new(family, bold, italic))
            }
            FamilyHint::Thai => self
                .thai_candidates
                .iter()
                .find(|candidate| candidate.regular.is_file())
                .map(|candidate| FontChoice::File(candidate.variant(bold, italic).to_path_buf()))
                .unwrap_or_else(|| {
                    tracing::debug!(family, "no Thai font file found, using Helvetica");
                    FontChoice::Standard(StandardFont::new(StandardFamily::Helvetica, bold, italic))
                }),
        }
    }
}

/// A TrueType font loaded from disk, embedded as Type0 / Identity-H
#[derive(Debug, Clone)]
pub struct TrueTypeFont {
    pub name: String,
    data: Vec<u8>,
    units_per_em: f64,
    ascender: i16,
    descender: i16,
    cap_height: i16,
    bbox: [i16; 4],
}

impl TrueTypeFont {
    pub fn load(path: &Path) -> Result<Self, EditError> {
        let data = std::fs::read(path).map_err(|e| {
            EditError::render(format!("cannot read font {}: {e}", path.display()))
        })?;
        Self::from_bytes(data, path)
    }

    pub fn from_bytes(data: Vec<u8>, path: &Path) -> Result<Self, EditError> {
        let mut font = {
            let face = ttf_parser::Face::parse(&data, 0).map_err(|e| {
                EditError::render(format!("cannot parse font {}: {e}", path.display()))
            })?;
            let name = face
                .names()
                .into_iter()
                .filter(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
                .find_map(|n| n.to_string())
                .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_default();
            let bbox = face.global_bounding_box();
            TrueTypeFont {
                name: pdf_name(&name),
                data: Vec::new(),
                units_per_em: f64::from(face.units_per_em().max(1)),
                ascender: face.ascender(),
                descender: face.descender(),
                cap_height: face.capital_height().unwrap_or(face.ascender()),
                bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            }
        };
        font.data = data;
        Ok(font)
    }

    /// Ascender as a fraction of the em
    pub fn ascent(&self) -> f64 {
        f64::from(self.ascender) / self.units_per_em
    }

    fn scaled(&self, units: i16) -> i64 {
        (f64::from(units) * 1000.0 / self.units_per_em).round() as i64
    }

    /// Glyph ids for `text`, `None` if the font lacks any character.
    pub fn glyphs(&self, text: &str) -> Option<Vec<(u16, char)>> {
        let face = ttf_parser::Face::parse(&self.data, 0).ok()?;
        text.chars()
            .map(|c| face.glyph_index(c).map(|gid| (gid.0, c)))
            .collect()
    }

    /// Write the Type0 font and its descendants into `font_id`, which was
    /// reserved before any content referenced it.
    pub fn write_type0(
        &self,
        doc: &mut Document,
        font_id: ObjectId,
        used: &BTreeMap<u16, char>,
    ) -> Result<(), EditError> {
        let face = ttf_parser::Face::parse(&self.data, 0)
            .map_err(|e| EditError::render(format!("cannot parse font {}: {e}", self.name)))?;

        let mut widths = Vec::with_capacity(used.len() * 2);
        for gid in used.keys() {
            let advance = face
                .glyph_hor_advance(ttf_parser::GlyphId(*gid))
                .unwrap_or(0);
            let width = (f64::from(advance) * 1000.0 / self.units_per_em).round() as i64;
            widths.push(Object::Integer(i64::from(*gid)));
            widths.push(Object::Array(vec![Object::Integer(width)]));
        }

        let file = Stream::new(
            dictionary! {
                "Length1" => self.data.len() as i64,
                "Filter" => "FlateDecode",
            },
            flate(&self.data)?,
        )
        .with_compression(false);
        let file_id = doc.add_object(file);

        let bbox: Vec<Object> = self
            .bbox
            .iter()
            .map(|v| Object::Integer(self.scaled(*v)))
            .collect();
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.name.clone().into_bytes()),
            "Flags" => 32,
            "FontBBox" => bbox,
            "ItalicAngle" => 0,
            "Ascent" => self.scaled(self.ascender),
            "Descent" => self.scaled(self.descender),
            "CapHeight" => self.scaled(self.cap_height),
            "StemV" => 80,
            "FontFile2" => file_id,
        });

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(
            Dictionary::new(),
            to_unicode_cmap(used).into_bytes(),
        ));

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => Object::Name(self.name.clone().into_bytes()),
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(cid_font_id)],
                "ToUnicode" => to_unicode_id,
            }),
        );
        Ok(())
    }
}

/// Font name usable as a PDF name object
fn pdf_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}

/// Hex string of big-endian glyph ids for an Identity-H show operator
pub fn glyph_hex(glyphs: &[(u16, char)]) -> Vec<u8> {
    glyphs
        .iter()
        .flat_map(|(gid, _)| gid.to_be_bytes())
        .collect()
}

fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<_> = used.iter().collect();
    // bfchar sections hold at most 100 entries
    for chunk in entries.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for (gid, c) in chunk {
            let mut utf16 = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut utf16)
                .iter()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            let _ = writeln!(cmap, "<{gid:04X}> <{hex}>");
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}
