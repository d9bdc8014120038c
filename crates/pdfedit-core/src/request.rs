//! Edit requests: what to draw on which page
//!
//! Requests arrive as loosely typed JSON from the browser editor. They are
//! decoded once, here, into a closed [`Edit`] type. Entries that cannot be
//! decoded are kept in place as [`EditSlot::Rejected`] so the compositor can
//! report them with their original position and still apply the rest.
//!
//! Two envelopes are accepted:
//!
//! ```json
//! { "0": [ { "type": "text", "x": 0.5, "y": 0.5, "text": "DRAFT" } ] }
//! { "units": "fraction", "pages": { "0": [ ... ] } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::color::Color;
use crate::error::EditError;
use crate::geometry::CoordinateUnits;

/// Image id to image file, as saved by the upload layer
pub type AssetMap = HashMap<String, PathBuf>;

const DEFAULT_FONT_SIZE: f64 = 12.0;
const DEFAULT_STROKE_WIDTH: f64 = 2.0;

/// One overlay instruction for one page
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    /// Anchor position, fraction of the displayed page width
    pub x: f64,
    /// Anchor position, fraction of the displayed page height
    pub y: f64,
    /// Degrees, clockwise
    pub rotation: i32,
    /// 0..=1
    pub opacity: f64,
    pub kind: EditKind,
}

impl Edit {
    pub fn new(x: f64, y: f64, kind: EditKind) -> Self {
        Self {
            x,
            y,
            rotation: 0,
            opacity: 1.0,
            kind,
        }
    }

    pub fn with_rotation(mut self, rotation: i32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditKind {
    Text(TextEdit),
    Image(ImageEdit),
    Shape(ShapeEdit),
}

impl EditKind {
    pub fn name(&self) -> &'static str {
        match self {
            EditKind::Text(_) => "text",
            EditKind::Image(_) => "image",
            EditKind::Shape(_) => "shape",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextEdit {
    pub text: String,
    pub font_size: f64,
    pub color: Color,
    /// Free-form family name, matched case-insensitively
    pub font_family: String,
    pub bold: bool,
    pub italic: bool,
}

impl TextEdit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: DEFAULT_FONT_SIZE,
            color: Color::BLACK,
            font_family: String::new(),
            bold: false,
            italic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEdit {
    pub image_id: String,
    /// Fraction of the displayed page width
    pub w: f64,
    /// Fraction of the displayed page height. `None` derives the height
    /// from the asset's aspect ratio.
    pub h: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    Rect,
    Ellipse,
    Line,
}

impl FromStr for ShapeType {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rect" | "rectangle" | "square" => Ok(ShapeType::Rect),
            "ellipse" | "circle" | "oval" => Ok(ShapeType::Ellipse),
            "line" => Ok(ShapeType::Line),
            other => Err(EditError::UnknownShapeType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEdit {
    pub shape_type: ShapeType,
    pub w: f64,
    pub h: f64,
    pub fill_color: Option<Color>,
    pub stroke_color: Option<Color>,
    pub stroke_width: f64,
}

impl ShapeEdit {
    pub fn new(shape_type: ShapeType, w: f64, h: f64) -> Self {
        Self {
            shape_type,
            w,
            h,
            fill_color: None,
            stroke_color: Some(Color::BLACK),
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

/// A decoded edit, or the reason it could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub enum EditSlot {
    Ready(Edit),
    Rejected {
        /// The `type` field as sent, if any
        kind: Option<String>,
        error: EditError,
    },
}

/// Per-page edit lists for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditRequest {
    pub units: CoordinateUnits,
    /// 0-based page index to edits in drawing order
    pub pages: BTreeMap<i64, Vec<EditSlot>>,
    /// Page keys that are not integers at all
    pub invalid_keys: Vec<String>,
}

impl EditRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units(mut self, units: CoordinateUnits) -> Self {
        self.units = units;
        self
    }

    pub fn push(&mut self, page: i64, edit: Edit) -> &mut Self {
        self.pages.entry(page).or_default().push(EditSlot::Ready(edit));
        self
    }

    /// Total number of slots, rejected ones included
    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_json(json: &str) -> Result<Self, EditError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| EditError::MalformedConfig(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, EditError> {
        let Value::Object(mut root) = value else {
            return Err(EditError::MalformedConfig(
                "edit configuration must be an object".into(),
            ));
        };

        let mut request = EditRequest::new();
        let pages = match root.remove("pages") {
            Some(Value::Object(pages)) => {
                if let Some(units) = root.remove("units") {
                    request.units = serde_json::from_value(units)
                        .map_err(|e| EditError::MalformedConfig(format!("units: {e}")))?;
                }
                pages
            }
            Some(other) => {
                // A bare page map cannot have a "pages" key, put it back so
                // it is reported as an invalid page.
                root.insert("pages".into(), other);
                root
            }
            None => root,
        };

        for (key, edits) in pages {
            let Value::Array(edits) = edits else {
                return Err(EditError::MalformedConfig(format!(
                    "edits for page {key:?} must be a list"
                )));
            };
            let slots: Vec<EditSlot> = edits.into_iter().map(decode_slot).collect();
            match parse_page_key(&key) {
                Some(index) => request.pages.entry(index).or_default().extend(slots),
                None => request.invalid_keys.push(key),
            }
        }

        Ok(request)
    }
}

fn parse_page_key(key: &str) -> Option<i64> {
    let key = key.trim();
    key.parse::<i64>().ok().or_else(|| {
        key.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

fn decode_slot(value: Value) -> EditSlot {
    let kind = value
        .get("type")
        .or_else(|| value.get("kind"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let decoded = serde_json::from_value::<RawEdit>(value)
        .map_err(|e| EditError::InvalidEdit(e.to_string()))
        .and_then(Edit::try_from);
    match decoded {
        Ok(edit) => EditSlot::Ready(edit),
        Err(error) => EditSlot::Rejected { kind, error },
    }
}

/// Wire shape of an edit, every field optional and loosely typed
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEdit {
    #[serde(rename = "type", alias = "kind")]
    kind: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    x: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    y: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    w: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    h: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    rotation: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    opacity: Option<f64>,

    #[serde(deserialize_with = "lenient::text")]
    text: Option<String>,
    #[serde(alias = "fontSize", deserialize_with = "lenient::number")]
    font_size: Option<f64>,
    #[serde(deserialize_with = "lenient::present")]
    color: Option<Value>,
    #[serde(alias = "fontFamily", alias = "font", deserialize_with = "lenient::text")]
    font_family: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    bold: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    italic: Option<bool>,

    #[serde(alias = "imageId", deserialize_with = "lenient::text")]
    image_id: Option<String>,

    #[serde(alias = "shapeType", deserialize_with = "lenient::text")]
    shape_type: Option<String>,
    #[serde(alias = "fill", deserialize_with = "lenient::present")]
    fill_color: Option<Value>,
    #[serde(alias = "stroke", deserialize_with = "lenient::present")]
    stroke_color: Option<Value>,
    #[serde(alias = "strokeWidth", deserialize_with = "lenient::number")]
    stroke_width: Option<f64>,
}

impl TryFrom<RawEdit> for Edit {
    type Error = EditError;

    fn try_from(raw: RawEdit) -> Result<Self, Self::Error> {
        let kind_name = raw
            .kind
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_default();

        let kind = match kind_name.as_str() {
            "text" => EditKind::Text(text_edit(&raw)?),
            "image" => EditKind::Image(image_edit(&raw)?),
            "shape" => EditKind::Shape(shape_edit(&raw)?),
            "" => return Err(EditError::UnknownEditKind("<missing>".into())),
            other => return Err(EditError::UnknownEditKind(other.to_string())),
        };

        Ok(Edit {
            x: finite("x", raw.x.unwrap_or(0.0))?,
            y: finite("y", raw.y.unwrap_or(0.0))?,
            rotation: finite("rotation", raw.rotation.unwrap_or(0.0))?.trunc() as i32,
            opacity: finite("opacity", raw.opacity.unwrap_or(1.0))?.clamp(0.0, 1.0),
            kind,
        })
    }
}

fn text_edit(raw: &RawEdit) -> Result<TextEdit, EditError> {
    let text = raw.text.clone().unwrap_or_default();
    if text.is_empty() {
        return Err(EditError::InvalidEdit("text edit without text".into()));
    }
    Ok(TextEdit {
        text,
        font_size: positive("font_size", raw.font_size.unwrap_or(DEFAULT_FONT_SIZE))?,
        color: match &raw.color {
            Some(value) => Color::from_value(value)?.unwrap_or_default(),
            None => Color::BLACK,
        },
        font_family: raw.font_family.clone().unwrap_or_default(),
        bold: raw.bold.unwrap_or(false),
        italic: raw.italic.unwrap_or(false),
    })
}

fn image_edit(raw: &RawEdit) -> Result<ImageEdit, EditError> {
    let image_id = raw
        .image_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EditError::InvalidEdit("image edit without image_id".into()))?;
    let w = positive("w", raw.w.unwrap_or(0.0))?;
    let h = match raw.h {
        Some(h) if finite("h", h)? > 0.0 => Some(h),
        _ => None,
    };
    Ok(ImageEdit { image_id, w, h })
}

fn shape_edit(raw: &RawEdit) -> Result<ShapeEdit, EditError> {
    let shape_type = raw.shape_type.as_deref().unwrap_or("rect").parse()?;
    let stroke_color = match &raw.stroke_color {
        Some(value) => Color::from_value(value)?,
        None => Some(Color::BLACK),
    };
    let fill_color = match &raw.fill_color {
        Some(value) => Color::from_value(value)?,
        None => None,
    };
    Ok(ShapeEdit {
        shape_type,
        w: finite("w", raw.w.unwrap_or(0.0))?,
        h: finite("h", raw.h.unwrap_or(0.0))?,
        fill_color,
        stroke_color,
        stroke_width: positive(
            "stroke_width",
            raw.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH),
        )?,
    })
}

fn finite(field: &str, value: f64) -> Result<f64, EditError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EditError::InvalidEdit(format!("{field} must be finite")))
    }
}

fn positive(field: &str, value: f64) -> Result<f64, EditError> {
    if finite(field, value)? > 0.0 {
        Ok(value)
    } else {
        Err(EditError::InvalidEdit(format!(
            "{field} must be positive, got {value}"
        )))
    }
}

/// Deserializers that accept what the browser editor actually sends
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Number, numeric string, or null
    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| D::Error::custom("number out of range")),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected a number, got {s:?}"))),
            other => Err(D::Error::custom(format!("expected a number, got {other}"))),
        }
    }

    /// String, or a number rendered as a string
    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(D::Error::custom(format!("expected a string, got {other}"))),
        }
    }

    /// Bool, "true"/"false", or 0/1
    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            Value::Number(n) => Ok(Some(n.as_f64().unwrap_or(0.0) != 0.0)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" | "" => Ok(Some(false)),
                _ => Err(D::Error::custom(format!("expected a boolean, got {s:?}"))),
            },
            other => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
        }
    }

    /// Keep the raw value, distinguishing an explicit null from a missing key
    pub fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
        Value::deserialize(d).map(Some)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn first_slot(value: Value) -> EditSlot {
        let request = EditRequest::from_value(json!({ "0": [value] })).unwrap();
        request.pages[&0][0].clone()
    }

    proptest! {
        #[test]
        fn numeric_strings_decode_like_numbers(
            x in 0.0f64..1.0,
            y in 0.0f64..1.0,
            size in 1.0f64..200.0,
        ) {
            let from_numbers = first_slot(json!({
                "type": "text", "text": "a", "x": x, "y": y, "fontSize": size
            }));
            let from_strings = first_slot(json!({
                "type": "text", "text": "a",
                "x": x.to_string(), "y": y.to_string(), "fontSize": size.to_string()
            }));
            prop_assert_eq!(from_numbers, from_strings);
        }

        #[test]
        fn opacity_always_ends_in_unit_range(opacity in -10.0f64..10.0) {
            let slot = first_slot(json!({
                "type": "shape", "shapeType": "rect", "x": 0.1, "y": 0.1,
                "w": 0.1, "h": 0.1, "opacity": opacity
            }));
            let EditSlot::Ready(edit) = slot else {
                return Err(TestCaseError::fail("shape rejected"));
            };
            prop_assert!((0.0..=1.0).contains(&edit.opacity));
        }

        #[test]
        fn arbitrary_type_names_never_abort_the_request(kind in "[a-z]{1,12}") {
            let request = EditRequest::from_value(json!({
                "0": [{"type": kind, "x": 0.1, "y": 0.1}]
            }));
            prop_assert!(request.is_ok());
            prop_assert_eq!(request.unwrap().len(), 1);
        }
    }
}
