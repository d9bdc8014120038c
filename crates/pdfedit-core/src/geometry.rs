//! Coordinate resolution between edit requests and PDF page space
//!
//! Edit requests describe positions as fractions of the page as it is
//! displayed, with a top-left origin. Drawing happens in PDF user space,
//! which has a bottom-left origin and ignores the page's /Rotate entry.
//!
//! ```text
//! page space:  x = width  * x_pct        (origin top-left, y grows down)
//!              y = height * y_pct
//! user space:  pdf_x = media_box.x0 + x
//!              pdf_y = media_box.y1 - y
//! ```
//!
//! Pages rotated by 90 or 270 degrees swap the axes and measure positions
//! against the unrotated MediaBox, see [`PageGeometry::resolve_box`].

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::EditError;

/// Values above this are treated as absolute page units in
/// [`CoordinateUnits::Auto`] mode.
pub const LEGACY_ABSOLUTE_THRESHOLD: f64 = 2.0;

/// US Letter, used when a page tree carries no MediaBox at all.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Limit when walking /Parent links, malformed files can contain cycles.
const MAX_TREE_DEPTH: usize = 32;

/// How incoming coordinates are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateUnits {
    /// Fractions of the page, except that any component above
    /// [`LEGACY_ABSOLUTE_THRESHOLD`] is taken as absolute page units.
    /// Older front ends sent pixels and rely on this.
    #[default]
    Auto,
    /// Always fractions of the page
    Fraction,
    /// Always absolute page units (points)
    Points,
}

impl CoordinateUnits {
    /// Map one component onto an extent of the page.
    pub fn scale(self, value: f64, extent: f64) -> f64 {
        match self {
            CoordinateUnits::Fraction => extent * value,
            CoordinateUnits::Points => value,
            CoordinateUnits::Auto if value > LEGACY_ABSOLUTE_THRESHOLD => value,
            CoordinateUnits::Auto => extent * value,
        }
    }
}

/// Axis-aligned rectangle in page space (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl PageRect {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Dimensions of one page as the compositor sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Displayed width (MediaBox width, or height when rotated 90/270)
    pub width: f64,
    /// Displayed height
    pub height: f64,
    /// Normalized /Rotate: 0, 90, 180 or 270
    pub rotation: u16,
    /// Normalized MediaBox `[x0, y0, x1, y1]`
    pub media_box: [f64; 4],
}

impl PageGeometry {
    pub fn from_media_box(media_box: [f64; 4], rotation: i64) -> Self {
        let [a, b, c, d] = media_box;
        let media_box = [a.min(c), b.min(d), a.max(c), b.max(d)];
        let rotation = normalize_rotation(rotation);
        let (mb_w, mb_h) = (media_box[2] - media_box[0], media_box[3] - media_box[1]);
        let (width, height) = if rotation % 180 == 90 {
            (mb_h, mb_w)
        } else {
            (mb_w, mb_h)
        };
        Self {
            width,
            height,
            rotation,
            media_box,
        }
    }

    /// Read MediaBox and Rotate for a page, following inheritance.
    pub fn read(doc: &Document, page_id: ObjectId) -> Result<Self, EditError> {
        let media_box = match inherited_attribute(doc, page_id, b"MediaBox")? {
            Some(obj) => parse_box(doc, obj)?,
            None => DEFAULT_MEDIA_BOX,
        };
        let rotation = match inherited_attribute(doc, page_id, b"Rotate")? {
            Some(obj) => resolve(doc, obj).and_then(obj_to_f64).unwrap_or(0.0) as i64,
            None => 0,
        };
        Ok(Self::from_media_box(media_box, rotation))
    }

    /// True for pages displayed sideways (90 or 270).
    pub fn swaps_axes(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Resolve an anchor point.
    pub fn resolve_point(&self, x_pct: f64, y_pct: f64, units: CoordinateUnits) -> (f64, f64) {
        let rect = self.resolve_box(x_pct, y_pct, 0.0, 0.0, units);
        (rect.x, rect.y)
    }

    /// Resolve a box into page space.
    ///
    /// On pages rotated by 90 or 270 degrees the caller's width and height
    /// are measured against the displayed frame while drawing happens in
    /// the unrotated one, so both the position and the size components are
    /// swapped. Positions land in the unrotated frame and scale against the
    /// MediaBox; sizes keep the displayed dimensions:
    ///
    /// ```text
    /// x = mb_w * y_pct     w = width  * h_pct
    /// y = mb_h * x_pct     h = height * w_pct
    /// ```
    pub fn resolve_box(
        &self,
        x_pct: f64,
        y_pct: f64,
        w_pct: f64,
        h_pct: f64,
        units: CoordinateUnits,
    ) -> PageRect {
        let (w_pct, h_pct) = (w_pct.max(0.0), h_pct.max(0.0));
        if self.swaps_axes() {
            let (mb_w, mb_h) = self.media_size();
            PageRect {
                x: units.scale(y_pct, mb_w),
                y: units.scale(x_pct, mb_h),
                w: units.scale(h_pct, self.width),
                h: units.scale(w_pct, self.height),
            }
        } else {
            PageRect {
                x: units.scale(x_pct, self.width),
                y: units.scale(y_pct, self.height),
                w: units.scale(w_pct, self.width),
                h: units.scale(h_pct, self.height),
            }
        }
    }

    /// Width and height of the unrotated MediaBox.
    pub fn media_size(&self) -> (f64, f64) {
        (
            self.media_box[2] - self.media_box[0],
            self.media_box[3] - self.media_box[1],
        )
    }

    /// Convert a page-space point to PDF user space.
    pub fn to_pdf(&self, x: f64, y: f64) -> (f64, f64) {
        (self.media_box[0] + x, self.media_box[3] - y)
    }
}

/// Normalize any /Rotate value (negative, > 360) to 0/90/180/270.
/// Values that are not multiples of 90 are invalid and read as 0.
pub fn normalize_rotation(rotation: i64) -> u16 {
    let r = rotation.rem_euclid(360);
    if r % 90 == 0 {
        r as u16
    } else {
        0
    }
}

/// Axis-aligned size of a `w` x `h` box rotated by `degrees`.
pub fn rotated_bounds(w: f64, h: f64, degrees: f64) -> (f64, f64) {
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    (w * cos + h * sin, w * sin + h * cos)
}

/// PDF affine transform `[a b c d e f]`, applied to row vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Clockwise (as seen on screen) rotation in y-up user space.
    pub fn rotate_cw(degrees: f64) -> Self {
        let theta = degrees.to_radians();
        let (sin, cos) = (snap(theta.sin()), snap(theta.cos()));
        Self {
            a: cos,
            b: -sin,
            c: sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Clockwise rotation around a pivot in user space.
    pub fn rotate_cw_about(degrees: f64, px: f64, py: f64) -> Self {
        Self::translate(-px, -py)
            .then(&Self::rotate_cw(degrees))
            .then(&Self::translate(px, py))
    }

    /// `self` first, then `next`.
    pub fn then(&self, next: &Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Operands for a `cm` operator.
    pub fn operands(&self) -> Vec<Object> {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .into_iter()
            .map(real)
            .collect()
    }
}

/// Drop floating point noise such as `cos(90°) = 6e-17`.
fn snap(v: f64) -> f64 {
    if v.abs() < 1e-12 {
        0.0
    } else {
        v
    }
}

pub(crate) fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

pub(crate) fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn parse_box(doc: &Document, obj: &Object) -> Result<[f64; 4], EditError> {
    let arr = resolve(doc, obj)
        .and_then(|o| o.as_array().ok())
        .ok_or_else(|| EditError::render("MediaBox is not an array"))?;
    let values: Vec<f64> = arr
        .iter()
        .filter_map(|o| resolve(doc, o).and_then(obj_to_f64))
        .collect();
    match values[..] {
        [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
            Ok([x0, y0, x1, y1])
        }
        _ => Err(EditError::render(format!(
            "MediaBox needs 4 numbers with non-zero area, got {values:?}"
        ))),
    }
}

pub(crate) fn page_dict(doc: &Document, page_id: ObjectId) -> Result<&Dictionary, EditError> {
    doc.get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| EditError::render(format!("page {page_id:?} is not a dictionary: {e}")))
}

/// Look up a page attribute, walking up the page tree when the page itself
/// does not carry it.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, EditError> {
    let mut dict = page_dict(doc, page_id)?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => dict = page_dict(doc, parent_id)?,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}
