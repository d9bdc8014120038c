//! Raster image overlays
//!
//! Images are embedded once per (asset, opacity) pair as a DeviceRGB
//! XObject. Opacity is baked into a DeviceGray soft mask rather than set
//! through an ExtGState.

use std::path::Path;

use lopdf::content::Operation;
use lopdf::{dictionary, Document, Object, Stream};

use super::{ImageSlot, PageCanvas, RenderSession};
use crate::error::EditError;
use crate::geometry::{real, rotated_bounds, Matrix, PageGeometry, PageRect};
use crate::request::{Edit, ImageEdit};
use crate::resources::flate;

/// Where an image lands in user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    /// Maps the image unit square into user space
    pub matrix: Matrix,
    /// `[x, y, w, h]` of the rotated bounding box, only for rotated images
    pub clip: Option<[f64; 4]>,
}

/// Fit a `px_w` x `px_h` image into `rect`, keeping its aspect ratio.
///
/// Unrotated images are centered in `rect`. Rotated ones are centered on
/// the edit's point (`rect.x`, `rect.y`), turned clockwise about it and
/// clipped to the rotated bounding box centered there.
///
/// Returns `None` when the box or the image has no area.
pub fn place_image(
    geometry: &PageGeometry,
    rect: PageRect,
    px_w: u32,
    px_h: u32,
    rotation: i32,
) -> Option<ImagePlacement> {
    if rect.w <= 0.0 || rect.h <= 0.0 || px_w == 0 || px_h == 0 {
        return None;
    }
    let (px_w, px_h) = (f64::from(px_w), f64::from(px_h));
    let scale = (rect.w / px_w).min(rect.h / px_h);
    let (draw_w, draw_h) = (px_w * scale, px_h * scale);
    let rotated = rotation % 360 != 0;
    let (cx, cy) = if rotated {
        (rect.x, rect.y)
    } else {
        rect.center()
    };
    let (llx, lly) = geometry.to_pdf(cx - draw_w / 2.0, cy + draw_h / 2.0);

    let matrix = Matrix {
        a: draw_w,
        d: draw_h,
        e: llx,
        f: lly,
        ..Matrix::IDENTITY
    };
    if !rotated {
        return Some(ImagePlacement { matrix, clip: None });
    }

    let (px, py) = geometry.to_pdf(cx, cy);
    let degrees = f64::from(rotation);
    let (bw, bh) = rotated_bounds(rect.w, rect.h, degrees);
    Some(ImagePlacement {
        matrix: matrix.then(&Matrix::rotate_cw_about(degrees, px, py)),
        clip: Some([px - bw / 2.0, py - bh / 2.0, bw, bh]),
    })
}

/// Scale an alpha sample by the edit's opacity.
pub(crate) fn synthesize_alpha(alpha: u8, opacity: f64) -> u8 {
    (f64::from(alpha) * opacity.clamp(0.0, 1.0)).round() as u8
}

fn embed_image(doc: &mut Document, path: &Path, opacity: f64) -> Result<ImageSlot, EditError> {
    let decoded = image::open(path)
        .map_err(|e| EditError::render(format!("cannot read image {}: {e}", path.display())))?;
    let has_alpha = decoded.color().has_alpha();
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    let mut alpha = Vec::with_capacity(rgba.len() / 4);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(synthesize_alpha(a, opacity));
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if has_alpha || opacity < 1.0 {
        let mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            flate(&alpha)?,
        )
        .with_compression(false);
        dict.set("SMask", doc.add_object(mask));
    }

    let id = doc.add_object(Stream::new(dict, flate(&rgb)?).with_compression(false));
    tracing::debug!(path = %path.display(), width, height, has_alpha, "embedded image");
    Ok(ImageSlot { id, width, height })
}

pub(super) fn render(
    doc: &mut Document,
    session: &mut RenderSession<'_>,
    canvas: &mut PageCanvas,
    edit: &Edit,
    image: &ImageEdit,
) -> Result<Vec<Operation>, EditError> {
    let slot = match session.cached_image(&image.image_id, edit.opacity) {
        Some(slot) => slot,
        None => {
            let path = session.assets().get(&image.image_id).ok_or_else(|| {
                EditError::render(format!("no asset for image id {:?}", image.image_id))
            })?;
            let slot = embed_image(doc, path, edit.opacity)?;
            session.cache_image(&image.image_id, edit.opacity, slot);
            slot
        }
    };

    let geometry = canvas.geometry;
    let mut rect = geometry.resolve_box(
        edit.x,
        edit.y,
        image.w,
        image.h.unwrap_or(0.0),
        canvas.units,
    );
    if image.h.is_none() {
        // The caller's width ends up in `rect.h` on sideways pages
        let aspect = f64::from(slot.height) / f64::from(slot.width.max(1));
        if geometry.swaps_axes() {
            rect.w = rect.h / aspect.max(f64::EPSILON);
        } else {
            rect.h = rect.w * aspect;
        }
    }

    let placement = place_image(&geometry, rect, slot.width, slot.height, edit.rotation)
        .ok_or_else(|| EditError::render(format!("image {:?} has an empty box", image.image_id)))?;
    let name = canvas.resource_name(doc, "XObject", slot.id)?;

    let mut ops = Vec::with_capacity(6);
    if let Some([x, y, w, h]) = placement.clip {
        ops.push(Operation::new("re", vec![real(x), real(y), real(w), real(h)]));
        ops.push(Operation::new("W", vec![]));
        ops.push(Operation::new("n", vec![]));
    }
    ops.push(Operation::new("cm", placement.matrix.operands()));
    ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
    Ok(ops)
}
