use lopdf::content::Operation;
use lopdf::Document;

use super::{opacity_operation, PageCanvas, RenderSession};
use crate::error::EditError;
use crate::geometry::{real, Matrix};
use crate::request::{Edit, ShapeEdit, ShapeType};

/// Control point distance for a quarter ellipse drawn with one cubic Bezier
const KAPPA: f64 = 0.552_284_749_831;

/// Path construction for a shape whose top-left corner is `(left, top)` in
/// user space.
fn path(shape_type: ShapeType, left: f64, top: f64, w: f64, h: f64) -> Vec<Operation> {
    match shape_type {
        ShapeType::Rect => vec![Operation::new(
            "re",
            vec![real(left), real(top - h), real(w), real(h)],
        )],
        ShapeType::Line => vec![
            Operation::new("m", vec![real(left), real(top)]),
            Operation::new("l", vec![real(left + w), real(top - h)]),
        ],
        ShapeType::Ellipse => {
            let (rx, ry) = (w / 2.0, h / 2.0);
            let (cx, cy) = (left + rx, top - ry);
            let (kx, ky) = (rx * KAPPA, ry * KAPPA);
            let curve =
                |points: [f64; 6]| Operation::new("c", points.into_iter().map(real).collect());
            vec![
                Operation::new("m", vec![real(cx + rx), real(cy)]),
                curve([cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry]),
                curve([cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy]),
                curve([cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry]),
                curve([cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy]),
                Operation::new("h", vec![]),
            ]
        }
    }
}

/// Painting operator for the fill/stroke combination.
fn paint_operator(filled: bool, stroked: bool) -> &'static str {
    match (filled, stroked) {
        (true, true) => "B",
        (true, false) => "f",
        (false, true) => "S",
        (false, false) => "n",
    }
}

pub(super) fn render(
    doc: &mut Document,
    session: &mut RenderSession<'_>,
    canvas: &mut PageCanvas,
    edit: &Edit,
    shape: &ShapeEdit,
) -> Result<Vec<Operation>, EditError> {
    let rect = canvas
        .geometry
        .resolve_box(edit.x, edit.y, shape.w, shape.h, canvas.units);
    if shape.shape_type != ShapeType::Line && (rect.w <= 0.0 || rect.h <= 0.0) {
        return Err(EditError::InvalidEdit(format!(
            "{:?} has an empty box",
            shape.shape_type
        )));
    }

    let mut ops = Vec::new();
    if let Some(gs) = opacity_operation(doc, session, canvas, edit.opacity)? {
        ops.push(gs);
    }
    if edit.rotation % 360 != 0 {
        let (cx, cy) = rect.center();
        let (cx, cy) = canvas.geometry.to_pdf(cx, cy);
        let matrix = Matrix::rotate_cw_about(f64::from(edit.rotation), cx, cy);
        ops.push(Operation::new("cm", matrix.operands()));
    }

    // Lines have no interior
    let fill = shape
        .fill_color
        .filter(|_| shape.shape_type != ShapeType::Line);
    if let Some(color) = fill {
        let [r, g, b] = color.components();
        ops.push(Operation::new("rg", vec![real(r), real(g), real(b)]));
    }
    if let Some(color) = shape.stroke_color {
        let [r, g, b] = color.components();
        ops.push(Operation::new("RG", vec![real(r), real(g), real(b)]));
        ops.push(Operation::new("w", vec![real(shape.stroke_width)]));
    }

    let (left, top) = canvas.geometry.to_pdf(rect.x, rect.y);
    ops.extend(path(shape.shape_type, left, top, rect.w, rect.h));
    ops.push(Operation::new(
        paint_operator(fill.is_some(), shape.stroke_color.is_some()),
        vec![],
    ));
    Ok(ops)
}
