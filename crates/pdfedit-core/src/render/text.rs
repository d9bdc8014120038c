use lopdf::content::Operation;
use lopdf::{Document, Object, StringFormat};

use super::{opacity_operation, PageCanvas, RenderSession};
use crate::error::EditError;
use crate::fonts::{FontChoice, StandardFamily, StandardFont};
use crate::geometry::{real, CoordinateUnits, Matrix, PageGeometry};
use crate::request::{Edit, TextEdit};

/// Rotation pivot and baseline origin for a text edit, in user space.
///
/// The edit's point is the top-left corner of the text box. The baseline
/// sits one ascent below it.
pub fn text_anchor(
    geometry: &PageGeometry,
    units: CoordinateUnits,
    x_pct: f64,
    y_pct: f64,
    ascent: f64,
    font_size: f64,
) -> ((f64, f64), (f64, f64)) {
    let (x, y) = geometry.resolve_point(x_pct, y_pct, units);
    let top_left = geometry.to_pdf(x, y);
    let baseline = (top_left.0, top_left.1 - ascent * font_size);
    (top_left, baseline)
}

pub(super) fn render(
    doc: &mut Document,
    session: &mut RenderSession<'_>,
    canvas: &mut PageCanvas,
    edit: &Edit,
    text: &TextEdit,
) -> Result<Vec<Operation>, EditError> {
    let choice = session
        .resolver()
        .resolve(&text.font_family, text.bold, text.italic);
    let shown = match session.show_text(doc, &choice, &text.text) {
        Ok(shown) => shown,
        Err(err) => {
            let fallback = FontChoice::Standard(StandardFont::new(
                StandardFamily::Helvetica,
                text.bold,
                text.italic,
            ));
            if choice == fallback {
                return Err(err);
            }
            tracing::warn!(font = ?choice, error = %err, "font unusable, retrying with Helvetica");
            session.show_text(doc, &fallback, &text.text)?
        }
    };

    let font_name = canvas.resource_name(doc, "Font", shown.font_id)?;
    let (pivot, baseline) = text_anchor(
        &canvas.geometry,
        canvas.units,
        edit.x,
        edit.y,
        shown.ascent,
        text.font_size,
    );

    let mut ops = Vec::with_capacity(8);
    if let Some(gs) = opacity_operation(doc, session, canvas, edit.opacity)? {
        ops.push(gs);
    }
    if edit.rotation % 360 != 0 {
        let matrix = Matrix::rotate_cw_about(f64::from(edit.rotation), pivot.0, pivot.1);
        ops.push(Operation::new("cm", matrix.operands()));
    }

    let format = if shown.hex {
        StringFormat::Hexadecimal
    } else {
        StringFormat::Literal
    };
    let [r, g, b] = text.color.components();
    ops.extend([
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font_name.into_bytes()), real(text.font_size)],
        ),
        Operation::new("rg", vec![real(r), real(g), real(b)]),
        Operation::new("Td", vec![real(baseline.0), real(baseline.1)]),
        Operation::new("Tj", vec![Object::String(shown.bytes, format)]),
        Operation::new("ET", vec![]),
    ]);
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::blank_page;
    use super::*;
    use crate::color::Color;
    use crate::fonts::SystemFontResolver;
    use crate::geometry::obj_to_f64;
    use crate::request::{AssetMap, EditKind};

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.operator.as_str()).collect()
    }

    fn operand(ops: &[Operation], operator: &str, index: usize) -> f64 {
        let op = ops.iter().find(|op| op.operator == operator).unwrap();
        obj_to_f64(&op.operands[index]).unwrap()
    }

    fn render_one(edit: &Edit, rotate: i64) -> Vec<Operation> {
        let (mut doc, page_id) = blank_page(612, 792, rotate);
        let resolver = SystemFontResolver::new(Vec::new());
        let assets = AssetMap::new();
        let mut session = RenderSession::new(&resolver, &assets);
        let geometry = PageGeometry::read(&doc, page_id).unwrap();
        let mut canvas = PageCanvas::new(page_id, geometry, CoordinateUnits::Auto);
        let EditKind::Text(text) = &edit.kind else {
            panic!("not a text edit");
        };
        render(&mut doc, &mut session, &mut canvas, edit, text).unwrap()
    }

    #[test]
    fn test_plain_text_has_no_transform_or_state() {
        let mut text = TextEdit::new("DRAFT");
        text.font_size = 24.0;
        text.color = Color::rgb(1.0, 0.0, 0.0);
        let ops = render_one(&Edit::new(0.5, 0.5, EditKind::Text(text)), 0);

        assert_eq!(operators(&ops), vec!["BT", "Tf", "rg", "Td", "Tj", "ET"]);
        assert_eq!(operand(&ops, "Tf", 1), 24.0);
        assert_eq!(operand(&ops, "rg", 0), 1.0);
        assert_eq!(operand(&ops, "Td", 0), 306.0);
        // Helvetica ascent is 0.718 em
        let expected = 396.0 - 0.718 * 24.0;
        assert!((operand(&ops, "Td", 1) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_rotated_text_pivots_on_anchor() {
        let edit = Edit::new(0.5, 0.5, EditKind::Text(TextEdit::new("x"))).with_rotation(90);
        let ops = render_one(&edit, 0);

        assert_eq!(ops[0].operator, "cm");
        let m: Vec<f64> = ops[0].operands.iter().map(|o| obj_to_f64(o).unwrap()).collect();
        let matrix = Matrix {
            a: m[0],
            b: m[1],
            c: m[2],
            d: m[3],
            e: m[4],
            f: m[5],
        };
        let (px, py) = matrix.apply(306.0, 396.0);
        assert!((px - 306.0).abs() < 1e-3 && (py - 396.0).abs() < 1e-3);
    }

    #[test]
    fn test_full_turn_is_not_a_rotation() {
        let edit = Edit::new(0.1, 0.1, EditKind::Text(TextEdit::new("x"))).with_rotation(360);
        let ops = render_one(&edit, 0);
        assert!(!operators(&ops).contains(&"cm"));
    }

    #[test]
    fn test_translucent_text_sets_graphics_state() {
        let edit = Edit::new(0.1, 0.1, EditKind::Text(TextEdit::new("x"))).with_opacity(0.3);
        let ops = render_one(&edit, 0);
        assert_eq!(ops[0].operator, "gs");
    }

    #[test]
    fn test_rotated_page_swaps_anchor() {
        // x comes from y_pct against the 612 wide MediaBox
        let edit = Edit::new(0.25, 0.5, EditKind::Text(TextEdit::new("x")));
        let ops = render_one(&edit, 90);
        assert_eq!(operand(&ops, "Td", 0), 306.0);
        let expected = 792.0 - 198.0 - 0.718 * 12.0;
        assert!((operand(&ops, "Td", 1) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_sideways_page_anchors_stay_on_page() {
        for rotate in [90, 270] {
            let geometry = PageGeometry::from_media_box([0.0, 0.0, 612.0, 792.0], rotate);
            for x_pct in [0.0, 0.1, 0.5, 0.9, 1.0] {
                for y_pct in [0.0, 0.1, 0.5, 0.9, 1.0] {
                    let ((x, y), _) = text_anchor(
                        &geometry,
                        CoordinateUnits::Fraction,
                        x_pct,
                        y_pct,
                        0.718,
                        12.0,
                    );
                    assert!(
                        (0.0..=612.0).contains(&x) && (0.0..=792.0).contains(&y),
                        "/Rotate {rotate}: ({x_pct}, {y_pct}) -> ({x}, {y})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_unencodable_text_falls_back_then_fails() {
        let edit = Edit::new(0.1, 0.1, EditKind::Text(TextEdit::new("สวัสดี")));
        let (mut doc, page_id) = blank_page(612, 792, 0);
        let resolver = SystemFontResolver::new(Vec::new());
        let assets = AssetMap::new();
        let mut session = RenderSession::new(&resolver, &assets);
        let geometry = PageGeometry::read(&doc, page_id).unwrap();
        let mut canvas = PageCanvas::new(page_id, geometry, CoordinateUnits::Auto);
        let EditKind::Text(text) = &edit.kind else {
            unreachable!()
        };

        let err = render(&mut doc, &mut session, &mut canvas, &edit, text).unwrap_err();
        assert!(matches!(err, EditError::RenderFailure(_)));
    }

    #[test]
    fn test_anchor_baseline_sits_one_ascent_below_top() {
        let geometry = PageGeometry::from_media_box([0.0, 0.0, 612.0, 792.0], 0);
        let (top, baseline) = text_anchor(&geometry, CoordinateUnits::Auto, 0.0, 0.0, 0.5, 20.0);
        assert_eq!(top, (0.0, 792.0));
        assert_eq!(baseline, (0.0, 782.0));
    }
}
