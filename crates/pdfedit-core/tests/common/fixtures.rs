//! Small PDFs and images built on the fly for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgba};
use lopdf::content::Operation;
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// Build a document with one page per `(width, height, rotate)`.
///
/// Every page already carries content that leaves a blue fill color set.
pub fn document(pages: &[(i64, i64, i64)]) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for &(width, height, rotate) in pages {
        let content = doc.add_object(Stream::new(
            Dictionary::new(),
            b"0 0 1 rg 10 10 50 50 re f".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Rotate" => rotate,
            "Contents" => content,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn letter_pages(count: usize) -> Document {
    document(&vec![(612, 792, 0); count])
}

pub fn write_pdf(dir: &Path, name: &str, mut doc: Document) -> PathBuf {
    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    ImageBuffer::from_pixel(width, height, Rgba([200u8, 30, 30, 255]))
        .save(&path)
        .unwrap();
    path
}

/// Decoded content of a page, 0-based.
pub fn page_operations(doc: &Document, index: usize) -> Vec<Operation> {
    let page_id = doc.get_pages().into_values().nth(index).unwrap();
    doc.get_and_decode_page_content(page_id).unwrap().operations
}

/// Operations after the page's original content.
pub fn overlay_operations(doc: &Document, index: usize) -> Vec<Operation> {
    let ops = page_operations(doc, index);
    let start = ops
        .iter()
        .position(|op| op.operator == "f")
        .map(|i| i + 1)
        .unwrap_or(0);
    // Skip the `Q` closing the wrapper around the original content
    ops.into_iter().skip(start + 1).collect()
}

pub fn number(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(r) => f64::from(*r),
        other => panic!("not a number: {other:?}"),
    }
}

pub fn shown_text(ops: &[Operation]) -> Vec<String> {
    ops.iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match &op.operands[0] {
            Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}
