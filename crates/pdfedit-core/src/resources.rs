//! Page resource dictionaries and content streams

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::EditError;
use crate::geometry::inherited_attribute;

/// Zlib-compress a stream body for /FlateDecode.
pub(crate) fn flate(data: &[u8]) -> Result<Vec<u8>, EditError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| EditError::render(format!("compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| EditError::render(format!("compression failed: {e}")))
}

fn resolved_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// Copy of the resources the page currently uses, inherited ones included.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, EditError> {
    Ok(inherited_attribute(doc, page_id, b"Resources")?
        .and_then(|obj| resolved_dict(doc, obj))
        .unwrap_or_default())
}

/// Add `object` to the page's `category` resources (Font, XObject,
/// ExtGState) under a fresh name starting with `prefix`.
///
/// Resources shared with other pages or inherited from the page tree are
/// copied onto the page first, so other pages never see the new entry.
pub fn register_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
    object: Object,
) -> Result<String, EditError> {
    let mut resources = effective_resources(doc, page_id)?;
    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .and_then(|obj| resolved_dict(doc, obj))
        .unwrap_or_default();

    let name = (1u32..)
        .map(|n| format!("{prefix}{n}"))
        .find(|candidate| !entries.has(candidate.as_bytes()))
        .ok_or_else(|| EditError::render("resource names exhausted"))?;
    entries.set(name.clone(), object);
    resources.set(category, entries);

    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| EditError::render(format!("page {page_id:?} is not a dictionary: {e}")))?
        .set("Resources", resources);
    Ok(name)
}

/// Append an overlay to the page's content.
///
/// The existing content is bracketed by `q`/`Q` so an unbalanced graphics
/// state in the original page cannot move or recolor the overlay.
pub fn append_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), EditError> {
    if operations.is_empty() {
        return Ok(());
    }

    let existing = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if !existing.is_empty() {
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())),
        ));
        contents.extend(existing);
    }

    let mut overlay = Vec::with_capacity(operations.len() + 1);
    if !contents.is_empty() {
        overlay.push(Operation::new("Q", vec![]));
    }
    overlay.extend(operations);

    // Streams are concatenated as-is, keep tokens from fusing across them
    let mut bytes = b"\n".to_vec();
    bytes.extend(Content { operations: overlay }.encode()?);
    bytes.push(b'\n');
    contents.push(Object::Reference(
        doc.add_object(Stream::new(Dictionary::new(), bytes)),
    ));

    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)?
        .set("Contents", Object::Array(contents));
    Ok(())
}
