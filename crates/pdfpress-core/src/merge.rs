//! PDF merge.
//!
//! Concatenates the pages of two or more uploaded documents, in input order,
//! into a single document. Inputs are fully parsed up front so a malformed
//! file is reported by name before anything is written.

use std::collections::BTreeMap;

use lopdf::{Document, Object, ObjectId};

use crate::error::PdfPressError;

/// One uploaded document: declared filename plus raw bytes.
#[derive(Debug, Clone)]
pub struct NamedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// True when the declared filename carries a `.pdf` suffix, any case.
pub fn is_pdf_filename(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Merge the pages of all inputs, in input order, into one PDF.
///
/// Fewer than two inputs is a validation failure; an input that does not
/// parse as a PDF fails the whole merge, naming the offending file. No
/// partial output is ever produced.
pub fn merge_documents(inputs: Vec<NamedDocument>) -> Result<Vec<u8>, PdfPressError> {
    if inputs.len() < 2 {
        return Err(PdfPressError::Validation(
            "At least 2 PDF files are required for merging".into(),
        ));
    }

    // Parse everything before touching anything, so a bad file in the middle
    // cannot leave a half-built result.
    let mut parsed = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let doc = Document::load_mem(&input.bytes).map_err(|e| {
            PdfPressError::InvalidInput(format!("{} is not a valid PDF: {}", input.filename, e))
        })?;
        parsed.push(doc);
    }

    let mut merged = parsed.remove(0);
    let mut page_refs = ordered_page_ids(&merged);
    let mut max_id = merged.max_id;

    for source in parsed {
        max_id = absorb(&mut merged, source, max_id, &mut page_refs);
    }

    rebuild_page_tree(&mut merged, page_refs)?;
    merged.max_id = max_id;
    merged.compress();

    let mut buffer = Vec::new();
    merged
        .save_to(&mut buffer)
        .map_err(|e| PdfPressError::InvalidInput(format!("Failed to save merged PDF: {}", e)))?;
    Ok(buffer)
}

/// Move every object of `source` into `dest` with shifted IDs and record the
/// source's pages at the end of `page_refs`. Returns the new maximum ID.
fn absorb(
    dest: &mut Document,
    source: Document,
    max_id: u32,
    page_refs: &mut Vec<ObjectId>,
) -> u32 {
    let offset = max_id;
    let source_pages = ordered_page_ids(&source);
    let source_max = source.max_id;

    let mut shifted = BTreeMap::new();
    for (old_id, object) in source.objects.into_iter() {
        shifted.insert((old_id.0 + offset, old_id.1), shift_refs(object, offset));
    }
    dest.objects.extend(shifted);

    for page in source_pages {
        page_refs.push((page.0 + offset, page.1));
    }

    (source_max + offset).max(max_id)
}

/// Page object IDs in page order.
fn ordered_page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Recursively shift every object reference by `offset`.
fn shift_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => {
            Object::Array(arr.into_iter().map(|o| shift_refs(o, offset)).collect())
        }
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = shift_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = shift_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the catalog's page tree at the combined page list.
fn rebuild_page_tree(doc: &mut Document, page_refs: Vec<ObjectId>) -> Result<(), PdfPressError> {
    let structural = |what: &str| PdfPressError::InvalidInput(format!("Malformed PDF: {}", what));

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .map_err(|_| structural("no Root in trailer"))?
        .as_reference()
        .map_err(|_| structural("Root is not a reference"))?;

    let pages_id = doc
        .objects
        .get(&catalog_id)
        .ok_or_else(|| structural("catalog missing"))?
        .as_dict()
        .map_err(|_| structural("catalog is not a dictionary"))?
        .get(b"Pages")
        .map_err(|_| structural("no Pages in catalog"))?
        .as_reference()
        .map_err(|_| structural("Pages is not a reference"))?;

    match doc.objects.get_mut(&pages_id) {
        Some(Object::Dictionary(pages_dict)) => {
            let kids: Vec<Object> = page_refs.iter().map(|&id| Object::Reference(id)).collect();
            pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
            pages_dict.set("Kids", Object::Array(kids));
            Ok(())
        }
        _ => Err(structural("pages node is not a dictionary")),
    }
}
