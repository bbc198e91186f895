//! Concatenate single-slide PDFs into one document.

use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("nothing to merge")]
    Empty,
    #[error("capture {index} is not a readable PDF: {source}")]
    Load {
        index: usize,
        #[source]
        source: lopdf::Error,
    },
    #[error("captures contain no {0} object")]
    Missing(&'static str),
    #[error("failed to serialize merged PDF: {0}")]
    Save(#[from] std::io::Error),
}

/// Merge `captures` into one PDF, keeping their pages in order.
///
/// # Errors
///
/// Returns an error if a capture cannot be parsed or the result cannot be
/// written.
pub fn merge_pdfs(captures: &[Vec<u8>]) -> Result<Vec<u8>, MergeError> {
    if captures.is_empty() {
        return Err(MergeError::Empty);
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (index, bytes) in captures.iter().enumerate() {
        let mut doc =
            Document::load_mem(bytes).map_err(|source| MergeError::Load { index, source })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let page = doc
                .get_object(page_id)
                .map_err(|source| MergeError::Load { index, source })?
                .to_owned();
            pages.push((page_id, page));
        }
        objects.extend(doc.objects);
    }

    let mut document = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut page_tree: Option<(ObjectId, Object)> = None;

    for (object_id, object) in objects {
        match object.type_name().unwrap_or("") {
            "Catalog" => {
                let id = catalog.as_ref().map_or(object_id, |(id, _)| *id);
                catalog = Some((id, object));
            }
            "Pages" => {
                if let Ok(dictionary) = object.as_dict() {
                    let mut dictionary = dictionary.clone();
                    if let Some((_, Object::Dictionary(previous))) = &page_tree {
                        dictionary.extend(previous);
                    }
                    let id = page_tree.as_ref().map_or(object_id, |(id, _)| *id);
                    page_tree = Some((id, Object::Dictionary(dictionary)));
                }
            }
            "Page" | "Outlines" | "Outline" => {}
            _ => {
                document.objects.insert(object_id, object);
            }
        }
    }

    let (catalog_id, catalog) = catalog.ok_or(MergeError::Missing("Catalog"))?;
    let (tree_id, tree) = page_tree.ok_or(MergeError::Missing("Pages"))?;

    for (page_id, page) in &pages {
        if let Ok(dictionary) = page.as_dict() {
            let mut dictionary = dictionary.clone();
            dictionary.set("Parent", tree_id);
            document
                .objects
                .insert(*page_id, Object::Dictionary(dictionary));
        }
    }

    if let Ok(dictionary) = tree.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set(
            "Count",
            Object::Integer(i64::try_from(pages.len()).unwrap_or(i64::MAX)),
        );
        dictionary.set(
            "Kids",
            pages
                .iter()
                .map(|(id, _)| Object::Reference(*id))
                .collect::<Vec<_>>(),
        );
        document
            .objects
            .insert(tree_id, Object::Dictionary(dictionary));
    }

    if let Ok(dictionary) = catalog.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set("Pages", tree_id);
        dictionary.remove(b"Outlines");
        document
            .objects
            .insert(catalog_id, Object::Dictionary(dictionary));
    }

    document.trailer.set("Root", catalog_id);
    document.max_id = u32::try_from(document.objects.len()).unwrap_or(u32::MAX);
    document.renumber_objects();
    document.compress();

    let mut out = Vec::new();
    document.save_to(&mut out)?;
    tracing::debug!(pages = pages.len(), bytes = out.len(), "merged slide captures");
    Ok(out)
}

/// Build a one-page PDF whose media box is `width` points wide.
#[cfg(test)]
pub(crate) fn single_page_pdf(width: i64) -> Vec<u8> {
    use lopdf::{Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(200),
        ],
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_widths(pdf: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(pdf).unwrap();
        doc.get_pages()
            .into_values()
            .map(|id| {
                let page = doc.get_object(id).unwrap().as_dict().unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_i64()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_merge_keeps_capture_order() {
        let captures: Vec<_> = (1..=3).map(|i| single_page_pdf(100 + i)).collect();
        let merged = merge_pdfs(&captures).unwrap();
        assert_eq!(page_widths(&merged), vec![101, 102, 103]);
    }

    #[test]
    fn test_merge_single_capture() {
        let merged = merge_pdfs(&[single_page_pdf(150)]).unwrap();
        assert_eq!(page_widths(&merged), vec![150]);
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let err = merge_pdfs(&[single_page_pdf(100), b"not a pdf".to_vec()]).unwrap_err();
        assert!(matches!(err, MergeError::Load { index: 1, .. }));
    }

    #[test]
    fn test_merge_nothing_is_an_error() {
        assert!(matches!(merge_pdfs(&[]), Err(MergeError::Empty)));
    }
}
