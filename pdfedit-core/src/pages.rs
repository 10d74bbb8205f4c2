//! Page-tree plumbing on top of `lopdf`.
//!
//! - fresh document skeletons (catalog + flat page tree)
//! - inherited page attributes and page geometry
//! - inserting and detaching pages while keeping `/Count` consistent
//! - deep copying pages between documents

use std::collections::{HashMap, HashSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::config::DEFAULT_PAGE_SIZE;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Creates an empty document: a catalog pointing at a page tree with no kids.
pub(crate) fn new_document() -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<Object>::new(),
        "Count" => 0,
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub(crate) fn root_pages_id(doc: &Document) -> lopdf::Result<ObjectId> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    doc.get_object(root_id)?
        .as_dict()?
        .get(b"Pages")?
        .as_reference()
}

/// Page object ids in document order.
pub(crate) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    let mut visited = HashSet::new();
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let dict = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Width and height in points of the page's effective media box.
pub(crate) fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|media_box| {
            let values = resolve(doc, &media_box).as_array().ok()?;
            if values.len() != 4 {
                return None;
            }
            let coords = values
                .iter()
                .map(|value| resolve(doc, value).as_float().ok())
                .collect::<Option<Vec<f32>>>()?;
            Some(((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs()))
        })
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

pub(crate) fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|rotate| resolve(doc, &rotate).as_i64().ok())
        .unwrap_or(0)
}

/// Clone of the page dictionary with inherited attributes copied onto it and
/// the `/Parent` link removed.
pub(crate) fn standalone_page_dict(doc: &Document, page_id: ObjectId) -> lopdf::Result<Dictionary> {
    let mut dict = doc.get_object(page_id)?.as_dict()?.clone();
    for key in INHERITABLE {
        if !dict.has(key) {
            if let Some(value) = inherited_attribute(doc, page_id, key) {
                dict.set(key.to_vec(), value);
            }
        }
    }
    dict.remove(b"Parent");
    Ok(dict)
}

fn adjust_count(doc: &mut Document, mut node: Option<ObjectId>, delta: i64) {
    let mut visited = HashSet::new();
    while let Some(id) = node {
        if !visited.insert(id) {
            break;
        }
        let Some(tree) = doc
            .objects
            .get_mut(&id)
            .and_then(|obj| obj.as_dict_mut().ok())
        else {
            break;
        };
        let count = tree.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        tree.set("Count", (count + delta).max(0));
        node = tree.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

/// Appends `page_id` as the last kid of the page-tree node `pages_id`.
pub(crate) fn append_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page_id: ObjectId,
) -> lopdf::Result<()> {
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Parent", pages_id);
    let pages = doc.get_object_mut(pages_id)?.as_dict_mut()?;
    let mut kids = pages.get(b"Kids")?.as_array()?.clone();
    kids.push(Object::Reference(page_id));
    pages.set("Kids", kids);
    adjust_count(doc, Some(pages_id), 1);
    Ok(())
}

/// Inserts `page_id` into the same page-tree node as `anchor`, right after it.
pub(crate) fn insert_page_after(
    doc: &mut Document,
    anchor: ObjectId,
    page_id: ObjectId,
) -> lopdf::Result<()> {
    let parent_id = doc
        .get_object(anchor)?
        .as_dict()?
        .get(b"Parent")?
        .as_reference()?;
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Parent", parent_id);
    let parent = doc.get_object_mut(parent_id)?.as_dict_mut()?;
    let mut kids = parent.get(b"Kids")?.as_array()?.clone();
    let position = kids
        .iter()
        .position(|kid| matches!(kid, Object::Reference(id) if *id == anchor))
        .map(|pos| pos + 1)
        .unwrap_or(kids.len());
    kids.insert(position, Object::Reference(page_id));
    parent.set("Kids", kids);
    adjust_count(doc, Some(parent_id), 1);
    Ok(())
}

/// Removes the page from its parent's kids and drops the page object.
pub(crate) fn detach_page(doc: &mut Document, page_id: ObjectId) -> lopdf::Result<()> {
    let parent_id = doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Parent")?
        .as_reference()?;
    let parent = doc.get_object_mut(parent_id)?.as_dict_mut()?;
    let kids: Vec<Object> = parent
        .get(b"Kids")?
        .as_array()?
        .iter()
        .filter(|kid| !matches!(kid, Object::Reference(id) if *id == page_id))
        .cloned()
        .collect();
    parent.set("Kids", kids);
    adjust_count(doc, Some(parent_id), -1);
    doc.objects.remove(&page_id);
    Ok(())
}

fn is_page_tree_node(obj: &Object) -> bool {
    match obj.as_dict() {
        Ok(dict) => matches!(
            dict.get(b"Type"),
            Ok(Object::Name(name)) if name == b"Page" || name == b"Pages"
        ),
        Err(_) => false,
    }
}

/// Copies pages, and everything they reference, from one document into another.
///
/// Every source object is copied at most once per copier, so resources shared
/// between pages stay shared in the target. References that lead back into the
/// source page tree (parents, links to pages that are not being copied) are
/// replaced by `null` instead of dragging the whole tree along.
pub(crate) struct PageCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
    page_tree: HashSet<ObjectId>,
}

impl<'a> PageCopier<'a> {
    pub(crate) fn new(source: &'a Document, target: &'a mut Document) -> Self {
        let page_tree = source
            .objects
            .iter()
            .filter(|(_, obj)| is_page_tree_node(obj))
            .map(|(id, _)| *id)
            .collect();
        Self {
            source,
            target,
            id_map: HashMap::new(),
            page_tree,
        }
    }

    /// Copies one page and returns the id of the new, parentless page object.
    /// Copying the same page twice yields two distinct pages.
    pub(crate) fn copy_page(&mut self, page_id: ObjectId) -> lopdf::Result<ObjectId> {
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(page_id, new_id);

        let dict = standalone_page_dict(self.source, page_id)?;
        let remapped = self.remap_references(Object::Dictionary(dict))?;
        self.target.objects.insert(new_id, remapped);
        Ok(new_id)
    }

    fn copy_object(&mut self, source_id: ObjectId) -> lopdf::Result<ObjectId> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        // Reserve the target id before recursing so reference cycles terminate.
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let obj = self.source.get_object(source_id)?.clone();
        let new_obj = self.remap_references(obj)?;
        self.target.objects.insert(new_id, new_obj);
        Ok(new_id)
    }

    fn remap_references(&mut self, obj: Object) -> lopdf::Result<Object> {
        match obj {
            Object::Reference(id) => {
                if let Some(mapped) = self.id_map.get(&id) {
                    return Ok(Object::Reference(*mapped));
                }
                if self.page_tree.contains(&id) {
                    return Ok(Object::Null);
                }
                Ok(Object::Reference(self.copy_object(id)?))
            }
            Object::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|item| self.remap_references(item))
                    .collect::<lopdf::Result<Vec<_>>>()?;
                Ok(Object::Array(items))
            }
            Object::Dictionary(mut dict) => {
                for (_, value) in dict.iter_mut() {
                    *value = self.remap_references(value.clone())?;
                }
                Ok(Object::Dictionary(dict))
            }
            Object::Stream(mut stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    *value = self.remap_references(value.clone())?;
                }
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }
}

/// Builds a new document holding copies of `(source, page_id)` pairs, in order.
pub(crate) fn assemble<'s, I>(pages: I) -> lopdf::Result<Document>
where
    I: IntoIterator<Item = (&'s Document, ObjectId)>,
{
    let mut target = new_document();
    let pages_id = root_pages_id(&target)?;

    let mut grouped: Vec<(&Document, Vec<ObjectId>)> = Vec::new();
    for (source, page_id) in pages {
        match grouped.last_mut() {
            Some((last, ids)) if std::ptr::eq(*last, source) => ids.push(page_id),
            _ => grouped.push((source, vec![page_id])),
        }
    }

    for (source, ids) in grouped {
        let copied = {
            let mut copier = PageCopier::new(source, &mut target);
            ids.into_iter()
                .map(|id| copier.copy_page(id))
                .collect::<lopdf::Result<Vec<_>>>()?
        };
        for page_id in copied {
            append_page(&mut target, pages_id, page_id)?;
        }
    }
    Ok(target)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{page_text, sample_document};
    use super::*;

    #[test]
    fn new_document_has_empty_page_tree() {
        let doc = new_document();
        assert!(doc.get_pages().is_empty());
        let pages_id = root_pages_id(&doc).unwrap();
        let count = doc
            .get_object(pages_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Count")
            .unwrap()
            .as_i64()
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn page_size_reads_media_box_and_falls_back_to_a4() {
        let doc = sample_document(2, "Page");
        let ids = page_ids(&doc);
        assert_eq!(page_size(&doc, ids[0]), (600.0, 792.0));
        assert_eq!(page_size(&doc, ids[1]), (601.0, 792.0));

        let mut bare = new_document();
        let pages_id = root_pages_id(&bare).unwrap();
        let page_id = bare.add_object(dictionary! { "Type" => "Page" });
        append_page(&mut bare, pages_id, page_id).unwrap();
        assert_eq!(page_size(&bare, page_id), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn standalone_dict_materializes_inherited_resources() {
        let doc = sample_document(1, "Page");
        let page_id = page_ids(&doc)[0];
        let dict = standalone_page_dict(&doc, page_id).unwrap();
        assert!(dict.has(b"Resources"));
        assert!(!dict.has(b"Parent"));
    }

    #[test]
    fn insert_and_detach_keep_count_in_sync() {
        let mut doc = sample_document(3, "Page");
        let ids = page_ids(&doc);
        let copy = doc.add_object(standalone_page_dict(&doc, ids[0]).unwrap());
        insert_page_after(&mut doc, ids[0], copy).unwrap();

        assert_eq!(page_ids(&doc), vec![ids[0], copy, ids[1], ids[2]]);
        let pages_id = root_pages_id(&doc).unwrap();
        let count = |doc: &Document| {
            doc.get_object(pages_id)
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"Count")
                .unwrap()
                .as_i64()
                .unwrap()
        };
        assert_eq!(count(&doc), 4);

        detach_page(&mut doc, ids[1]).unwrap();
        assert_eq!(page_ids(&doc), vec![ids[0], copy, ids[2]]);
        assert_eq!(count(&doc), 3);
    }

    #[test]
    fn assemble_copies_pages_in_order_with_repeats() {
        let first = sample_document(3, "First");
        let second = sample_document(2, "Second");
        let a = page_ids(&first);
        let b = page_ids(&second);

        let doc = assemble(vec![
            (&first, a[2]),
            (&second, b[0]),
            (&first, a[0]),
            (&first, a[0]),
        ])
        .unwrap();

        assert_eq!(doc.get_pages().len(), 4);
        assert!(page_text(&doc, 1).contains("First 3"));
        assert!(page_text(&doc, 2).contains("Second 1"));
        assert!(page_text(&doc, 3).contains("First 1"));
        assert!(page_text(&doc, 4).contains("First 1"));

        let ids = page_ids(&doc);
        assert_ne!(ids[2], ids[3]);
    }

    #[test]
    fn copier_does_not_drag_the_source_page_tree_along() {
        let source = sample_document(5, "Page");
        let ids = page_ids(&source);
        let doc = assemble(vec![(&source, ids[1])]).unwrap();

        let page_objects = doc
            .objects
            .values()
            .filter(|obj| is_page_tree_node(obj))
            .count();
        // one page plus the new root
        assert_eq!(page_objects, 2);
    }
}
