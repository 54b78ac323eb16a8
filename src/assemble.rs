use crate::buffer::GrowBuffer;
use crate::error::PageBindError;
use log::debug;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, dictionary};
use std::collections::BTreeMap;

const DEFAULT_PAGE_TOP: f64 = 792.0;

/// One bookmark in the merged document, addressed by global page index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub title: String,
    pub level: u32,
    pub page_index: usize,
}

/// Structural edits deferred until every stream has been imported, so no
/// object is touched while imports may still renumber around it.
enum PendingEdit {
    ReparentPage(LoObjectId),
    RelinkAnnotation {
        annotation: LoObjectId,
        page: LoObjectId,
    },
}

/// Merges rendered page streams into one document.
///
/// The first stream supplies the catalog; pages of every later stream are
/// appended in order under its page tree. Named destinations merge with the
/// first writer winning, and `outline` becomes the document bookmark tree.
/// A single stream passes through byte for byte with nothing applied on top.
pub fn assemble(
    mut streams: Vec<Vec<u8>>,
    outline: &[OutlineEntry],
) -> Result<Vec<u8>, PageBindError> {
    if streams.is_empty() {
        return Err(PageBindError::EmptyDocument);
    }
    if streams.len() == 1 {
        return Ok(streams.remove(0));
    }

    let mut base = load_stream(&streams[0])?;
    let catalog_id = root_reference(&base)?;
    let pages_root = pages_reference(&base, catalog_id)?;
    let mut page_order: Vec<LoObjectId> = base.get_pages().values().copied().collect();
    let mut destinations: BTreeMap<Vec<u8>, LoObject> = BTreeMap::new();
    collect_named_destinations(&base, &mut destinations);

    let mut edits: Vec<PendingEdit> = Vec::new();
    let mut appended: Vec<LoObjectId> = Vec::new();
    for bytes in &streams[1..] {
        let mut src = load_stream(bytes)?;
        let start_id = base.max_id + 1;
        src.renumber_objects_with(start_id);
        let src_pages: Vec<LoObjectId> = src.get_pages().values().copied().collect();
        if src.max_id > base.max_id {
            base.max_id = src.max_id;
        }
        collect_named_destinations(&src, &mut destinations);
        base.objects.extend(src.objects);
        for page_id in src_pages {
            edits.push(PendingEdit::ReparentPage(page_id));
            for annotation in page_annotations(&base, page_id) {
                edits.push(PendingEdit::RelinkAnnotation {
                    annotation,
                    page: page_id,
                });
            }
            appended.push(page_id);
        }
    }
    debug!(
        "merged {} stream(s): {} base page(s), {} appended",
        streams.len(),
        page_order.len(),
        appended.len()
    );

    for edit in edits {
        match edit {
            PendingEdit::ReparentPage(id) => {
                let page = base.get_object_mut(id).and_then(|obj| obj.as_dict_mut())?;
                page.set("Parent", LoObject::Reference(pages_root));
            }
            PendingEdit::RelinkAnnotation { annotation, page } => {
                // Annotations missing or malformed in a source stream are
                // carried unchanged rather than failing the merge.
                if let Ok(dict) = base
                    .get_object_mut(annotation)
                    .and_then(|obj| obj.as_dict_mut())
                {
                    dict.set("P", LoObject::Reference(page));
                }
            }
        }
    }

    {
        let pages = base
            .get_object_mut(pages_root)
            .and_then(|obj| obj.as_dict_mut())?;
        let mut kids = pages
            .get(b"Kids")
            .and_then(|obj| obj.as_array())
            .cloned()
            .unwrap_or_default();
        for id in &appended {
            kids.push(LoObject::Reference(*id));
        }
        pages.set("Kids", LoObject::Array(kids));
        pages.set("Count", (page_order.len() + appended.len()) as i64);
    }
    page_order.extend(appended);

    if !outline.is_empty() {
        let outline_root = build_outline(&mut base, outline, &page_order)?;
        let catalog = base
            .get_object_mut(catalog_id)
            .and_then(|obj| obj.as_dict_mut())?;
        catalog.set("Outlines", LoObject::Reference(outline_root));
        catalog.set("PageMode", LoObject::Name(b"UseOutlines".to_vec()));
    }
    if !destinations.is_empty() {
        let mut dict = lopdf::Dictionary::new();
        for (name, dest) in destinations {
            dict.set(name, dest);
        }
        let dests_id = base.add_object(LoObject::Dictionary(dict));
        let catalog = base
            .get_object_mut(catalog_id)
            .and_then(|obj| obj.as_dict_mut())?;
        catalog.set("Dests", LoObject::Reference(dests_id));
    }

    base.prune_objects();
    base.renumber_objects();
    base.compress();
    let mut buffer = GrowBuffer::new();
    base.save_to(&mut buffer)?;
    Ok(buffer.finalize())
}

fn load_stream(bytes: &[u8]) -> Result<LoDocument, PageBindError> {
    let doc = LoDocument::load_mem(bytes)?;
    if doc.is_encrypted() {
        return Err(PageBindError::InvalidPageStream(
            "page stream is encrypted".to_string(),
        ));
    }
    Ok(doc)
}

fn root_reference(doc: &LoDocument) -> Result<LoObjectId, PageBindError> {
    match doc.trailer.get(b"Root") {
        Ok(LoObject::Reference(id)) => Ok(*id),
        _ => Err(PageBindError::InvalidPageStream(
            "missing document catalog".to_string(),
        )),
    }
}

fn pages_reference(
    doc: &LoDocument,
    catalog_id: LoObjectId,
) -> Result<LoObjectId, PageBindError> {
    let catalog = doc.get_object(catalog_id).and_then(|obj| obj.as_dict())?;
    match catalog.get(b"Pages") {
        Ok(LoObject::Reference(id)) => Ok(*id),
        _ => Err(PageBindError::InvalidPageStream(
            "catalog has no page tree".to_string(),
        )),
    }
}

fn page_annotations(doc: &LoDocument, page_id: LoObjectId) -> Vec<LoObjectId> {
    let mut out = Vec::new();
    let Ok(page) = doc.get_object(page_id).and_then(|obj| obj.as_dict()) else {
        return out;
    };
    let Ok(annots) = page.get(b"Annots") else {
        return out;
    };
    let items = match annots {
        LoObject::Array(items) => items.clone(),
        LoObject::Reference(id) => match doc.get_object(*id).and_then(|obj| obj.as_array()) {
            Ok(items) => items.clone(),
            Err(_) => return out,
        },
        _ => return out,
    };
    for item in items {
        if let LoObject::Reference(id) = item {
            out.push(id);
        }
    }
    out
}

/// Gathers named destinations from both the catalog `/Dests` dictionary and
/// the `/Names` destination name tree. Existing names keep their first value.
fn collect_named_destinations(doc: &LoDocument, out: &mut BTreeMap<Vec<u8>, LoObject>) {
    let Ok(catalog) = doc.catalog() else { return };
    if let Ok(dests) = catalog.get(b"Dests") {
        if let Some(dict) = resolve_dict(doc, dests) {
            for (name, dest) in dict.iter() {
                out.entry(name.clone()).or_insert_with(|| dest.clone());
            }
        }
    }
    if let Ok(names) = catalog.get(b"Names") {
        if let Some(dict) = resolve_dict(doc, names) {
            if let Ok(tree) = dict.get(b"Dests") {
                walk_name_tree(doc, tree, out);
            }
        }
    }
}

fn walk_name_tree(doc: &LoDocument, node: &LoObject, out: &mut BTreeMap<Vec<u8>, LoObject>) {
    let Some(node) = resolve_dict(doc, node) else {
        return;
    };
    if let Ok(kids) = node.get(b"Kids").and_then(LoObject::as_array) {
        for kid in kids {
            walk_name_tree(doc, kid, out);
        }
    }
    if let Ok(names) = node.get(b"Names").and_then(LoObject::as_array) {
        for pair in names.chunks(2) {
            if let [name, dest] = pair {
                if let Ok(bytes) = name.as_str() {
                    out.entry(bytes.to_vec()).or_insert_with(|| dest.clone());
                }
            }
        }
    }
}

fn resolve_dict(doc: &LoDocument, object: &LoObject) -> Option<lopdf::Dictionary> {
    match object {
        LoObject::Dictionary(dict) => Some(dict.clone()),
        LoObject::Reference(id) => doc
            .get_object(*id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .cloned(),
        _ => None,
    }
}

struct OutlineNode {
    title: String,
    level: u32,
    page: LoObjectId,
    parent: Option<usize>,
    first: Option<usize>,
    last: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
    /// Number of entries emitted by the time this node closed. Written as
    /// `/Count` only for nodes with children.
    closed_at: usize,
}

/// Builds the bookmark tree as an index-linked arena, then emits one object
/// per node plus the `/Outlines` root. Returns the root's id.
fn build_outline(
    doc: &mut LoDocument,
    entries: &[OutlineEntry],
    pages: &[LoObjectId],
) -> Result<LoObjectId, PageBindError> {
    let mut nodes: Vec<OutlineNode> = Vec::with_capacity(entries.len());
    let mut stack: Vec<usize> = Vec::new();
    let mut top_first: Option<usize> = None;
    let mut top_last: Option<usize> = None;

    for (index, entry) in entries.iter().enumerate() {
        let page = *pages.get(entry.page_index).ok_or_else(|| {
            PageBindError::MissingOutlineTarget {
                title: entry.title.clone(),
                page_index: entry.page_index,
            }
        })?;
        while let Some(&open) = stack.last() {
            if nodes[open].level < entry.level {
                break;
            }
            nodes[open].closed_at = index;
            stack.pop();
        }
        let parent = stack.last().copied();
        let node_index = nodes.len();
        let prev = match parent {
            Some(p) => nodes[p].last,
            None => top_last,
        };
        if let Some(prev) = prev {
            nodes[prev].next = Some(node_index);
        }
        match parent {
            Some(p) => {
                if nodes[p].first.is_none() {
                    nodes[p].first = Some(node_index);
                }
                nodes[p].last = Some(node_index);
            }
            None => {
                if top_first.is_none() {
                    top_first = Some(node_index);
                }
                top_last = Some(node_index);
            }
        }
        nodes.push(OutlineNode {
            title: entry.title.clone(),
            level: entry.level,
            page,
            parent,
            first: None,
            last: None,
            prev,
            next: None,
            closed_at: entries.len(),
        });
        stack.push(node_index);
    }

    let ids: Vec<LoObjectId> = nodes.iter().map(|_| doc.new_object_id()).collect();
    let root_id = doc.new_object_id();
    for (index, node) in nodes.iter().enumerate() {
        let top = page_top(doc, node.page);
        let mut dict = dictionary! {
            "Title" => LoObject::string_literal(node.title.clone()),
            "Parent" => LoObject::Reference(node.parent.map(|p| ids[p]).unwrap_or(root_id)),
            "Dest" => LoObject::Array(vec![
                LoObject::Reference(node.page),
                LoObject::Name(b"XYZ".to_vec()),
                0.into(),
                LoObject::Real(top as f32),
                LoObject::Null,
            ]),
        };
        if let Some(first) = node.first {
            dict.set("First", LoObject::Reference(ids[first]));
        }
        if let Some(last) = node.last {
            dict.set("Last", LoObject::Reference(ids[last]));
        }
        if let Some(prev) = node.prev {
            dict.set("Prev", LoObject::Reference(ids[prev]));
        }
        if let Some(next) = node.next {
            dict.set("Next", LoObject::Reference(ids[next]));
        }
        if node.first.is_some() {
            dict.set("Count", node.closed_at as i64);
        }
        doc.objects.insert(ids[index], LoObject::Dictionary(dict));
    }

    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => entries.len() as i64,
    };
    if let Some(first) = top_first {
        root.set("First", LoObject::Reference(ids[first]));
    }
    if let Some(last) = top_last {
        root.set("Last", LoObject::Reference(ids[last]));
    }
    doc.objects.insert(root_id, LoObject::Dictionary(root));
    Ok(root_id)
}

/// Top edge of a page for destination anchors, taken from its media box.
fn page_top(doc: &LoDocument, page_id: LoObjectId) -> f64 {
    let media_box = doc
        .get_object(page_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|page| page.get(b"MediaBox").ok().cloned());
    let media_box = match media_box {
        Some(LoObject::Array(items)) => items,
        Some(LoObject::Reference(id)) => match doc.get_object(id).and_then(LoObject::as_array) {
            Ok(items) => items.clone(),
            Err(_) => return DEFAULT_PAGE_TOP,
        },
        _ => return DEFAULT_PAGE_TOP,
    };
    match media_box.get(3) {
        Some(LoObject::Integer(value)) => *value as f64,
        Some(LoObject::Real(value)) => f64::from(*value),
        _ => DEFAULT_PAGE_TOP,
    }
}
