use std::collections::HashMap;

use lopdf::{dictionary, Dictionary, Document as PdfDocument, Object, ObjectId};
use tracing::{debug, info};

use crate::error::{FolioError, Result};
use crate::models::Chunk;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

/// Splits a PDF into page-range chunks of at most `max_pages_per_chunk` pages.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    max_pages_per_chunk: u32,
}

impl Splitter {
    pub fn new(max_pages_per_chunk: u32) -> Result<Self> {
        if max_pages_per_chunk == 0 {
            return Err(FolioError::Configuration(
                "max pages per chunk must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_pages_per_chunk,
        })
    }

    pub fn max_pages_per_chunk(&self) -> u32 {
        self.max_pages_per_chunk
    }

    /// Parse `source` and return a lazy sequence of its chunks. Calling `split`
    /// again on the same bytes restarts the sequence from the first chunk.
    pub fn split(&self, source: &[u8]) -> Result<PageChunks> {
        let document = PdfDocument::load_mem(source)
            .map_err(|e| FolioError::DocumentFormat(format!("Failed to parse PDF: {e}")))?;

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        info!(
            total_pages = page_ids.len(),
            max_pages_per_chunk = self.max_pages_per_chunk,
            "Starting PDF split"
        );

        Ok(PageChunks {
            document,
            page_ids,
            max_pages: self.max_pages_per_chunk as usize,
            next_index: 0,
        })
    }
}

/// Chunks are rendered one at a time as the iterator advances: only the parsed
/// source and the chunk being built are resident.
///
/// A chunk is a fresh document that holds its pages and the objects reachable
/// from them, so rendering one costs in proportion to the chunk, not the source.
pub struct PageChunks {
    document: PdfDocument,
    page_ids: Vec<ObjectId>,
    max_pages: usize,
    next_index: usize,
}

impl PageChunks {
    pub fn total_pages(&self) -> usize {
        self.page_ids.len()
    }

    /// Number of chunks the sequence yields in total. A document without pages
    /// still yields one chunk.
    pub fn chunk_count(&self) -> usize {
        self.total_pages().div_ceil(self.max_pages).max(1)
    }

    fn render(&self, index: usize) -> Result<Chunk> {
        let total = self.total_pages();
        let start = (index * self.max_pages).min(total);
        let end = (start + self.max_pages).min(total);

        let mut document = self.extract(&self.page_ids[start..end])?;
        let mut content = Vec::new();
        document.save_to(&mut content).map_err(|e| {
            FolioError::DocumentFormat(format!("Failed to write chunk {index}: {e}"))
        })?;

        debug!(
            chunk_index = index,
            first_page = start + 1,
            last_page = end,
            objects = document.objects.len(),
            size_kb = content.len() / 1024,
            "Chunk rendered"
        );

        Ok(Chunk::new(
            index,
            start as u32 + 1,
            (end - start) as u32,
            content,
        ))
    }

    /// Copy `pages` and everything they reference into a new document with
    /// compact object ids. Page tree links are not followed; references to
    /// pages outside the range become null.
    fn extract(&self, pages: &[ObjectId]) -> Result<PdfDocument> {
        let mut chunk = PdfDocument::with_version(self.document.version.clone());
        let pages_id = chunk.new_object_id();

        let mut ids: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut pending = Vec::new();
        let mut page_dicts = Vec::with_capacity(pages.len());

        for &page_id in pages {
            let source = self.document.get_dictionary(page_id).map_err(|e| {
                FolioError::DocumentFormat(format!("Page object {page_id:?} unreadable: {e}"))
            })?;
            let mut page = source.clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = self.inherited(source, key) {
                        page.set(key, value.clone());
                    }
                }
            }
            page.remove(b"Parent");
            collect_dictionary_references(&page, &mut pending);
            ids.insert(page_id, chunk.new_object_id());
            page_dicts.push((page_id, page));
        }

        let mut copied = Vec::new();
        while let Some(id) = pending.pop() {
            if ids.contains_key(&id) {
                continue;
            }
            let Some(object) = self.document.objects.get(&id) else {
                continue;
            };
            if is_page_tree_node(object) {
                continue;
            }
            collect_references(object, &mut pending);
            ids.insert(id, chunk.new_object_id());
            copied.push(id);
        }

        let mut kids = Vec::with_capacity(page_dicts.len());
        for (page_id, page) in page_dicts {
            let mut page = Object::Dictionary(page);
            remap_references(&mut page, &ids);
            if let Object::Dictionary(dict) = &mut page {
                dict.set("Parent", pages_id);
            }
            let new_id = ids[&page_id];
            chunk.objects.insert(new_id, page);
            kids.push(Object::Reference(new_id));
        }
        for id in copied {
            if let Some(object) = self.document.objects.get(&id) {
                let mut object = object.clone();
                remap_references(&mut object, &ids);
                chunk.objects.insert(ids[&id], object);
            }
        }

        let count = kids.len() as i64;
        chunk.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = chunk.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        chunk.trailer.set("Root", catalog_id);

        Ok(chunk)
    }

    /// Nearest ancestor value of an inheritable page attribute.
    fn inherited(&self, page: &Dictionary, key: &[u8]) -> Option<&Object> {
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        for _ in 0..MAX_TREE_DEPTH {
            let node = self.document.get_dictionary(parent?).ok()?;
            if let Ok(value) = node.get(key) {
                return Some(value);
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    matches!(object, Object::Dictionary(dict) if dict.has_type(b"Page") || dict.has_type(b"Pages"))
}

fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => collect_dictionary_references(dict, out),
        Object::Stream(stream) => collect_dictionary_references(&stream.dict, out),
        _ => {}
    }
}

/// `Parent` links lead back into the page tree and are never followed.
fn collect_dictionary_references(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(value, out);
        }
    }
}

fn remap_references(object: &mut Object, ids: &HashMap<ObjectId, ObjectId>) {
    if let Object::Reference(id) = object {
        let target = ids.get(id).copied();
        *object = target.map_or(Object::Null, Object::Reference);
        return;
    }
    match object {
        Object::Array(items) => items.iter_mut().for_each(|item| remap_references(item, ids)),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .for_each(|(_, value)| remap_references(value, ids)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .for_each(|(_, value)| remap_references(value, ids)),
        _ => {}
    }
}

impl Iterator for PageChunks {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.chunk_count() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(self.render(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chunk_count() - self.next_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PageChunks {}
