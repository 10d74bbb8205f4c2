use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use image::{ColorType, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{EditorConfig, EraseConfig, PageSizeConfig};
use crate::error::{EditorError, EditorResult};
use crate::pages::{self, PageCopier};

/// Converts a top-left-origin y coordinate into page space (bottom-left
/// origin), placing the text baseline one font size below `y`.
pub fn to_pdf_y(page_height: f32, y: f32, font_size: f32) -> f32 {
    page_height - y - font_size
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn to_hex(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }

    /// Parses `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Color> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .ok()
                .map(|v| f32::from(v) / 255.0)
        };
        Some(Color {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    fn fill_operation(&self) -> Operation {
        Operation::new(
            "rg",
            vec![self.r.into(), self.g.into(), self.b.into()],
        )
    }
}

impl From<[f32; 3]> for Color {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_size: f32,
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: Color::BLACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpg,
}

impl ImageKind {
    /// Anything that does not look like PNG is treated as JPEG.
    pub fn from_mime(mime: &str) -> Self {
        if mime.contains("png") {
            ImageKind::Png
        } else {
            ImageKind::Jpg
        }
    }
}

impl FromStr for ImageKind {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageKind::Png),
            "jpg" | "jpeg" => Ok(ImageKind::Jpg),
            other => Err(EditorError::UnsupportedImageFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Png => f.write_str("png"),
            ImageKind::Jpg => f.write_str("jpg"),
        }
    }
}

/// Page-oriented operations over a single, exclusively owned PDF document.
pub struct PdfEditor {
    document: Option<Document>,
    /// Pages whose original content has already been wrapped in `q`/`Q`.
    normalized: HashSet<ObjectId>,
    erase: EraseConfig,
    blank_page: PageSizeConfig,
}

impl Default for PdfEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfEditor {
    pub fn new() -> Self {
        Self::from_config(&EditorConfig::default())
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            document: None,
            normalized: HashSet::new(),
            erase: config.erase,
            blank_page: config.blank_page,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    fn replace(&mut self, document: Option<Document>) {
        self.document = document;
        self.normalized.clear();
    }

    fn doc(&self) -> EditorResult<&Document> {
        self.document.as_ref().ok_or(EditorError::NoDocumentLoaded)
    }

    fn doc_mut(&mut self) -> EditorResult<&mut Document> {
        self.document.as_mut().ok_or(EditorError::NoDocumentLoaded)
    }

    fn page_id(&self, index: usize) -> EditorResult<ObjectId> {
        let ids = pages::page_ids(self.doc()?);
        ids.get(index)
            .copied()
            .ok_or(EditorError::PageOutOfBounds {
                index,
                count: ids.len(),
            })
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn load(&mut self, bytes: &[u8]) -> EditorResult<()> {
        let document = Document::load_mem(bytes).map_err(EditorError::Parse)?;
        debug!(pages = document.get_pages().len(), "document loaded");
        self.replace(Some(document));
        Ok(())
    }

    pub fn create_blank(&mut self) {
        self.replace(Some(pages::new_document()));
    }

    pub fn page_count(&self) -> usize {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len())
            .unwrap_or(0)
    }

    /// Width and height in points of the page at `index`.
    pub fn page_size(&self, index: usize) -> EditorResult<(f32, f32)> {
        let page_id = self.page_id(index)?;
        Ok(pages::page_size(self.doc()?, page_id))
    }

    pub fn page_rotation(&self, index: usize) -> EditorResult<i64> {
        let page_id = self.page_id(index)?;
        Ok(pages::page_rotation(self.doc()?, page_id))
    }

    /// Fails with [`EditorError::UnencodableText`] when `text` cannot be drawn
    /// with the standard font.
    pub fn validate_text(text: &str) -> EditorResult<()> {
        text.split('\n').try_for_each(|line| encode_win_ansi(line).map(|_| ()))
    }

    /// Draws `text` with its top-left corner at screen position `(x, y)`.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn add_text(
        &mut self,
        page_index: usize,
        text: &str,
        x: f32,
        y: f32,
        style: TextStyle,
    ) -> EditorResult<()> {
        let page_id = self.page_id(page_index)?;
        let lines = text
            .split('\n')
            .map(encode_win_ansi)
            .collect::<EditorResult<Vec<_>>>()?;

        let doc = self.doc_mut()?;
        let (_, page_height) = pages::page_size(doc, page_id);
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let font_name = register_resource(doc, page_id, b"Font", "F", font_id)?;

        let mut operations = vec![
            Operation::new("q", vec![]),
            style.color.fill_operation(),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font_name.into_bytes()), style.font_size.into()],
            ),
            Operation::new("TL", vec![(style.font_size * 1.2).into()]),
            Operation::new(
                "Td",
                vec![x.into(), to_pdf_y(page_height, y, style.font_size).into()],
            ),
        ];
        for (line_no, line) in lines.into_iter().enumerate() {
            if line_no > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(line, StringFormat::Literal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));
        operations.push(Operation::new("Q", vec![]));

        self.append_content(page_id, operations)
    }

    /// Draws an image into the rectangle whose lower-left corner is `(x, y)`.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn add_image(
        &mut self,
        page_index: usize,
        bytes: &[u8],
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        kind: ImageKind,
    ) -> EditorResult<()> {
        let page_id = self.page_id(page_index)?;
        let doc = self.doc_mut()?;
        let image_id = embed_image(doc, bytes, kind)?;
        let image_name = register_resource(doc, page_id, b"XObject", "Im", image_id)?;

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image_name.into_bytes())]),
            Operation::new("Q", vec![]),
        ];
        self.append_content(page_id, operations)
    }

    /// Sets the absolute rotation of a page.
    pub fn rotate_page(&mut self, page_index: usize, degrees: i32) -> EditorResult<()> {
        let page_id = self.page_id(page_index)?;
        if degrees % 90 != 0 {
            return Err(EditorError::InvalidRotation(degrees));
        }
        let normalized = i64::from(degrees.rem_euclid(360));
        self.doc_mut()?
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Rotate", normalized);
        debug!(page_index, rotation = normalized, "page rotated");
        Ok(())
    }

    pub fn delete_page(&mut self, page_index: usize) -> EditorResult<()> {
        let page_id = self.page_id(page_index)?;
        if self.page_count() <= 1 {
            return Err(EditorError::LastPageRemoval);
        }
        let doc = self.doc_mut()?;
        pages::detach_page(doc, page_id)?;
        doc.prune_objects();
        self.normalized.remove(&page_id);
        debug!(page_index, "page deleted");
        Ok(())
    }

    pub fn duplicate_page(&mut self, page_index: usize) -> EditorResult<()> {
        let page_id = self.page_id(page_index)?;
        let doc = self.doc_mut()?;
        let copy = pages::standalone_page_dict(doc, page_id)?;
        let copy_id = doc.add_object(copy);
        pages::insert_page_after(doc, page_id, copy_id)?;
        debug!(page_index, "page duplicated");
        Ok(())
    }

    /// Serializes a new document holding the given pages, in the given order.
    #[instrument(skip(self))]
    pub fn extract_pages(&self, indices: &[usize]) -> EditorResult<Vec<u8>> {
        let doc = self.doc()?;
        if indices.is_empty() {
            return Err(EditorError::EmptySelection);
        }
        let ids = pages::page_ids(doc);
        let selected = indices
            .iter()
            .map(|&index| {
                ids.get(index)
                    .map(|id| (doc, *id))
                    .ok_or(EditorError::PageOutOfBounds {
                        index,
                        count: ids.len(),
                    })
            })
            .collect::<EditorResult<Vec<_>>>()?;
        let mut extracted = pages::assemble(selected)?;
        save(&mut extracted)
    }

    /// Appends every page of `bytes` to the end of the current document.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn merge_from(&mut self, bytes: &[u8]) -> EditorResult<()> {
        self.doc()?;
        let source = Document::load_mem(bytes).map_err(EditorError::Parse)?;
        let doc = self.doc_mut()?;
        let pages_id = pages::root_pages_id(doc)?;
        let copied = {
            let mut copier = PageCopier::new(&source, doc);
            pages::page_ids(&source)
                .into_iter()
                .map(|id| copier.copy_page(id))
                .collect::<lopdf::Result<Vec<_>>>()?
        };
        for page_id in &copied {
            pages::append_page(doc, pages_id, *page_id)?;
        }
        debug!(appended = copied.len(), "document merged");
        Ok(())
    }

    /// Builds a new document from every page of every buffer, in order.
    pub fn merge_all<B: AsRef<[u8]>>(buffers: &[B]) -> EditorResult<Vec<u8>> {
        let sources = buffers
            .iter()
            .map(|buffer| Document::load_mem(buffer.as_ref()).map_err(EditorError::Parse))
            .collect::<EditorResult<Vec<_>>>()?;
        let selection = sources
            .iter()
            .flat_map(|source| {
                pages::page_ids(source)
                    .into_iter()
                    .map(move |id| (source, id))
            })
            .collect::<Vec<_>>();
        let mut merged = pages::assemble(selection)?;
        debug!(
            sources = sources.len(),
            pages = merged.get_pages().len(),
            "documents merged"
        );
        save(&mut merged)
    }

    /// Replaces the document with one whose page `n` is the old page `new_order[n]`.
    #[instrument(skip(self))]
    pub fn reorder_pages(&mut self, new_order: &[usize]) -> EditorResult<()> {
        let reordered = {
            let doc = self.doc()?;
            let ids = pages::page_ids(doc);
            if new_order.len() != ids.len() {
                return Err(EditorError::LengthMismatch {
                    expected: ids.len(),
                    actual: new_order.len(),
                });
            }
            let selection = new_order
                .iter()
                .map(|&index| {
                    ids.get(index)
                        .map(|id| (doc, *id))
                        .ok_or(EditorError::PageOutOfBounds {
                            index,
                            count: ids.len(),
                        })
                })
                .collect::<EditorResult<Vec<_>>>()?;
            pages::assemble(selection)?
        };
        self.replace(Some(reordered));
        Ok(())
    }

    /// Appends an empty page sized like the first page. Returns `false` on failure.
    pub fn add_blank_page(&mut self) -> bool {
        match self.try_add_blank_page() {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "failed to add blank page");
                false
            }
        }
    }

    fn try_add_blank_page(&mut self) -> EditorResult<()> {
        let fallback = (self.blank_page.width, self.blank_page.height);
        let doc = self.doc_mut()?;
        let (width, height) = pages::page_ids(doc)
            .first()
            .map(|first| pages::page_size(doc, *first))
            .unwrap_or(fallback);
        let pages_id = pages::root_pages_id(doc)?;
        let contents_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => dictionary! {},
            "Contents" => contents_id,
        });
        pages::append_page(doc, pages_id, page_id)?;
        Ok(())
    }

    /// Covers previously drawn text with an opaque white rectangle of fixed
    /// size. Nothing is removed from the content stream.
    pub fn erase_text_region(&mut self, page_index: usize, x: f32, y: f32) -> EditorResult<()> {
        let page_id = self.page_id(page_index)?;
        let EraseConfig {
            width,
            height,
            offset,
        } = self.erase;
        let operations = vec![
            Operation::new("q", vec![]),
            Color::WHITE.fill_operation(),
            Operation::new(
                "re",
                vec![
                    (x - offset).into(),
                    (y - offset).into(),
                    width.into(),
                    height.into(),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ];
        self.append_content(page_id, operations)
    }

    pub fn serialize(&mut self) -> EditorResult<Vec<u8>> {
        save(self.doc_mut()?)
    }

    pub fn clear(&mut self) {
        self.replace(None);
    }

    /// Appends a content stream to the page, isolating the page's existing
    /// content in a `q`/`Q` pair the first time the page is touched.
    fn append_content(&mut self, page_id: ObjectId, operations: Vec<Operation>) -> EditorResult<()> {
        let encoded = Content { operations }.encode()?;
        let first_touch = !self.normalized.contains(&page_id);
        let doc = self.doc_mut()?;

        let existing = match doc.get_object(page_id)?.as_dict()?.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Reference(id)) => match doc.get_object(*id)? {
                Object::Array(items) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            _ => Vec::new(),
        };

        let mut contents = Vec::with_capacity(existing.len() + 3);
        if first_touch && !existing.is_empty() {
            let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            let restore_id = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
            contents.push(Object::Reference(save_id));
            contents.extend(existing);
            contents.push(Object::Reference(restore_id));
        } else {
            contents.extend(existing);
        }
        let overlay_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        contents.push(Object::Reference(overlay_id));

        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Contents", contents);
        self.normalized.insert(page_id);
        Ok(())
    }
}

fn save(doc: &mut Document) -> EditorResult<Vec<u8>> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|err| EditorError::Unknown(anyhow::Error::new(err)))?;
    Ok(buffer)
}

/// Adds `target` under a fresh name in the page's `category` resource
/// dictionary. The page gets its own inline copy of its resources so pages
/// sharing a resource dictionary are not affected.
fn register_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    prefix: &str,
    target: ObjectId,
) -> EditorResult<String> {
    let mut resources = match pages::inherited_attribute(doc, page_id, b"Resources") {
        Some(found) => match pages::resolve(doc, &found) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        None => Dictionary::new(),
    };
    let mut entries = match resources.get(category) {
        Ok(found) => match pages::resolve(doc, found) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };

    let mut counter = 1usize;
    let name = loop {
        let candidate = format!("{prefix}{counter}");
        if !entries.has(candidate.as_bytes()) {
            break candidate;
        }
        counter += 1;
    };
    entries.set(name.clone(), target);
    resources.set(category.to_vec(), entries);
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", resources);
    Ok(name)
}

fn embed_image(doc: &mut Document, bytes: &[u8], kind: ImageKind) -> EditorResult<ObjectId> {
    match kind {
        ImageKind::Jpg => {
            let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
                .map_err(|err| EditorError::UnsupportedImageFormat(format!("invalid jpg: {err}")))?;
            let color_space = match decoded.color() {
                ColorType::L8 | ColorType::L16 => "DeviceGray",
                _ => "DeviceRGB",
            };
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(decoded.width()),
                    "Height" => i64::from(decoded.height()),
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                bytes.to_vec(),
            );
            Ok(doc.add_object(stream))
        }
        ImageKind::Png => {
            let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
                .map_err(|err| EditorError::UnsupportedImageFormat(format!("invalid png: {err}")))?
                .to_rgba8();
            let (width, height) = decoded.dimensions();
            let mut rgb = Vec::with_capacity((width * height * 3) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            for pixel in decoded.pixels() {
                rgb.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
            }

            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            };
            if alpha.iter().any(|&a| a != u8::MAX) {
                let mut smask = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => i64::from(width),
                        "Height" => i64::from(height),
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    alpha,
                );
                smask.compress()?;
                dict.set("SMask", doc.add_object(smask));
            }
            let mut stream = Stream::new(dict, rgb);
            stream.compress()?;
            Ok(doc.add_object(stream))
        }
    }
}

/// Windows-1252 code points outside Latin-1 that the standard fonts can draw.
const WIN_ANSI_EXTRAS: [(char, u8); 27] = [
    ('€', 0x80),
    ('‚', 0x82),
    ('ƒ', 0x83),
    ('„', 0x84),
    ('…', 0x85),
    ('†', 0x86),
    ('‡', 0x87),
    ('ˆ', 0x88),
    ('‰', 0x89),
    ('Š', 0x8A),
    ('‹', 0x8B),
    ('Œ', 0x8C),
    ('Ž', 0x8E),
    ('‘', 0x91),
    ('’', 0x92),
    ('“', 0x93),
    ('”', 0x94),
    ('•', 0x95),
    ('–', 0x96),
    ('—', 0x97),
    ('˜', 0x98),
    ('™', 0x99),
    ('š', 0x9A),
    ('›', 0x9B),
    ('œ', 0x9C),
    ('ž', 0x9E),
    ('Ÿ', 0x9F),
];

fn encode_win_ansi(text: &str) -> EditorResult<Vec<u8>> {
    text.chars()
        .filter(|ch| *ch != '\r')
        .map(|ch| match ch as u32 {
            0x20..=0x7E | 0xA0..=0xFF => Ok(ch as u32 as u8),
            _ => WIN_ANSI_EXTRAS
                .iter()
                .find(|(extra, _)| *extra == ch)
                .map(|(_, byte)| *byte)
                .ok_or(EditorError::UnencodableText(ch)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::fixtures::{page_text, sample_bytes};
    use std::io::Cursor;

    fn loaded(num_pages: u32, prefix: &str) -> PdfEditor {
        let mut editor = PdfEditor::new();
        editor.load(&sample_bytes(num_pages, prefix)).unwrap();
        editor
    }

    fn reparse(editor: &mut PdfEditor) -> Document {
        Document::load_mem(&editor.serialize().unwrap()).unwrap()
    }

    fn widths(editor: &PdfEditor) -> Vec<f32> {
        (0..editor.page_count())
            .map(|i| editor.page_size(i).unwrap().0)
            .collect()
    }

    fn font_names(doc: &Document, page_number: u32) -> Vec<String> {
        let page_id = *doc.get_pages().get(&page_number).unwrap();
        let resources = pages::inherited_attribute(doc, page_id, b"Resources").unwrap();
        let resources = pages::resolve(doc, &resources).as_dict().unwrap();
        let fonts = pages::resolve(doc, resources.get(b"Font").unwrap())
            .as_dict()
            .unwrap();
        let mut names = fonts
            .iter()
            .map(|(name, _)| String::from_utf8_lossy(name).into_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn operations(doc: &Document, page_number: u32) -> Vec<Operation> {
        let page_id = *doc.get_pages().get(&page_number).unwrap();
        Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
    }

    fn png_bytes(alpha: u8) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, alpha]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn jpg_bytes() -> Vec<u8> {
        let image = image::RgbImage::from_pixel(4, 3, image::Rgb([0, 128, 255]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn operations_without_document_fail() {
        let mut editor = PdfEditor::new();
        assert_eq!(editor.page_count(), 0);
        assert!(matches!(
            editor.serialize(),
            Err(EditorError::NoDocumentLoaded)
        ));
        assert!(matches!(
            editor.rotate_page(0, 90),
            Err(EditorError::NoDocumentLoaded)
        ));
        assert!(matches!(
            editor.extract_pages(&[0]),
            Err(EditorError::NoDocumentLoaded)
        ));
        assert!(matches!(
            editor.merge_from(&sample_bytes(1, "Page")),
            Err(EditorError::NoDocumentLoaded)
        ));
        assert!(!editor.add_blank_page());
    }

    #[test]
    fn load_rejects_garbage() {
        let mut editor = PdfEditor::new();
        assert!(matches!(
            editor.load(b"definitely not a pdf"),
            Err(EditorError::Parse(_))
        ));
        assert!(!editor.is_loaded());
    }

    #[test]
    fn round_trip_preserves_page_count_and_geometry() {
        let mut editor = loaded(3, "Page");
        let before = widths(&editor);
        let bytes = editor.serialize().unwrap();

        let mut reloaded = PdfEditor::new();
        reloaded.load(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 3);
        assert_eq!(widths(&reloaded), before);
        assert_eq!(reloaded.page_size(0).unwrap().1, 792.0);
    }

    #[test]
    fn create_blank_then_add_blank_page_uses_default_size() {
        let mut editor = PdfEditor::new();
        editor.create_blank();
        assert_eq!(editor.page_count(), 0);
        assert!(editor.add_blank_page());
        assert_eq!(editor.page_count(), 1);
        assert_eq!(editor.page_size(0).unwrap(), (595.28, 841.89));
    }

    #[test]
    fn blank_page_matches_first_page() {
        let mut editor = loaded(2, "Page");
        assert!(editor.add_blank_page());
        assert_eq!(editor.page_count(), 3);
        assert_eq!(editor.page_size(2).unwrap(), (600.0, 792.0));
    }

    #[test]
    fn duplicate_inserts_copy_after_source() {
        for index in 0..3 {
            let mut editor = loaded(3, "Page");
            editor.duplicate_page(index).unwrap();
            assert_eq!(editor.page_count(), 4);

            let doc = reparse(&mut editor);
            let source = page_text(&doc, index as u32 + 1);
            let copy = page_text(&doc, index as u32 + 2);
            assert_eq!(source, copy);
            assert!(copy.contains(&format!("Page {}", index + 1)));
        }
    }

    #[test]
    fn duplicate_out_of_bounds_fails() {
        let mut editor = loaded(2, "Page");
        assert!(matches!(
            editor.duplicate_page(2),
            Err(EditorError::PageOutOfBounds { index: 2, count: 2 })
        ));
        assert_eq!(editor.page_count(), 2);
    }

    #[test]
    fn delete_shifts_following_pages() {
        for index in 0..3 {
            let mut editor = loaded(3, "Page");
            let mut expected = widths(&editor);
            expected.remove(index);
            editor.delete_page(index).unwrap();
            assert_eq!(editor.page_count(), 2);
            assert_eq!(widths(&editor), expected);
        }
    }

    #[test]
    fn deleting_last_remaining_page_is_rejected() {
        let mut editor = loaded(1, "Page");
        assert!(matches!(
            editor.delete_page(0),
            Err(EditorError::LastPageRemoval)
        ));
        assert_eq!(editor.page_count(), 1);
    }

    #[test]
    fn rotation_is_absolute_and_validated() {
        let mut editor = loaded(2, "Page");
        editor.rotate_page(1, 90).unwrap();
        editor.rotate_page(1, 180).unwrap();
        assert_eq!(editor.page_rotation(1).unwrap(), 180);
        editor.rotate_page(1, -90).unwrap();
        assert_eq!(editor.page_rotation(1).unwrap(), 270);
        assert_eq!(editor.page_rotation(0).unwrap(), 0);

        assert!(matches!(
            editor.rotate_page(0, 45),
            Err(EditorError::InvalidRotation(45))
        ));
        assert!(matches!(
            editor.rotate_page(5, 90),
            Err(EditorError::PageOutOfBounds { .. })
        ));

        let mut reloaded = PdfEditor::new();
        reloaded.load(&editor.serialize().unwrap()).unwrap();
        assert_eq!(reloaded.page_rotation(1).unwrap(), 270);
    }

    #[test]
    fn reorder_permutation_maps_pages() {
        let mut editor = loaded(4, "Page");
        let original = widths(&editor);
        let order = [2, 0, 3, 1];
        editor.reorder_pages(&order).unwrap();

        let reordered = widths(&editor);
        for (n, &source) in order.iter().enumerate() {
            assert_eq!(reordered[n], original[source]);
        }
        let doc = reparse(&mut editor);
        assert!(page_text(&doc, 1).contains("Page 3"));
        assert!(page_text(&doc, 4).contains("Page 2"));
    }

    #[test]
    fn reorder_allows_repeats() {
        let mut editor = loaded(3, "Page");
        editor.reorder_pages(&[0, 0, 2]).unwrap();
        assert_eq!(widths(&editor), vec![600.0, 600.0, 602.0]);
    }

    #[test]
    fn reorder_with_wrong_length_leaves_document_untouched() {
        let mut editor = loaded(3, "Page");
        let before = widths(&editor);
        assert!(matches!(
            editor.reorder_pages(&[0, 1]),
            Err(EditorError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            editor.reorder_pages(&[0, 1, 3]),
            Err(EditorError::PageOutOfBounds { index: 3, .. })
        ));
        assert_eq!(widths(&editor), before);

        editor.reorder_pages(&[2, 1, 0]).unwrap();
        assert_eq!(widths(&editor), vec![602.0, 601.0, 600.0]);
    }

    #[test]
    fn extract_honors_order_and_repeats_without_mutating() {
        let editor = loaded(4, "Page");
        let bytes = editor.extract_pages(&[3, 1, 3]).unwrap();
        assert_eq!(editor.page_count(), 4);

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert!(page_text(&doc, 1).contains("Page 4"));
        assert!(page_text(&doc, 2).contains("Page 2"));
        assert!(page_text(&doc, 3).contains("Page 4"));

        assert!(matches!(
            editor.extract_pages(&[]),
            Err(EditorError::EmptySelection)
        ));
        assert!(matches!(
            editor.extract_pages(&[4]),
            Err(EditorError::PageOutOfBounds { index: 4, count: 4 })
        ));
    }

    #[test]
    fn merge_from_appends_all_pages() {
        let mut editor = loaded(2, "Target");
        editor.merge_from(&sample_bytes(3, "Source")).unwrap();
        assert_eq!(editor.page_count(), 5);

        let doc = reparse(&mut editor);
        assert!(page_text(&doc, 2).contains("Target 2"));
        assert!(page_text(&doc, 3).contains("Source 1"));
        assert!(page_text(&doc, 5).contains("Source 3"));

        assert!(matches!(
            editor.merge_from(b"junk"),
            Err(EditorError::Parse(_))
        ));
        assert_eq!(editor.page_count(), 5);
    }

    #[test]
    fn merge_all_concatenates_in_order() {
        let a = sample_bytes(3, "A");
        let b = sample_bytes(2, "B");
        let merged = PdfEditor::merge_all(&[a.clone(), b]).unwrap();

        let mut editor = PdfEditor::new();
        editor.load(&merged).unwrap();
        assert_eq!(editor.page_count(), 5);
        assert_eq!(&widths(&editor)[..3], &[600.0, 601.0, 602.0]);

        let doc = Document::load_mem(&merged).unwrap();
        assert!(page_text(&doc, 1).contains("A 1"));
        assert!(page_text(&doc, 3).contains("A 3"));
        assert!(page_text(&doc, 4).contains("B 1"));

        assert!(matches!(
            PdfEditor::merge_all(&[a, b"junk".to_vec()]),
            Err(EditorError::Parse(_))
        ));
    }

    #[test]
    fn add_text_embeds_font_and_draws_glyphs() {
        let mut editor = loaded(1, "Page");
        editor
            .add_text(0, "Hello", 10.0, 20.0, TextStyle::default())
            .unwrap();
        editor
            .add_text(0, "Again", 10.0, 60.0, TextStyle::default())
            .unwrap();

        let doc = reparse(&mut editor);
        let content = page_text(&doc, 1);
        assert!(content.contains("Page 1"));
        assert!(content.contains("Hello"));
        assert!(content.contains("Again"));

        assert_eq!(font_names(&doc, 1), vec!["F1", "F2", "F3"]);
    }

    #[test]
    fn add_text_validates_page_and_encoding() {
        let mut editor = loaded(1, "Page");
        assert!(matches!(
            editor.add_text(1, "x", 0.0, 0.0, TextStyle::default()),
            Err(EditorError::PageOutOfBounds { index: 1, count: 1 })
        ));
        assert!(matches!(
            editor.add_text(0, "日本", 0.0, 0.0, TextStyle::default()),
            Err(EditorError::UnencodableText('日'))
        ));
        editor
            .add_text(0, "Olá – €5", 0.0, 0.0, TextStyle::default())
            .unwrap();
    }

    #[test]
    fn validate_text_matches_what_add_text_accepts() {
        assert!(PdfEditor::validate_text("Grüße – 5 €\nsecond line").is_ok());
        assert!(matches!(
            PdfEditor::validate_text("ok\n日本"),
            Err(EditorError::UnencodableText('日'))
        ));
    }

    #[test]
    fn screen_y_is_flipped_into_page_space() {
        assert_eq!(to_pdf_y(792.0, 20.0, 12.0), 760.0);
        assert_eq!(to_pdf_y(100.0, 0.0, 10.0), 90.0);
    }

    #[test]
    fn duplicated_page_resources_are_not_shared_after_edit() {
        let mut editor = loaded(1, "Page");
        editor.duplicate_page(0).unwrap();
        editor
            .add_text(1, "Only here", 0.0, 0.0, TextStyle::default())
            .unwrap();

        let doc = reparse(&mut editor);
        assert_eq!(font_names(&doc, 1), vec!["F1"]);
        assert_eq!(font_names(&doc, 2), vec!["F1", "F2"]);
        assert!(!page_text(&doc, 1).contains("Only here"));
    }

    #[test]
    fn add_image_embeds_png_with_soft_mask() {
        let mut editor = loaded(1, "Page");
        editor
            .add_image(0, &png_bytes(128), 5.0, 5.0, 100.0, 100.0, ImageKind::Png)
            .unwrap();
        editor
            .add_image(0, &jpg_bytes(), 5.0, 5.0, 40.0, 30.0, ImageKind::Jpg)
            .unwrap();

        let doc = reparse(&mut editor);
        let content = page_text(&doc, 1);
        assert!(content.contains("/Im1 Do"));
        assert!(content.contains("/Im2 Do"));

        let images = doc
            .objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .filter(|stream| {
                matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
            })
            .count();
        // png, its soft mask, jpg
        assert_eq!(images, 3);
    }

    #[test]
    fn add_image_rejects_mismatched_data() {
        let mut editor = loaded(1, "Page");
        assert!(matches!(
            editor.add_image(0, b"nope", 0.0, 0.0, 1.0, 1.0, ImageKind::Png),
            Err(EditorError::UnsupportedImageFormat(_))
        ));
        assert!(matches!(
            editor.add_image(0, &png_bytes(255), 0.0, 0.0, 1.0, 1.0, ImageKind::Jpg),
            Err(EditorError::UnsupportedImageFormat(_))
        ));
        assert!(matches!(
            "gif".parse::<ImageKind>(),
            Err(EditorError::UnsupportedImageFormat(_))
        ));
        assert_eq!(ImageKind::from_mime("image/png"), ImageKind::Png);
        assert_eq!(ImageKind::from_mime("image/jpeg"), ImageKind::Jpg);
    }

    #[test]
    fn erase_paints_fixed_white_rectangle() {
        let mut editor = loaded(1, "Page");
        editor.erase_text_region(0, 50.0, 100.0).unwrap();
        let doc = reparse(&mut editor);
        assert!(page_text(&doc, 1).contains("Page 1"));

        let ops = operations(&doc, 1);
        let fill = ops.iter().rev().find(|op| op.operator == "rg").unwrap();
        let white = fill
            .operands
            .iter()
            .map(|value| value.as_float().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(white, vec![1.0, 1.0, 1.0]);
        let rect = ops.iter().find(|op| op.operator == "re").unwrap();
        let rect = rect
            .operands
            .iter()
            .map(|value| value.as_float().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(rect, vec![45.0, 95.0, 200.0, 20.0]);

        assert!(matches!(
            editor.erase_text_region(3, 0.0, 0.0),
            Err(EditorError::PageOutOfBounds { .. })
        ));
    }

    #[test]
    fn existing_content_is_isolated_once() {
        let mut editor = loaded(1, "Page");
        editor.erase_text_region(0, 0.0, 0.0).unwrap();
        editor.erase_text_region(0, 0.0, 0.0).unwrap();
        let doc = reparse(&mut editor);
        let page_id = *doc.get_pages().get(&1).unwrap();
        let contents = doc
            .get_object(page_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap()
            .len();
        // q, original, Q, two overlays
        assert_eq!(contents, 5);
    }

    #[test]
    fn clear_discards_document() {
        let mut editor = loaded(2, "Page");
        editor.clear();
        assert_eq!(editor.page_count(), 0);
        assert!(matches!(
            editor.serialize(),
            Err(EditorError::NoDocumentLoaded)
        ));
    }

    #[test]
    fn color_hex() {
        assert_eq!(Color::BLACK.to_hex(), "#000000");
        assert_eq!(Color::from([1.0, 0.5, 0.0]).to_hex(), "#ff8000");
        assert_eq!(Color::from_hex("#ffffff"), Some(Color::WHITE));
        assert_eq!(Color::from_hex("#000000"), Some(Color::BLACK));
        assert_eq!(Color::from_hex("red"), None);
        assert_eq!(Color::from_hex("#12345"), None);
    }
}
