use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::blob::{BlobRegistry, DisplayUrl};
use crate::config::EditorConfig;
use crate::editor::{to_pdf_y, Color, ImageKind, PdfEditor, TextStyle};
use crate::error::{EditorError, EditorResult};
use crate::files::{
    edited_file_name, exported_pages_file_name, merged_file_name, validate_pdf_file,
    DownloadSink, FileId, UploadedFile, PDF_MIME,
};
use crate::overlay::{placements_for_page, OverlayPlacement};
use crate::render::{PageRenderer, RenderRequest, RenderSource, RenderedPage};

pub type AnnotationId = Uuid;

/// Text the user placed on a page, kept so it can be edited or removed later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub text: String,
    pub x: f32,
    pub y: f32,
    /// 0-based.
    pub page: usize,
    pub font_size: f32,
    /// `#rrggbb`.
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: FileId,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

impl From<&UploadedFile> for FileSummary {
    fn from(file: &UploadedFile) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            mime: file.mime.clone(),
            size: file.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub pdf_file: Option<FileSummary>,
    pub display_url: Option<DisplayUrl>,
    /// 1-based.
    pub current_page: usize,
    pub total_pages: usize,
    pub zoom: f32,
    pub is_loading: bool,
    pub error: Option<String>,
    pub selected_tool: Option<String>,
    pub editing_text_id: Option<AnnotationId>,
}

impl DisplayState {
    fn initial(config: &EditorConfig) -> Self {
        Self {
            pdf_file: None,
            display_url: None,
            current_page: 1,
            total_pages: 0,
            zoom: config.zoom.clamp(config.zoom.initial),
            is_loading: false,
            error: None,
            selected_tool: None,
            editing_text_id: None,
        }
    }
}

/// The action a failure is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Load,
    LoadFiles,
    Save,
    Export,
    Merge,
    Rotate,
    Duplicate,
    Delete,
    Reorder,
    BlankPage,
    AddText,
    AddImage,
    UpdateText,
    DeleteText,
}

impl ActionKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ActionKind::Load => "Failed to load PDF",
            ActionKind::LoadFiles => "Failed to load PDF files",
            ActionKind::Save => "Failed to save PDF",
            ActionKind::Export => "Failed to export pages",
            ActionKind::Merge => "Failed to merge PDF",
            ActionKind::Rotate => "Failed to rotate page",
            ActionKind::Duplicate => "Failed to duplicate page",
            ActionKind::Delete => "Failed to delete page",
            ActionKind::Reorder => "Failed to reorder pages",
            ActionKind::BlankPage => "Failed to add blank page",
            ActionKind::AddText => "Failed to add text",
            ActionKind::AddImage => "Failed to add image",
            ActionKind::UpdateText => "Failed to update text",
            ActionKind::DeleteText => "Failed to delete text",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// State changes that never touch the document.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    GoToPage { page: usize },
    NextPage,
    PrevPage,
    ZoomIn,
    ZoomOut,
    SetZoom { zoom: f32 },
    SelectTool { tool: Option<String> },
    StartEditingText { id: AnnotationId },
    FinishEditingText,
    ClearError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EditorEvent {
    DocumentLoaded { name: String, total_pages: usize },
    DocumentChanged { action: ActionKind, total_pages: usize },
    DisplayUrlRevoked { url: DisplayUrl },
    PageChanged { page: usize },
    ZoomChanged { zoom: f32 },
    Downloaded { filename: String, size: usize },
    Failed { action: ActionKind, message: String },
}

/// Owns the document façade and keeps the display state in step with it.
pub struct EditorStore {
    editor: PdfEditor,
    blobs: Arc<dyn BlobRegistry>,
    downloads: Arc<dyn DownloadSink>,
    config: EditorConfig,
    state: DisplayState,
    annotations: Vec<TextAnnotation>,
    events: Arc<Mutex<Vec<EditorEvent>>>,
}

impl EditorStore {
    pub fn new(
        editor: PdfEditor,
        blobs: Arc<dyn BlobRegistry>,
        downloads: Arc<dyn DownloadSink>,
        config: EditorConfig,
    ) -> Self {
        Self {
            editor,
            blobs,
            downloads,
            state: DisplayState::initial(&config),
            config,
            annotations: Vec::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn annotations(&self) -> &[TextAnnotation] {
        &self.annotations
    }

    pub fn editor(&self) -> &PdfEditor {
        &self.editor
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<Mutex<Vec<EditorEvent>>> {
        Arc::clone(&self.events)
    }

    fn emit(&self, event: EditorEvent) {
        self.events.lock().push(event);
    }

    fn begin(&mut self) {
        self.state.is_loading = true;
    }

    fn fail(&mut self, action: ActionKind, err: impl fmt::Display) {
        let message = format!("{}: {}", action.prefix(), err);
        warn!(?action, error = %err, "action failed");
        self.state.error = Some(message.clone());
        self.state.is_loading = false;
        self.emit(EditorEvent::Failed { action, message });
    }

    /// Swaps in a new display URL and revokes the one it replaces.
    fn replace_display_url(&mut self, bytes: Bytes) {
        let url = self.blobs.create(bytes, PDF_MIME);
        if let Some(previous) = self.state.display_url.replace(url) {
            self.blobs.revoke(&previous);
            self.emit(EditorEvent::DisplayUrlRevoked { url: previous });
        }
    }

    fn set_current_page(&mut self, page: usize) {
        let upper = self.state.total_pages.max(1);
        let page = page.clamp(1, upper);
        if page != self.state.current_page {
            self.state.current_page = page;
            self.emit(EditorEvent::PageChanged { page });
        }
    }

    fn set_zoom(&mut self, zoom: f32) {
        let zoom = self.config.zoom.clamp(zoom);
        if (zoom - self.state.zoom).abs() > f32::EPSILON {
            self.state.zoom = zoom;
            self.emit(EditorEvent::ZoomChanged { zoom });
        }
    }

    /// Re-serializes the document and republishes the derived display state.
    fn publish(&mut self, action: ActionKind) -> EditorResult<()> {
        let bytes = Bytes::from(self.editor.serialize()?);
        self.replace_display_url(bytes);
        self.state.total_pages = self.editor.page_count();
        let current = self.state.current_page;
        self.set_current_page(current);
        self.state.is_loading = false;
        debug!(?action, total_pages = self.state.total_pages, "document changed");
        self.emit(EditorEvent::DocumentChanged {
            action,
            total_pages: self.state.total_pages,
        });
        Ok(())
    }

    /// Runs one structural mutation followed by a republish. Returns whether
    /// both succeeded; a failure is recorded in `error`.
    fn transition<F>(&mut self, action: ActionKind, mutate: F) -> bool
    where
        F: FnOnce(&mut PdfEditor) -> EditorResult<()>,
    {
        self.begin();
        let result = mutate(&mut self.editor).and_then(|_| self.publish(action));
        match result {
            Ok(()) => true,
            Err(err) => {
                self.fail(action, err);
                false
            }
        }
    }

    #[instrument(skip(self, file), fields(name = %file.name, size = file.size))]
    pub async fn load_pdf(&mut self, file: UploadedFile) {
        self.begin();
        self.state.error = None;
        let result = match self.validate_upload(&file) {
            Ok(()) => self.load_upload(file).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            self.fail(ActionKind::Load, err);
        }
    }

    fn validate_upload(&self, file: &UploadedFile) -> EditorResult<()> {
        let validation = validate_pdf_file(file, self.config.max_upload_bytes);
        if validation.is_valid {
            Ok(())
        } else {
            Err(EditorError::InvalidUpload(
                validation.error.unwrap_or_default(),
            ))
        }
    }

    /// Replaces the document with an already validated upload.
    async fn load_upload(&mut self, file: UploadedFile) -> EditorResult<()> {
        let bytes = file.read_bytes().await?;
        self.editor.load(&bytes)?;

        self.replace_display_url(bytes);
        self.annotations.clear();
        self.state.editing_text_id = None;
        self.state.total_pages = self.editor.page_count();
        self.state.current_page = 1;
        self.state.pdf_file = Some(FileSummary::from(&file));
        self.state.is_loading = false;
        debug!(total_pages = self.state.total_pages, "document loaded");
        self.emit(EditorEvent::DocumentLoaded {
            name: file.name,
            total_pages: self.state.total_pages,
        });
        Ok(())
    }

    /// Loads one file as is, or merges several into a synthetic file first.
    /// Each input is validated on its own; the merged result is not held to
    /// the upload limit.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn load_multiple_pdfs(&mut self, mut files: Vec<UploadedFile>) {
        match files.len() {
            0 => {}
            1 => {
                if let Some(file) = files.pop() {
                    self.load_pdf(file).await;
                }
            }
            count => {
                self.begin();
                self.state.error = None;
                let validated = files.iter().try_for_each(|file| {
                    self.validate_upload(file)
                        .map_err(|err| anyhow!("{}: {}", file.name, err))
                });
                if let Err(err) = validated {
                    self.fail(ActionKind::LoadFiles, err);
                    return;
                }
                let merged = match Self::merge_uploads(&files).await {
                    Ok(merged) => merged,
                    Err(err) => {
                        self.fail(ActionKind::LoadFiles, err);
                        return;
                    }
                };
                let file =
                    UploadedFile::from_bytes(merged_file_name(count), PDF_MIME, Bytes::from(merged));
                if let Err(err) = self.load_upload(file).await {
                    self.fail(ActionKind::Load, err);
                }
            }
        }
    }

    async fn merge_uploads(files: &[UploadedFile]) -> EditorResult<Vec<u8>> {
        let mut buffers = Vec::with_capacity(files.len());
        for file in files {
            let bytes = file
                .read_bytes()
                .await
                .with_context(|| format!("failed to read {}", file.name))?;
            buffers.push(bytes);
        }
        PdfEditor::merge_all(&buffers)
    }

    fn current_name(&self) -> Option<&str> {
        self.state.pdf_file.as_ref().map(|file| file.name.as_str())
    }

    fn download(&self, bytes: &[u8], filename: &str) -> EditorResult<()> {
        self.downloads.download(bytes, filename, PDF_MIME)?;
        self.emit(EditorEvent::Downloaded {
            filename: filename.to_string(),
            size: bytes.len(),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn save_pdf(&mut self) {
        self.begin();
        let result = self.editor.serialize().and_then(|bytes| {
            let filename = edited_file_name(self.current_name(), &self.config.naming);
            self.download(&bytes, &filename)
        });
        match result {
            Ok(()) => self.state.is_loading = false,
            Err(err) => self.fail(ActionKind::Save, err),
        }
    }

    /// Downloads a new document with the given 0-based pages, in order.
    #[instrument(skip(self))]
    pub fn export_pages(&mut self, indices: &[usize]) {
        self.begin();
        let result = self.editor.extract_pages(indices).and_then(|bytes| {
            let filename =
                exported_pages_file_name(self.current_name(), indices, &self.config.naming);
            self.download(&bytes, &filename)
        });
        match result {
            Ok(()) => self.state.is_loading = false,
            Err(err) => self.fail(ActionKind::Export, err),
        }
    }

    #[instrument(skip(self, file), fields(name = %file.name))]
    pub async fn merge_pdf(&mut self, file: UploadedFile) {
        self.begin();
        let validation = validate_pdf_file(&file, self.config.max_upload_bytes);
        if let Some(message) = validation.error {
            self.fail(ActionKind::Merge, message);
            return;
        }
        match file.read_bytes().await {
            Ok(bytes) => {
                self.transition(ActionKind::Merge, |editor| editor.merge_from(&bytes));
            }
            Err(err) => self.fail(ActionKind::Merge, format!("{err:#}")),
        }
    }

    /// `page_index` is 0-based.
    pub fn rotate_page(&mut self, page_index: usize, degrees: i32) {
        self.transition(ActionKind::Rotate, |editor| {
            editor.rotate_page(page_index, degrees)
        });
    }

    pub fn duplicate_page(&mut self, page_index: usize) {
        self.transition(ActionKind::Duplicate, |editor| {
            editor.duplicate_page(page_index)
        });
    }

    pub fn delete_page(&mut self, page_index: usize) {
        self.transition(ActionKind::Delete, |editor| editor.delete_page(page_index));
    }

    /// `new_order[n]` is the 0-based index of the page that ends up at position `n`.
    pub fn reorder_pages(&mut self, new_order: &[usize]) {
        if self.transition(ActionKind::Reorder, |editor| {
            editor.reorder_pages(new_order)
        }) {
            self.set_current_page(1);
        }
    }

    pub fn add_blank_page(&mut self) {
        if !self.editor.is_loaded() || self.editor.page_count() == 0 {
            self.fail(ActionKind::BlankPage, EditorError::NoDocumentLoaded);
            return;
        }
        self.state.error = None;
        let added = self.transition(ActionKind::BlankPage, |editor| {
            if editor.add_blank_page() {
                Ok(())
            } else {
                Err(EditorError::Unknown(anyhow!("page could not be appended")))
            }
        });
        if added {
            let last = self.state.total_pages;
            self.set_current_page(last);
        }
    }

    /// Draws text on the current page and records it as an annotation.
    #[instrument(skip(self, text))]
    pub fn add_text(&mut self, text: &str, x: f32, y: f32) {
        let page = self.state.current_page - 1;
        let style = TextStyle {
            font_size: self.config.text.font_size,
            color: Color::from(self.config.text.color),
        };
        if self.transition(ActionKind::AddText, |editor| {
            editor.add_text(page, text, x, y, style)
        }) {
            self.annotations.push(TextAnnotation {
                id: Uuid::new_v4(),
                text: text.to_string(),
                x,
                y,
                page,
                font_size: style.font_size,
                color: style.color.to_hex(),
            });
        }
    }

    #[instrument(skip(self, file), fields(name = %file.name))]
    pub async fn add_image(&mut self, file: UploadedFile, x: f32, y: f32) {
        self.begin();
        let bytes = match file.read_bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.fail(ActionKind::AddImage, format!("{err:#}"));
                return;
            }
        };
        let page = self.state.current_page - 1;
        let kind = ImageKind::from_mime(&file.mime);
        let (width, height) = (self.config.image.width, self.config.image.height);
        self.transition(ActionKind::AddImage, |editor| {
            editor.add_image(page, &bytes, x, y, width, height, kind)
        });
    }

    fn find_annotation(&self, id: AnnotationId) -> EditorResult<TextAnnotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.id == id)
            .cloned()
            .ok_or_else(|| EditorError::AnnotationNotFound(id.to_string()))
    }

    /// Covers an annotation's glyphs with the erase rectangle.
    fn erase_annotation(editor: &mut PdfEditor, annotation: &TextAnnotation) -> EditorResult<()> {
        let (_, page_height) = editor.page_size(annotation.page)?;
        let y = to_pdf_y(page_height, annotation.y, annotation.font_size);
        editor.erase_text_region(annotation.page, annotation.x, y)
    }

    /// Erases the annotation's text and draws `text` in its place.
    #[instrument(skip(self, text))]
    pub fn update_text(&mut self, id: AnnotationId, text: &str) {
        let annotation = match self.find_annotation(id) {
            Ok(annotation) => annotation,
            Err(err) => {
                self.fail(ActionKind::UpdateText, err);
                return;
            }
        };
        let style = TextStyle {
            font_size: annotation.font_size,
            color: Color::from_hex(&annotation.color).unwrap_or(Color::BLACK),
        };
        let updated = self.transition(ActionKind::UpdateText, |editor| {
            PdfEditor::validate_text(text)?;
            Self::erase_annotation(editor, &annotation)?;
            editor.add_text(annotation.page, text, annotation.x, annotation.y, style)
        });
        if updated {
            if let Some(record) = self.annotations.iter_mut().find(|a| a.id == id) {
                record.text = text.to_string();
            }
            self.state.editing_text_id = None;
        }
    }

    #[instrument(skip(self))]
    pub fn delete_text(&mut self, id: AnnotationId) {
        let annotation = match self.find_annotation(id) {
            Ok(annotation) => annotation,
            Err(err) => {
                self.fail(ActionKind::DeleteText, err);
                return;
            }
        };
        let deleted = self.transition(ActionKind::DeleteText, |editor| {
            Self::erase_annotation(editor, &annotation)
        });
        if deleted {
            self.annotations.retain(|a| a.id != id);
            if self.state.editing_text_id == Some(id) {
                self.state.editing_text_id = None;
            }
        }
    }

    /// Drops the document and returns every piece of state to its initial value.
    pub fn reset(&mut self) {
        if let Some(url) = self.state.display_url.take() {
            self.blobs.revoke(&url);
            self.emit(EditorEvent::DisplayUrlRevoked { url });
        }
        self.editor.clear();
        self.annotations.clear();
        self.state = DisplayState::initial(&self.config);
        debug!("editor reset");
    }

    pub fn apply(&mut self, command: EditorCommand) {
        match command {
            EditorCommand::GoToPage { page } => self.set_current_page(page),
            EditorCommand::NextPage => {
                let next = self.state.current_page + 1;
                self.set_current_page(next);
            }
            EditorCommand::PrevPage => {
                let prev = self.state.current_page.saturating_sub(1);
                self.set_current_page(prev);
            }
            EditorCommand::ZoomIn => {
                let zoom = self.state.zoom + self.config.zoom.step;
                self.set_zoom(zoom);
            }
            EditorCommand::ZoomOut => {
                let zoom = self.state.zoom - self.config.zoom.step;
                self.set_zoom(zoom);
            }
            EditorCommand::SetZoom { zoom } => self.set_zoom(zoom),
            EditorCommand::SelectTool { tool } => self.state.selected_tool = tool,
            EditorCommand::StartEditingText { id } => self.state.editing_text_id = Some(id),
            EditorCommand::FinishEditingText => self.state.editing_text_id = None,
            EditorCommand::ClearError => self.state.error = None,
        }
    }

    /// Renders the current page at the current zoom from the display URL.
    pub fn render_current_page(&self, renderer: &dyn PageRenderer) -> anyhow::Result<RenderedPage> {
        let url = self
            .state
            .display_url
            .clone()
            .ok_or_else(|| anyhow!("no document is displayed"))?;
        let blob = self
            .blobs
            .resolve(&url)
            .ok_or_else(|| anyhow!("display URL {url} has been revoked"))?;
        let request = RenderRequest {
            page_number: self.state.current_page,
            scale: self.state.zoom,
        };
        renderer.render_page(
            &RenderSource {
                url,
                bytes: blob.bytes,
            },
            request,
        )
    }

    pub fn overlay_for_current_page(&self) -> Vec<OverlayPlacement> {
        placements_for_page(
            &self.annotations,
            self.state.current_page - 1,
            self.state.zoom,
        )
    }
}
