//! Document editing core: a page-level façade over `lopdf` and the state
//! store that keeps what the user sees consistent with it.

pub mod blob;
pub mod config;
pub mod editor;
pub mod error;
pub mod files;
pub mod overlay;
mod pages;
pub mod render;
pub mod selection;
pub mod store;

pub use blob::{BlobRegistry, DisplayUrl, MemoryBlobRegistry};
pub use config::EditorConfig;
pub use editor::{to_pdf_y, Color, ImageKind, PdfEditor, TextStyle};
pub use error::{EditorError, EditorResult};
pub use files::{
    validate_pdf_file, DirectoryDownloads, DownloadSink, FileValidation, MemoryDownloads,
    UploadedFile, PDF_MIME,
};
pub use overlay::OverlayPlacement;
pub use render::{PageRenderer, RenderRequest, RenderSource, RenderedPage};
pub use selection::{PageSelection, ReorderPlan};
pub use store::{
    ActionKind, AnnotationId, DisplayState, EditorCommand, EditorEvent, EditorStore,
    TextAnnotation,
};
