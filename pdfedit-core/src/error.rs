use thiserror::Error;

/// Failures raised by [`crate::PdfEditor`] and surfaced by [`crate::EditorStore`].
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no PDF document loaded")]
    NoDocumentLoaded,

    #[error("failed to parse PDF: {0}")]
    Parse(#[source] lopdf::Error),

    #[error("page index {index} out of bounds (document has {count} pages)")]
    PageOutOfBounds { index: usize, count: usize },

    #[error("new order must contain exactly {expected} pages, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),

    #[error("cannot delete the only remaining page")]
    LastPageRemoval,

    #[error("no pages selected")]
    EmptySelection,

    #[error("character {0:?} cannot be encoded with the standard font")]
    UnencodableText(char),

    #[error("text annotation {0} not found")]
    AnnotationNotFound(String),

    #[error("{0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<lopdf::Error> for EditorError {
    fn from(err: lopdf::Error) -> Self {
        EditorError::Unknown(anyhow::Error::new(err))
    }
}

pub type EditorResult<T> = std::result::Result<T, EditorError>;
