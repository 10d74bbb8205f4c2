use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Environment variable naming a pdfium shared library to bind before any
/// other location is tried.
pub const PDFIUM_PATH_ENV: &str = "PDFEDIT_PDFIUM_LIBRARY_PATH";

fn library_path_hint(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

/// Converts a 1-based page number into a 0-based index.
fn page_index(page_number: usize) -> Result<usize> {
    page_number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("page numbers start at 1"))
}

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumRenderer;

#[cfg(feature = "pdf")]
mod pdfium {
    use std::convert::TryFrom;
    use std::mem;
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};
    use parking_lot::Mutex;
    use pdfedit_core::{DisplayUrl, PageRenderer, RenderRequest, RenderSource, RenderedPage};
    use pdfium_render::prelude::*;
    use tracing::{debug, instrument, warn};

    use super::{library_path_hint, page_index, PDFIUM_PATH_ENV};

    struct LoadedDocument {
        url: DisplayUrl,
        document: PdfDocument<'static>,
    }

    /// Renders pages with pdfium, keeping the most recently displayed
    /// document parsed between calls.
    pub struct PdfiumRenderer {
        // Declared before `pdfium` so the cached document is dropped first.
        loaded: Mutex<Option<LoadedDocument>>,
        pdfium: Arc<Pdfium>,
    }

    impl PdfiumRenderer {
        pub fn new() -> Result<Self> {
            let pdfium = match bind_pdfium_from_env() {
                Some(pdfium) => pdfium,
                None => bind_pdfium_default()?,
            };
            Ok(Self {
                loaded: Mutex::new(None),
                pdfium: Arc::new(pdfium),
            })
        }

        fn open_document(&self, source: &RenderSource) -> Result<PdfDocument<'static>> {
            let document = self
                .pdfium
                .load_pdf_from_byte_vec(source.bytes.to_vec(), None)
                .with_context(|| format!("failed to open {}", source.url))?;
            // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is only ever
            // stored in `self.loaded`, which is declared before `pdfium` and therefore dropped
            // before it, so the borrow never outlives the bindings.
            let document =
                unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
            Ok(document)
        }

        fn with_document<R, F>(&self, source: &RenderSource, f: F) -> Result<R>
        where
            F: FnOnce(&PdfDocument<'static>) -> Result<R>,
        {
            let mut guard = self.loaded.lock();
            let stale = guard
                .as_ref()
                .map_or(true, |loaded| loaded.url != source.url);
            if stale {
                debug!(url = %source.url, "parsing display document");
                *guard = None;
                let document = self.open_document(source)?;
                *guard = Some(LoadedDocument {
                    url: source.url.clone(),
                    document,
                });
            }
            let loaded = guard
                .as_ref()
                .ok_or_else(|| anyhow!("document must be loaded"))?;
            f(&loaded.document)
        }

        fn render_internal(
            &self,
            document: &PdfDocument<'_>,
            request: RenderRequest,
        ) -> Result<RenderedPage> {
            let index = page_index(request.page_number)?;
            let index: PdfPageIndex = index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", request.page_number))?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", request.page_number))?;

            let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_number))?;
            let pixels = bitmap.as_image().to_rgba8().into_raw();

            Ok(RenderedPage {
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                pixels,
                page_width_pt: page.width().value,
                page_height_pt: page.height().value,
            })
        }
    }

    impl PageRenderer for PdfiumRenderer {
        #[instrument(skip(self, source), fields(url = %source.url))]
        fn render_page(
            &self,
            source: &RenderSource,
            request: RenderRequest,
        ) -> Result<RenderedPage> {
            self.with_document(source, |document| {
                self.render_internal(document, request)
            })
        }
    }

    fn bind_pdfium_from_env() -> Option<Pdfium> {
        let path = library_path_hint(std::env::var(PDFIUM_PATH_ENV).ok())?;
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(
                    "failed to load Pdfium from {} ({}): {}",
                    path.display(),
                    PDFIUM_PATH_ENV,
                    err
                );
                None
            }
        }
    }

    fn bind_pdfium_default() -> Result<Pdfium> {
        let mut errors = Vec::new();

        let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

        match Pdfium::bind_to_library(&cwd_path) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(err) => {
                errors.push(format!("{}: {}", cwd_path.display(), err));
            }
        }

        match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(err) => {
                errors.push(format!("system: {err}"));
                Err(anyhow!(
                    "failed to bind to a pdfium library; set {} or install it ({})",
                    PDFIUM_PATH_ENV,
                    errors.join(", ")
                ))
            }
        }
    }
}
