use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::NamingConfig;

pub const PDF_MIME: &str = "application/pdf";

pub type FileId = Uuid;

static FILE_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f8e7d20-51b4-5c8e-9a1d-6c0f2b94e7a3").expect("valid namespace UUID")
});

pub fn file_id_for_path(path: &Path) -> FileId {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Uuid::new_v5(&FILE_NAMESPACE, resolved.to_string_lossy().as_bytes())
}

#[derive(Debug, Clone)]
enum FileContents {
    Path(PathBuf),
    Memory(Bytes),
}

/// A user-supplied file, read lazily when it lives on disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub id: FileId,
    pub name: String,
    pub mime: String,
    pub size: u64,
    contents: FileContents,
}

impl UploadedFile {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to stat {:?}", path))?;
        if !metadata.is_file() {
            return Err(anyhow!("{:?} is not a file", path));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{:?} has no file name", path))?;
        let mime = sniff_mime(path).await?;
        Ok(Self {
            id: file_id_for_path(path),
            name,
            mime,
            size: metadata.len(),
            contents: FileContents::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime: mime.into(),
            size: bytes.len() as u64,
            contents: FileContents::Memory(bytes),
        }
    }

    pub async fn read_bytes(&self) -> Result<Bytes> {
        match &self.contents {
            FileContents::Memory(bytes) => Ok(bytes.clone()),
            FileContents::Path(path) => {
                let raw = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {:?}", path))?;
                Ok(Bytes::from(raw))
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.contents {
            FileContents::Path(path) => Some(path),
            FileContents::Memory(_) => None,
        }
    }
}

async fn sniff_mime(path: &Path) -> Result<String> {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let mime = match by_extension.as_deref() {
        Some("pdf") => PDF_MIME,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    if mime != PDF_MIME {
        return Ok(mime.to_string());
    }

    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {:?}", path))?;
    let mut magic = [0u8; 5];
    let read = file.read(&mut magic).await?;
    if read == magic.len() && &magic == b"%PDF-" {
        Ok(PDF_MIME.to_string())
    } else {
        Ok("application/octet-stream".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl FileValidation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
        }
    }
}

pub fn validate_pdf_file(file: &UploadedFile, max_bytes: u64) -> FileValidation {
    if file.mime != PDF_MIME {
        return FileValidation::rejected("only PDF files are accepted");
    }
    if file.size > max_bytes {
        return FileValidation::rejected(format!(
            "file too large (maximum {})",
            format_file_size(max_bytes)
        ));
    }
    FileValidation::ok()
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

fn stem(name: &str) -> &str {
    name.strip_suffix(".pdf").unwrap_or(name)
}

pub fn edited_file_name(original: Option<&str>, naming: &NamingConfig) -> String {
    match original {
        Some(name) => format!("{}{}.pdf", stem(name), naming.edited_suffix),
        None => format!("documento{}.pdf", naming.edited_suffix),
    }
}

pub fn exported_pages_file_name(
    original: Option<&str>,
    indices: &[usize],
    naming: &NamingConfig,
) -> String {
    let joined = indices
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join("-");
    match original {
        Some(name) => format!("{}{}{}.pdf", stem(name), naming.export_infix, joined),
        None => "paginas_exportadas.pdf".to_string(),
    }
}

pub fn merged_file_name(count: usize) -> String {
    format!("documento-unido-{count}-pdfs.pdf")
}

/// Receives "save as" requests for generated documents.
pub trait DownloadSink: Send + Sync {
    fn download(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<()>;
}

pub struct DirectoryDownloads {
    root: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create download directory at {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DownloadSink for DirectoryDownloads {
    fn download(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<()> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| anyhow!("invalid download name {:?}", filename))?;
        let path = self.root.join(name);
        let tmp = path.with_extension("part");
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp download file {:?}", tmp))?;
        file.write_all(bytes)?;
        file.flush()?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), mime, size = bytes.len(), "download written");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct MemoryDownloads {
    inner: Mutex<Vec<Download>>,
}

impl MemoryDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Download> {
        std::mem::take(&mut *self.inner.lock())
    }
}

impl DownloadSink for MemoryDownloads {
    fn download(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<()> {
        self.inner.lock().push(Download {
            filename: filename.to_string(),
            mime: mime.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
