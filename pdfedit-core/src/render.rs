use anyhow::Result;
use bytes::Bytes;

use crate::blob::DisplayUrl;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 1-based, as shown to the user.
    pub page_number: usize,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_number: 1,
            scale: 1.0,
        }
    }
}

/// Serialized document handed to a renderer, tagged with the display URL it
/// was resolved from.
#[derive(Debug, Clone)]
pub struct RenderSource {
    pub url: DisplayUrl,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major.
    pub pixels: Vec<u8>,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
}

pub trait PageRenderer: Send + Sync {
    fn render_page(&self, source: &RenderSource, request: RenderRequest) -> Result<RenderedPage>;
}
