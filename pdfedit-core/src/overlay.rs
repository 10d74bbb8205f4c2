use serde::{Deserialize, Serialize};

use crate::store::{AnnotationId, TextAnnotation};

/// Where an annotation is drawn over the rendered page, in zoomed pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayPlacement {
    pub id: AnnotationId,
    pub text: String,
    pub left: f32,
    pub bottom: f32,
    pub font_size: f32,
    pub color: String,
}

impl OverlayPlacement {
    pub fn new(annotation: &TextAnnotation, zoom: f32) -> Self {
        Self {
            id: annotation.id,
            text: annotation.text.clone(),
            left: annotation.x * zoom,
            bottom: annotation.y * zoom,
            font_size: annotation.font_size * zoom,
            color: annotation.color.clone(),
        }
    }

    /// Top-left pixel origin of the text box on a page `page_height` pixels tall.
    pub fn to_pixel_origin(&self, page_height: f32) -> (f32, f32) {
        (self.left, (page_height - self.bottom - self.font_size).max(0.0))
    }
}

/// Placements for the annotations that belong to `page` (0-based).
pub fn placements_for_page(
    annotations: &[TextAnnotation],
    page: usize,
    zoom: f32,
) -> Vec<OverlayPlacement> {
    annotations
        .iter()
        .filter(|annotation| annotation.page == page)
        .map(|annotation| OverlayPlacement::new(annotation, zoom))
        .collect()
}
