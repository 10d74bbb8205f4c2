use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// A4 in points.
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (595.28, 841.89);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub max_upload_bytes: u64,
    pub zoom: ZoomConfig,
    pub text: TextConfig,
    pub image: ImageConfig,
    pub erase: EraseConfig,
    pub blank_page: PageSizeConfig,
    pub naming: NamingConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            zoom: ZoomConfig::default(),
            text: TextConfig::default(),
            image: ImageConfig::default(),
            erase: EraseConfig::default(),
            blank_page: PageSizeConfig::default(),
            naming: NamingConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Reads a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("failed to decode config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoomConfig {
    pub initial: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            min: 0.5,
            max: 2.0,
            step: 0.1,
        }
    }
}

impl ZoomConfig {
    /// Clamps into `[min, max]`, snapping to the nearest `min + k * step` so
    /// repeated steps never drift.
    pub fn clamp(&self, zoom: f32) -> f32 {
        let snapped = if self.step > 0.0 {
            let steps = ((zoom - self.min) / self.step).round();
            let on_grid = self.min + steps * self.step;
            (on_grid * 10_000.0).round() / 10_000.0
        } else {
            zoom
        };
        if snapped.is_finite() {
            snapped.max(self.min).min(self.max)
        } else {
            self.initial
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub font_size: f32,
    pub color: [f32; 3],
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
        }
    }
}

/// Size of the white rectangle painted over text that is being removed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EraseConfig {
    pub width: f32,
    pub height: f32,
    pub offset: f32,
}

impl Default for EraseConfig {
    fn default() -> Self {
        Self {
            width: 200.0,
            height: 20.0,
            offset: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PageSizeConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for PageSizeConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_PAGE_SIZE.0,
            height: DEFAULT_PAGE_SIZE.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NamingConfig {
    pub edited_suffix: String,
    pub export_infix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            edited_suffix: "_editado".to_string(),
            export_infix: "_paginas_".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = EditorConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EditorConfig::from_toml(
            r#"
            max_upload_bytes = 1024

            [zoom]
            max = 3.0

            [naming]
            edited_suffix = "_edited"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.zoom.max, 3.0);
        assert_eq!(config.zoom.min, 0.5);
        assert_eq!(config.naming.edited_suffix, "_edited");
        assert_eq!(config.naming.export_infix, "_paginas_");
        assert_eq!(config.text.font_size, 12.0);
    }

    #[test]
    fn zoom_clamp_snaps_and_bounds() {
        let zoom = ZoomConfig::default();
        assert_eq!(zoom.clamp(1.0 + 0.1 + 0.1 + 0.1), 1.3);
        assert_eq!(zoom.clamp(7.0), 2.0);
        assert_eq!(zoom.clamp(0.1), 0.5);
        assert_eq!(zoom.clamp(f32::NAN), 1.0);
    }

    #[test]
    fn zoom_clamp_follows_configured_step() {
        let fine = ZoomConfig {
            step: 0.05,
            ..ZoomConfig::default()
        };
        assert_eq!(fine.clamp(1.0 + 0.05), 1.05);
        assert_eq!(fine.clamp(1.0 + 0.05 + 0.05 + 0.05), 1.15);

        let quarter = ZoomConfig {
            step: 0.25,
            ..ZoomConfig::default()
        };
        assert_eq!(quarter.clamp(1.0 + 0.25), 1.25);
        assert_eq!(quarter.clamp(1.6), 1.5);
        assert_eq!(quarter.clamp(9.0), 2.0);
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_upload_bytes = \"lots\"").unwrap();
        let err = EditorConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
