use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Font a label renders with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontAsset {
    pub family: String,
    pub path: PathBuf,
    #[serde(default = "default_font_size")]
    pub size: f32,
}

const fn default_font_size() -> f32 {
    24.0
}

/// Material applied on top of a label's font
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialAsset {
    pub name: String,
    /// RGBA face color
    pub color: [f32; 4],
    #[serde(default)]
    pub outline_width: f32,
    #[serde(default)]
    pub outline_color: Option<[f32; 4]>,
}
