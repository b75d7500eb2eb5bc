//! Quality policy - maps user intent and document size to render settings

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Page counts at which the render scale gets capped, largest first
pub const PAGE_COUNT_CAPS: [(usize, f32); 3] = [(80, 0.7), (40, 0.85), (20, 1.0)];

/// Scale ceiling applied when fast mode is on
pub const FAST_MODE_SCALE_CAP: f32 = 0.85;

/// User-selected compression level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CompressionLevel {
    /// Light compression, best fidelity
    Low,
    #[default]
    Medium,
    High,
    /// Smallest output, visibly degraded
    Extreme,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 4] = [
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
        CompressionLevel::Extreme,
    ];

    /// Parse a level name, falling back to `Medium` for anything unknown
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
            CompressionLevel::Extreme => "extreme",
        }
    }

    /// Render settings before any page-count or fast-mode caps
    #[must_use]
    pub const fn base_settings(self) -> RenderSettings {
        match self {
            CompressionLevel::Low => RenderSettings::new(1.5, 0.85),
            CompressionLevel::Medium => RenderSettings::new(1.2, 0.70),
            CompressionLevel::High => RenderSettings::new(1.0, 0.50),
            CompressionLevel::Extreme => RenderSettings::new(0.8, 0.30),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown compression level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for CompressionLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            "extreme" => Ok(CompressionLevel::Extreme),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

impl From<String> for CompressionLevel {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

/// Concrete render scale and JPEG quality for one request
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Multiplier applied to page dimensions in points
    pub scale: f32,
    /// Encode quality in (0, 1]
    pub quality: f32,
}

impl RenderSettings {
    #[must_use]
    pub const fn new(scale: f32, quality: f32) -> Self {
        Self { scale, quality }
    }

    /// Quality on the 1..=100 scale JPEG encoders expect
    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    fn cap_scale(self, ceiling: f32) -> Self {
        Self {
            scale: self.scale.min(ceiling),
            ..self
        }
    }
}

/// Resolve render settings for a request.
///
/// Large documents and fast mode only ever lower the scale; quality always
/// comes straight from the level's base table.
#[must_use]
pub fn decide(level: CompressionLevel, page_count: usize, fast_mode: bool) -> RenderSettings {
    let mut settings = level.base_settings();

    if let Some(&(_, ceiling)) = PAGE_COUNT_CAPS
        .iter()
        .find(|(threshold, _)| page_count >= *threshold)
    {
        settings = settings.cap_scale(ceiling);
    }

    if fast_mode {
        settings = settings.cap_scale(FAST_MODE_SCALE_CAP);
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_table_matches_levels() {
        assert_eq!(decide(CompressionLevel::Low, 1, false), RenderSettings::new(1.5, 0.85));
        assert_eq!(decide(CompressionLevel::Medium, 1, false), RenderSettings::new(1.2, 0.70));
        assert_eq!(decide(CompressionLevel::High, 1, false), RenderSettings::new(1.0, 0.50));
        assert_eq!(decide(CompressionLevel::Extreme, 1, false), RenderSettings::new(0.8, 0.30));
    }

    #[test]
    fn page_count_caps_scale() {
        assert_eq!(decide(CompressionLevel::Low, 19, false).scale, 1.5);
        assert_eq!(decide(CompressionLevel::Low, 20, false).scale, 1.0);
        assert_eq!(decide(CompressionLevel::Low, 40, false).scale, 0.85);
        assert_eq!(decide(CompressionLevel::Low, 79, false).scale, 0.85);
        assert_eq!(decide(CompressionLevel::Low, 80, false).scale, 0.7);
        assert_eq!(decide(CompressionLevel::Low, 500, false).scale, 0.7);
    }

    #[test]
    fn caps_never_raise_scale() {
        // Extreme's base 0.8 is already below the 40-page cap
        assert_eq!(decide(CompressionLevel::Extreme, 45, false).scale, 0.8);
        assert_eq!(decide(CompressionLevel::Extreme, 90, false).scale, 0.7);
    }

    #[test]
    fn fast_mode_caps_scale_only() {
        let settings = decide(CompressionLevel::Medium, 3, true);
        assert_eq!(settings.scale, 0.85);
        assert_eq!(settings.quality, 0.70);

        let settings = decide(CompressionLevel::High, 100, true);
        assert_eq!(settings.scale, 0.7);
        assert_eq!(settings.quality, 0.50);
    }

    #[test]
    fn fifty_page_extreme_fast_mode() {
        // min(0.8 base, 0.85 for >= 40 pages, 0.85 fast mode)
        let settings = decide(CompressionLevel::Extreme, 50, true);
        assert_eq!(settings.scale, 0.8);
        assert_eq!(settings.quality, 0.30);
    }

    #[test]
    fn scale_never_exceeds_base_and_never_grows_with_pages() {
        for level in CompressionLevel::ALL {
            for fast in [false, true] {
                let mut previous = f32::INFINITY;
                for pages in 0..200 {
                    let settings = decide(level, pages, fast);
                    assert!(settings.scale <= level.base_settings().scale);
                    assert!(settings.scale <= previous, "{level} {pages} {fast}");
                    assert_eq!(settings.quality, level.base_settings().quality);
                    previous = settings.scale;
                }
            }
        }
    }

    #[test]
    fn unknown_level_falls_back_to_medium() {
        assert_eq!(CompressionLevel::parse_lenient("ultra"), CompressionLevel::Medium);
        assert_eq!(CompressionLevel::parse_lenient(""), CompressionLevel::Medium);
        assert_eq!(CompressionLevel::parse_lenient(" HIGH "), CompressionLevel::High);
        assert!("ultra".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&CompressionLevel::Extreme).unwrap();
        assert_eq!(json, "\"extreme\"");

        let level: CompressionLevel = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(level, CompressionLevel::Low);

        let level: CompressionLevel = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(level, CompressionLevel::Medium);
    }

    #[test]
    fn jpeg_quality_maps_to_percent() {
        assert_eq!(RenderSettings::new(1.0, 0.85).jpeg_quality(), 85);
        assert_eq!(RenderSettings::new(1.0, 0.70).jpeg_quality(), 70);
        assert_eq!(RenderSettings::new(1.0, 0.30).jpeg_quality(), 30);
        assert_eq!(RenderSettings::new(1.0, 0.0).jpeg_quality(), 1);
        assert_eq!(RenderSettings::new(1.0, 1.5).jpeg_quality(), 100);
    }
}
