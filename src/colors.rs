//! Section color assignment
//!
//! Known sections get a curated color. Unknown names take the next slot of a
//! small fallback palette in first-seen order and keep it for the session.

use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::attributes::normalize_key;
use crate::config::PaletteConfig;

#[derive(Error, Debug, PartialEq)]
pub enum ColorParseError {
    #[error("color '{0}' must start with '#'")]
    MissingHash(String),
    #[error("color '{0}' must have 3 or 6 hex digits")]
    BadLength(String),
    #[error("color '{0}' contains a non-hex digit")]
    BadDigit(String),
}

/// An opaque sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    /// Color with the given opacity (0.0 - 1.0) for painting
    pub fn with_opacity(self, opacity: f32) -> egui::Color32 {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        egui::Color32::from_rgba_unmultiplied(self.0, self.1, self.2, alpha)
    }

    pub fn to_color32(self) -> egui::Color32 {
        egui::Color32::from_rgb(self.0, self.1, self.2)
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    /// Parse `#rgb` or `#rrggbb`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(s.to_string()))?;

        let nibble = |c: char| {
            c.to_digit(16)
                .map(|d| d as u8)
                .ok_or_else(|| ColorParseError::BadDigit(s.to_string()))
        };

        let chars: Vec<char> = digits.chars().collect();
        match chars.len() {
            3 => {
                let r = nibble(chars[0])?;
                let g = nibble(chars[1])?;
                let b = nibble(chars[2])?;
                Ok(Rgb(r * 17, g * 17, b * 17))
            }
            6 => {
                let byte = |i: usize| -> Result<u8, ColorParseError> {
                    Ok(nibble(chars[i])? * 16 + nibble(chars[i + 1])?)
                };
                Ok(Rgb(byte(0)?, byte(2)?, byte(4)?))
            }
            _ => Err(ColorParseError::BadLength(s.to_string())),
        }
    }
}

/// Deterministic section name -> color mapping, one per map instance
#[derive(Debug, Clone)]
pub struct SectionColors {
    known: HashMap<String, Rgb>,
    fallback: Vec<Rgb>,
    neutral: Rgb,
    assigned: HashMap<String, Rgb>,
}

impl SectionColors {
    pub fn new(known: HashMap<String, Rgb>, fallback: Vec<Rgb>, neutral: Rgb) -> Self {
        let known = known
            .into_iter()
            .map(|(name, color)| (normalize_key(&name), color))
            .collect();
        Self {
            known,
            fallback,
            neutral,
            assigned: HashMap::new(),
        }
    }

    /// Build from the `palette` section of the config
    pub fn from_config(palette: &PaletteConfig) -> Result<Self, ColorParseError> {
        let known = palette
            .known
            .iter()
            .map(|(name, hex)| Ok::<_, ColorParseError>((name.clone(), hex.parse::<Rgb>()?)))
            .collect::<Result<HashMap<String, Rgb>, _>>()?;
        let fallback = palette
            .fallback
            .iter()
            .map(|hex| hex.parse::<Rgb>())
            .collect::<Result<Vec<Rgb>, _>>()?;
        Ok(Self::new(known, fallback, palette.neutral.parse()?))
    }

    /// Color for a section name; `None` or blank names get the neutral gray
    pub fn color_for(&mut self, name: Option<&str>) -> Rgb {
        let key = match name.map(normalize_key) {
            Some(key) if !key.is_empty() => key,
            _ => return self.neutral,
        };

        if let Some(color) = self.known.get(&key) {
            return *color;
        }
        if let Some(color) = self.assigned.get(&key) {
            return *color;
        }
        if self.fallback.is_empty() {
            return self.neutral;
        }

        let color = self.fallback[self.assigned.len() % self.fallback.len()];
        debug!("Assigned {} to unknown section '{}'", color.to_hex(), key);
        self.assigned.insert(key, color);
        color
    }

    pub fn neutral(&self) -> Rgb {
        self.neutral
    }
}
