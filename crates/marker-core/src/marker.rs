//! Marker records the host rebuilds every frame, and the closed vocabularies
//! (glyph, interaction state, priority kind) they carry.

use crate::error::{Error, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Glyph drawn for a marker. Codes must match `markers.wgsl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum MarkerStyle {
    #[default]
    Cross,
    Circle,
    XMarker,
    Plus,
    Square,
    Diamond,
}

impl MarkerStyle {
    pub const ALL: [MarkerStyle; 6] = [
        MarkerStyle::Cross,
        MarkerStyle::Circle,
        MarkerStyle::XMarker,
        MarkerStyle::Plus,
        MarkerStyle::Square,
        MarkerStyle::Diamond,
    ];

    /// Numeric code written into the style attribute buffer.
    #[inline]
    pub fn code(self) -> f32 {
        match self {
            MarkerStyle::Cross => 0.0,
            MarkerStyle::Circle => 1.0,
            MarkerStyle::XMarker => 2.0,
            MarkerStyle::Plus => 3.0,
            MarkerStyle::Square => 4.0,
            MarkerStyle::Diamond => 5.0,
        }
    }

    /// Coarser glyph used at distant LOD tiers.
    #[inline]
    pub fn simplified(self) -> Self {
        match self {
            MarkerStyle::Diamond | MarkerStyle::Square => MarkerStyle::Circle,
            MarkerStyle::XMarker | MarkerStyle::Plus => MarkerStyle::Cross,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerStyle::Cross => "cross",
            MarkerStyle::Circle => "circle",
            MarkerStyle::XMarker => "x-marker",
            MarkerStyle::Plus => "plus",
            MarkerStyle::Square => "square",
            MarkerStyle::Diamond => "diamond",
        }
    }
}

impl From<&str> for MarkerStyle {
    /// Unknown names fall back to `Cross`.
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "circle" => MarkerStyle::Circle,
            "x" | "x-marker" | "xmarker" => MarkerStyle::XMarker,
            "plus" => MarkerStyle::Plus,
            "square" => MarkerStyle::Square,
            "diamond" => MarkerStyle::Diamond,
            _ => MarkerStyle::Cross,
        }
    }
}

impl From<String> for MarkerStyle {
    fn from(name: String) -> Self {
        MarkerStyle::from(name.as_str())
    }
}

/// Interaction state, set by the host from pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum MarkerState {
    #[default]
    Normal,
    Hovered,
    Selected,
    Dragging,
}

impl MarkerState {
    #[inline]
    pub fn code(self) -> f32 {
        match self {
            MarkerState::Normal => 0.0,
            MarkerState::Hovered => 1.0,
            MarkerState::Selected => 2.0,
            MarkerState::Dragging => 3.0,
        }
    }
}

impl From<&str> for MarkerState {
    /// Unknown names fall back to `Normal`.
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "hovered" | "hover" => MarkerState::Hovered,
            "selected" => MarkerState::Selected,
            "dragging" => MarkerState::Dragging,
            _ => MarkerState::Normal,
        }
    }
}

impl From<String> for MarkerState {
    fn from(name: String) -> Self {
        MarkerState::from(name.as_str())
    }
}

/// Semantic tag the optimizer uses for culling priority. Independent of
/// [`MarkerState`]: the host decides which corner counts as "control".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum MarkerKind {
    Selected,
    Hovered,
    Control,
    Corner,
    #[default]
    Normal,
}

impl MarkerKind {
    /// Weight applied to render priority.
    #[inline]
    pub fn priority_weight(self) -> f32 {
        match self {
            MarkerKind::Selected => 1.0,
            MarkerKind::Hovered => 0.9,
            MarkerKind::Control => 0.8,
            MarkerKind::Corner => 0.7,
            MarkerKind::Normal => 0.5,
        }
    }
}

impl From<&str> for MarkerKind {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "selected" => MarkerKind::Selected,
            "hovered" => MarkerKind::Hovered,
            "control" => MarkerKind::Control,
            "corner" => MarkerKind::Corner,
            _ => MarkerKind::Normal,
        }
    }
}

impl From<String> for MarkerKind {
    fn from(name: String) -> Self {
        MarkerKind::from(name.as_str())
    }
}

/// Linear RGB in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([1.0, 1.0, 1.0]);

    #[inline]
    pub fn from_hex(hex: u32) -> Self {
        Rgb([
            ((hex >> 16) & 0xff) as f32 / 255.0,
            ((hex >> 8) & 0xff) as f32 / 255.0,
            (hex & 0xff) as f32 / 255.0,
        ])
    }

    /// Parses `#rgb`, `#rrggbb`, `0xrrggbb` and a handful of CSS names.
    pub fn parse(s: &str) -> Result<Self> {
        let t = s.trim().to_ascii_lowercase();
        let named = match t.as_str() {
            "white" => Some(0xffffff),
            "black" => Some(0x000000),
            "red" => Some(0xff0000),
            "green" => Some(0x00ff00),
            "blue" => Some(0x0000ff),
            "yellow" => Some(0xffff00),
            "orange" => Some(0xffa500),
            "cyan" => Some(0x00ffff),
            "magenta" => Some(0xff00ff),
            "gray" | "grey" => Some(0x808080),
            _ => None,
        };
        if let Some(hex) = named {
            return Ok(Rgb::from_hex(hex));
        }

        let digits = t
            .strip_prefix('#')
            .or_else(|| t.strip_prefix("0x"))
            .ok_or_else(|| Error::InvalidColor(s.to_string()))?;

        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return Err(Error::InvalidColor(s.to_string())),
        };

        u32::from_str_radix(&expanded, 16)
            .map(Rgb::from_hex)
            .map_err(|_| Error::InvalidColor(s.to_string()))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::WHITE
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> String {
        let [r, g, b] = c.0.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl TryFrom<String> for Rgb {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Rgb::parse(&s)
    }
}

/// One interactive marker as handed over by the host.
///
/// `position` is optional because host state can be momentarily inconsistent
/// mid-drag; the optimizer skips such entries rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Marker {
    pub position: Option<Vec3>,
    pub color: Option<Rgb>,
    pub scale: Option<f32>,
    pub style: MarkerStyle,
    pub state: MarkerState,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn at(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_style(mut self, style: MarkerStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_state(mut self, state: MarkerState) -> Self {
        self.state = state;
        self
    }

    pub fn with_kind(mut self, kind: MarkerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Position if present and finite.
    #[inline]
    pub fn valid_position(&self) -> Option<Vec3> {
        self.position.filter(|p| p.is_finite())
    }
}

/// Fully resolved instance, ready to be encoded into the attribute buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPoint {
    pub position: Vec3,
    pub color: Rgb,
    pub scale: f32,
    pub style: MarkerStyle,
    pub state: MarkerState,
}

impl RenderPoint {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: Rgb::WHITE,
            scale: 1.0,
            style: MarkerStyle::Cross,
            state: MarkerState::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unknown_names_fall_back_to_neutral_variants() {
        assert_eq!(MarkerStyle::from("hexagon"), MarkerStyle::Cross);
        assert_eq!(MarkerState::from("wiggling"), MarkerState::Normal);
        assert_eq!(MarkerKind::from("vip"), MarkerKind::Normal);
        assert_relative_eq!(MarkerKind::from("vip").priority_weight(), 0.5);
    }

    #[test]
    fn simplified_glyphs_follow_downgrade_table() {
        assert_eq!(MarkerStyle::Diamond.simplified(), MarkerStyle::Circle);
        assert_eq!(MarkerStyle::Square.simplified(), MarkerStyle::Circle);
        assert_eq!(MarkerStyle::XMarker.simplified(), MarkerStyle::Cross);
        assert_eq!(MarkerStyle::Plus.simplified(), MarkerStyle::Cross);
        assert_eq!(MarkerStyle::Circle.simplified(), MarkerStyle::Circle);
        assert_eq!(MarkerStyle::Cross.simplified(), MarkerStyle::Cross);
    }

    #[test]
    fn style_codes_are_distinct() {
        let codes: std::collections::HashSet<u32> = MarkerStyle::ALL.iter().map(|s| s.code().to_bits()).collect();
        assert_eq!(codes.len(), MarkerStyle::ALL.len());
        assert_eq!(MarkerStyle::ALL.len(), 6);
    }

    #[test]
    fn color_serializes_as_hex_string() {
        let c = Rgb::from_hex(0x3a80ff);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"#3a80ff\"");
        assert_eq!(serde_json::from_str::<Rgb>(&json).unwrap(), c);
    }

    #[test]
    fn parses_hex_and_named_colors() {
        assert_eq!(Rgb::parse("#fff").unwrap(), Rgb::WHITE);
        let c = Rgb::parse("#ff8000").unwrap();
        assert_relative_eq!(c.0[0], 1.0);
        assert_relative_eq!(c.0[1], 128.0 / 255.0);
        assert_relative_eq!(c.0[2], 0.0);
        assert_eq!(Rgb::parse("Yellow").unwrap(), Rgb::from_hex(0xffff00));
        assert!(matches!(Rgb::parse("#12"), Err(Error::InvalidColor(_))));
        assert!(Rgb::parse("chartreuse-ish").is_err());
    }

    #[test]
    fn styles_deserialize_with_fallback() {
        let s: MarkerStyle = serde_json_like("diamond");
        assert_eq!(s, MarkerStyle::Diamond);
        let s: MarkerStyle = serde_json_like("star");
        assert_eq!(s, MarkerStyle::Cross);
    }

    fn serde_json_like(name: &str) -> MarkerStyle {
        use serde::de::value::{Error as DeError, StringDeserializer};
        use serde::de::IntoDeserializer;
        let de: StringDeserializer<DeError> = name.to_string().into_deserializer();
        MarkerStyle::deserialize(de).unwrap()
    }

    #[test]
    fn non_finite_positions_are_invalid() {
        assert!(Marker::at(Vec3::new(f32::NAN, 0.0, 0.0)).valid_position().is_none());
        assert!(Marker::default().valid_position().is_none());
        assert!(Marker::at(Vec3::ONE).valid_position().is_some());
    }
}
