//! Title text description and the measuring / outlining seam
//! used by layout and rasterization.

use serde::{Deserialize, Serialize};

use crate::color::{Color, ColorError};

pub mod wrap;

/// Outline color value that disables the outline stroke.
pub const NO_OUTLINE: &str = "none";

/// The user-facing parameters of one title render.
///
/// Any change to any field calls for a brand new pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpec {
    pub text: String,
    /// Fill color, as a CSS color string.
    pub color: String,
    /// Font size in CSS pixels.
    pub font_size: f32,
    #[serde(default = "default_outline_color")]
    pub outline_color: String,
    #[serde(default)]
    pub outline_width: f32,
    /// Width of the title box in CSS pixels. Lines wrap to fit it.
    pub target_width: f32,
}

fn default_outline_color() -> String {
    NO_OUTLINE.to_owned()
}

impl TextSpec {
    pub fn new(
        text: impl Into<String>,
        color: impl Into<String>,
        font_size: f32,
        target_width: f32,
    ) -> Self {
        Self {
            text: text.into(),
            color: color.into(),
            font_size,
            outline_color: default_outline_color(),
            outline_width: 0.,
            target_width,
        }
    }

    pub fn outline(mut self, color: impl Into<String>, width: f32) -> Self {
        self.outline_color = color.into();
        self.outline_width = width;
        self
    }
}

/// Stroke drawn around each glyph before it is filled.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Outline {
    pub color: Color,
    /// Stroke width in CSS pixels.
    pub width: f32,
}

impl Outline {
    /// Strokes are always joined with round joins.
    pub const MITER_LIMIT: f32 = 2.;

    /// Resolves the outline settings of a spec. Returns `None` if the
    /// outline is disabled, either through the `"none"` sentinel or a
    /// non-positive width.
    pub fn from_spec(spec: &TextSpec) -> Result<Option<Self>, ColorError> {
        let disabled = spec.outline_color.trim().eq_ignore_ascii_case(NO_OUTLINE);
        if disabled || !(spec.outline_width > 0.) {
            return Ok(None);
        }
        Ok(Some(Self {
            color: Color::parse(&spec.outline_color)?,
            width: spec.outline_width,
        }))
    }
}

/// Resolved drawing parameters for the rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawStyle {
    pub font_size: f32,
    /// Distance between consecutive line tops, in CSS pixels.
    pub line_height: f32,
    pub fill: Color,
    pub outline: Option<Outline>,
}

impl DrawStyle {
    pub fn from_spec(spec: &TextSpec, line_height_factor: f32) -> Result<Self, ColorError> {
        Ok(Self {
            font_size: spec.font_size,
            line_height: spec.font_size * line_height_factor,
            fill: Color::parse(&spec.color)?,
            outline: Outline::from_spec(spec)?,
        })
    }
}

/// Measures the advance width of a string in CSS pixels.
pub trait Measure {
    fn width(&self, text: &str) -> f32;
}

impl<F> Measure for F
where
    F: Fn(&str) -> f32,
{
    fn width(&self, text: &str) -> f32 {
        self(text)
    }
}

/// A font at a fixed size that can both measure and outline text.
pub trait TextShaper: Measure {
    /// Appends the outline of `text` to `path`.
    ///
    /// Coordinates are in CSS pixels. The pen starts at `x = 0` and the
    /// top of the em box sits at `y = 0`.
    fn append_outline(&self, text: &str, path: &mut tiny_skia::PathBuilder);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_from_json_uses_defaults() {
        let spec: TextSpec = serde_json::from_str(
            r#"{ "text": "Hi", "color": "white", "fontSize": 48, "targetWidth": 300 }"#,
        )
        .unwrap();
        assert_eq!(spec.outline_color, "none");
        assert_eq!(spec.outline_width, 0.);
        assert_eq!(Outline::from_spec(&spec).unwrap(), None);
    }

    #[test]
    fn outline_needs_color_and_width() {
        let spec = TextSpec::new("Hi", "white", 48., 300.);
        assert_eq!(Outline::from_spec(&spec.clone().outline("black", 0.)).unwrap(), None);
        assert_eq!(Outline::from_spec(&spec.clone().outline("None", 3.)).unwrap(), None);

        let outline = Outline::from_spec(&spec.clone().outline("black", 3.)).unwrap();
        assert_eq!(
            outline,
            Some(Outline {
                color: Color::BLACK,
                width: 3.
            })
        );

        assert!(Outline::from_spec(&spec.outline("blurple", 3.)).is_err());
    }

    #[test]
    fn draw_style_line_height() {
        let spec = TextSpec::new("Hi", "#102030", 40., 300.);
        let style = DrawStyle::from_spec(&spec, 1.25).unwrap();
        assert_eq!(style.line_height, 50.);
        assert_eq!(style.fill, Color::rgb(0x10, 0x20, 0x30));
    }
}
