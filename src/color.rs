use std::str::FromStr;

use palette::Srgb;

/// An sRGB color with an alpha channel.
///
/// Unpremultiplied by convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Color([u8; 4]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid CSS color")]
pub struct ColorError(String);

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(u8::MAX, u8::MAX, u8::MAX);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    /// Creates a color from its RGBA components.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Creates a color from RGB components with 100% alpha.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, u8::MAX)
    }

    pub fn red(&self) -> u8 {
        self.0[0]
    }

    pub fn green(&self) -> u8 {
        self.0[1]
    }

    pub fn blue(&self) -> u8 {
        self.0[2]
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// Gets the color as an array of values in RGBA order.
    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.red(), self.green(), self.blue(), self.alpha())
    }

    /// Parses a CSS color string.
    ///
    /// Accepts hex notation (`#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`),
    /// the `rgb()` / `rgba()` functions, CSS named colors and `transparent`.
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn parse(s: &str) -> Result<Self, ColorError> {
        let trimmed = s.trim().to_ascii_lowercase();
        let err = || ColorError(s.to_owned());

        if trimmed == "transparent" {
            return Ok(Color::TRANSPARENT);
        }
        if let Some(hex) = trimmed.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(err);
        }
        let args = function_args(&trimmed, "rgba").or_else(|| function_args(&trimmed, "rgb"));
        if let Some(args) = args {
            return parse_rgb_function(args).ok_or_else(err);
        }

        palette::named::from_str(&trimmed)
            .map(|c: Srgb<u8>| Color::rgb(c.red, c.green, c.blue))
            .ok_or_else(err)
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    match hex.len() {
        3 | 6 => {
            let c = Srgb::<u8>::from_str(hex).ok()?;
            Some(Color::rgb(c.red, c.green, c.blue))
        }
        4 => {
            let c = Srgb::<u8>::from_str(&hex[..3]).ok()?;
            let a = u8::from_str_radix(&hex[3..], 16).ok()?;
            Some(Color::rgba(c.red, c.green, c.blue, a * 17))
        }
        8 => {
            let c = Srgb::<u8>::from_str(&hex[..6]).ok()?;
            let a = u8::from_str_radix(&hex[6..], 16).ok()?;
            Some(Color::rgba(c.red, c.green, c.blue, a))
        }
        _ => None,
    }
}

fn function_args<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn parse_rgb_function(args: &str) -> Option<Color> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let channel = |s: &str| -> Option<u8> {
        let v: f32 = s.parse().ok()?;
        Some(v.round().clamp(0., 255.) as u8)
    };
    match parts.as_slice() {
        [r, g, b] => Some(Color::rgb(channel(r)?, channel(g)?, channel(b)?)),
        [r, g, b, a] => {
            let a: f32 = a.parse().ok()?;
            Some(Color::rgba(
                channel(r)?,
                channel(g)?,
                channel(b)?,
                (a.clamp(0., 1.) * 255.).round() as u8,
            ))
        }
        _ => None,
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::parse(s)
    }
}
