//! Software rasterization of wrapped title lines using [`tiny-skia`](https://docs.rs/tiny-skia).

use glam::{vec2, UVec2, Vec2};
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::{
    surface::device_pixels,
    text::{DrawStyle, Outline, TextShaper},
};

/// An offscreen pixel grid holding rendered title text.
///
/// Pixels are RGBA8 with color channels premultiplied by alpha.
#[derive(Clone, PartialEq)]
pub struct RasterBuffer {
    pixmap: Pixmap,
    css_size: Vec2,
}

impl RasterBuffer {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn device_size(&self) -> UVec2 {
        UVec2::new(self.width(), self.height())
    }

    /// Logical size in CSS pixels.
    pub fn css_size(&self) -> Vec2 {
        self.css_size
    }

    /// Premultiplied RGBA bytes, row by row.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Straight (unpremultiplied) RGBA bytes, row by row.
    pub fn demultiplied(&self) -> Vec<u8> {
        self.pixmap
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let c = pixel.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

impl std::fmt::Debug for RasterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBuffer")
            .field("device_size", &self.device_size())
            .field("css_size", &self.css_size)
            .finish()
    }
}

/// Draws lines of text into a [`RasterBuffer`].
pub struct Rasterizer<'a, S> {
    shaper: &'a S,
    path_builder: PathBuilder,
}

impl<'a, S> Rasterizer<'a, S>
where
    S: TextShaper,
{
    pub fn new(shaper: &'a S) -> Self {
        Self {
            shaper,
            path_builder: PathBuilder::new(),
        }
    }

    /// Renders `lines` stacked from the top, each centered in `target_width`.
    ///
    /// Returns `None` if no pixel buffer of the required size can be allocated.
    pub fn rasterize(
        &mut self,
        lines: &[String],
        style: &DrawStyle,
        target_width: f32,
        device_pixel_ratio: f32,
    ) -> Option<RasterBuffer> {
        let css_size = vec2(target_width, lines.len() as f32 * style.line_height);
        let mut pixmap = Pixmap::new(
            device_pixels(css_size.x, device_pixel_ratio),
            device_pixels(css_size.y, device_pixel_ratio),
        )?;
        pixmap.fill(tiny_skia::Color::TRANSPARENT);

        let base_transform = Transform::from_scale(device_pixel_ratio, device_pixel_ratio);

        for (i, line) in lines.iter().enumerate() {
            let Some(path) = self.line_path(line) else {
                continue;
            };
            let x = target_width / 2. - self.shaper.width(line) / 2.;
            let y = i as f32 * style.line_height;
            let transform = base_transform.pre_translate(x, y);

            if let Some(outline) = &style.outline {
                pixmap.stroke_path(
                    &path,
                    &solid_paint(outline.color.to_skia()),
                    &outline_stroke(outline),
                    transform,
                    None,
                );
            }
            pixmap.fill_path(
                &path,
                &solid_paint(style.fill.to_skia()),
                FillRule::Winding,
                transform,
                None,
            );

            // Reuse the path builder's allocated space.
            self.path_builder = path.clear();
        }

        Some(RasterBuffer { pixmap, css_size })
    }

    fn line_path(&mut self, line: &str) -> Option<tiny_skia::Path> {
        let mut builder = std::mem::take(&mut self.path_builder);
        self.shaper.append_outline(line, &mut builder);
        // Empty for blank lines and whitespace-only glyph runs.
        builder.finish()
    }
}

fn solid_paint(color: tiny_skia::Color) -> Paint<'static> {
    let mut paint = Paint {
        anti_alias: true,
        ..Default::default()
    };
    paint.set_color(color);
    paint
}

fn outline_stroke(outline: &Outline) -> Stroke {
    Stroke {
        width: outline.width,
        miter_limit: Outline::MITER_LIMIT,
        line_cap: LineCap::Butt,
        line_join: LineJoin::Round,
        dash: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{color::Color, text::Measure};

    /// Draws every non-space char as a filled box `0.6em` wide.
    pub(crate) struct BoxShaper {
        pub size: f32,
    }

    impl BoxShaper {
        fn advance(&self) -> f32 {
            self.size * 0.6
        }
    }

    impl Measure for BoxShaper {
        fn width(&self, text: &str) -> f32 {
            text.chars().count() as f32 * self.advance()
        }
    }

    impl TextShaper for BoxShaper {
        fn append_outline(&self, text: &str, path: &mut PathBuilder) {
            for (i, c) in text.chars().enumerate() {
                if c.is_whitespace() {
                    continue;
                }
                let x = i as f32 * self.advance();
                if let Some(rect) = tiny_skia::Rect::from_xywh(
                    x + 1.,
                    self.size * 0.2,
                    self.advance() - 2.,
                    self.size * 0.6,
                ) {
                    path.push_rect(rect);
                }
            }
        }
    }

    fn style(outline: Option<Outline>) -> DrawStyle {
        DrawStyle {
            font_size: 20.,
            line_height: 20.,
            fill: Color::rgb(255, 0, 0),
            outline,
        }
    }

    fn lines(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn pixel(raster: &RasterBuffer, x: u32, y: u32) -> [u8; 4] {
        let c = raster.pixmap().pixel(x, y).unwrap();
        [c.red(), c.green(), c.blue(), c.alpha()]
    }

    #[test]
    fn buffer_is_sized_for_device_pixels() {
        let shaper = BoxShaper { size: 20. };
        let raster = Rasterizer::new(&shaper)
            .rasterize(&lines(&["ab", "cd", "ef"]), &style(None), 100.5, 2.)
            .unwrap();
        assert_eq!(raster.device_size(), UVec2::new(201, 120));
        assert_eq!(raster.css_size(), vec2(100.5, 60.));
        assert_eq!(raster.data().len(), 201 * 120 * 4);
    }

    #[test]
    fn degenerate_sizes_still_allocate() {
        let shaper = BoxShaper { size: 20. };
        for width in [0., -50.] {
            let raster = Rasterizer::new(&shaper)
                .rasterize(&lines(&["ab"]), &style(None), width, 1.)
                .unwrap();
            assert_eq!(raster.device_size(), UVec2::new(1, 20));
        }

        let raster = Rasterizer::new(&shaper)
            .rasterize(&[], &style(None), 0., 3.)
            .unwrap();
        assert_eq!(raster.device_size(), UVec2::new(1, 1));
    }

    #[test]
    fn oversized_buffer_is_unavailable() {
        let shaper = BoxShaper { size: 20. };
        let raster = Rasterizer::new(&shaper).rasterize(&lines(&["ab"]), &style(None), 1.0e9, 1.);
        assert!(raster.is_none());
    }

    #[test]
    fn lines_are_centered_and_stacked() {
        let shaper = BoxShaper { size: 20. };
        // "a" is 12px wide, centered in 100px: spans 44..56.
        let raster = Rasterizer::new(&shaper)
            .rasterize(&lines(&["a", "", "a"]), &style(None), 100., 1.)
            .unwrap();

        assert_eq!(pixel(&raster, 50, 10), [255, 0, 0, 255]);
        assert_eq!(pixel(&raster, 50, 50), [255, 0, 0, 255]);
        // blank middle line
        assert_eq!(pixel(&raster, 50, 30), [0, 0, 0, 0]);
        // outside the glyph box
        assert_eq!(pixel(&raster, 20, 10), [0, 0, 0, 0]);
        assert_eq!(pixel(&raster, 50, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn outline_is_stroked_under_fill() {
        let shaper = BoxShaper { size: 20. };
        let outline = Outline {
            color: Color::rgb(0, 0, 255),
            width: 4.,
        };
        let raster = Rasterizer::new(&shaper)
            .rasterize(&lines(&["a"]), &style(Some(outline)), 100., 1.)
            .unwrap();

        // Glyph box spans y 4..16; the stroke extends 2px beyond it.
        assert_eq!(pixel(&raster, 50, 10), [255, 0, 0, 255]);
        assert_eq!(pixel(&raster, 50, 2), [0, 0, 255, 255]);
        assert_eq!(pixel(&raster, 50, 18), [0, 0, 0, 0]);
    }

    #[test]
    fn rasterization_is_deterministic() {
        let shaper = BoxShaper { size: 20. };
        let style = style(Some(Outline {
            color: Color::rgba(0, 0, 0, 128),
            width: 1.5,
        }));
        let text = lines(&["hello", "world wide"]);
        let a = Rasterizer::new(&shaper).rasterize(&text, &style, 173.3, 1.5).unwrap();
        let b = Rasterizer::new(&shaper).rasterize(&text, &style, 173.3, 1.5).unwrap();
        assert_eq!(a.data(), b.data());
        assert!(a.data().iter().any(|&byte| byte != 0));
    }

    #[test]
    fn demultiplied_restores_straight_alpha() {
        let shaper = BoxShaper { size: 20. };
        let mut style = style(None);
        style.fill = Color::rgba(200, 100, 50, 128);
        let raster = Rasterizer::new(&shaper)
            .rasterize(&lines(&["a"]), &style, 100., 1.)
            .unwrap();

        let index = ((10 * raster.width() + 50) * 4) as usize;
        let premultiplied = &raster.data()[index..index + 4];
        let straight = &raster.demultiplied()[index..index + 4];
        assert_eq!(premultiplied[3], 128);
        assert!(premultiplied[0] < 110);
        assert!((straight[0] as i32 - 200).abs() <= 2);
        assert_eq!(straight[3], 128);
    }
}
