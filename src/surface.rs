//! Sizing of the visible output surface.

use glam::{uvec2, vec2, UVec2, Vec2};

use crate::platform::PlatformHint;

/// Vertical padding per line, in units of `font_size / divisor`.
const PADDING_PER_LINE: f32 = 2.7;
const DIVISOR: f32 = 6.;
const NARROW_METRICS_DIVISOR: f32 = 12.;

/// Dimensions of the surface the shader renders into.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SurfaceDescriptor {
    pub css_width: f32,
    pub css_height: f32,
    pub device_pixel_width: u32,
    pub device_pixel_height: u32,
}

impl SurfaceDescriptor {
    pub fn css_size(&self) -> Vec2 {
        vec2(self.css_width, self.css_height)
    }

    pub fn device_size(&self) -> UVec2 {
        uvec2(self.device_pixel_width, self.device_pixel_height)
    }
}

/// Extra CSS height added below the text so the shader's surface does not
/// clip descenders on any platform.
pub fn height_offset(font_size: f32, line_count: usize, platform: &PlatformHint) -> f32 {
    let divisor = if platform.has_narrow_metrics() {
        NARROW_METRICS_DIVISOR
    } else {
        DIVISOR
    };
    line_count as f32 * PADDING_PER_LINE * (font_size / divisor)
}

/// Computes the visible surface for a raster of the given CSS size.
pub fn size_surface(
    raster_css_size: Vec2,
    font_size: f32,
    line_count: usize,
    platform: &PlatformHint,
    device_pixel_ratio: f32,
) -> SurfaceDescriptor {
    let css_width = raster_css_size.x;
    let css_height = raster_css_size.y + height_offset(font_size, line_count, platform);

    // Device pixels derive from the unclamped CSS size, so a degenerate
    // title collapses to a single device pixel at any ratio.
    SurfaceDescriptor {
        css_width: css_width.max(1.),
        css_height: css_height.max(1.),
        device_pixel_width: device_pixels(css_width, device_pixel_ratio),
        device_pixel_height: device_pixels(css_height, device_pixel_ratio),
    }
}

/// Converts a CSS length to whole device pixels, never less than one.
pub(crate) fn device_pixels(css: f32, device_pixel_ratio: f32) -> u32 {
    // `as` saturates negatives and NaN to zero.
    ((css * device_pixel_ratio).floor() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Browser, Os};

    fn desktop() -> PlatformHint {
        PlatformHint::new(Os::Windows, Browser::Chrome)
    }

    fn ios() -> PlatformHint {
        PlatformHint::new(Os::Ios, Browser::MobileSafari)
    }

    #[test]
    fn offset_is_linear() {
        let base = height_offset(12., 1, &desktop());
        assert!((base - 5.4).abs() < 1e-4);
        assert!((height_offset(24., 1, &desktop()) - 2. * base).abs() < 1e-4);
        assert!((height_offset(12., 3, &desktop()) - 3. * base).abs() < 1e-4);
        assert_eq!(height_offset(12., 0, &desktop()), 0.);
    }

    #[test]
    fn desktop_offset_doubles_narrow_offset() {
        for (size, lines) in [(12., 1), (48., 2), (31.5, 7)] {
            let narrow = height_offset(size, lines, &ios());
            let wide = height_offset(size, lines, &desktop());
            assert!((wide - 2. * narrow).abs() < 1e-3);
        }
    }

    #[test]
    fn surface_dimensions() {
        let surface = size_surface(vec2(300., 96.), 48., 2, &desktop(), 2.);
        // 2 * 2.7 * 8 = 43.2
        assert_eq!(surface.css_width, 300.);
        assert!((surface.css_height - 139.2).abs() < 1e-3);
        assert_eq!(surface.device_size(), uvec2(600, 278));
    }

    #[test]
    fn degenerate_sizes_clamp_to_one_pixel() {
        let surface = size_surface(vec2(-20., 0.), 0., 1, &desktop(), 1.);
        assert_eq!(surface.device_size(), uvec2(1, 1));
        assert_eq!(surface.css_size(), vec2(1., 1.));

        let surface = size_surface(vec2(0.2, 0.3), -5., 1, &ios(), 3.);
        assert_eq!(surface.device_size(), uvec2(1, 1));
        assert_eq!(device_pixels(f32::NAN, 2.), 1);
    }
}
