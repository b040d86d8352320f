use serde::{Deserialize, Serialize};

/// The host operating system, as far as text metrics are concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Os {
    Ios,
    Android,
    MacOs,
    Windows,
    Linux,
    #[default]
    Other,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    /// Safari on iOS, the default browser there.
    MobileSafari,
    Edge,
    #[default]
    Other,
}

/// Read-only description of the platform a title is rendered for.
///
/// Supplied once per run by the host; detection itself happens elsewhere.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PlatformHint {
    pub os: Os,
    pub browser: Browser,
}

impl PlatformHint {
    pub fn new(os: Os, browser: Browser) -> Self {
        Self { os, browser }
    }

    /// Whether this platform reports compressed line-height and baseline
    /// metrics, so that text needs twice the usual vertical padding.
    pub fn has_narrow_metrics(&self) -> bool {
        self.os == Os::Ios || self.browser == Browser::MobileSafari
    }
}

/// Per-run facts about the host display.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Environment {
    pub platform: PlatformHint,
    device_pixel_ratio: f32,
}

impl Environment {
    /// Creates an environment. Ratios below 1 (or non-finite) are treated as 1.
    pub fn new(platform: PlatformHint, device_pixel_ratio: f32) -> Self {
        let device_pixel_ratio = if device_pixel_ratio.is_finite() {
            device_pixel_ratio.max(1.)
        } else {
            1.
        };
        Self {
            platform,
            device_pixel_ratio,
        }
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(PlatformHint::default(), 1.)
    }
}
