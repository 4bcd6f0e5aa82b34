use serde::Serialize;

use crate::resolution::{ALIGNMENT, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceCategory {
    Mobile,
    Tablet,
    #[serde(rename = "Laptop/Desktop")]
    Desktop,
}

impl DeviceCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mobile => "Mobile",
            Self::Tablet => "Tablet",
            Self::Desktop => "Laptop/Desktop",
        }
    }

    pub fn all() -> [DeviceCategory; 3] {
        [Self::Mobile, Self::Tablet, Self::Desktop]
    }
}

/// A named target resolution for a common display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DevicePreset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub category: DeviceCategory,
}

impl DevicePreset {
    const fn new(name: &'static str, width: u32, height: u32, category: DeviceCategory) -> Self {
        Self { name, width, height, category }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Nearest size the pipeline accepts: each side rounded to a multiple of 8.
    /// Panels like 1290x2796 are not aligned and would fail validation.
    pub fn generation_target(&self) -> Resolution {
        Resolution::new(align(self.width), align(self.height))
    }

    pub fn resolution_str(&self) -> String {
        self.resolution().to_string()
    }

    /// Reduced aspect ratio, e.g. `(16, 9)` for 3840x2160
    pub fn aspect_ratio(&self) -> (u32, u32) {
        let d = gcd(self.width, self.height);
        (self.width / d, self.height / d)
    }

    /// Dropdown label, e.g. `4K (UHD) (3840x2160)`
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.resolution_str())
    }
}

use DeviceCategory::{Desktop, Mobile, Tablet};

static DEVICE_PRESETS: [DevicePreset; 16] = [
    DevicePreset::new("iPhone 14 Pro Max", 1290, 2796, Mobile),
    DevicePreset::new("iPhone 14 Pro", 1179, 2556, Mobile),
    DevicePreset::new("iPhone 14", 1170, 2532, Mobile),
    DevicePreset::new("iPhone SE", 750, 1334, Mobile),
    DevicePreset::new("Samsung Galaxy S23 Ultra", 1440, 3088, Mobile),
    DevicePreset::new("iPad Pro 12.9\"", 2732, 2048, Tablet),
    DevicePreset::new("iPad Pro 11\"", 2388, 1668, Tablet),
    DevicePreset::new("iPad Air", 2360, 1640, Tablet),
    DevicePreset::new("13\" MacBook Pro", 2560, 1600, Desktop),
    DevicePreset::new("14\" MacBook Pro", 3024, 1964, Desktop),
    DevicePreset::new("16\" MacBook Pro", 3456, 2234, Desktop),
    DevicePreset::new("1080p (Full HD)", 1920, 1080, Desktop),
    DevicePreset::new("1440p (2K)", 2560, 1440, Desktop),
    DevicePreset::new("4K (UHD)", 3840, 2160, Desktop),
    DevicePreset::new("5K", 5120, 2880, Desktop),
    DevicePreset::new("Dual 1440p", 5120, 1440, Desktop),
];

pub fn all_presets() -> &'static [DevicePreset] {
    &DEVICE_PRESETS
}

pub fn presets_in(category: DeviceCategory) -> impl Iterator<Item = &'static DevicePreset> {
    DEVICE_PRESETS.iter().filter(move |p| p.category == category)
}

pub fn preset_by_name(name: &str) -> Option<&'static DevicePreset> {
    DEVICE_PRESETS.iter().find(|p| p.name == name)
}

pub fn display_options() -> Vec<String> {
    DEVICE_PRESETS.iter().map(DevicePreset::display).collect()
}

/// Inverse of [`DevicePreset::display`]. Splits on the last `" ("` so names
/// that contain parentheses themselves still resolve.
pub fn parse_display_option(display: &str) -> Option<&'static DevicePreset> {
    let name = display.rfind(" (").map_or(display, |idx| &display[..idx]);
    preset_by_name(name)
}

fn align(dimension: u32) -> u32 {
    (dimension + ALIGNMENT / 2) / ALIGNMENT * ALIGNMENT
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}
