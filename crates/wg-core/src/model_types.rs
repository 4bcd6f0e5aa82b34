use serde::{Deserialize, Serialize};

/// Registered super-resolution models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpscalerModel {
    #[serde(rename = "RealESRGAN_x4plus")]
    RealEsrganX4Plus,
    #[serde(rename = "RealESRGAN_x2plus")]
    RealEsrganX2Plus,
}

impl UpscalerModel {
    /// Registry name, also the weight file stem
    pub fn name(&self) -> &'static str {
        match self {
            Self::RealEsrganX4Plus => "RealESRGAN_x4plus",
            Self::RealEsrganX2Plus => "RealESRGAN_x2plus",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RealEsrganX4Plus => "General-purpose 4x upscaler (best quality)",
            Self::RealEsrganX2Plus => "General-purpose 2x upscaler (faster)",
        }
    }

    /// Native integer scale factor of the network
    pub fn scale(&self) -> u32 {
        match self {
            Self::RealEsrganX4Plus => 4,
            Self::RealEsrganX2Plus => 2,
        }
    }

    /// Number of RRDB blocks in the generator network
    pub fn num_block(&self) -> u32 {
        match self {
            Self::RealEsrganX4Plus | Self::RealEsrganX2Plus => 23,
        }
    }

    /// Stable download location of the pretrained weights
    pub fn weights_url(&self) -> &'static str {
        match self {
            Self::RealEsrganX4Plus => {
                "https://github.com/xinntao/Real-ESRGAN/releases/download/v0.1.0/RealESRGAN_x4plus.pth"
            }
            Self::RealEsrganX2Plus => {
                "https://github.com/xinntao/Real-ESRGAN/releases/download/v0.2.1/RealESRGAN_x2plus.pth"
            }
        }
    }

    pub fn weights_file_name(&self) -> String {
        format!("{}.pth", self.name())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|m| m.name() == name)
    }

    /// Model whose native factor matches a factor from `calculate_upscale_factor`
    pub fn for_factor(factor: u32) -> Self {
        if factor <= 2 {
            Self::RealEsrganX2Plus
        } else {
            Self::RealEsrganX4Plus
        }
    }

    /// All available models
    pub fn all() -> [UpscalerModel; 2] {
        [Self::RealEsrganX4Plus, Self::RealEsrganX2Plus]
    }

    pub fn names() -> Vec<&'static str> {
        Self::all().iter().map(|m| m.name()).collect()
    }
}

impl Default for UpscalerModel {
    fn default() -> Self {
        Self::RealEsrganX4Plus
    }
}
