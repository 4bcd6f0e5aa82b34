// crates/wg-models/src/text_to_image.rs

use image::{Rgb, RgbImage};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wg_core::ExecutorError;
use wg_core::executor::{BaseGenerator, GenerateParams, Generation, Precision};
use wg_core::request::Seed;

/// Offline stand-in for the diffusion model.
/// Paints a seeded synthetic landscape so the whole pipeline can run
/// without a GPU or the inference service:
/// - sky gradient tinted by colour words in the prompt
/// - a sun placed by the seed
/// - layered ridges with per-seed noise
pub struct PlaceholderGenerator {
    loaded: Option<String>,
}

impl PlaceholderGenerator {
    pub fn new() -> Self {
        Self { loaded: None }
    }
}

impl Default for PlaceholderGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseGenerator for PlaceholderGenerator {
    fn load(&mut self, model_id: &str, _precision: Precision) -> Result<(), ExecutorError> {
        info!("Placeholder generator standing in for {}", model_id);
        self.loaded = Some(model_id.to_string());
        Ok(())
    }

    fn generate(
        &mut self,
        params: &GenerateParams<'_>,
        on_step: &mut dyn FnMut(u32),
    ) -> Result<Generation, ExecutorError> {
        if self.loaded.is_none() {
            return Err(ExecutorError::NotLoaded);
        }

        // Keep reported draws within the signed range the metadata stores
        let seed = match params.seed {
            Seed::Fixed(seed) => seed,
            Seed::Random => rand::thread_rng().gen_range(0..=i64::MAX as u64),
        };

        let image = paint_landscape(
            params.prompt,
            params.resolution.width,
            params.resolution.height,
            seed,
        );
        for step in 0..params.steps {
            on_step(step);
        }

        Ok(Generation { image, seed: Some(seed) })
    }

    fn unload(&mut self) -> Result<(), ExecutorError> {
        self.loaded = None;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}

/// Extract a colour hint from the prompt (placeholder logic)
fn extract_color_from_prompt(prompt: &str) -> [u8; 3] {
    let prompt_lower = prompt.to_lowercase();

    if prompt_lower.contains("red") || prompt_lower.contains("sunset") {
        [235, 110, 80]
    } else if prompt_lower.contains("blue") || prompt_lower.contains("ocean") {
        [90, 130, 230]
    } else if prompt_lower.contains("green") || prompt_lower.contains("forest") {
        [90, 190, 110]
    } else if prompt_lower.contains("yellow") || prompt_lower.contains("desert") {
        [240, 210, 110]
    } else if prompt_lower.contains("purple") || prompt_lower.contains("neon") {
        [180, 100, 230]
    } else {
        [150, 160, 190]
    }
}

fn paint_landscape(prompt: &str, width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let sky = extract_color_from_prompt(prompt);

    let sun_x = rng.gen_range(0.15..0.85) * width as f32;
    let sun_y = rng.gen_range(0.15..0.45) * height as f32;
    let sun_radius = 0.08 * width.min(height) as f32;

    let ridges: Vec<(f32, f32, f32)> = (0..3)
        .map(|i| {
            let base = 0.55 + 0.12 * i as f32;
            (base, rng.gen_range(0.02..0.08), rng.gen_range(1.0..4.0))
        })
        .collect();

    let mut img = RgbImage::new(width, height);
    for y in 0..height {
        let v = y as f32 / height as f32;
        for x in 0..width {
            let u = x as f32 / width as f32;

            // Sky gradient, brighter towards the horizon
            let glow = 0.45 + 0.55 * v;
            let mut color = [
                sky[0] as f32 * glow,
                sky[1] as f32 * glow,
                sky[2] as f32 * glow,
            ];

            let dx = x as f32 - sun_x;
            let dy = y as f32 - sun_y;
            if (dx * dx + dy * dy).sqrt() < sun_radius {
                color = [255.0, 240.0, 200.0];
            }

            // Farther ridges are lighter
            for (i, (base, amplitude, frequency)) in ridges.iter().enumerate() {
                let crest = base + amplitude * (u * frequency * std::f32::consts::TAU).sin();
                if v > crest {
                    let shade = 0.6 - 0.18 * i as f32;
                    color = [
                        sky[0] as f32 * shade * 0.5,
                        sky[1] as f32 * shade * 0.6,
                        sky[2] as f32 * shade * 0.5,
                    ];
                }
            }

            let noise = rng.gen_range(-6.0..6.0);
            img.put_pixel(x, y, Rgb(color.map(|c| (c + noise).clamp(0.0, 255.0) as u8)));
        }
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use wg_core::Resolution;

    fn params(seed: Seed) -> GenerateParams<'static> {
        GenerateParams {
            prompt: "a red canyon at dusk",
            negative_prompt: "",
            resolution: Resolution::new(96, 64),
            steps: 5,
            guidance_scale: 7.5,
            seed,
        }
    }

    #[test]
    fn test_generate_reports_every_step() {
        let mut generator = PlaceholderGenerator::new();
        generator.load("placeholder", Precision::Full).unwrap();

        let mut steps = Vec::new();
        let generation = generator.generate(&params(Seed::Random), &mut |s| steps.push(s)).unwrap();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);
        assert_eq!(generation.image.dimensions(), (96, 64));
        assert!(generation.seed.unwrap() <= i64::MAX as u64);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let mut generator = PlaceholderGenerator::new();
        generator.load("placeholder", Precision::Full).unwrap();

        let a = generator.generate(&params(Seed::Fixed(7)), &mut |_| {}).unwrap();
        let b = generator.generate(&params(Seed::Fixed(7)), &mut |_| {}).unwrap();
        let c = generator.generate(&params(Seed::Fixed(8)), &mut |_| {}).unwrap();
        assert_eq!(a.image, b.image);
        assert_ne!(a.image, c.image);
        assert_eq!(a.seed, Some(7));
    }

    #[test]
    fn test_lifecycle() {
        let mut generator = PlaceholderGenerator::new();
        assert!(matches!(
            generator.generate(&params(Seed::Random), &mut |_| {}),
            Err(ExecutorError::NotLoaded)
        ));
        assert!(generator.unload().is_ok());
        generator.load("placeholder", Precision::Half).unwrap();
        assert!(generator.is_loaded());
        generator.unload().unwrap();
        generator.unload().unwrap();
        assert!(!generator.is_loaded());
    }

    #[test]
    fn test_color_extraction() {
        let red = extract_color_from_prompt("a red apple");
        assert!(red[0] > red[1] && red[0] > red[2]);

        let blue = extract_color_from_prompt("a blue ocean");
        assert!(blue[2] > blue[0] && blue[2] > blue[1]);
    }
}
