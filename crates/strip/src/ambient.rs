use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use keylight_domain::{hsl_to_rgb, AmbientSettings, Rgb};

const CHRISTMAS: &[Rgb] = &[Rgb::new(255, 255, 255), Rgb::new(255, 0, 0), Rgb::new(0, 255, 0)];
const HALLOWEEN: &[Rgb] = &[Rgb::new(255, 162, 0), Rgb::new(128, 0, 255)];
const SUNSET: &[Rgb] = &[
    Rgb::new(113, 29, 176),
    Rgb::new(194, 18, 146),
    Rgb::new(239, 64, 64),
    Rgb::new(255, 167, 50),
];
const LAGOON: &[Rgb] = &[
    Rgb::new(54, 47, 217),
    Rgb::new(26, 172, 172),
    Rgb::new(46, 151, 167),
    Rgb::new(238, 238, 238),
];
const BERRY: &[Rgb] = &[
    Rgb::new(134, 10, 53),
    Rgb::new(175, 38, 85),
    Rgb::new(0, 255, 8),
    Rgb::new(243, 243, 243),
];
// Mostly blue with an occasional orange spark.
const SEA_SPARK: &[Rgb] = &[
    Rgb::new(55, 139, 174),
    Rgb::new(55, 139, 174),
    Rgb::new(55, 139, 174),
    Rgb::new(55, 139, 174),
    Rgb::new(55, 139, 174),
    Rgb::new(55, 139, 174),
    Rgb::new(55, 139, 174),
    Rgb::new(255, 77, 0),
];

/// Fixed palette for presets 1..=6; preset 0 is the hue sweep and has none.
pub fn preset_palette(preset: u8) -> Option<&'static [Rgb]> {
    match preset {
        1 => Some(CHRISTMAS),
        2 => Some(HALLOWEEN),
        3 => Some(SUNSET),
        4 => Some(LAGOON),
        5 => Some(BERRY),
        6 => Some(SEA_SPARK),
        _ => None,
    }
}

/// Picks the free-play color for each freshly pressed key.
pub struct AmbientSelector {
    rng: StdRng,
}

impl AmbientSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advances the hue (preset 0 with cycling on) and returns the color to paint.
    ///
    /// The hue lives in `settings` so the control plane sees the sweep position.
    pub fn on_press(&mut self, settings: &mut AmbientSettings) -> Rgb {
        if settings.preset == 0 && settings.hue_cycling {
            let advanced = (u32::from(settings.hue) + u32::from(settings.hue_shift)) % 360;
            settings.hue = advanced as u16;
        }
        self.color(settings)
    }

    pub fn color(&mut self, settings: &AmbientSettings) -> Rgb {
        match preset_palette(settings.preset).and_then(|colors| colors.choose(&mut self.rng)) {
            Some(color) => *color,
            None => hsl_to_rgb(settings.hue, settings.saturation, settings.lightness),
        }
    }
}

impl Default for AmbientSelector {
    fn default() -> Self {
        Self::new()
    }
}
