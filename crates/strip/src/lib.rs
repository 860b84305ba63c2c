pub mod ambient;
pub mod surface;

pub use ambient::{preset_palette, AmbientSelector};
pub use surface::{KeyLayout, MemorySurface, RenderSurface, SharedSurface, PIXELS_PER_KEY};
