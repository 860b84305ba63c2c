use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use keylight_domain::{Key, Rgb};

/// Every key lights two adjacent pixels.
pub const PIXELS_PER_KEY: usize = 2;

/// Logical output device: a row of addressable pixels.
///
/// Writes are buffered until `flush`. Physical parameters (pin, DMA channel,
/// frequency) belong to the implementation, never to callers.
pub trait RenderSurface: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pixel(&self, index: usize) -> Option<Rgb>;

    fn set_pixel(&mut self, index: usize, color: Rgb);

    fn flush(&mut self) -> Result<()>;

    fn set_brightness(&mut self, _brightness: u8) {}
}

/// Maps keys onto pixel indices: `(key - key_offset) * 2`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyLayout {
    pub key_offset: u8,
    pub led_count: usize,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            key_offset: 24,
            led_count: 144,
        }
    }
}

impl KeyLayout {
    /// Pixels lit by `key`, or `None` when the key falls outside the strip.
    pub fn pixels(&self, key: Key) -> Option<Range<usize>> {
        let relative = key.code().checked_sub(self.key_offset)?;
        let start = usize::from(relative) * PIXELS_PER_KEY;
        let end = start + PIXELS_PER_KEY;
        (end <= self.led_count).then_some(start..end)
    }
}

/// In-memory surface. Used headless and in tests.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    pixels: Vec<Rgb>,
    shown: Vec<Rgb>,
    brightness: u8,
    flushes: usize,
}

impl MemorySurface {
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Rgb::BLACK; len],
            shown: vec![Rgb::BLACK; len],
            brightness: 255,
            flushes: 0,
        }
    }

    /// The frame as of the last flush.
    pub fn shown(&self) -> &[Rgb] {
        &self.shown
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl RenderSurface for MemorySurface {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn pixel(&self, index: usize) -> Option<Rgb> {
        self.pixels.get(index).copied()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(slot) = self.pixels.get_mut(index) {
            *slot = color;
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.shown.clone_from(&self.pixels);
        self.flushes += 1;
        trace!(flushes = self.flushes, "memory surface flushed");
        Ok(())
    }

    fn set_brightness(&mut self, brightness: u8) {
        debug!(brightness, "memory surface brightness");
        self.brightness = brightness;
    }
}

/// Handle to the single render surface shared by every activity.
///
/// Each call applies all of its pixel writes and flushes under one lock, so a
/// key's two pixels always land together. Consecutive calls from different
/// activities may interleave.
#[derive(Clone)]
pub struct SharedSurface {
    inner: Arc<Mutex<Box<dyn RenderSurface>>>,
    layout: KeyLayout,
}

impl SharedSurface {
    pub fn new(surface: impl RenderSurface + 'static, layout: KeyLayout) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(surface))),
            layout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn RenderSurface>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn paint_key(&self, key: Key, color: Rgb) -> Result<()> {
        self.paint_keys([(key, color)])
    }

    /// Colors every listed key, then flushes once.
    pub fn paint_keys<I>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = (Key, Rgb)>,
    {
        let mut surface = self.lock();
        for (key, color) in keys {
            match self.layout.pixels(key) {
                Some(range) => range.for_each(|index| surface.set_pixel(index, color)),
                None => trace!(%key, "key has no pixels on this strip"),
            }
        }
        surface.flush()
    }

    pub fn fill(&self, color: Rgb) -> Result<()> {
        let mut surface = self.lock();
        for index in 0..surface.len() {
            surface.set_pixel(index, color);
        }
        surface.flush()
    }

    pub fn set_brightness(&self, brightness: u8) -> Result<()> {
        let mut surface = self.lock();
        surface.set_brightness(brightness);
        surface.flush()
    }

    /// Current contents of every pixel.
    pub fn snapshot(&self) -> Vec<Rgb> {
        let surface = self.lock();
        (0..surface.len()).filter_map(|index| surface.pixel(index)).collect()
    }

    pub fn key_color(&self, key: Key) -> Option<Rgb> {
        let range = self.layout.pixels(key)?;
        self.lock().pixel(range.start)
    }
}
