//! Plain row-major pixel buffers.

use rayon::prelude::*;

/// A `width` x `height` grid of texels stored row by row.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuffer<T> {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<T>,
}

impl<T: Copy + Send + Sync> ImageBuffer<T> {
    /// Create a new image buffer filled with `value`.
    pub fn new(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; (width as usize) * (height as usize)],
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Get the pixel at (x, y).
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.pixels[self.index(x, y)]
    }

    /// Set the pixel at (x, y).
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let i = self.index(x, y);
        self.pixels[i] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.pixels.fill(value);
    }

    /// Evaluate `f(x, y)` for every pixel, one rayon task per row.
    pub fn par_fill_with<F>(&mut self, f: F)
    where
        F: Fn(u32, u32) -> T + Sync,
    {
        let width = self.width as usize;
        self.pixels
            .par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    *px = f(x as u32, y as u32);
                }
            });
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl ImageBuffer<[u8; 4]> {
    /// Flatten to tightly packed RGBA bytes.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flatten().copied().collect()
    }
}
