//! Row-aligned 2-D pixel grid (spec.md §4.9).
//!
//! No teacher equivalent (the teacher writes straight into an `RgbaImage`
//! via the `image` crate); designed directly from spec.md's alignment and
//! bounds-checking requirements, reusing the `checked_mul` helper
//! `math::bounds` already exposes for k-d tree index sizing.

use std::cell::UnsafeCell;

use crate::color::{Color3, ColorSpace};
use crate::error::{Result, Status};
use crate::math::checked_mul;

pub const FRAMEBUFFER_ROW_ALIGNMENT: usize = 128;

fn round_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

/// A row-major grid of `Color3` pixels. Row stride is padded so each row
/// starts at a `FRAMEBUFFER_ROW_ALIGNMENT`-byte boundary; this pads past
/// `width` and wastes a little memory but keeps per-row writes from
/// different threads on separate cache lines.
///
/// Pixels are stored behind `UnsafeCell` so the render driver (spec.md §4.8)
/// can hand out `&Framebuffer` to every worker thread and have each write
/// its own pixels through `write_pixel` without a lock: spec.md §5 makes
/// per-pixel writes disjoint by construction (each pixel is visited by
/// exactly one chunk), so `unsafe impl Sync` below never races in practice.
pub struct Framebuffer {
    width: u32,
    height: u32,
    stride_pixels: usize,
    pixels: Vec<UnsafeCell<Color3>>,
}

// SAFETY: concurrent writers only ever call `write_pixel` with disjoint
// `(col, row)` pairs (the render driver partitions the image into
// non-overlapping chunks before spawning workers), so no two threads ever
// touch the same `UnsafeCell` at once.
unsafe impl Sync for Framebuffer {}

impl Framebuffer {
    /// Allocates a framebuffer cleared to black in `space`. `(width, _) ==
    /// (0, _)` fails `InvalidArgument(0)`; `(_, height) == (_, 0)` fails
    /// `InvalidArgument(1)` (spec.md §8 property 5).
    pub fn new(width: u32, height: u32, space: ColorSpace) -> Result<Framebuffer> {
        Framebuffer::with_clear_color(width, height, Color3::black(space))
    }

    pub fn with_clear_color(width: u32, height: u32, clear: Color3) -> Result<Framebuffer> {
        if width == 0 {
            return Err(Status::InvalidArgument("framebuffer width"));
        }
        if height == 0 {
            return Err(Status::InvalidArgument("framebuffer height"));
        }

        let pixel_size = std::mem::size_of::<Color3>();
        let row_bytes = checked_mul(width as usize, pixel_size).ok_or(Status::AllocationFailed)?;
        let aligned_row_bytes = round_up(row_bytes, FRAMEBUFFER_ROW_ALIGNMENT);
        let stride_pixels = aligned_row_bytes / pixel_size;
        let total_pixels = checked_mul(stride_pixels, height as usize).ok_or(Status::AllocationFailed)?;

        let pixels = (0..total_pixels).map(|_| UnsafeCell::new(clear)).collect();
        Ok(Framebuffer { width, height, stride_pixels, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.stride_pixels + col as usize
    }

    /// Bounds-checked read (spec.md §4.9).
    pub fn get_pixel(&self, col: u32, row: u32) -> Result<Color3> {
        if col >= self.width || row >= self.height {
            return Err(Status::InvalidArgument("framebuffer coordinate"));
        }
        // SAFETY: reads are only raced against a concurrent `write_pixel` to
        // a different pixel (never this one) during a render; outside a
        // render no writer is active at all.
        Ok(unsafe { *self.pixels[self.index(col, row)].get() })
    }

    /// Writes are trusted: callers that pass an out-of-range coordinate hit
    /// the debug assertion, not a `Result` (spec.md §4.9's "writes are
    /// trusted (asserted)").
    pub fn set_pixel(&mut self, col: u32, row: u32, color: Color3) {
        debug_assert!(col < self.width && row < self.height, "framebuffer write out of bounds");
        let idx = self.index(col, row);
        *self.pixels[idx].get_mut() = color;
    }

    /// Concurrent, unsynchronized write through a shared reference, used by
    /// the render driver (spec.md §4.8) once pixel ownership has been
    /// statically partitioned across worker threads. Callers must never
    /// call this twice for the same `(col, row)` concurrently from two
    /// threads.
    pub fn write_pixel(&self, col: u32, row: u32, color: Color3) {
        debug_assert!(col < self.width && row < self.height, "framebuffer write out of bounds");
        let idx = self.index(col, row);
        // SAFETY: the render driver guarantees each pixel is written by
        // exactly one worker, so this is never aliased concurrently.
        unsafe {
            *self.pixels[idx].get() = color;
        }
    }
}
