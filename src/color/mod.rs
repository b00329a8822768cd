//! Tristimulus color, spectra/reflectors and the compositor arena algebra.
//!
//! No teacher equivalent exists (the teacher's `Color` is a plain RGB
//! `Vec3`); grounded directly on spec.md §3/§4.1/§4.2. See DESIGN.md.

pub mod cie;
pub mod compositor;
pub mod reflector;
pub mod spectrum;

use crate::error::{Result, Status};

/// Closed set of color spaces this crate understands. `ColorConvert` always
/// pivots through `Xyz` (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Xyz,
    LinearSrgb,
}

/// A tristimulus color tagged with the space its three components are
/// expressed in. Invariant: all components finite and >= 0; when
/// `space == Xyz`, `y` is luminance (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color3 {
    pub c: [f64; 3],
    pub space: ColorSpace,
}

// Fixed conversion constants (sRGB primaries, D65 white point).
const LINEAR_SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

const XYZ_TO_LINEAR_SRGB: [[f64; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];

fn mat_vec(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

impl Color3 {
    pub fn new(c: [f64; 3], space: ColorSpace) -> Result<Color3> {
        if !c.iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err(Status::InvalidArgument("color components"));
        }
        Ok(Color3 { c, space })
    }

    pub fn black(space: ColorSpace) -> Color3 {
        Color3 { c: [0.0, 0.0, 0.0], space }
    }

    pub fn to_xyz(&self) -> Color3 {
        match self.space {
            ColorSpace::Xyz => *self,
            ColorSpace::LinearSrgb => Color3 {
                c: mat_vec(&LINEAR_SRGB_TO_XYZ, self.c),
                space: ColorSpace::Xyz,
            },
        }
    }

    fn from_xyz(xyz: [f64; 3], target: ColorSpace) -> Color3 {
        match target {
            ColorSpace::Xyz => Color3 { c: xyz, space: ColorSpace::Xyz },
            ColorSpace::LinearSrgb => {
                let mut rgb = mat_vec(&XYZ_TO_LINEAR_SRGB, xyz);
                // Negative outputs after a round-trip are clamped to 0 for
                // numeric safety (spec.md §3).
                for v in rgb.iter_mut() {
                    if *v < 0.0 {
                        *v = 0.0;
                    }
                }
                Color3 { c: rgb, space: ColorSpace::LinearSrgb }
            }
        }
    }
}

/// Converts `color` into `target`'s space, pivoting through XYZ. Identity
/// when the tags already match (spec.md §4.1).
pub fn color_convert(color: &Color3, target: ColorSpace) -> Color3 {
    if color.space == target {
        return *color;
    }
    let xyz = color.to_xyz();
    Color3::from_xyz(xyz.c, target)
}

/// Adds two colors, elevating both to a common space first (spec.md §4.1).
/// The common space is the left operand's space.
pub fn color_add(a: &Color3, b: &Color3) -> Color3 {
    let b_in_a_space = color_convert(b, a.space);
    Color3 {
        c: [a.c[0] + b_in_a_space.c[0], a.c[1] + b_in_a_space.c[1], a.c[2] + b_in_a_space.c[2]],
        space: a.space,
    }
}
