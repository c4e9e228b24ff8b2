//! Color model and RGB → CIE Lab conversion
//!
//! Nearest-color search compares products in CIE L*a*b* space, where the
//! Euclidean distance between two colors tracks perceived difference far
//! better than distance between raw RGB triples.
//!
//! Conversion path: sRGB (gamma encoded, 0-255) → linear RGB → CIE XYZ
//! (D65 white point) → CIE L*a*b*.

use serde::{Deserialize, Serialize};

/// D65 reference white, normalized so Y = 1.0
const WHITE_X: f64 = 0.950_47;
const WHITE_Y: f64 = 1.000_00;
const WHITE_Z: f64 = 1.088_83;

/// CIE constant (6/29)^3
const EPSILON: f64 = 0.008_856;
/// CIE constant (29/6)^2 / 3
const KAPPA_SLOPE: f64 = 7.787;

/// Gamma-encoded sRGB color, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Convert to CIE L*a*b*
    pub fn to_lab(self) -> Lab {
        to_perceptual(self)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// CIE L*a*b* color
///
/// `l` is lightness in [0, 100]; `a` and `b` are the green-red and
/// blue-yellow opponent axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// Euclidean distance (CIE76 ΔE)
    pub fn distance(&self, other: &Lab) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

/// Convert an sRGB color to CIE L*a*b*.
///
/// Total and deterministic: every `u8` triple is in range by construction.
pub fn to_perceptual(rgb: Rgb) -> Lab {
    let r = linearize(rgb.red);
    let g = linearize(rgb.green);
    let b = linearize(rgb.blue);

    let x = (r * 0.4124 + g * 0.3576 + b * 0.1805) / WHITE_X;
    let y = (r * 0.2126 + g * 0.7152 + b * 0.0722) / WHITE_Y;
    let z = (r * 0.0193 + g * 0.1192 + b * 0.9505) / WHITE_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Undo sRGB gamma encoding
fn linearize(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c > 0.040_45 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        KAPPA_SLOPE * t + 16.0 / 116.0
    }
}

/// A product's dominant color, carried in both representations.
///
/// The Lab value is always derived from the RGB value; there is no way to
/// build one without the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductColor {
    rgb: Rgb,
    lab: Lab,
}

impl ProductColor {
    pub fn from_rgb(rgb: Rgb) -> Self {
        Self {
            rgb,
            lab: to_perceptual(rgb),
        }
    }

    pub fn rgb(&self) -> Rgb {
        self.rgb
    }

    pub fn lab(&self) -> Lab {
        self.lab
    }
}

impl From<Rgb> for ProductColor {
    fn from(rgb: Rgb) -> Self {
        Self::from_rgb(rgb)
    }
}
