use std::fmt;

use serde::{Deserialize, Serialize};

/// D65 reference white in XYZ.
const D65: [f64; 3] = [0.95047, 1.00000, 1.08883];

/// Normalised sRGB colour with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Builds a colour from straight (non-premultiplied) 8-bit channels.
    /// A fully transparent pixel carries no colour and maps to black.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        if a == 0 {
            return Self::BLACK;
        }

        Self {
            r: f64::from(r) / 255.0,
            g: f64::from(g) / 255.0,
            b: f64::from(b) / 255.0,
        }
    }

    pub fn to_rgb8(&self) -> [u8; 3] {
        [self.r, self.g, self.b].map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8)
    }

    pub fn hex(&self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Linear-light RGB, undoing the sRGB transfer curve.
    pub fn linear_rgb(&self) -> [f64; 3] {
        [self.r, self.g, self.b].map(linearize)
    }

    /// CIE XYZ under the D65 illuminant.
    pub fn xyz(&self) -> [f64; 3] {
        let [r, g, b] = self.linear_rgb();
        [
            0.41239079926595948 * r + 0.35758433938387796 * g + 0.18048078840183429 * b,
            0.21263900587151036 * r + 0.71516867876775593 * g + 0.072192315360733715 * b,
            0.019330818715591851 * r + 0.11919477979462599 * g + 0.95053215224966058 * b,
        ]
    }

    /// CIE xyY chromaticity plus luminance, the representation light-stream
    /// sinks consume. Black has no chromaticity and reports the white point.
    pub fn xyy(&self) -> [f64; 3] {
        let [x, y, z] = self.xyz();
        let sum = x + y + z;

        if sum.abs() < 1e-14 {
            let white = D65[0] + D65[1] + D65[2];
            [D65[0] / white, D65[1] / white, y]
        } else {
            [x / sum, y / sum, y]
        }
    }

    /// Single precision `[x, y, Y]` triple as pushed to the light stream.
    pub fn chromaticity(&self) -> [f32; 3] {
        self.xyy().map(|c| c as f32)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

fn linearize(channel: f64) -> f64 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}
