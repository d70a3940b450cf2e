//! Screen regions and their mapping onto pixel rectangles.
//!
//! A [`Region`] places a box on a normalised grid where both axes run from
//! -1 to 1 and +1 on the vertical axis is the top of the frame:
//!
//! ```text
//!            1
//!            |
//!   -1 ------+------ 1
//!            |
//!           -1
//! ```
//!
//! The box size is expressed as a percentage of the frame, so the same region
//! works for any capture resolution.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ChromaticError, Result};

/// Identifier of the physical light a region feeds.
pub type RegionId = u32;

const BORDER_THICKNESS: u32 = 5;
const BORDER_LENGTH: u32 = 100;

/// Common sampling layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Top,
    Bottom,
    Left,
    Right,
    Whole,
}

impl Preset {
    /// Builds the region this preset describes for the given light.
    pub fn region(self, id: RegionId) -> Region {
        let (center_x, center_y, width_pct, height_pct) = match self {
            Preset::Top => (0.0, 1.0, BORDER_LENGTH, BORDER_THICKNESS),
            Preset::Bottom => (0.0, -1.0, BORDER_LENGTH, BORDER_THICKNESS),
            Preset::Left => (-1.0, 0.0, BORDER_THICKNESS, BORDER_LENGTH),
            Preset::Right => (1.0, 0.0, BORDER_THICKNESS, BORDER_LENGTH),
            Preset::Whole => (0.0, 0.0, BORDER_LENGTH, BORDER_LENGTH),
        };

        Region {
            id,
            center_x,
            center_y,
            width_pct,
            height_pct,
        }
    }
}

impl FromStr for Preset {
    type Err = ChromaticError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "top" => Ok(Preset::Top),
            "bottom" => Ok(Preset::Bottom),
            "left" => Ok(Preset::Left),
            "right" => Ok(Preset::Right),
            "whole" => Ok(Preset::Whole),
            other => Err(ChromaticError::invalid(format!("unknown preset `{other}`"))),
        }
    }
}

/// Declarative description of the screen area mapped to one light.
///
/// Fields are private so every instance has gone through [`Region::new`] (or a
/// [`Preset`]) and satisfies the coordinate and percentage bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    id: RegionId,
    center_x: f64,
    center_y: f64,
    width_pct: u32,
    height_pct: u32,
}

impl Region {
    /// Validates and builds a region. Centre coordinates must lie in
    /// `[-1, 1]`, percentages in `1..=100`.
    pub fn new(
        id: RegionId,
        center_x: f64,
        center_y: f64,
        width_pct: u32,
        height_pct: u32,
    ) -> Result<Self> {
        for (axis, value) in [("x", center_x), ("y", center_y)] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ChromaticError::invalid(format!(
                    "region {id}: centre {axis} {value} is outside [-1, 1]"
                )));
            }
        }

        for (axis, value) in [("width", width_pct), ("height", height_pct)] {
            if !(1..=100).contains(&value) {
                return Err(ChromaticError::invalid(format!(
                    "region {id}: {axis} {value}% is outside (0, 100]"
                )));
            }
        }

        Ok(Self {
            id,
            center_x,
            center_y,
            width_pct,
            height_pct,
        })
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn size_pct(&self) -> (u32, u32) {
        (self.width_pct, self.height_pct)
    }

    /// Maps the normalised centre onto pixel space for a `width` x `height`
    /// frame. (-1, 1) lands on the top-left corner, (1, -1) on the
    /// bottom-right one.
    pub fn center_point(&self, width: u32, height: u32) -> PixelPoint {
        let x = (self.center_x + 1.0) * (f64::from(width) / 2.0);
        let y = (1.0 - self.center_y) * (f64::from(height) / 2.0);

        PixelPoint {
            x: x as u32,
            y: y as u32,
        }
    }

    /// Converts the region into a pixel rectangle for the current frame.
    ///
    /// The rectangle always spans the full box size, so only a box that rounds
    /// down to zero pixels yields an empty rectangle. A box that would spill
    /// over an edge is pinned flush against that edge instead of being
    /// shrunk. Each axis is handled independently.
    pub fn rectangle(&self, width: u32, height: u32) -> PixelRect {
        let center = self.center_point(width, height);
        let box_width = width * self.width_pct / 100;
        let box_height = height * self.height_pct / 100;

        let (left, right) = place_span(center.x, box_width, width);
        let (top, bottom) = place_span(center.y, box_height, height);

        PixelRect {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Places a span of exactly `size` pixels around `center` within
/// `[0, limit]`. `size` never exceeds `limit`.
fn place_span(center: u32, size: u32, limit: u32) -> (u32, u32) {
    let half = size / 2;

    let start = if center < half {
        0
    } else if center - half + size > limit {
        limit - size
    } else {
        center - half
    };

    (start, start + size)
}

/// A position on the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

/// Half-open pixel rectangle `[left, right) x [top, bottom)`, always contained
/// in the frame it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Number of pixels covered by the rectangle.
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.left, self.top, self.right, self.bottom
        )
    }
}
