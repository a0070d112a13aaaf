//! Size string parsing and aspect-ratio bucketing

use crate::config::AspectRatios;

/// Coarse orientation of a requested image size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectBucket {
    Wide,
    Tall,
    Square,
}

impl AspectBucket {
    /// Bucket for a `WIDTHxHEIGHT` string. Anything unparsable is square.
    pub fn from_size(size: &str) -> Self {
        match parse_dimensions(size) {
            Some((width, height)) if width > height => AspectBucket::Wide,
            Some((width, height)) if width < height => AspectBucket::Tall,
            _ => AspectBucket::Square,
        }
    }

    pub fn ratio<'a>(&self, ratios: &'a AspectRatios) -> &'a str {
        match self {
            AspectBucket::Wide => &ratios.wide,
            AspectBucket::Tall => &ratios.tall,
            AspectBucket::Square => &ratios.square,
        }
    }
}

/// Split `WIDTHxHEIGHT` into its two positive integers
pub fn parse_dimensions(size: &str) -> Option<(u32, u32)> {
    let (width, height) = size.trim().split_once(['x', 'X'])?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}
