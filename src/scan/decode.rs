// src/scan/decode.rs

use image::DynamicImage;
use std::path::Path;
use tracing::debug;

use crate::error::ScanError;

/// 8-bit grayscale pixel buffer, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl Frame {
    /// Returns `None` if `luma` does not hold exactly `width * height` pixels.
    pub fn from_luma(width: u32, height: u32, luma: Vec<u8>) -> Option<Self> {
        if luma.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            luma,
        })
    }

    /// Colour images are converted to grayscale; grayscale images pass through.
    pub fn from_image(img: &DynamicImage) -> Self {
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();
        Self {
            width,
            height,
            luma: gray.into_raw(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let img = image::open(path.as_ref())?;
        Ok(Self::from_image(&img))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScanError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&img))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.luma.is_empty()
    }

    /// Luma at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.luma
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// One decoded barcode region: raw payload plus its boundary in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub data: Vec<u8>,
    pub polygon: Vec<Point>,
}

impl Symbol {
    /// Boundary to draw around the symbol. Anything beyond a quadrilateral
    /// is reduced to its convex hull.
    pub fn outline(&self) -> Vec<Point> {
        if self.polygon.len() > 4 {
            convex_hull(&self.polygon)
        } else {
            self.polygon.clone()
        }
    }
}

/// Finds and decodes every symbol in a frame.
pub trait SymbolDecoder {
    fn decode(&self, frame: &Frame) -> Vec<Symbol>;
}

/// QR decoder backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl SymbolDecoder for QrDecoder {
    fn decode(&self, frame: &Frame) -> Vec<Symbol> {
        if frame.is_empty() {
            return Vec::new();
        }
        let width = frame.width as usize;
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width,
            frame.height as usize,
            |x, y| frame.luma[y * width + x],
        );

        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| {
                let mut data = Vec::new();
                match grid.decode_to(&mut data) {
                    Ok(_) => Some(Symbol {
                        data,
                        polygon: grid.bounds.iter().map(|p| Point { x: p.x, y: p.y }).collect(),
                    }),
                    Err(e) => {
                        debug!("grid found but not decodable: {}", e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Andrew's monotone chain, counter-clockwise, no repeated endpoint.
fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort();
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point, a: Point, b: Point) -> i64 {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    }

    let mut lower: Vec<Point> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}
