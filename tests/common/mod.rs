#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use dishmatch::{AppError, Embedder, FeatureExtractor};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use ndarray::{s, Array4};

/// Mean color of each cell of a 4x4 grid, plus a constant term.
///
/// Deterministic and cheap; identical images map to identical vectors and
/// differently colored images point in clearly different directions.
#[derive(Debug)]
pub struct GridMeans;

impl FeatureExtractor for GridMeans {
    fn extract(&self, input: &Array4<f32>) -> Result<Vec<f32>, AppError> {
        let (_, channels, height, width) = input.dim();
        let (cell_h, cell_w) = (height / 4, width / 4);
        let mut features = Vec::with_capacity(channels * 16 + 1);
        for c in 0..channels {
            for gy in 0..4 {
                for gx in 0..4 {
                    let cell = input.slice(s![
                        0,
                        c,
                        gy * cell_h..(gy + 1) * cell_h,
                        gx * cell_w..(gx + 1) * cell_w
                    ]);
                    features.push(cell.mean().unwrap_or(0.0) - 0.5);
                }
            }
        }
        features.push(0.1);
        Ok(features)
    }

    fn name(&self) -> &str {
        "grid-means"
    }
}

pub fn embedder() -> Embedder {
    Embedder::new(Arc::new(GridMeans), 32)
}

pub fn solid_image(rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(48, 48, image::Rgb(rgb)))
}

/// Left half one color, right half another
pub fn split_image(left: [u8; 3], right: [u8; 3]) -> DynamicImage {
    let mut img = RgbImage::new(48, 48);
    for (x, _, pixel) in img.enumerate_pixels_mut() {
        *pixel = image::Rgb(if x < 24 { left } else { right });
    }
    DynamicImage::ImageRgb8(img)
}

pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
    buf.into_inner()
}
