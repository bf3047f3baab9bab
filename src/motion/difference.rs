use anyhow::{anyhow, Result};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use imageproc::point::Point;

/// Intensity change a pixel must exceed to count as changed.
pub const PIXEL_DELTA_THRESHOLD: u8 = 25;

/// Passes of 3x3 dilation applied to the threshold mask.
pub const DILATE_ITERATIONS: u8 = 2;

const MASK_ON: u8 = 255;

/// Axis-aligned box around a region, in pixels of the preprocessed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One external contour of the changed-pixel mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub bounds: BoundingBox,
    /// Area enclosed by the contour polygon.
    pub area: f64,
}

/// Everything the extractor derives from one reference/current pair.
pub struct Difference {
    /// Per-pixel absolute intensity difference.
    pub delta: GrayImage,
    /// Dilated binary mask of changed pixels.
    pub mask: GrayImage,
    pub regions: Vec<Region>,
}

#[derive(Clone, Debug)]
pub struct DifferenceExtractor {
    threshold: u8,
    dilate_iterations: u8,
}

impl DifferenceExtractor {
    pub fn new(threshold: u8, dilate_iterations: u8) -> Self {
        Self {
            threshold,
            dilate_iterations,
        }
    }

    pub fn extract(&self, reference: &GrayImage, current: &GrayImage) -> Result<Difference> {
        let delta = absolute_difference(reference, current)?;
        let mask = threshold_mask(&delta, self.threshold);
        let mask = dilate_mask(mask, self.dilate_iterations);
        let regions = external_regions(&mask);
        Ok(Difference {
            delta,
            mask,
            regions,
        })
    }
}

impl Default for DifferenceExtractor {
    fn default() -> Self {
        Self::new(PIXEL_DELTA_THRESHOLD, DILATE_ITERATIONS)
    }
}

pub fn absolute_difference(reference: &GrayImage, current: &GrayImage) -> Result<GrayImage> {
    if reference.dimensions() != current.dimensions() {
        return Err(anyhow!(
            "frame size {:?} does not match reference {:?}",
            current.dimensions(),
            reference.dimensions()
        ));
    }
    let (width, height) = reference.dimensions();
    let pixels = reference
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .map(|(a, b)| a.abs_diff(*b))
        .collect();
    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("delta buffer does not fit {}x{}", width, height))
}

/// Pixels strictly above `threshold` become 255, everything else 0.
pub fn threshold_mask(delta: &GrayImage, threshold: u8) -> GrayImage {
    let mut mask = delta.clone();
    for pixel in mask.pixels_mut() {
        *pixel = Luma([if pixel[0] > threshold { MASK_ON } else { 0 }]);
    }
    mask
}

pub fn dilate_mask(mut mask: GrayImage, iterations: u8) -> GrayImage {
    for _ in 0..iterations {
        mask = dilate(&mask, Norm::LInf, 1);
    }
    mask
}

/// Outer borders that are not nested inside another shape.
pub fn external_regions(mask: &GrayImage) -> Vec<Region> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let bounds = bounding_box(&c.points)?;
            Some(Region {
                bounds,
                area: polygon_area(&c.points),
            })
        })
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(BoundingBox {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([0]))
    }

    fn fill(image: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
        for yy in y..y + h {
            for xx in x..x + w {
                image.put_pixel(xx, yy, Luma([value]));
            }
        }
    }

    #[test]
    fn identical_frames_have_no_regions() -> Result<()> {
        let mut frame = blank(40, 30);
        fill(&mut frame, 5, 5, 10, 10, 200);
        let diff = DifferenceExtractor::default().extract(&frame, &frame.clone())?;
        assert!(diff.regions.is_empty());
        assert!(diff.delta.pixels().all(|p| p[0] == 0));
        Ok(())
    }

    #[test]
    fn changed_block_becomes_one_region() -> Result<()> {
        let reference = blank(60, 40);
        let mut current = reference.clone();
        fill(&mut current, 20, 10, 10, 10, 200);

        let diff = DifferenceExtractor::default().extract(&reference, &current)?;
        assert_eq!(diff.regions.len(), 1);

        // Two dilation passes grow the 10x10 block by two pixels on every side.
        let region = &diff.regions[0];
        assert_eq!(
            region.bounds,
            BoundingBox {
                x: 18,
                y: 8,
                width: 14,
                height: 14
            }
        );
        assert_eq!(region.area, 169.0);
        Ok(())
    }

    #[test]
    fn small_changes_stay_below_threshold() -> Result<()> {
        let reference = GrayImage::from_pixel(20, 20, Luma([100]));
        let current = GrayImage::from_pixel(20, 20, Luma([100 + PIXEL_DELTA_THRESHOLD]));
        let diff = DifferenceExtractor::default().extract(&reference, &current)?;
        assert!(diff.regions.is_empty());
        assert!(diff.mask.pixels().all(|p| p[0] == 0));
        Ok(())
    }

    #[test]
    fn nearby_fragments_merge_after_dilation() -> Result<()> {
        let reference = blank(40, 20);
        let mut current = reference.clone();
        fill(&mut current, 10, 5, 4, 4, 255);
        fill(&mut current, 17, 5, 4, 4, 255);

        let undilated = DifferenceExtractor::new(PIXEL_DELTA_THRESHOLD, 0)
            .extract(&reference, &current)?;
        assert_eq!(undilated.regions.len(), 2);

        let dilated = DifferenceExtractor::default().extract(&reference, &current)?;
        assert_eq!(dilated.regions.len(), 1);
        Ok(())
    }

    #[test]
    fn nested_shapes_are_not_external() {
        let mut mask = blank(30, 30);
        fill(&mut mask, 2, 2, 26, 26, MASK_ON);
        fill(&mut mask, 6, 6, 18, 18, 0);
        fill(&mut mask, 12, 12, 4, 4, MASK_ON);

        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds.width, 26);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let result = absolute_difference(&blank(4, 4), &blank(5, 4));
        assert!(result.is_err());
    }

    #[test]
    fn polygon_area_of_square() {
        let square = [
            Point::new(0, 0),
            Point::new(9, 0),
            Point::new(9, 9),
            Point::new(0, 9),
        ];
        assert_eq!(polygon_area(&square), 81.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }
}
