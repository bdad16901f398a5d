use image::{GrayImage, ImageBuffer, Luma};
use imageproc::morphology::{
    grayscale_close, grayscale_dilate, grayscale_erode, grayscale_open, Mask,
};

/// Binary structuring element with an anchor at `(width / 2, height / 2)`,
/// turned into an imageproc [`Mask`] for the grayscale operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StructuringElement {
    width: u32,
    height: u32,
    mask: Vec<bool>,
}

impl StructuringElement {
    pub(super) fn rect(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mask: vec![true; (width * height) as usize],
        }
    }

    /// Ellipse inscribed in the `width × height` box, rasterized row by row from
    /// the half-width at each vertical offset. Even sizes give an asymmetric shape.
    pub(super) fn ellipse(width: u32, height: u32) -> Self {
        let r = (height / 2) as i64;
        let c = (width / 2) as i64;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let mut mask = vec![false; (width * height) as usize];
        for row in 0..height as i64 {
            let dy = row - r;
            if dy.abs() > r {
                continue;
            }
            let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i64;
            let start = (c - dx).max(0);
            let end = (c + dx + 1).min(width as i64);
            for col in start..end {
                mask[(row * width as i64 + col) as usize] = true;
            }
        }
        Self { width, height, mask }
    }

    /// Nonzero pixels of the rasterized element, anchored at its center.
    pub(super) fn mask(&self) -> Mask {
        let image: GrayImage = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            Luma([if self.mask[(y * self.width + x) as usize] { 255 } else { 0 }])
        });
        Mask::from_image(&image, (self.width / 2) as u8, (self.height / 2) as u8)
    }
}

/// Close (ellipse 4) → open (ellipse 3) → dilate (rect 3, ×2) → erode (ellipse 2).
pub(super) fn clean_up(binary: &GrayImage) -> GrayImage {
    let closed = grayscale_close(binary, &StructuringElement::ellipse(4, 4).mask());
    let opened = grayscale_open(&closed, &StructuringElement::ellipse(3, 3).mask());
    let grow = StructuringElement::rect(3, 3).mask();
    let dilated = grayscale_dilate(&grayscale_dilate(&opened, &grow), &grow);
    grayscale_erode(&dilated, &StructuringElement::ellipse(2, 2).mask())
}
