use image::{Rgb, RgbImage};
use rand::Rng;

/// Random perturbations applied to training images, one draw per sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Augmentation {
	/// Maximum shear angle in degrees, drawn from `[-shear_range, shear_range]`.
	pub shear_range: f32,
	/// Zoom factors for x and y are drawn independently from `[1 - zoom_range, 1 + zoom_range]`.
	pub zoom_range: f32,
	pub horizontal_flip: bool,
}

impl Augmentation {
	pub fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
		let shear = if self.shear_range > 0.0 {
			rng.gen_range(-self.shear_range..=self.shear_range).to_radians()
		} else {
			0.0
		};

		let (zoom_x, zoom_y) = if self.zoom_range > 0.0 {
			let range = (1.0 - self.zoom_range)..=(1.0 + self.zoom_range);
			(rng.gen_range(range.clone()), rng.gen_range(range))
		} else {
			(1.0, 1.0)
		};

		let mut image = shear_zoom(&image, shear, zoom_x, zoom_y);
		maybe_hflip(&mut image, self.horizontal_flip, rng);
		image
	}
}

pub fn maybe_hflip<R: Rng + ?Sized>(image: &mut RgbImage, enabled: bool, rng: &mut R) {
	if enabled && rng.gen_bool(0.5) {
		image::imageops::flip_horizontal_in_place(image);
	}
}

/// Resample `image` through a shear (radians) and per-axis zoom about its centre.
///
/// Each output pixel reads the input at `M * (p - c) + c` with bilinear
/// interpolation. Coordinates falling outside are clamped to the nearest edge.
pub fn shear_zoom(image: &RgbImage, shear: f32, zoom_x: f32, zoom_y: f32) -> RgbImage {
	let (width, height) = image.dimensions();
	if width == 0 || height == 0 || (shear == 0.0 && zoom_x == 1.0 && zoom_y == 1.0) {
		return image.clone();
	}

	let cx = (width as f32 - 1.0) / 2.0;
	let cy = (height as f32 - 1.0) / 2.0;

	let m00 = zoom_x;
	let m01 = -shear.sin() * zoom_y;
	let m11 = shear.cos() * zoom_y;

	RgbImage::from_fn(width, height, |x, y| {
		let dx = x as f32 - cx;
		let dy = y as f32 - cy;
		let sx = m00 * dx + m01 * dy + cx;
		let sy = m11 * dy + cy;
		bilinear(image, sx, sy)
	})
}

fn bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
	let (width, height) = image.dimensions();
	let x = x.clamp(0.0, (width - 1) as f32);
	let y = y.clamp(0.0, (height - 1) as f32);

	let x0 = x.floor() as u32;
	let y0 = y.floor() as u32;
	let x1 = (x0 + 1).min(width - 1);
	let y1 = (y0 + 1).min(height - 1);
	let fx = x - x0 as f32;
	let fy = y - y0 as f32;

	let p00 = image.get_pixel(x0, y0);
	let p10 = image.get_pixel(x1, y0);
	let p01 = image.get_pixel(x0, y1);
	let p11 = image.get_pixel(x1, y1);

	let mut out = [0u8; 3];
	for c in 0..3 {
		let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
		let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
		out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
	}
	Rgb(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn gradient(width: u32, height: u32) -> RgbImage {
		RgbImage::from_fn(width, height, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 128]))
	}

	#[test]
	fn identity_transform_keeps_pixels() {
		let image = gradient(8, 6);

		assert_eq!(shear_zoom(&image, 0.0, 1.0, 1.0), image);
	}

	#[test]
	fn zoom_in_samples_closer_to_centre() {
		let image = gradient(9, 9);

		let zoomed = shear_zoom(&image, 0.0, 0.5, 0.5);

		// Corner (0, 0) reads input (2, 2) when halving the sampling distance.
		assert_eq!(zoomed.get_pixel(0, 0), &Rgb([20, 20, 128]));
		assert_eq!(zoomed.get_pixel(4, 4), image.get_pixel(4, 4));
	}

	#[test]
	fn zoom_out_clamps_to_edges() {
		let image = gradient(9, 9);

		let zoomed = shear_zoom(&image, 0.0, 2.0, 2.0);

		assert_eq!(zoomed.get_pixel(0, 0), image.get_pixel(0, 0));
		assert_eq!(zoomed.get_pixel(8, 8), image.get_pixel(8, 8));
		assert_eq!(zoomed.get_pixel(1, 4), &Rgb([0, 40, 128]));
	}

	#[test]
	fn empty_image_passes_through() {
		let augmentation = Augmentation { shear_range: 0.2, zoom_range: 0.2, horizontal_flip: true };

		assert_eq!(shear_zoom(&RgbImage::new(0, 0), 0.3, 0.8, 1.2).dimensions(), (0, 0));
		assert_eq!(augmentation.apply(RgbImage::new(0, 5), &mut StdRng::seed_from_u64(3)).dimensions(), (0, 5));
	}

	#[test]
	fn augmentation_keeps_dimensions() {
		let augmentation = Augmentation { shear_range: 0.2, zoom_range: 0.2, horizontal_flip: true };
		let mut rng = StdRng::seed_from_u64(42);

		for _ in 0..10 {
			let out = augmentation.apply(gradient(12, 7), &mut rng);
			assert_eq!(out.dimensions(), (12, 7));
		}
	}

	#[test]
	fn seeded_augmentation_is_reproducible() {
		let augmentation = Augmentation { shear_range: 0.2, zoom_range: 0.2, horizontal_flip: true };

		let a = augmentation.apply(gradient(16, 16), &mut StdRng::seed_from_u64(1));
		let b = augmentation.apply(gradient(16, 16), &mut StdRng::seed_from_u64(1));

		assert_eq!(a, b);
	}

	#[test]
	fn flip_mirrors_columns() {
		let image = gradient(4, 1);
		let mut rng = StdRng::seed_from_u64(0);
		let mut flipped = image.clone();

		// Keep drawing until the coin lands on a flip.
		while flipped == image {
			maybe_hflip(&mut flipped, true, &mut rng);
		}

		assert_eq!(flipped.get_pixel(0, 0), image.get_pixel(3, 0));
	}

	#[test]
	fn disabled_flip_never_flips() {
		let image = gradient(4, 1);
		let mut rng = StdRng::seed_from_u64(0);
		let mut copy = image.clone();

		for _ in 0..20 {
			maybe_hflip(&mut copy, false, &mut rng);
		}

		assert_eq!(copy, image);
	}
}
