use crate::augment::Augmentation;
use crate::config::PrepareConfig;
use crate::error::PrepError;
use crate::materialize::ClassBucket;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::{Backend, Int};
use burn::tensor::{Tensor, TensorData};
use image::imageops::FilterType;
use image::RgbImage;
use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// 1/255, applied to every decoded pixel.
pub const RESCALE: f32 = 1.0 / 255.0;

#[derive(Debug, Clone)]
pub struct LesionItem {
	pub path: PathBuf,
	pub label: usize,
}

/// Image files under `{root}/{class}/` for a fixed list of classes.
///
/// Other folders under the root are never looked at. Labels follow the
/// alphabetical order of the class names.
pub struct LesionFolderDataset {
	items: Vec<LesionItem>,
	classes: Vec<String>,
}

impl LesionFolderDataset {
	pub fn new<A: AsRef<Path>>(root: A, classes: &[&str]) -> Result<Self, PrepError> {
		let root = root.as_ref();
		let mut classes: Vec<String> = classes.iter().map(|class| class.to_string()).collect();
		classes.sort();

		let mut items = Vec::new();
		for (label, class) in classes.iter().enumerate() {
			let class_dir = root.join(class);
			if !class_dir.is_dir() {
				return Err(PrepError::FolderNotFound(class_dir));
			}

			let mut paths = Vec::new();
			for entry in class_dir.read_dir()? {
				let path = entry?.path();
				if path.is_file() && has_image_extension(&path) {
					paths.push(path);
				}
			}
			paths.sort();

			items.extend(paths.into_iter().map(|path| LesionItem { path, label }));
		}

		Ok(Self { items, classes })
	}

	pub fn lesion_classes<A: AsRef<Path>>(root: A) -> Result<Self, PrepError> {
		let classes = ClassBucket::ALL.map(ClassBucket::dir_name);
		Self::new(root, &classes)
	}

	pub fn class_indices(&self) -> BTreeMap<String, usize> {
		self.classes.iter().enumerate().map(|(index, class)| (class.clone(), index)).collect()
	}
}

impl Dataset<LesionItem> for LesionFolderDataset {
	fn get(&self, index: usize) -> Option<LesionItem> {
		self.items.get(index).cloned()
	}

	fn len(&self) -> usize {
		self.items.len()
	}
}

fn has_image_extension(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
		.unwrap_or(false)
}

/// Decodes, resizes, augments and rescales one image.
#[derive(Debug, Clone, Copy)]
pub struct ImageLoader {
	pub image_size: u32,
	pub augmentation: Option<Augmentation>,
	pub seed: Option<u64>,
}

impl ImageLoader {
	/// Pixels in CHW order scaled to [0, 1]. `draw` selects the augmentation
	/// stream when a seed is set.
	pub fn load(&self, path: &Path, draw: u64) -> Result<Vec<f32>, PrepError> {
		let image = image::open(path).map_err(|source| PrepError::Image { path: path.to_path_buf(), source })?.to_rgb8();
		let image = image::imageops::resize(&image, self.image_size, self.image_size, FilterType::Nearest);

		let image = match (self.augmentation, self.seed) {
			(Some(augmentation), Some(seed)) => augmentation.apply(image, &mut StdRng::seed_from_u64(seed.wrapping_add(draw))),
			(Some(augmentation), None) => augmentation.apply(image, &mut rand::thread_rng()),
			(None, _) => image,
		};

		Ok(to_chw(&image))
	}

	fn blank(&self) -> Vec<f32> {
		vec![0.0; 3 * (self.image_size * self.image_size) as usize]
	}
}

fn to_chw(image: &RgbImage) -> Vec<f32> {
	let plane = (image.width() * image.height()) as usize;
	let mut out = vec![0.0; 3 * plane];

	for (i, pixel) in image.pixels().enumerate() {
		for c in 0..3 {
			out[c * plane + i] = pixel[c] as f32 * RESCALE;
		}
	}

	out
}

/// Turns items into tensors. Decoding inside a batch runs on its own rayon
/// pool; `num_workers` of 0 lets rayon pick the thread count.
#[derive(Clone)]
pub struct LesionBatcher<B: Backend> {
	device: B::Device,
	loader: ImageLoader,
	pool: Arc<ThreadPool>,
	draws: Arc<AtomicU64>,
}

impl<B: Backend> LesionBatcher<B> {
	pub fn new(device: B::Device, loader: ImageLoader, num_workers: usize) -> Result<Self, PrepError> {
		let pool = ThreadPoolBuilder::new().num_threads(num_workers).thread_name(|i| format!("lesion-decode-{i}")).build()?;

		Ok(Self {
			device,
			loader,
			pool: Arc::new(pool),
			draws: Arc::new(AtomicU64::new(0)),
		})
	}
}

#[derive(Debug, Clone)]
pub struct LesionBatch<B: Backend> {
	/// `[batch, 3, image_size, image_size]`
	pub images: Tensor<B, 4>,
	pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<LesionItem, LesionBatch<B>> for LesionBatcher<B> {
	fn batch(&self, items: Vec<LesionItem>) -> LesionBatch<B> {
		let loader = self.loader;
		let first_draw = self.draws.fetch_add(items.len() as u64, Ordering::Relaxed);

		let pixels: Vec<Vec<f32>> = self.pool.install(|| {
			items
				.par_iter()
				.enumerate()
				.map(|(i, item)| {
					loader.load(&item.path, first_draw + i as u64).unwrap_or_else(|err| {
						warn!("{err}, using a blank image");
						loader.blank()
					})
				})
				.collect()
		});

		let side = loader.image_size as usize;
		let images = TensorData::new(pixels.concat(), [items.len(), 3, side, side]);
		let images = Tensor::<B, 4>::from_data(images.convert::<B::FloatElem>(), &self.device);

		let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
		let targets = TensorData::new(labels, [items.len()]);
		let targets = Tensor::<B, 1, Int>::from_data(targets.convert::<B::IntElem>(), &self.device);

		LesionBatch { images, targets }
	}
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
	pub image_size: u32,
	pub batch_size: usize,
	pub num_workers: usize,
	pub shuffle_seed: u64,
	pub augmentation: Option<Augmentation>,
	pub augment_seed: Option<u64>,
}

impl StreamOptions {
	pub fn train(config: &PrepareConfig) -> Self {
		Self {
			augmentation: Some(Augmentation {
				shear_range: config.shear_range,
				zoom_range: config.zoom_range,
				horizontal_flip: config.horizontal_flip,
			}),
			..Self::validation(config)
		}
	}

	pub fn validation(config: &PrepareConfig) -> Self {
		Self {
			image_size: config.image_size,
			batch_size: config.batch_size,
			num_workers: config.num_workers,
			shuffle_seed: config.seed,
			augmentation: None,
			augment_seed: config.augment_seed,
		}
	}

	pub fn validate(&self) -> Result<(), PrepError> {
		if self.image_size == 0 {
			return Err(PrepError::Config("image_size must be at least 1".to_string()));
		}
		if self.batch_size == 0 {
			return Err(PrepError::Config("batch_size must be at least 1".to_string()));
		}
		Ok(())
	}
}

/// Restartable source of `LesionBatch`es read from one split folder.
pub struct BatchStream<B: Backend> {
	loader: Arc<dyn DataLoader<LesionBatch<B>>>,
	class_indices: BTreeMap<String, usize>,
	num_items: usize,
}

impl<B: Backend> BatchStream<B> {
	/// Batches are drawn from a single loader so every batch is a shuffled
	/// sample of the whole folder. `num_workers` only sizes the decoding pool.
	pub fn from_directory<A: AsRef<Path>>(root: A, options: &StreamOptions, device: B::Device) -> Result<Self, PrepError> {
		options.validate()?;

		let dataset = LesionFolderDataset::lesion_classes(root)?;
		let class_indices = dataset.class_indices();
		let num_items = dataset.len();

		let batcher = LesionBatcher::<B>::new(
			device,
			ImageLoader {
				image_size: options.image_size,
				augmentation: options.augmentation,
				seed: options.augment_seed,
			},
			options.num_workers,
		)?;

		let loader = DataLoaderBuilder::new(batcher).batch_size(options.batch_size).shuffle(options.shuffle_seed).build(dataset);

		Ok(Self { loader, class_indices, num_items })
	}

	pub fn class_indices(&self) -> &BTreeMap<String, usize> {
		&self.class_indices
	}

	pub fn num_items(&self) -> usize {
		self.num_items
	}

	/// One shuffled pass over the folder. Each call starts from the beginning.
	pub fn epoch(&self) -> impl Iterator<Item = LesionBatch<B>> + '_ {
		self.loader.iter()
	}

	/// Exactly `steps` batches, wrapping into new epochs as needed.
	/// Yields nothing when the folder holds no images.
	pub fn steps(&self, steps: usize) -> impl Iterator<Item = LesionBatch<B>> + '_ {
		let steps = if self.num_items == 0 { 0 } else { steps };

		std::iter::repeat(()).flat_map(move |_| self.epoch()).take(steps)
	}
}
