use crate::error::PrepError;
use burn::config::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const IMAGE_ARCHIVE_URL: &str = "https://isic-challenge-data.s3.amazonaws.com/2020/ISIC_2020_Training_JPEG.zip";
pub const METADATA_URL: &str = "https://isic-challenge-data.s3.amazonaws.com/2020/ISIC_2020_Training_GroundTruth.csv";

/// Diagnoses seen fewer times than this are folded into [`OTHER_DIAGNOSIS`].
pub const RARE_CLASS_THRESHOLD: usize = 100;
pub const OTHER_DIAGNOSIS: &str = "other";
pub const MELANOMA_DIAGNOSIS: &str = "melanoma";

/// Which column of the metadata drives the stratified split.
///
/// The split key and the training label are deliberately separate: the label is
/// always the binary melanoma flag, while stratification defaults to the
/// diagnosis as it appeared before rare classes were collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum StratifyKey {
	RawDiagnosis,
	CollapsedDiagnosis,
	Label,
}

#[derive(Config)]
pub struct PrepareConfig {
	#[config(default = "PathBuf::from(\"data\")")]
	pub data_dir: PathBuf,
	#[config(default = "IMAGE_ARCHIVE_URL.to_string()")]
	pub image_archive_url: String,
	#[config(default = "METADATA_URL.to_string()")]
	pub metadata_url: String,
	#[config(default = "String::from(\"ISIC_2020_Training_JPEG\")")]
	pub archive_dir_name: String,
	#[config(default = "String::from(\"train\")")]
	pub source_subdir: String,
	#[config(default = "String::from(\"melanoma_split\")")]
	pub output_dir_name: String,
	#[config(default = 42)]
	pub seed: u64,
	#[config(default = 0.2)]
	pub test_size: f64,
	#[config(default = "StratifyKey::RawDiagnosis")]
	pub stratify_key: StratifyKey,
	#[config(default = false)]
	pub drop_singleton_classes: bool,
	#[config(default = 224)]
	pub image_size: u32,
	#[config(default = 32)]
	pub batch_size: usize,
	#[config(default = 4)]
	pub num_workers: usize,
	#[config(default = 0.2)]
	pub shear_range: f32,
	#[config(default = 0.2)]
	pub zoom_range: f32,
	#[config(default = true)]
	pub horizontal_flip: bool,
	pub augment_seed: Option<u64>,
}

impl PrepareConfig {
	pub fn from_file<A: AsRef<Path>>(path: A) -> Result<Self, PrepError> {
		Self::load(path).map_err(|err| PrepError::Config(format!("{err:?}")))
	}

	/// Reject values that only fail deep inside a later stage.
	pub fn validate(&self) -> Result<(), PrepError> {
		if !(self.test_size > 0.0 && self.test_size < 1.0) {
			return Err(PrepError::InvalidTestSize(self.test_size));
		}
		if self.image_size == 0 {
			return Err(PrepError::Config("image_size must be at least 1".to_string()));
		}
		if self.batch_size == 0 {
			return Err(PrepError::Config("batch_size must be at least 1".to_string()));
		}
		Ok(())
	}

	/// Folder whose existence marks the image archive as already extracted.
	pub fn archive_dir(&self) -> PathBuf {
		self.data_dir.join(&self.archive_dir_name)
	}

	pub fn archive_file(&self) -> PathBuf {
		self.data_dir.join(format!("{}.zip", self.archive_dir_name))
	}

	pub fn metadata_file(&self) -> PathBuf {
		let file_name = self.metadata_url.rsplit('/').next().filter(|name| !name.is_empty()).unwrap_or("metadata.csv");
		self.data_dir.join(file_name)
	}

	/// Flat folder of `{image_name}.jpg` files the split is copied from.
	pub fn source_dir(&self) -> PathBuf {
		self.archive_dir().join(&self.source_subdir)
	}

	/// Root of the generated `train/` and `validation/` trees. Never the source folder.
	pub fn output_dir(&self) -> PathBuf {
		self.data_dir.join(&self.output_dir_name)
	}
}
