use crate::acquire;
use crate::config::{PrepareConfig, StratifyKey, RARE_CLASS_THRESHOLD};
use crate::data::{BatchStream, StreamOptions};
use crate::error::PrepError;
use crate::materialize::{materialize, DirectoryLayout, MaterializeReport};
use crate::metadata::{self, MetadataRecord};
use crate::report;
use crate::split::{stratified_split, Split, SplitAssignment};
use burn::config::Config;
use burn::prelude::Backend;
use log::{info, warn};

/// Everything a run produced, handed from stage to stage.
pub struct PreparedData<B: Backend> {
	pub records: Vec<MetadataRecord>,
	pub assignment: SplitAssignment,
	pub layout: DirectoryLayout,
	pub copy_report: MaterializeReport,
	pub train: BatchStream<B>,
	pub validation: BatchStream<B>,
}

pub struct Pipeline {
	pub config: PrepareConfig,
	pub skip_download: bool,
}

impl Pipeline {
	pub fn new(config: PrepareConfig) -> Self {
		Self { config, skip_download: false }
	}

	pub fn with_skip_download(mut self, skip_download: bool) -> Self {
		self.skip_download = skip_download;
		self
	}

	pub fn run<B: Backend>(&self, device: B::Device) -> Result<PreparedData<B>, PrepError> {
		let config = &self.config;
		config.validate()?;

		let metadata_file = if self.skip_download {
			config.metadata_file()
		} else {
			acquire::ensure_image_archive(config)?;
			acquire::ensure_metadata(config)?
		};

		let mut records = metadata::load_metadata_file(metadata_file)?;
		info!("Loaded {} metadata rows", records.len());

		let assignment = prepare_split(config, &mut records)?;
		report::print_split_head(&assignment, 5);

		let layout = DirectoryLayout::create(config.output_dir())?;
		let copy_report = materialize(&layout, &assignment, config.source_dir())?;

		report::print_class_distribution(&assignment, Split::Train);
		report::print_class_distribution(&assignment, Split::Validation);

		config.save(config.output_dir().join("config.json"))?;

		let train = BatchStream::from_directory(layout.split_dir(Split::Train), &StreamOptions::train(config), device.clone())?;
		let validation = BatchStream::from_directory(layout.split_dir(Split::Validation), &StreamOptions::validation(config), device)?;

		report::print_directory_summary(layout.split_dir(Split::Train), true)?;
		report::print_directory_summary(layout.split_dir(Split::Train), false)?;
		report::print_class_indices("training", &train);
		report::print_class_indices("validation", &validation);

		Ok(PreparedData {
			records,
			assignment,
			layout,
			copy_report,
			train,
			validation,
		})
	}
}

/// Normalize the table in place and split it.
pub fn prepare_split(config: &PrepareConfig, records: &mut [MetadataRecord]) -> Result<SplitAssignment, PrepError> {
	metadata::normalize(records, RARE_CLASS_THRESHOLD);

	let assignment = if config.drop_singleton_classes {
		let filtered = metadata::drop_singleton_classes(records, config.stratify_key);
		info!("Dropped {} rows from single-member classes", records.len() - filtered.len());
		stratified_split(&filtered, config.stratify_key, config.test_size, config.seed)?
	} else {
		stratified_split(records, config.stratify_key, config.test_size, config.seed).inspect_err(|err| {
			if let Some(hint) = split_hint(config, err) {
				warn!("{hint}");
			}
		})?
	};

	info!("Split {} images into {} train / {} validation", assignment.len(), assignment.train.len(), assignment.validation.len());

	Ok(assignment)
}

/// Suggest a way around a failed split when the raw diagnosis is the key.
/// The ISIC 2020 table has diagnoses with a single image, so this is the
/// usual outcome of the default settings on the full dataset.
pub fn split_hint(config: &PrepareConfig, err: &PrepError) -> Option<String> {
	match err {
		PrepError::StratificationInfeasible { class, .. } if config.stratify_key == StratifyKey::RawDiagnosis && !config.drop_singleton_classes => Some(format!(
			"Raw diagnosis '{class}' cannot be stratified. Rerun with `--stratify-key collapsed-diagnosis` or set `drop_singleton_classes` to true in the config"
		)),
		_ => None,
	}
}
