use crate::error::PrepError;
use crate::split::{Split, SplitAssignment};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassBucket {
	Melanoma,
	NonMelanoma,
}

impl ClassBucket {
	/// Alphabetical, which is also the label index order of the batch streams.
	pub const ALL: [ClassBucket; 2] = [ClassBucket::Melanoma, ClassBucket::NonMelanoma];

	pub fn from_label(melanoma: bool) -> Self {
		if melanoma {
			ClassBucket::Melanoma
		} else {
			ClassBucket::NonMelanoma
		}
	}

	pub fn dir_name(self) -> &'static str {
		match self {
			ClassBucket::Melanoma => "melanoma",
			ClassBucket::NonMelanoma => "non_melanoma",
		}
	}
}

/// `train/` and `validation/` roots, each holding one folder per [`ClassBucket`].
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
	pub root: PathBuf,
}

impl DirectoryLayout {
	/// Create every class folder up front. Existing folders are reused as-is.
	pub fn create<A: AsRef<Path>>(root: A) -> Result<Self, PrepError> {
		let layout = Self { root: root.as_ref().to_path_buf() };

		for split in [Split::Train, Split::Validation] {
			for bucket in ClassBucket::ALL {
				fs::create_dir_all(layout.class_dir(split, bucket))?;
			}
		}

		Ok(layout)
	}

	pub fn split_dir(&self, split: Split) -> PathBuf {
		self.root.join(split.dir_name())
	}

	pub fn class_dir(&self, split: Split, bucket: ClassBucket) -> PathBuf {
		self.split_dir(split).join(bucket.dir_name())
	}

	pub fn image_path(&self, split: Split, bucket: ClassBucket, image_name: &str) -> PathBuf {
		self.class_dir(split, bucket).join(format!("{image_name}.jpg"))
	}
}

#[derive(Debug, Default, Clone)]
pub struct MaterializeReport {
	pub copied: usize,
	pub missing: Vec<PathBuf>,
}

/// Copy every assigned image from the flat source folder into its class folder.
///
/// Images absent from `source_dir` are logged and skipped. Existing destination
/// files are overwritten.
pub fn materialize<A: AsRef<Path>>(layout: &DirectoryLayout, assignment: &SplitAssignment, source_dir: A) -> Result<MaterializeReport, PrepError> {
	let source_dir = source_dir.as_ref();
	let mut report = MaterializeReport::default();

	for split in [Split::Train, Split::Validation] {
		for entry in assignment.entries(split) {
			let source = source_dir.join(format!("{}.jpg", entry.image_name));
			let destination = layout.image_path(split, entry.bucket, &entry.image_name);

			if !source.exists() {
				warn!("Image not found: {}", source.display());
				report.missing.push(source);
				continue;
			}

			if let Some(parent) = destination.parent() {
				fs::create_dir_all(parent)?;
			}
			fs::copy(&source, &destination)?;
			debug!("Copied {:?} -> {:?}", source, destination);
			report.copied += 1;
		}
	}

	info!("Copied {} images, {} missing", report.copied, report.missing.len());

	Ok(report)
}
