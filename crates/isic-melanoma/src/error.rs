use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
	#[error("Std IO error")]
	StdIoError(#[from] std::io::Error),
	#[error("HTTP request failed")]
	Http(#[from] reqwest::Error),
	#[error("Unexpected HTTP status {status} for {url}")]
	HttpStatus {
		url: String,
		status: u16,
	},
	#[error("Archive extraction failed")]
	Zip(#[from] zip::result::ZipError),
	#[error("Metadata CSV error")]
	Csv(#[from] csv::Error),
	#[error("Could not decode image {path:?}")]
	Image {
		path: PathBuf,
		#[source]
		source: image::ImageError,
	},
	#[error("Directory traversal failed")]
	Walk(#[from] walkdir::Error),
	#[error("Invalid config: {0}")]
	Config(String),
	#[error("Could not start the decoding thread pool")]
	ThreadPool(#[from] rayon::ThreadPoolBuildError),
	#[error("Metadata table is empty")]
	EmptyMetadata,
	#[error("test_size must lie strictly between 0 and 1, got {0}")]
	InvalidTestSize(f64),
	#[error("The least populated class '{class}' has only {count} member(s), which is too few. The minimum number of members in any class cannot be less than 2")]
	StratificationInfeasible {
		class: String,
		count: usize,
	},
	#[error("The {split} split would hold {size} sample(s), which is fewer than the {classes} classes")]
	SplitTooSmall {
		split: &'static str,
		size: usize,
		classes: usize,
	},
	#[error("Folder not found: {0:?}")]
	FolderNotFound(PathBuf),
}
