use crate::data::BatchStream;
use crate::error::PrepError;
use crate::materialize::ClassBucket;
use crate::split::{Split, SplitAssignment};
use burn::prelude::Backend;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSummary {
	pub depth: usize,
	pub name: String,
	pub file_count: usize,
}

impl DirSummary {
	pub fn line(&self) -> String {
		format!("{}{}/ {} files", " ".repeat(4 * self.depth), self.name, self.file_count)
	}
}

fn is_hidden(entry: &DirEntry) -> bool {
	entry.file_name().to_str().map(|name| name.starts_with('.')).unwrap_or(false)
}

/// Walk `root` top-down and count the files directly inside each folder.
///
/// With `skip_hidden`, dot-prefixed folders below the root are not entered.
pub fn directory_summary<A: AsRef<Path>>(root: A, skip_hidden: bool) -> Result<Vec<DirSummary>, PrepError> {
	let root = root.as_ref();
	let walker = WalkDir::new(root)
		.sort_by_file_name()
		.into_iter()
		.filter_entry(|entry| !(skip_hidden && entry.depth() > 0 && entry.file_type().is_dir() && is_hidden(entry)));

	let mut summaries = Vec::new();
	for entry in walker {
		let entry = entry?;
		if !entry.file_type().is_dir() {
			continue;
		}

		let mut file_count = 0;
		for child in entry.path().read_dir()? {
			if !child?.file_type()?.is_dir() {
				file_count += 1;
			}
		}

		let name = entry
			.path()
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| entry.path().display().to_string());

		summaries.push(DirSummary {
			depth: entry.depth(),
			name,
			file_count,
		});
	}

	Ok(summaries)
}

pub fn print_directory_summary<A: AsRef<Path>>(root: A, skip_hidden: bool) -> Result<(), PrepError> {
	let root = root.as_ref();
	if skip_hidden {
		println!("Directory structure summary for {}", root.display());
	}

	for summary in directory_summary(root, skip_hidden)? {
		println!("{}", summary.line());
	}

	Ok(())
}

pub fn print_split_head(assignment: &SplitAssignment, rows: usize) {
	println!("Training images (first {rows}):");
	for entry in assignment.train.iter().take(rows) {
		println!("    {}", entry.image_name);
	}

	println!("Training labels (first {rows}):");
	for entry in assignment.train.iter().take(rows) {
		println!("    {} {}", entry.image_name, label_value(entry.bucket));
	}
}

fn label_value(bucket: ClassBucket) -> u8 {
	match bucket {
		ClassBucket::Melanoma => 1,
		ClassBucket::NonMelanoma => 0,
	}
}

pub fn class_distribution(assignment: &SplitAssignment, split: Split) -> BTreeMap<ClassBucket, usize> {
	let mut counts = BTreeMap::new();
	for entry in assignment.entries(split) {
		*counts.entry(entry.bucket).or_insert(0) += 1;
	}
	counts
}

pub fn print_class_distribution(assignment: &SplitAssignment, split: Split) {
	println!("Class distribution in the {} set:", split.dir_name());
	for (bucket, count) in class_distribution(assignment, split) {
		println!("    {:<14}{count}", bucket.dir_name());
	}
}

pub fn print_class_indices<B: Backend>(name: &str, stream: &BatchStream<B>) {
	let mapping = stream
		.class_indices()
		.iter()
		.map(|(class, index)| format!("'{class}': {index}"))
		.collect::<Vec<_>>()
		.join(", ");

	println!("Classes in {name} stream: {{{mapping}}} ({} images)", stream.num_items());
}
