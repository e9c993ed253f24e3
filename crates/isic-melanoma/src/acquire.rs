use crate::config::PrepareConfig;
use crate::error::PrepError;
use log::{debug, info};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Make sure the image archive is extracted under the data folder.
///
/// Only the presence of the extracted folder is checked, not its completeness.
/// Extraction goes through a `.partial` folder that is renamed at the end, so an
/// interrupted run never leaves the marker folder behind.
pub fn ensure_image_archive(config: &PrepareConfig) -> Result<PathBuf, PrepError> {
	let archive_dir = config.archive_dir();
	if archive_dir.exists() {
		debug!("{:?} already present, skipping download", archive_dir);
		return Ok(archive_dir);
	}

	fs::create_dir_all(&config.data_dir)?;

	let archive_file = config.archive_file();
	if !archive_file.exists() {
		download_to(&config.image_archive_url, &archive_file)?;
	}

	extract_zip(&archive_file, &archive_dir)?;

	Ok(archive_dir)
}

/// Fetch the metadata CSV once and return the local copy.
pub fn ensure_metadata(config: &PrepareConfig) -> Result<PathBuf, PrepError> {
	let metadata_file = config.metadata_file();
	if metadata_file.exists() {
		debug!("{:?} already present, skipping download", metadata_file);
		return Ok(metadata_file);
	}

	fs::create_dir_all(&config.data_dir)?;
	download_to(&config.metadata_url, &metadata_file)?;

	Ok(metadata_file)
}

fn download_to(url: &str, destination: &Path) -> Result<(), PrepError> {
	info!("Downloading {url}");

	// The image archive is tens of gigabytes, so the default request timeout is lifted.
	let client = reqwest::blocking::Client::builder().timeout(None).build()?;
	let mut response = client.get(url).send()?;

	if !response.status().is_success() {
		return Err(PrepError::HttpStatus {
			url: url.to_string(),
			status: response.status().as_u16(),
		});
	}

	let partial = with_suffix(destination, "part");
	let mut file = File::create(&partial)?;
	let bytes = response.copy_to(&mut file)?;
	drop(file);

	fs::rename(&partial, destination)?;
	info!("Saved {bytes} bytes to {:?}", destination);

	Ok(())
}

pub fn extract_zip(archive_file: &Path, destination: &Path) -> Result<(), PrepError> {
	info!("Extracting {:?} into {:?}", archive_file, destination);

	let partial = with_suffix(destination, "partial");
	if partial.exists() {
		fs::remove_dir_all(&partial)?;
	}

	let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_file)?))?;
	archive.extract(&partial)?;

	fs::rename(&partial, destination)?;
	info!("Extracted {} entries", archive.len());

	Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
	name.push(".");
	name.push(suffix);
	path.with_file_name(name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use zip::write::SimpleFileOptions;

	fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
		let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
		for (name, bytes) in entries {
			writer.start_file(*name, SimpleFileOptions::default()).unwrap();
			writer.write_all(bytes).unwrap();
		}
		writer.finish().unwrap();
	}

	#[test]
	fn existing_archive_folder_skips_download() {
		let dir = tempfile::tempdir().unwrap();
		// An unreachable URL proves no request is made.
		let config = PrepareConfig::new()
			.with_data_dir(dir.path().to_path_buf())
			.with_image_archive_url("http://127.0.0.1:9/never.zip".to_string());
		fs::create_dir_all(config.archive_dir()).unwrap();

		let archive_dir = ensure_image_archive(&config).unwrap();

		assert_eq!(archive_dir, config.archive_dir());
	}

	#[test]
	fn local_archive_is_extracted_without_network() {
		let dir = tempfile::tempdir().unwrap();
		let config = PrepareConfig::new()
			.with_data_dir(dir.path().to_path_buf())
			.with_image_archive_url("http://127.0.0.1:9/never.zip".to_string());
		write_archive(&config.archive_file(), &[("train/ISIC_0000001.jpg", b"jpeg bytes")]);

		ensure_image_archive(&config).unwrap();

		let extracted = config.source_dir().join("ISIC_0000001.jpg");
		assert_eq!(fs::read(extracted).unwrap(), b"jpeg bytes");
		assert!(!with_suffix(&config.archive_dir(), "partial").exists());
	}

	#[test]
	fn corrupt_archive_leaves_no_marker_folder() {
		let dir = tempfile::tempdir().unwrap();
		let config = PrepareConfig::new().with_data_dir(dir.path().to_path_buf());
		fs::write(config.archive_file(), b"not a zip").unwrap();

		let result = ensure_image_archive(&config);

		assert!(matches!(result, Err(PrepError::Zip(_))));
		assert!(!config.archive_dir().exists());
	}

	#[test]
	fn cached_metadata_is_reused() {
		let dir = tempfile::tempdir().unwrap();
		let config = PrepareConfig::new()
			.with_data_dir(dir.path().to_path_buf())
			.with_metadata_url("http://127.0.0.1:9/ground_truth.csv".to_string());
		fs::write(config.metadata_file(), "image_name,diagnosis\n").unwrap();

		let path = ensure_metadata(&config).unwrap();

		assert_eq!(path, dir.path().join("ground_truth.csv"));
	}

	#[test]
	fn suffix_is_appended_to_file_name() {
		assert_eq!(with_suffix(Path::new("a/b.zip"), "part"), PathBuf::from("a/b.zip.part"));
	}
}
