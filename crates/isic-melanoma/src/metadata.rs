use crate::config::{StratifyKey, MELANOMA_DIAGNOSIS, OTHER_DIAGNOSIS};
use crate::error::PrepError;
use log::warn;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// One row of the ground truth table. The ISIC file carries more columns
/// (`patient_id`, `target`, ...) which are ignored.
#[derive(Debug, Clone, Deserialize)]
struct GroundTruthRow {
	image_name: String,
	diagnosis: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
	pub image_name: String,
	/// Diagnosis exactly as read from the CSV.
	pub raw_diagnosis: String,
	/// Diagnosis after rare classes were folded into "other".
	pub diagnosis: String,
	pub melanoma: bool,
}

impl MetadataRecord {
	pub fn new<S: Into<String>>(image_name: S, diagnosis: S) -> Self {
		let diagnosis = diagnosis.into();

		Self {
			image_name: image_name.into(),
			raw_diagnosis: diagnosis.clone(),
			diagnosis,
			melanoma: false,
		}
	}

	pub fn stratum(&self, key: StratifyKey) -> String {
		match key {
			StratifyKey::RawDiagnosis => self.raw_diagnosis.clone(),
			StratifyKey::CollapsedDiagnosis => self.diagnosis.clone(),
			StratifyKey::Label => self.melanoma.to_string(),
		}
	}
}

pub fn load_metadata<R: Read>(reader: R) -> Result<Vec<MetadataRecord>, PrepError> {
	let mut records = Vec::new();

	for row in csv::Reader::from_reader(reader).deserialize() {
		let row: GroundTruthRow = row?;
		records.push(MetadataRecord::new(row.image_name, row.diagnosis));
	}

	if records.is_empty() {
		return Err(PrepError::EmptyMetadata);
	}

	Ok(records)
}

pub fn load_metadata_file<A: AsRef<Path>>(path: A) -> Result<Vec<MetadataRecord>, PrepError> {
	load_metadata(std::fs::File::open(path)?)
}

pub fn value_counts<'a, I: IntoIterator<Item = &'a str>>(values: I) -> BTreeMap<String, usize> {
	let mut counts = BTreeMap::new();
	for value in values {
		*counts.entry(value.to_string()).or_insert(0) += 1;
	}
	counts
}

/// Rewrite every diagnosis seen fewer than `threshold` times to "other".
pub fn collapse_rare(records: &mut [MetadataRecord], threshold: usize) {
	let counts = value_counts(records.iter().map(|record| record.diagnosis.as_str()));

	for record in records.iter_mut() {
		if counts[&record.diagnosis] < threshold {
			record.diagnosis = OTHER_DIAGNOSIS.to_string();
		}
	}
}

/// Set the binary label from the current (normally collapsed) diagnosis.
pub fn derive_labels(records: &mut [MetadataRecord]) {
	for record in records.iter_mut() {
		record.melanoma = record.diagnosis == MELANOMA_DIAGNOSIS;
	}
}

/// Collapse rare diagnoses, then derive labels.
///
/// The order matters: a rare "melanoma" becomes "other" and never produces a
/// positive label. That case is logged rather than corrected.
pub fn normalize(records: &mut [MetadataRecord], threshold: usize) {
	collapse_rare(records, threshold);
	derive_labels(records);

	let raw_melanoma = records.iter().any(|record| record.raw_diagnosis == MELANOMA_DIAGNOSIS);
	let labelled_melanoma = records.iter().any(|record| record.melanoma);
	if raw_melanoma && !labelled_melanoma {
		warn!("'{MELANOMA_DIAGNOSIS}' is rarer than {threshold} rows and was collapsed into '{OTHER_DIAGNOSIS}', no positive labels remain");
	}
}

/// Keep only rows whose stratum has at least two members.
pub fn drop_singleton_classes(records: &[MetadataRecord], key: StratifyKey) -> Vec<MetadataRecord> {
	let strata: Vec<String> = records.iter().map(|record| record.stratum(key)).collect();
	let counts = value_counts(strata.iter().map(String::as_str));

	records
		.iter()
		.zip(strata.iter())
		.filter(|(_, stratum)| counts[stratum.as_str()] >= 2)
		.map(|(record, _)| record.clone())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RARE_CLASS_THRESHOLD;

	fn records(counts: &[(&str, usize)]) -> Vec<MetadataRecord> {
		let mut out = Vec::new();
		for (diagnosis, count) in counts {
			for i in 0..*count {
				out.push(MetadataRecord::new(format!("{diagnosis}_{i}"), diagnosis.to_string()));
			}
		}
		out
	}

	#[test]
	fn loads_isic_columns_and_ignores_the_rest() {
		let csv = "image_name,patient_id,sex,age_approx,anatom_site_general_challenge,diagnosis,benign_malignant,target\n\
			ISIC_2637011,IP_7279968,male,45.0,head/neck,unknown,benign,0\n\
			ISIC_0015719,IP_3075186,female,45.0,upper extremity,melanoma,malignant,1\n";

		let records = load_metadata(csv.as_bytes()).unwrap();

		assert_eq!(records.len(), 2);
		assert_eq!(records[0].image_name, "ISIC_2637011");
		assert_eq!(records[1].raw_diagnosis, "melanoma");
		assert!(!records[1].melanoma);
	}

	#[test]
	fn missing_diagnosis_column_is_an_error() {
		let csv = "image_name,target\nISIC_1,0\n";

		assert!(matches!(load_metadata(csv.as_bytes()), Err(PrepError::Csv(_))));
	}

	#[test]
	fn header_only_file_is_empty_metadata() {
		assert!(matches!(load_metadata("image_name,diagnosis\n".as_bytes()), Err(PrepError::EmptyMetadata)));
	}

	#[test]
	fn rare_diagnoses_become_other() {
		let mut table = records(&[("nevus", 150), ("lentigo NOS", 44), ("melanoma", 120)]);

		collapse_rare(&mut table, RARE_CLASS_THRESHOLD);

		let counts = value_counts(table.iter().map(|record| record.diagnosis.as_str()));
		assert_eq!(counts.get("nevus"), Some(&150));
		assert_eq!(counts.get("melanoma"), Some(&120));
		assert_eq!(counts.get("other"), Some(&44));
		assert!(!counts.contains_key("lentigo NOS"));
		assert!(table.iter().filter(|r| r.diagnosis == "other").all(|r| r.raw_diagnosis == "lentigo NOS"));
	}

	#[test]
	fn collapsing_twice_never_restores_a_label() {
		let mut table = records(&[("nevus", 150), ("seborrheic keratosis", 3)]);

		collapse_rare(&mut table, RARE_CLASS_THRESHOLD);
		collapse_rare(&mut table, RARE_CLASS_THRESHOLD);

		assert!(table.iter().all(|r| r.diagnosis == "nevus" || r.diagnosis == "other"));
	}

	#[test]
	fn label_is_exact_melanoma_match_after_collapse() {
		let mut table = records(&[("melanoma", 100), ("nevus", 150), ("melanoma ", 2)]);

		normalize(&mut table, RARE_CLASS_THRESHOLD);

		for record in &table {
			assert_eq!(record.melanoma, record.diagnosis == "melanoma");
		}
		assert_eq!(table.iter().filter(|r| r.melanoma).count(), 100);
	}

	#[test]
	fn collapse_runs_before_labelling() {
		let mut table = records(&[("melanoma", 5), ("nevus", 150)]);

		normalize(&mut table, RARE_CLASS_THRESHOLD);

		assert!(table.iter().all(|r| !r.melanoma));
		assert_eq!(table[0].diagnosis, "other");

		// Labelling first would have kept the positives.
		let mut reversed = records(&[("melanoma", 5), ("nevus", 150)]);
		derive_labels(&mut reversed);
		collapse_rare(&mut reversed, RARE_CLASS_THRESHOLD);
		assert_eq!(reversed.iter().filter(|r| r.melanoma).count(), 5);
	}

	#[test]
	fn singleton_filter_uses_the_chosen_key() {
		let mut table = records(&[("nevus", 150), ("atypical melanocytic proliferation", 1), ("cafe-au-lait macule", 1)]);
		normalize(&mut table, RARE_CLASS_THRESHOLD);

		let by_raw = drop_singleton_classes(&table, StratifyKey::RawDiagnosis);
		let by_collapsed = drop_singleton_classes(&table, StratifyKey::CollapsedDiagnosis);

		assert_eq!(by_raw.len(), 150);
		assert_eq!(by_collapsed.len(), 152);
	}
}
