use crate::config::StratifyKey;
use crate::error::PrepError;
use crate::materialize::ClassBucket;
use crate::metadata::MetadataRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
	Train,
	Validation,
}

impl Split {
	pub fn dir_name(self) -> &'static str {
		match self {
			Split::Train => "train",
			Split::Validation => "validation",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEntry {
	pub image_name: String,
	pub bucket: ClassBucket,
}

/// Result of one stratified split. Built once per run and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct SplitAssignment {
	pub train: Vec<SplitEntry>,
	pub validation: Vec<SplitEntry>,
}

impl SplitAssignment {
	pub fn len(&self) -> usize {
		self.train.len() + self.validation.len()
	}

	pub fn entries(&self, split: Split) -> &[SplitEntry] {
		match split {
			Split::Train => &self.train,
			Split::Validation => &self.validation,
		}
	}

	#[cfg(test)]
	pub fn split_of(&self, image_name: &str) -> Option<Split> {
		if self.train.iter().any(|entry| entry.image_name == image_name) {
			Some(Split::Train)
		} else if self.validation.iter().any(|entry| entry.image_name == image_name) {
			Some(Split::Validation)
		} else {
			None
		}
	}
}

/// Stratified shuffle split of `records` into train and validation.
///
/// The validation set receives `ceil(test_size * n)` rows. Each stratum
/// contributes its proportional share, rounded down, and the leftover slots
/// go to the strata with the largest remainders. Every stratum needs at least
/// two members.
pub fn stratified_split(records: &[MetadataRecord], key: StratifyKey, test_size: f64, seed: u64) -> Result<SplitAssignment, PrepError> {
	if !(test_size > 0.0 && test_size < 1.0) {
		return Err(PrepError::InvalidTestSize(test_size));
	}
	if records.is_empty() {
		return Err(PrepError::EmptyMetadata);
	}

	let mut strata: BTreeMap<String, Vec<&MetadataRecord>> = BTreeMap::new();
	for record in records {
		strata.entry(record.stratum(key)).or_default().push(record);
	}

	if let Some((class, members)) = strata.iter().min_by_key(|(_, members)| members.len()) {
		if members.len() < 2 {
			return Err(PrepError::StratificationInfeasible {
				class: class.clone(),
				count: members.len(),
			});
		}
	}

	let n = records.len();
	let n_test = (test_size * n as f64).ceil() as usize;
	let n_train = n - n_test;
	let classes = strata.len();
	if n_train < classes {
		return Err(PrepError::SplitTooSmall { split: "train", size: n_train, classes });
	}
	if n_test < classes {
		return Err(PrepError::SplitTooSmall { split: "validation", size: n_test, classes });
	}

	let counts: Vec<usize> = strata.values().map(Vec::len).collect();
	let test_counts = allocate(&counts, n_test);

	let mut rng = StdRng::seed_from_u64(seed);
	let mut assignment = SplitAssignment::default();

	for (members, take) in strata.into_values().zip(test_counts) {
		let mut members = members;
		members.shuffle(&mut rng);

		let (validation, train) = members.split_at(take);
		assignment.validation.extend(validation.iter().map(|record| entry(record)));
		assignment.train.extend(train.iter().map(|record| entry(record)));
	}

	assignment.train.shuffle(&mut rng);
	assignment.validation.shuffle(&mut rng);

	Ok(assignment)
}

fn entry(record: &MetadataRecord) -> SplitEntry {
	SplitEntry {
		image_name: record.image_name.clone(),
		bucket: ClassBucket::from_label(record.melanoma),
	}
}

/// Spread `total` slots over classes proportionally to `counts`.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
	let n: usize = counts.iter().sum();
	let shares: Vec<f64> = counts.iter().map(|&count| count as f64 * total as f64 / n as f64).collect();

	let mut allocated: Vec<usize> = shares.iter().map(|share| share.floor() as usize).collect();
	let mut left = total - allocated.iter().sum::<usize>();

	let mut order: Vec<usize> = (0..counts.len()).collect();
	// Stable sort keeps class-name order among equal remainders.
	order.sort_by(|&a, &b| {
		let ra = shares[a] - shares[a].floor();
		let rb = shares[b] - shares[b].floor();
		rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
	});

	for index in order.into_iter().cycle() {
		if left == 0 {
			break;
		}
		if allocated[index] < counts[index] {
			allocated[index] += 1;
			left -= 1;
		}
	}

	allocated
}
