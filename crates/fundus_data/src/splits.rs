//! Train/validation splitting over label records.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::types::{Grade, LabelRecord};

/// Count records per DR grade.
pub fn count_grades(records: &[LabelRecord]) -> BTreeMap<Grade, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.grade).or_insert(0) += 1;
    }
    counts
}

/// Shuffle and split into (train, validation). `val_ratio` is clamped to
/// [0, 1]; the validation length is rounded from `len * ratio`.
pub fn split_records(
    mut records: Vec<LabelRecord>,
    val_ratio: f32,
    seed: Option<u64>,
) -> (Vec<LabelRecord>, Vec<LabelRecord>) {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    records.shuffle(&mut rng);

    let ratio = val_ratio.clamp(0.0, 1.0);
    let val_len = ((records.len() as f32) * ratio).round() as usize;
    let val_len = val_len.min(records.len());
    let split_at = records.len() - val_len;
    let val = records.split_off(split_at);
    (records, val)
}

/// Split per grade so every class present in the input is represented in
/// both halves at roughly `val_ratio`. Rare grades with a rounded
/// validation share of zero stay entirely in the training half.
pub fn split_records_stratified(
    records: Vec<LabelRecord>,
    val_ratio: f32,
    seed: Option<u64>,
) -> (Vec<LabelRecord>, Vec<LabelRecord>) {
    let mut buckets: BTreeMap<Grade, Vec<LabelRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.grade).or_default().push(record);
    }

    let mut train = Vec::new();
    let mut val = Vec::new();
    for (i, (_, bucket)) in buckets.into_iter().enumerate() {
        // Distinct sub-seed per grade keeps the overall split reproducible.
        let bucket_seed = seed.map(|s| s.wrapping_add(i as u64));
        let (t, v) = split_records(bucket, val_ratio, bucket_seed);
        train.extend(t);
        val.extend(v);
    }
    (train, val)
}

#[cfg(test)]
mod split_tests {
    use super::{count_grades, split_records, split_records_stratified};
    use crate::types::{Grade, LabelRecord};

    fn rec(id: &str, grade: u8) -> LabelRecord {
        LabelRecord {
            image_id: id.to_string(),
            grade: Grade::try_from(grade).unwrap(),
        }
    }

    fn ids(records: &[LabelRecord]) -> Vec<&str> {
        records.iter().map(|r| r.image_id.as_str()).collect()
    }

    #[test]
    fn split_sizes_follow_ratio() {
        let records: Vec<_> = (0..10).map(|i| rec(&format!("img{i}"), 0)).collect();
        let (train, val) = split_records(records, 0.2, Some(3));
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
    }

    #[test]
    fn stratified_split_keeps_every_grade_in_both_halves() {
        let mut records = Vec::new();
        for grade in 0..=4u8 {
            for i in 0..4 {
                records.push(rec(&format!("g{grade}_{i}"), grade));
            }
        }
        let (train, val) = split_records_stratified(records, 0.25, Some(9));
        assert_eq!(train.len(), 15);
        assert_eq!(val.len(), 5);
        let train_counts = count_grades(&train);
        let val_counts = count_grades(&val);
        for grade in Grade::ALL {
            assert_eq!(train_counts.get(&grade), Some(&3), "{grade}");
            assert_eq!(val_counts.get(&grade), Some(&1), "{grade}");
        }
    }

    #[test]
    fn seeded_split_is_reproducible() {
        let make = || -> Vec<_> { (0..12).map(|i| rec(&format!("img{i}"), (i % 5) as u8)).collect() };
        let (train_a, val_a) = split_records_stratified(make(), 0.25, Some(42));
        let (train_b, val_b) = split_records_stratified(make(), 0.25, Some(42));
        assert_eq!(ids(&train_a), ids(&train_b));
        assert_eq!(ids(&val_a), ids(&val_b));
    }
}
