use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::dataset::Dataset;
use crate::pipeline::PipelineError;

/// A train/test partition of one dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

/// Partitions `dataset` into training and test sets.
///
/// Rows are shuffled with a generator seeded from `seed`, so the same seed
/// always yields the same partition. The test set receives
/// `round(test_fraction * len)` rows and both partitions keep the source
/// order of their rows.
///
/// # Errors
/// - `InvalidArgument` if `test_fraction` is not strictly between 0 and 1
pub fn train_test_split(
    dataset: &Dataset,
    test_fraction: f64,
    seed: u64,
) -> Result<Split, PipelineError> {
    if !test_fraction.is_finite() || test_fraction <= 0.0 || test_fraction >= 1.0 {
        return Err(PipelineError::InvalidArgument(format!(
            "Test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let total = dataset.len();
    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_len = ((total as f64) * test_fraction).round() as usize;
    let test_len = test_len.min(total);

    let (test_idx, train_idx) = indices.split_at_mut(test_len);
    test_idx.sort_unstable();
    train_idx.sort_unstable();

    let split = Split {
        train: dataset.select(train_idx),
        test: dataset.select(test_idx),
    };

    debug!(
        "Dataset split: {} training, {} test (fraction {:.2}, seed {})",
        split.train.len(),
        split.test.len(),
        test_fraction,
        seed
    );

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;

    fn numbered(n: usize) -> Dataset {
        let rows = (0..n)
            .map(|i| Record::new().with("text", format!("{}", i)))
            .collect::<Vec<_>>();
        if n == 0 {
            return Dataset::from_parts(Default::default(), rows);
        }
        Dataset::from_records(rows).unwrap()
    }

    #[test]
    fn test_correct_split_sizes() {
        let split = train_test_split(&numbered(100), 0.2, 7).unwrap();
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.test.len(), 20);
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let data = numbered(10);
        for f in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                train_test_split(&data, f, 0),
                Err(PipelineError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_single_row_goes_to_one_side() {
        let data = numbered(1);
        let small = train_test_split(&data, 0.2, 0).unwrap();
        assert_eq!((small.train.len(), small.test.len()), (1, 0));
        let half = train_test_split(&data, 0.5, 0).unwrap();
        assert_eq!((half.train.len(), half.test.len()), (0, 1));
    }

    #[test]
    fn test_empty_dataset() {
        let split = train_test_split(&numbered(0), 0.2, 0).unwrap();
        assert!(split.train.is_empty());
        assert!(split.test.is_empty());
    }

    #[test]
    fn test_same_seed_same_partition() {
        let data = numbered(30);
        let a = train_test_split(&data, 0.3, 42).unwrap();
        let b = train_test_split(&data, 0.3, 42).unwrap();
        assert_eq!(a.test, b.test);
        assert_eq!(a.train, b.train);
    }
}
