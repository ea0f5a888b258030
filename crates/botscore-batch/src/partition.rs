//! Work partitioning
//!
//! Turns the batch configuration into the list of index ranges handed to
//! workers, one range per worker.

use botscore_core::{check_disjoint, BatchConfig, IdRange};

use crate::BatchError;

/// How the identifier index space is divided among workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Hand-assigned ranges
    Explicit(Vec<IdRange>),

    /// `[start, end)` split into `workers` near-equal contiguous ranges;
    /// `end` defaults to the number of identifiers in the sample
    Even {
        start: usize,
        end: Option<usize>,
        workers: usize,
    },
}

impl PartitionStrategy {
    pub fn from_config(config: &BatchConfig) -> Self {
        match config.workers {
            Some(workers) => Self::Even {
                start: config.even_start,
                end: config.even_end,
                workers,
            },
            None => Self::Explicit(config.ranges.clone()),
        }
    }

    /// Whether `ranges` needs the identifier count
    pub fn needs_total(&self) -> bool {
        matches!(self, Self::Even { end: None, .. })
    }

    /// Resolve the strategy into validated, disjoint ranges
    pub fn ranges(&self, total: Option<usize>) -> Result<Vec<IdRange>, BatchError> {
        let ranges = match self {
            Self::Explicit(ranges) => ranges.clone(),
            Self::Even { workers: 0, .. } => {
                return Err(BatchError::Partition("worker count must be positive".into()))
            }
            Self::Even {
                start,
                end,
                workers,
            } => {
                let end = (*end).or(total).ok_or_else(|| {
                    BatchError::Partition("even split needs an end index or a sample size".into())
                })?;
                if *start > end {
                    return Err(BatchError::Partition(format!(
                        "even split start {start} is past its end {end}"
                    )));
                }
                even_split(IdRange::new(*start, end), *workers)
            }
        };

        check_disjoint(&ranges)?;
        Ok(ranges)
    }
}

/// Split `span` into at most `workers` contiguous non-empty ranges whose
/// sizes differ by at most one
pub fn even_split(span: IdRange, workers: usize) -> Vec<IdRange> {
    let len = span.len();
    let count = workers.min(len);
    if count == 0 {
        return Vec::new();
    }

    let base = len / count;
    let extra = len % count;

    let mut ranges = Vec::with_capacity(count);
    let mut cursor = span.start;
    for i in 0..count {
        let size = base + usize::from(i < extra);
        ranges.push(IdRange::new(cursor, cursor + size));
        cursor += size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reference_ranges() {
        let strategy = PartitionStrategy::from_config(&BatchConfig::default());
        assert!(!strategy.needs_total());

        let ranges = strategy.ranges(None).unwrap();
        assert_eq!(
            ranges,
            vec![
                IdRange::new(36000, 47000),
                IdRange::new(47000, 58000),
                IdRange::new(58000, 69000),
            ]
        );
    }

    #[test]
    fn test_even_split_uneven_length() {
        let ranges = even_split(IdRange::new(0, 10), 3);
        assert_eq!(
            ranges,
            vec![IdRange::new(0, 4), IdRange::new(4, 7), IdRange::new(7, 10)]
        );
    }

    #[test]
    fn test_even_split_more_workers_than_ids() {
        let ranges = even_split(IdRange::new(5, 7), 8);
        assert_eq!(ranges, vec![IdRange::new(5, 6), IdRange::new(6, 7)]);
        assert!(even_split(IdRange::new(3, 3), 4).is_empty());
    }

    #[test]
    fn test_even_inverted_span_rejected() {
        let inverted = PartitionStrategy::Even {
            start: 100,
            end: Some(50),
            workers: 3,
        };
        assert!(matches!(inverted.ranges(None), Err(BatchError::Partition(_))));

        let past_sample = PartitionStrategy::Even {
            start: 100,
            end: None,
            workers: 3,
        };
        assert!(matches!(
            past_sample.ranges(Some(40)),
            Err(BatchError::Partition(_))
        ));
        assert!(past_sample.ranges(Some(100)).unwrap().is_empty());
    }

    #[test]
    fn test_even_uses_sample_size() {
        let strategy = PartitionStrategy::Even {
            start: 0,
            end: None,
            workers: 2,
        };
        assert!(strategy.needs_total());
        assert!(matches!(strategy.ranges(None), Err(BatchError::Partition(_))));
        assert_eq!(
            strategy.ranges(Some(9)).unwrap(),
            vec![IdRange::new(0, 5), IdRange::new(5, 9)]
        );
    }

    #[test]
    fn test_overlapping_explicit_ranges_rejected() {
        let strategy = PartitionStrategy::Explicit(vec![IdRange::new(0, 10), IdRange::new(9, 20)]);
        assert!(matches!(strategy.ranges(None), Err(BatchError::Config(_))));
    }

    proptest! {
        #[test]
        fn prop_even_split_covers_span(start in 0usize..10_000, len in 0usize..5_000, workers in 1usize..32) {
            let span = IdRange::new(start, start + len);
            let ranges = even_split(span, workers);

            prop_assert!(ranges.len() <= workers);
            prop_assert_eq!(ranges.iter().map(IdRange::len).sum::<usize>(), len);
            prop_assert!(check_disjoint(&ranges).is_ok());

            if let (Some(first), Some(last)) = (ranges.first(), ranges.last()) {
                prop_assert_eq!(first.start, span.start);
                prop_assert_eq!(last.end, span.end);
            }
            for pair in ranges.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }

            let sizes: Vec<usize> = ranges.iter().map(IdRange::len).collect();
            if let (Some(min), Some(max)) = (sizes.iter().min(), sizes.iter().max()) {
                prop_assert!(max - min <= 1);
                prop_assert!(*min > 0);
            }
        }
    }
}
