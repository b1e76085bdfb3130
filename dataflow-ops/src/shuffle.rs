//! Randomly reorders elements through a bounded buffer

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, Error, IteratorContext, PartialShape,
    Result,
};

use crate::util::preallocated;

/// Emits a permutation of its input using a buffer of `buffer_size` elements
///
/// When both seeds are zero a random seed pair is drawn once, at
/// construction, so every iterator over the same dataset sees the same order.
pub struct ShuffleDataset {
    input: DatasetRef,
    buffer_size: usize,
    seed: i64,
    seed2: i64,
}

impl ShuffleDataset {
    /// Wrap `input`; `buffer_size` must be positive
    pub fn new(input: DatasetRef, buffer_size: i64, seed: i64, seed2: i64) -> Result<Self> {
        let buffer_size = usize::try_from(buffer_size)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "buffer_size must be greater than zero, got {buffer_size}."
                ))
            })?;
        let (seed, seed2) = if seed == 0 && seed2 == 0 {
            let mut rng = rand::thread_rng();
            (rng.gen(), rng.gen())
        } else {
            (seed, seed2)
        };
        debug!(buffer_size, seed, seed2, "Created ShuffleDataset");
        Ok(Self {
            input,
            buffer_size,
            seed,
            seed2,
        })
    }

    fn rng(&self) -> StdRng {
        let mixed = (self.seed as u64).rotate_left(32) ^ (self.seed2 as u64);
        StdRng::seed_from_u64(mixed)
    }
}

impl Dataset for ShuffleDataset {
    fn output_dtypes(&self) -> &[DType] {
        self.input.output_dtypes()
    }

    fn output_shapes(&self) -> &[PartialShape] {
        self.input.output_shapes()
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        let state = ShuffleState {
            input: Some(input),
            buffer: Vec::with_capacity(preallocated(self.buffer_size)),
            rng: self.rng(),
        };
        Box::new(ShuffleIterator {
            dataset: self,
            state: Mutex::new(state),
        })
    }

    fn debug_string(&self) -> String {
        format!("ShuffleDatasetOp({})::Dataset", self.buffer_size)
    }
}

struct ShuffleState {
    /// `None` once the input has ended
    input: Option<Box<dyn DatasetIterator>>,
    buffer: Vec<Element>,
    rng: StdRng,
}

struct ShuffleIterator {
    dataset: Arc<ShuffleDataset>,
    state: Mutex<ShuffleState>,
}

impl DatasetIterator for ShuffleIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        while state.buffer.len() < self.dataset.buffer_size {
            let Some(input) = state.input.as_ref() else {
                break;
            };
            match input.get_next(ctx)? {
                Some(element) => state.buffer.push(element),
                None => {
                    trace!(buffered = state.buffer.len(), "ShuffleDataset input exhausted");
                    state.input = None;
                }
            }
        }
        if state.buffer.is_empty() {
            return Ok(None);
        }
        let index = state.rng.gen_range(0..state.buffer.len());
        Ok(Some(state.buffer.swap_remove(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::{drain, ints, scalars};
    use proptest::prelude::*;

    fn shuffled(values: &[i64], buffer_size: i64, seed: i64) -> Vec<i64> {
        let dataset: DatasetRef = Arc::new(ShuffleDataset::new(ints(values), buffer_size, seed, 0).unwrap());
        scalars(&drain(&dataset))
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let values: Vec<i64> = (0..50).collect();
        assert_eq!(shuffled(&values, 10, 42), shuffled(&values, 10, 42));
    }

    #[test]
    fn test_iterators_share_random_seed() {
        let values: Vec<i64> = (0..50).collect();
        let dataset: DatasetRef = Arc::new(ShuffleDataset::new(ints(&values), 50, 0, 0).unwrap());
        assert_eq!(scalars(&drain(&dataset)), scalars(&drain(&dataset)));
    }

    #[test]
    fn test_buffer_of_one_preserves_order() {
        assert_eq!(shuffled(&[1, 2, 3, 4], 1, 7), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_buffer_size_beyond_input_length() {
        let dataset: DatasetRef = Arc::new(ShuffleDataset::new(ints(&[1, 2, 3]), i64::MAX, 1, 2).unwrap());
        let mut out = scalars(&drain(&dataset));
        out.sort_unstable();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_buffer_size() {
        assert!(matches!(
            ShuffleDataset::new(ints(&[1]), 0, 0, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_emits_permutation(values in prop::collection::vec(any::<i64>(), 0..60), buffer in 1i64..20, seed in 1i64..1000) {
            let mut out = shuffled(&values, buffer, seed);
            let mut expected = values.clone();
            out.sort_unstable();
            expected.sort_unstable();
            prop_assert_eq!(out, expected);
        }
    }
}
