//! Dataset and iterator traits
//!
//! A [`Dataset`] is an immutable description of a stream of elements. It is
//! shared through [`DatasetRef`] and produces any number of independent
//! [`DatasetIterator`]s. Wrapping datasets hold a `DatasetRef` to each upstream
//! dataset, and every iterator holds an `Arc` to its own dataset, so upstream
//! stages live at least as long as anything built on top of them.

use std::fmt;
use std::sync::Arc;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::executor::Runner;
use crate::resource::{Resource, ResourceKind};
use crate::shape::PartialShape;
use crate::tensor::Tensor;

/// One row of a pipeline: an ordered tuple of component tensors
pub type Element = Vec<Tensor>;

/// Shared ownership handle to a dataset
pub type DatasetRef = Arc<dyn Dataset>;

/// An immutable, shareable description of a stream of elements
pub trait Dataset: Send + Sync {
    /// Per-component dtypes of every element
    fn output_dtypes(&self) -> &[DType];

    /// Per-component shapes of every element; produced shapes may be more specific
    fn output_shapes(&self) -> &[PartialShape];

    /// Create a fresh, independent cursor over this dataset
    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator>;

    /// Short description naming the operator and its parameters
    fn debug_string(&self) -> String;
}

impl fmt::Debug for dyn Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

/// A stateful cursor over a dataset
///
/// `get_next` returns `Ok(None)` at end of sequence. Once it has done so, every
/// later call also returns `Ok(None)`. After an error the iterator should not
/// be pulled again.
///
/// Implementations guard their mutable state with interior locks, so an
/// iterator may be shared between threads; concurrent callers may observe
/// elements in a non-deterministic order.
pub trait DatasetIterator: Send + Sync {
    /// Pull the next element
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>>;
}

/// Per-call environment passed down the iterator chain
#[derive(Debug, Clone, Default)]
pub struct IteratorContext {
    runner: Runner,
}

impl IteratorContext {
    /// Create a context that schedules function work with `runner`
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    /// Get the runner for captured-function work
    pub fn runner(&self) -> &Runner {
        &self.runner
    }
}

/// Adapts a [`DatasetIterator`] into a std iterator of `Result<Element>`
///
/// Iteration stops after end of sequence or after yielding the first error.
pub struct Elements<'a> {
    iterator: &'a dyn DatasetIterator,
    ctx: &'a IteratorContext,
    done: bool,
}

impl<'a> Elements<'a> {
    /// Wrap `iterator`
    pub fn new(iterator: &'a dyn DatasetIterator, ctx: &'a IteratorContext) -> Self {
        Self {
            iterator,
            ctx,
            done: false,
        }
    }
}

impl Iterator for Elements<'_> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.iterator.get_next(self.ctx) {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Drain a fresh iterator over `dataset`
pub fn collect_elements(dataset: &DatasetRef, ctx: &IteratorContext) -> Result<Vec<Element>> {
    let iterator = Arc::clone(dataset).make_iterator();
    Elements::new(iterator.as_ref(), ctx).collect()
}

/// Check that `element` conforms to declared dtypes and shapes
pub fn validate_element(
    dtypes: &[DType],
    shapes: &[PartialShape],
    element: &[Tensor],
) -> Result<()> {
    if element.len() != dtypes.len() {
        return Err(Error::InvalidArgument(format!(
            "Element has {} components, expected {}",
            element.len(),
            dtypes.len()
        )));
    }
    for (i, component) in element.iter().enumerate() {
        if component.dtype() != dtypes[i] {
            return Err(Error::InvalidArgument(format!(
                "Component {i} has dtype {}, expected {}",
                component.dtype(),
                dtypes[i]
            )));
        }
        if let Some(shape) = shapes.get(i) {
            if !shape.is_compatible_with(component.shape()) {
                return Err(Error::InvalidArgument(format!(
                    "Component {i} has shape {}, incompatible with {shape}",
                    component.shape()
                )));
            }
        }
    }
    Ok(())
}

/// Registry entry wrapping a published dataset
pub struct DatasetResource {
    dataset: DatasetRef,
}

impl DatasetResource {
    /// Wrap `dataset`
    pub fn new(dataset: DatasetRef) -> Self {
        Self { dataset }
    }

    /// Get a new reference to the wrapped dataset
    pub fn dataset(&self) -> DatasetRef {
        Arc::clone(&self.dataset)
    }
}

impl Resource for DatasetResource {
    const KIND: ResourceKind = ResourceKind::Dataset;

    fn debug_string(&self) -> String {
        self.dataset.debug_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Countdown {
        dtypes: Vec<DType>,
        shapes: Vec<PartialShape>,
        from: i64,
    }

    struct CountdownIterator {
        next: Mutex<i64>,
    }

    impl Dataset for Countdown {
        fn output_dtypes(&self) -> &[DType] {
            &self.dtypes
        }

        fn output_shapes(&self) -> &[PartialShape] {
            &self.shapes
        }

        fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
            Box::new(CountdownIterator {
                next: Mutex::new(self.from),
            })
        }

        fn debug_string(&self) -> String {
            format!("Countdown({})", self.from)
        }
    }

    impl DatasetIterator for CountdownIterator {
        fn get_next(&self, _ctx: &IteratorContext) -> Result<Option<Element>> {
            let mut next = self.next.lock();
            if *next == 0 {
                return Ok(None);
            }
            let value = *next;
            *next -= 1;
            Ok(Some(vec![Tensor::scalar(value)]))
        }
    }

    fn countdown(from: i64) -> DatasetRef {
        Arc::new(Countdown {
            dtypes: vec![DType::Int64],
            shapes: vec![PartialShape::scalar()],
            from,
        })
    }

    #[test]
    fn test_collect_elements_uses_fresh_iterator() {
        let dataset = countdown(3);
        let ctx = IteratorContext::default();
        let first = collect_elements(&dataset, &ctx).unwrap();
        let second = collect_elements(&dataset, &ctx).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(format!("{dataset:?}"), "Countdown(3)");
    }

    #[test]
    fn test_validate_element() {
        let dtypes = [DType::Int64];
        let shapes = [PartialShape::scalar()];
        assert!(validate_element(&dtypes, &shapes, &[Tensor::scalar(1i64)]).is_ok());
        assert!(validate_element(&dtypes, &shapes, &[Tensor::scalar(1i32)]).is_err());
        assert!(validate_element(&dtypes, &shapes, &[Tensor::vector(vec![1i64])]).is_err());
        assert!(validate_element(&dtypes, &shapes, &[]).is_err());
    }

    #[test]
    fn test_elements_stops_after_end() {
        let iterator = countdown(1).make_iterator();
        let ctx = IteratorContext::default();
        let mut elements = Elements::new(iterator.as_ref(), &ctx);
        assert!(elements.next().is_some());
        assert!(elements.next().is_none());
        assert!(elements.next().is_none());
    }
}
