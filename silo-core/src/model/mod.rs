//! Model representation: weight tensors, weight sets and their layout.
//!
//! A model is an ordered sequence of n-dimensional weight tensors. The
//! order is the layer order of the underlying architecture and is
//! semantically significant: it must never be reordered. All weight sets
//! that participate in one aggregation round must conform to the same
//! [`WeightLayout`].

use std::slice::{Iter, IterMut};

use derive_more::{From, Index, IndexMut, Into};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("a tensor of shape {shape:?} holds {expected} weights, but {actual} were supplied")]
/// An error related to the construction of a weight tensor.
pub struct InvalidTensorError {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors related to layout validation of weight sets.
pub enum LayoutError {
    #[error("the update has {actual} tensors, the layout expects {expected}")]
    TensorCount { expected: usize, actual: usize },

    #[error("tensor {index} has shape {actual:?}, the layout expects {expected:?}")]
    Shape {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("a flat vector of length {actual} cannot fill a layout of total length {expected}")]
    TotalLength { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An n-dimensional array of weights with row-major flat storage.
pub struct WeightTensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl WeightTensor {
    /// Creates a new weight tensor from a shape and its row-major data.
    ///
    /// A scalar tensor has an empty shape and exactly one weight.
    ///
    /// # Errors
    /// Fails if the number of weights does not match the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, InvalidTensorError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(InvalidTensorError {
                expected,
                actual: data.len(),
                shape,
            });
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor of the given shape with all weights set to zero.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            data: vec![0.; len],
        }
    }

    /// Gets the shape of this tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Gets the number of weights of this tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks if this tensor holds no weights.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gets the row-major weights of this tensor.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Gets the row-major weights of this tensor mutably.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

#[derive(From, Index, IndexMut, Into, Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An ordered sequence of weight tensors representing one model.
pub struct WeightSet(Vec<WeightTensor>);

#[allow(clippy::len_without_is_empty)]
impl WeightSet {
    /// Creates a new weight set from tensors in layer order.
    pub fn new(tensors: Vec<WeightTensor>) -> Self {
        Self(tensors)
    }

    /// Creates a weight set of zeros conforming to the given layout.
    pub fn zeros(layout: &WeightLayout) -> Self {
        Self(
            layout
                .shapes()
                .iter()
                .map(|shape| WeightTensor::zeros(shape.clone()))
                .collect(),
        )
    }

    /// Gets the number of tensors of this weight set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Creates an iterator that yields references to the tensors in layer order.
    pub fn iter(&self) -> Iter<'_, WeightTensor> {
        self.0.iter()
    }

    /// Creates an iterator that yields mutable references to the tensors in layer order.
    pub fn iter_mut(&mut self) -> IterMut<'_, WeightTensor> {
        self.0.iter_mut()
    }

    /// Flattens all tensors into one numeric vector in layout order.
    pub fn flatten(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.iter().map(WeightTensor::len).sum());
        for tensor in self.iter() {
            flat.extend_from_slice(tensor.data());
        }
        flat
    }

    /// Rebuilds a weight set from a flat vector according to the given layout.
    ///
    /// The inverse of [`flatten()`]: the vector is split in layout order and
    /// each piece is reshaped to its descriptor.
    ///
    /// # Errors
    /// Fails if the vector length does not equal the total length of the layout.
    ///
    /// [`flatten()`]: WeightSet::flatten
    pub fn unflatten(layout: &WeightLayout, flat: &[f64]) -> Result<Self, LayoutError> {
        if flat.len() != layout.total_len() {
            return Err(LayoutError::TotalLength {
                expected: layout.total_len(),
                actual: flat.len(),
            });
        }
        let mut tensors = Vec::with_capacity(layout.len());
        let mut offset = 0;
        for shape in layout.shapes() {
            let size = shape.iter().product::<usize>();
            let data = flat[offset..offset + size].to_vec();
            // safe unwrap: the slice length is the shape product by construction
            tensors.push(WeightTensor::new(shape.clone(), data).unwrap());
            offset += size;
        }
        Ok(Self(tensors))
    }
}

impl<'a> IntoIterator for &'a WeightSet {
    type Item = &'a WeightTensor;
    type IntoIter = Iter<'a, WeightTensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// An ordered sequence of shape descriptors for one model architecture.
///
/// Derived from a reference architecture and immutable once an aggregation
/// round starts. Used to flatten/unflatten weight sets and to validate
/// compatibility between updates.
pub struct WeightLayout(Vec<Vec<usize>>);

#[allow(clippy::len_without_is_empty)]
impl WeightLayout {
    /// Creates a layout from an ordered sequence of shapes.
    pub fn new(shapes: Vec<Vec<usize>>) -> Self {
        Self(shapes)
    }

    /// Derives the layout of the given weight set.
    pub fn of(weights: &WeightSet) -> Self {
        Self(weights.iter().map(|t| t.shape().to_vec()).collect())
    }

    /// Gets the number of tensors this layout describes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Gets the ordered shape descriptors.
    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.0
    }

    /// Gets the total number of weights across all tensors.
    pub fn total_len(&self) -> usize {
        self.0.iter().map(|shape| shape.iter().product::<usize>()).sum()
    }

    /// Validates that the given weight set conforms to this layout.
    ///
    /// # Errors
    /// Fails on a tensor count mismatch or on the first shape disagreement.
    pub fn matches(&self, weights: &WeightSet) -> Result<(), LayoutError> {
        if weights.len() != self.len() {
            return Err(LayoutError::TensorCount {
                expected: self.len(),
                actual: weights.len(),
            });
        }
        for (index, (shape, tensor)) in self.0.iter().zip(weights.iter()).enumerate() {
            if tensor.shape() != shape.as_slice() {
                return Err(LayoutError::Shape {
                    index,
                    expected: shape.clone(),
                    actual: tensor.shape().to_vec(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(shape: Vec<usize>, data: Vec<f64>) -> WeightTensor {
        WeightTensor::new(shape, data).unwrap()
    }

    #[test]
    fn test_tensor_shape_validation() {
        assert!(WeightTensor::new(vec![2, 3], vec![0.; 6]).is_ok());
        assert!(WeightTensor::new(vec![2, 3], vec![0.; 5]).is_err());
        // scalar tensors have an empty shape and exactly one weight
        assert!(WeightTensor::new(vec![], vec![1.]).is_ok());
        assert!(WeightTensor::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_flatten_unflatten_round_trip() {
        let weights = WeightSet::new(vec![
            tensor(vec![2, 2], vec![1., 2., 3., 4.]),
            tensor(vec![3], vec![5., 6., 7.]),
        ]);
        let layout = WeightLayout::of(&weights);
        assert_eq!(layout.total_len(), 7);

        let flat = weights.flatten();
        assert_eq!(flat, vec![1., 2., 3., 4., 5., 6., 7.]);

        let rebuilt = WeightSet::unflatten(&layout, &flat).unwrap();
        assert_eq!(rebuilt, weights);
    }

    #[test]
    fn test_unflatten_wrong_length() {
        let layout = WeightLayout::new(vec![vec![2, 2], vec![3]]);
        let err = WeightSet::unflatten(&layout, &[0.; 6]).unwrap_err();
        assert_eq!(
            err,
            LayoutError::TotalLength {
                expected: 7,
                actual: 6
            }
        );
    }

    #[test]
    fn test_layout_matches() {
        let layout = WeightLayout::new(vec![vec![4, 2], vec![2]]);
        let good = WeightSet::new(vec![
            tensor(vec![4, 2], vec![0.; 8]),
            tensor(vec![2], vec![0.; 2]),
        ]);
        assert!(layout.matches(&good).is_ok());

        let short = WeightSet::new(vec![tensor(vec![4, 2], vec![0.; 8])]);
        assert_eq!(
            layout.matches(&short).unwrap_err(),
            LayoutError::TensorCount {
                expected: 2,
                actual: 1
            }
        );

        let reshaped = WeightSet::new(vec![
            tensor(vec![2, 4], vec![0.; 8]),
            tensor(vec![2], vec![0.; 2]),
        ]);
        assert!(matches!(
            layout.matches(&reshaped).unwrap_err(),
            LayoutError::Shape { index: 0, .. }
        ));
    }

    #[test]
    fn test_zeros_conform() {
        let layout = WeightLayout::new(vec![vec![4, 2], vec![2]]);
        let zeros = WeightSet::zeros(&layout);
        assert!(layout.matches(&zeros).is_ok());
        assert!(zeros.flatten().iter().all(|w| *w == 0.));
    }
}
