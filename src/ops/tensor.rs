//! TL-008: Minimal dense tensor — row-major f32 storage.
//!
//! Just enough surface for the reference kernels: scalar/vector construction,
//! elementwise map/zip with scalar broadcast, truthiness for predicates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dense row-major f32 tensor. A scalar is a tensor with an empty shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimension sizes; empty for a scalar
    pub shape: Vec<usize>,

    /// Row-major element storage
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that the data length matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, String> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(format!(
                "shape {:?} implies {} elements, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    /// A rank-0 scalar.
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// A rank-1 vector.
    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The single element of a one-element tensor, if it is one.
    pub fn scalar_value(&self) -> Option<f32> {
        if self.data.len() == 1 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Predicate interpretation: a one-element tensor is truthy when nonzero.
    pub fn truthy(&self) -> Result<bool, String> {
        match self.scalar_value() {
            Some(v) => Ok(v != 0.0),
            None => Err(format!(
                "predicate must be a single-element tensor, got shape {:?}",
                self.shape
            )),
        }
    }

    /// Apply `f` to every element.
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Elementwise combine with `other`. Shapes must match, except that a
    /// one-element tensor on either side broadcasts against the other.
    pub fn zip_map<F: Fn(f32, f32) -> f32>(&self, other: &Tensor, f: F) -> Result<Tensor, String> {
        if self.shape == other.shape {
            let data = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect();
            return Ok(Tensor {
                shape: self.shape.clone(),
                data,
            });
        }
        if let Some(b) = other.scalar_value() {
            return Ok(self.map(|a| f(a, b)));
        }
        if let Some(a) = self.scalar_value() {
            return Ok(Tensor {
                shape: other.shape.clone(),
                data: other.data.iter().map(|&b| f(a, b)).collect(),
            });
        }
        Err(format!(
            "shape mismatch: {:?} vs {:?}",
            self.shape, other.shape
        ))
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scalar_value() {
            Some(v) if self.rank() == 0 => write!(f, "{}", v),
            _ => write!(f, "{:?} {:?}", self.shape, self.data),
        }
    }
}
