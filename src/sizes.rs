//! Operations over `[width, height]` size pairs.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A banner size, serialized as a `[width, height]` JSON array.
///
/// Components are kept as JSON numbers so that sizes round-trip through ad unit payloads exactly
/// as they were configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Size(pub Number, pub Number);

/// Sizes compare by numeric value, so `300` and `300.0` are the same width.
impl PartialEq for Size {
    fn eq(&self, other: &Size) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }
}

impl Size {
    /// Create a size from any numeric width and height.
    ///
    /// ```
    /// # use ppi::Size;
    /// let size = Size::new(300, 250);
    /// assert_eq!(size.area(), 75_000.0);
    /// ```
    pub fn new(width: impl Into<Number>, height: impl Into<Number>) -> Size {
        Size(width.into(), height.into())
    }

    /// Parse a size from a JSON value. Returns `None` unless [`is_size_valid`] holds.
    pub fn from_value(value: &Value) -> Option<Size> {
        match value.as_array()?.as_slice() {
            [Value::Number(w), Value::Number(h)] => Some(Size(w.clone(), h.clone())),
            _ => None,
        }
    }

    pub fn width(&self) -> f64 {
        self.0.as_f64().unwrap_or(0.0)
    }

    pub fn height(&self) -> f64 {
        self.1.as_f64().unwrap_or(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(vec![Value::Number(self.0.clone()), Value::Number(self.1.clone())])
    }
}

/// Return `true` if `size` is a two-element array of numbers.
///
/// Negative and fractional numbers are accepted.
pub fn is_size_valid(size: &Value) -> bool {
    Size::from_value(size).is_some()
}

/// Sort sizes descending by area, then by width, then by height.
pub fn sort_sizes(mut sizes: Vec<Size>) -> Vec<Size> {
    sizes.sort_by(|a, b| {
        cmp_desc(a.area(), b.area())
            .then_with(|| cmp_desc(a.width(), b.width()))
            .then_with(|| cmp_desc(a.height(), b.height()))
    });
    sizes
}

fn cmp_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Return the sizes of `candidate` that have an exact match in `allowed`, in `candidate` order.
pub fn filter_sizes_by_intersection(candidate: &[Size], allowed: &[Size]) -> Vec<Size> {
    candidate
        .iter()
        .filter(|size| allowed.contains(size))
        .cloned()
        .collect()
}

/// Return `true` if at least one size is present in both sets.
pub(crate) fn intersects(a: &[Size], b: &[Size]) -> bool {
    a.iter().any(|size| b.contains(size))
}

/// Wrap a flat `[w, h]` pair into `[[w, h]]`, the usual mistake in hand-written configuration.
///
/// Returns `None` if `sizes` is not an array.
pub(crate) fn normalize_sizes(sizes: &Value) -> Option<Vec<Value>> {
    let array = sizes.as_array()?;
    if matches!(array.first(), Some(Value::Number(_))) {
        Some(vec![sizes.clone()])
    } else {
        Some(array.clone())
    }
}

/// Serialize a list of sizes as a JSON array of pairs.
pub(crate) fn sizes_to_value(sizes: &[Size]) -> Value {
    Value::Array(sizes.iter().map(Size::to_value).collect())
}
