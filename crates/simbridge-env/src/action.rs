//! Action and value inputs accepted by `step`.
//!
//! Callers may hand over a single number or a sequence, integers or floats.
//! Everything is normalised into a flat vector once, at the entry point, so
//! the rest of the session only ever sees `Vec<ActionValue>` / `Vec<f64>`.

use serde::{Deserialize, Serialize};

/// One action element. Integers stay integers on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    Int(i64),
    Float(f64),
}

impl ActionValue {
    /// The element as a float, for comparisons and logging.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl From<i64> for ActionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ActionValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for ActionValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ActionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for ActionValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

/// Action argument of `step`: a scalar or a vector.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionInput {
    Scalar(ActionValue),
    Vector(Vec<ActionValue>),
}

impl ActionInput {
    /// Number of elements after normalisation.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into the wire representation.
    pub fn into_values(self) -> Vec<ActionValue> {
        match self {
            Self::Scalar(value) => vec![value],
            Self::Vector(values) => values,
        }
    }
}

impl From<ActionValue> for ActionInput {
    fn from(value: ActionValue) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for ActionInput {
    fn from(v: i64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<i32> for ActionInput {
    fn from(v: i32) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<u32> for ActionInput {
    fn from(v: u32) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<f64> for ActionInput {
    fn from(v: f64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<f32> for ActionInput {
    fn from(v: f32) -> Self {
        Self::Scalar(v.into())
    }
}

impl<T: Into<ActionValue>> From<Vec<T>> for ActionInput {
    fn from(values: Vec<T>) -> Self {
        Self::Vector(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ActionValue> + Copy> From<&[T]> for ActionInput {
    fn from(values: &[T]) -> Self {
        Self::Vector(values.iter().copied().map(Into::into).collect())
    }
}

impl<T: Into<ActionValue>, const N: usize> From<[T; N]> for ActionInput {
    fn from(values: [T; N]) -> Self {
        Self::Vector(values.into_iter().map(Into::into).collect())
    }
}

/// Value-estimate argument of `step`, forwarded to the simulator for display.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueInput {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ValueInput {
    /// Flatten into the wire representation.
    pub fn into_values(self) -> Vec<f64> {
        match self {
            Self::Scalar(value) => vec![value],
            Self::Vector(values) => values,
        }
    }
}

impl Default for ValueInput {
    fn default() -> Self {
        Self::Vector(Vec::new())
    }
}

impl From<f64> for ValueInput {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<f32> for ValueInput {
    fn from(v: f32) -> Self {
        Self::Scalar(f64::from(v))
    }
}

impl From<i32> for ValueInput {
    fn from(v: i32) -> Self {
        Self::Scalar(f64::from(v))
    }
}

impl<T: Into<f64>> From<Vec<T>> for ValueInput {
    fn from(values: Vec<T>) -> Self {
        Self::Vector(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<f64> + Copy> From<&[T]> for ValueInput {
    fn from(values: &[T]) -> Self {
        Self::Vector(values.iter().copied().map(Into::into).collect())
    }
}

impl<T: Into<f64>, const N: usize> From<[T; N]> for ValueInput {
    fn from(values: [T; N]) -> Self {
        Self::Vector(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_action_becomes_single_element() {
        let input = ActionInput::from(3_i64);
        assert_eq!(input.len(), 1);
        assert_eq!(input.into_values(), vec![ActionValue::Int(3)]);
    }

    #[test]
    fn test_vector_inputs_keep_element_kind() {
        assert_eq!(
            ActionInput::from([0, 1]).into_values(),
            vec![ActionValue::Int(0), ActionValue::Int(1)]
        );
        assert_eq!(
            ActionInput::from(vec![0.25_f64, -1.0]).into_values(),
            vec![ActionValue::Float(0.25), ActionValue::Float(-1.0)]
        );
        let slice: &[f32] = &[0.5];
        assert_eq!(
            ActionInput::from(slice).into_values(),
            vec![ActionValue::Float(0.5)]
        );
    }

    #[test]
    fn test_value_inputs_normalise_to_floats() {
        assert_eq!(ValueInput::from(0.5_f64).into_values(), vec![0.5]);
        assert_eq!(ValueInput::from([1_i32, 2]).into_values(), vec![1.0, 2.0]);
        assert!(ValueInput::default().into_values().is_empty());
    }

    #[test]
    fn test_action_values_serialise_untagged() {
        let json = serde_json::to_string(&vec![ActionValue::Int(1), ActionValue::Float(0.5)])
            .unwrap_or_default();
        assert_eq!(json, "[1,0.5]");
    }
}
