//! Typed transform chains.
//!
//! A [`Transform`] turns one value into another and may fail; chains are
//! built by composition with [`Transform::then`], piping one stage's output
//! into the next with compile-time type checking. Transforms may keep
//! private working state but must not touch shared state.

use std::marker::PhantomData;
use thiserror::Error;

/// Failure of a single transform step; the worker drops the current batch
/// and carries on.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("empty input batch")]
    EmptyBatch,

    #[error("transform failed: {0}")]
    Failed(String),
}

/// One step of a processing chain.
pub trait Transform: Send {
    type Input;
    type Output;

    fn apply(&mut self, input: Self::Input) -> Result<Self::Output, TransformError>;

    /// Compose with a following transform, feeding this one's output into it.
    fn then<T>(self, next: T) -> Then<Self, T>
    where
        Self: Sized,
        T: Transform<Input = Self::Output>,
    {
        Then {
            first: self,
            second: next,
        }
    }
}

/// Two transforms applied in order. Built by [`Transform::then`].
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<A, B> Transform for Then<A, B>
where
    A: Transform,
    B: Transform<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn apply(&mut self, input: Self::Input) -> Result<Self::Output, TransformError> {
        let mid = self.first.apply(input)?;
        self.second.apply(mid)
    }
}

/// Pass-through transform.
pub struct Identity<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Identity<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Identity<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Transform for Identity<T> {
    type Input = T;
    type Output = T;

    fn apply(&mut self, input: T) -> Result<T, TransformError> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    impl Transform for Double {
        type Input = i64;
        type Output = i64;

        fn apply(&mut self, input: i64) -> Result<i64, TransformError> {
            Ok(input * 2)
        }
    }

    struct ParseNumber;

    impl Transform for ParseNumber {
        type Input = String;
        type Output = i64;

        fn apply(&mut self, input: String) -> Result<i64, TransformError> {
            input
                .parse()
                .map_err(|e| TransformError::Failed(format!("{e}: {input:?}")))
        }
    }

    #[test]
    fn composed_chain_pipes_outputs() {
        let mut chain = ParseNumber.then(Double).then(Double);
        assert_eq!(chain.apply("7".to_string()).unwrap(), 28);
    }

    #[test]
    fn step_failure_propagates_as_chain_failure() {
        let mut chain = ParseNumber.then(Double);
        assert!(chain.apply("not a number".to_string()).is_err());
    }

    #[test]
    fn identity_returns_input() {
        let mut id = Identity::<Vec<u8>>::new();
        assert_eq!(id.apply(vec![1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }
}
