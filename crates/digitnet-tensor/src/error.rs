use thiserror::Error;

use crate::Shape;

/// Errors raised while allocating or combining tensors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    /// The arena has no room left for the requested buffer.
    #[error(
        "Allocation of {requested} bytes exhausted the arena ({live} of {capacity} bytes in use)"
    )]
    AllocationExhausted {
        /// Size of the buffer that could not be allocated.
        requested: usize,
        /// Bytes in use when the allocation was attempted.
        live: usize,
        /// Capacity of the arena.
        capacity: usize,
    },

    /// The data handed to a constructor does not fill the requested shape.
    #[error("Data of length {actual} does not fit shape {shape} ({expected} elements)")]
    DataLength {
        /// The requested shape.
        shape: Shape,
        /// Number of elements the shape holds.
        expected: usize,
        /// Number of elements provided.
        actual: usize,
    },

    /// Two operands have shapes the operation cannot combine.
    #[error("Incompatible shapes for `{op}`: {lhs} and {rhs}")]
    IncompatibleShapes {
        /// The operation.
        op: &'static str,
        /// Shape of the left operand.
        lhs: Shape,
        /// Shape of the right operand.
        rhs: Shape,
    },

    /// The operand does not have the rank the operation works on.
    #[error("`{op}` expects a tensor of rank {expected}, got shape {actual}")]
    InvalidRank {
        /// The operation.
        op: &'static str,
        /// Expected rank.
        expected: usize,
        /// Actual shape.
        actual: Shape,
    },

    /// Any other invalid argument.
    #[error("Invalid argument for `{op}`: {reason}")]
    InvalidArgument {
        /// The operation.
        op: &'static str,
        /// What is wrong with the argument.
        reason: String,
    },
}
