use crate::value::SlotKind;
use thiserror::Error;

/// Recoverable conditions raised by the clock objects.
///
/// None of these are fatal: the object reports the condition, applies the
/// documented fallback and keeps running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TempoError {
    /// A value supplied for a reference slot was not a reference.
    #[error("bad reference value for slot {slot}")]
    BadReferenceValue {
        /// Slot index that received the value.
        slot: usize,
    },

    /// A reference held by a pending delivery no longer points to live state.
    #[error("stale reference in slot {slot}")]
    StaleReference {
        /// Slot index of the skipped entry.
        slot: usize,
    },

    /// A duration was negative, too small or non-finite and has been clamped.
    #[error("invalid duration {value}, clamped to {clamped}")]
    InvalidDuration {
        /// Requested duration.
        value: f64,
        /// Duration actually used.
        clamped: f64,
    },

    /// A slot descriptor carried an unknown type character.
    #[error("slot {slot}: unsupported type tag '{tag}'")]
    UnsupportedTypeTag {
        /// Slot index of the descriptor.
        slot: usize,
        /// The offending descriptor text.
        tag: String,
    },

    /// The trailing creation argument of a queue was not a number.
    #[error("{argument}: bad time delay value")]
    BadDelayArgument {
        /// Textual form of the offending argument.
        argument: String,
    },

    /// A slot index was outside the declared arity.
    #[error("slot index {index} out of range (arity {arity})")]
    SlotOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of declared slots.
        arity: usize,
    },

    /// A value did not match the declared slot type.
    #[error("slot {index} expects {expected}, got {found}")]
    SlotTypeMismatch {
        /// Slot index.
        index: usize,
        /// Declared slot type.
        expected: SlotKind,
        /// Type of the supplied value.
        found: SlotKind,
    },
}

/// Convenience type alias for tempo operations.
pub type TempoResult<T> = Result<T, TempoError>;
