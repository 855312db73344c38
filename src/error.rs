//! Error types for recording, sweeping, and tape (de)serialization.

use thiserror::Error;

use crate::opcode::OpCode;
use crate::tape::TapeId;

/// Errors raised by the recorder, the sweeps, and the tape codec.
#[derive(Debug, Error)]
pub enum AdError {
    /// An operand belongs to a tape that is recording on another thread.
    #[error("operand belongs to tape {found}, which is recording elsewhere (active here: {active:?})")]
    InvalidTapeMix {
        found: TapeId,
        active: Option<TapeId>,
    },

    /// `Tape::start` while a recording is already active on this thread.
    #[error("a recording (tape {active}) is already active on this thread")]
    NestedRecording { active: TapeId },

    /// The operation needs an active recording on this thread.
    #[error("no recording is active on this thread")]
    NotRecording,

    /// The opcode does not fit the entry point it was passed to.
    #[error("{0:?} cannot be applied here")]
    InvalidOpcode(OpCode),

    /// A node reference was requested from a constant scalar.
    #[error("scalar is a constant, not a tape variable")]
    NotAVariable,

    /// A sweep needs Taylor orders that have not been computed yet.
    #[error("no base point: order {required} needs orders 0..{required} but {available} are computed")]
    NoBasePoint { required: usize, available: usize },

    /// Reverse sweeps start at order one.
    #[error("invalid sweep order {order}")]
    InvalidOrder { order: usize },

    /// A vector argument has the wrong length.
    #[error("shape mismatch in {context}: expected {expected}, got {found}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// The stream names an opcode this build does not know.
    #[error("unknown opcode tag {tag} at node {node}")]
    UnknownOpcode { tag: u8, node: usize },

    /// The stream ended before the tape was complete.
    #[error("tape stream truncated at byte {offset}: {needed} more bytes needed")]
    TruncatedTape { offset: usize, needed: usize },

    /// The stream was written by an incompatible format version.
    #[error("unsupported tape format version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    /// The stream decoded but does not describe a valid tape.
    #[error("malformed tape: {0}")]
    MalformedTape(String),

    /// The stream references an atomic operation missing from the registry.
    #[error("atomic operation `{0}` is not registered")]
    UnknownAtomic(String),

    /// Atomic operations carry code and cannot go through serde.
    #[error("cannot serialize a tape that calls atomic operation `{0}`; use the binary codec and re-register it")]
    AtomicNotSerializable(String),

    /// An atomic callback reported failure.
    #[error("atomic operation `{name}` failed at order {order}")]
    AtomicFailed { name: String, order: usize },

    /// A taped vector was indexed outside its bounds.
    #[error("index {index} out of range for taped vector of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// NaN in a dependent while every recorded leaf was finite or non-NaN.
    #[error("NaN in dependent {dependent} at order {order} although no independent or constant is NaN")]
    NanDiagnostic { dependent: usize, order: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = AdError> = std::result::Result<T, E>;
