//! Trace-and-replay algorithmic differentiation.
//!
//! Arithmetic on [`Ad`] values is recorded into an operation log while a
//! [`Tape`] is active. Stopping the tape freezes the log into a
//! [`Function`], which can be replayed at new points by forward sweeps
//! (Taylor coefficients of any order), differentiated by reverse sweeps,
//! and encoded to bytes.
//!
//! ```
//! use adtape::{Ad, Tape};
//!
//! let mut x = [Ad::constant(1.0_f64), Ad::constant(2.0)];
//! let tape = Tape::start(&mut x).unwrap();
//! let y = [x[0] * x[1], x[0].exp()];
//! let f = tape.stop(&y).unwrap();
//!
//! let mut state = f.new_state();
//! assert_eq!(f.forward(&mut state, 0, &[3.0, 4.0]).unwrap()[0], 12.0);
//! let dw = f.reverse(&mut state, 1, &[1.0, 0.0]).unwrap();
//! assert_eq!(dw, vec![4.0, 3.0]);
//! ```

pub mod ad;
pub mod api;
pub mod atomic;
pub mod error;
pub mod float;
pub mod function;
pub mod opcode;
pub mod scalar;
pub mod tape;
pub mod taylor_ops;
mod traits;
pub mod vec_ad;

pub use ad::Ad;
pub use api::{record, record_multi};
pub use atomic::{Atomic, AtomicOp};
pub use error::{AdError, Result};
pub use float::Float;
pub use function::{BranchPolicy, Function, FunctionOptions, SweepState, FORMAT_VERSION, MAGIC};
pub use opcode::{CompareOp, OpCode};
pub use scalar::Scalar;
pub use tape::{NodeRef, OperationLog, RecorderThreadLocal, Tape, TapeId};
pub use vec_ad::VecAd;

/// Tape scalar over `f64`.
pub type Ad64 = Ad<f64>;
/// Tape scalar over `f32`.
pub type Ad32 = Ad<f32>;
/// Recorded function over `f64`.
pub type Function64 = Function<f64>;
