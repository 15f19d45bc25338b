//! Internal error handling for faultline
//!
//! Failures of faultline's own machinery (loading configuration, delivering
//! report batches, serializing payloads) are described by [`FaultlineError`].
//! They are deliberately separate from [`crate::taxonomy::AppError`], which is
//! the *data* that flows through recovery and reporting.
//!
//! ## Propagation rules
//!
//! - Configuration problems surface from `Config::from_file`/`validate` and
//!   stop startup.
//! - Sink delivery problems never leave the reporter; they are logged and
//!   dropped.
//! - Nothing in the recovery path returns a `FaultlineError` to the caller of
//!   a guarded operation.

pub mod constructors;
pub mod conversions;
pub mod types;

pub use types::{FaultlineError, FaultlineResult};
