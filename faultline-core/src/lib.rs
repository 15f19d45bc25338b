pub mod config;
pub mod error;
pub mod observability;
pub mod patterns;
pub mod recovery;
pub mod reporting;
pub mod taxonomy;

pub use config::{Config, ConfigBuilder};
pub use error::{FaultlineError, FaultlineResult};
pub use recovery::{RecoveryManager, RecoveryStats, RetryOverrides};
pub use reporting::{ErrorReport, ErrorReporter};
pub use taxonomy::{classify, AppError, ErrorCategory, ErrorContext, RecoveryStrategy, Severity};
