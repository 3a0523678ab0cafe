//! Transform registration.
//!
//! A [`TransformManager`] keeps the pool of available streams for one variant.
//! Adding a [`TransformDescriptor`] validates it, matches and splits the pool,
//! and yields a [`RegisteredTransform`] that an external scheduler wires into
//! its task graph. At run time a [`TransformInvocation`] resolves the
//! registered streams into full or incremental inputs.

pub mod graph;
pub mod invocation;
pub mod issues;
pub mod layout;
pub mod manager;
pub mod types;
pub mod validate;

pub use graph::{GraphError, TransformGraph};
pub use invocation::{OutputProvider, TransformInvocation};
pub use issues::{CollectingReporter, IssueReporter, LoggingReporter};
pub use layout::OutputLayout;
pub use manager::{TransformManager, task_name};
pub use types::{ConfigError, RegisteredTransform, TransformDescriptor};
pub use validate::{DEFAULT_PROVIDED_ONLY_EXEMPT, ValidationPolicy};
