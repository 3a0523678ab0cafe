//! Streams: immutable, classified handles over files flowing through the pipeline.
//!
//! A stream is either *original* (files handed in from outside) or
//! *intermediate* (a root owned by the pipeline and filled by a transform).
//! Both kinds expose the same two execution-time views:
//! [`Stream::as_non_incremental_input`] and [`Stream::as_incremental_input`].

pub mod folder;
pub mod input;
pub mod types;

pub use folder::{Artifact, Format, IntermediateFolder};
pub use input::{ChangedFiles, DirectoryInput, JarInput, Status, TransformInput, changes_under};
pub use types::{InputError, Stream, StreamId, StreamLocator, TransformId};
