//! xform-lib: the transform pipeline core.
//!
//! This crate provides the pieces that wire build steps together:
//! - `classify`: content types, scopes and the folder codec that persists them
//! - `stream`: classified handles over files flowing through the pipeline
//! - `incremental`: per-file change computation for directories and jars
//! - `transform`: the stream registry that matches, splits and produces streams
//! - `definition`: JSON pipeline definitions for driving the registry

pub mod cache_lock;
pub mod classify;
pub mod consts;
pub mod definition;
pub mod incremental;
pub mod platform;
pub mod stream;
pub mod transform;
pub mod util;
