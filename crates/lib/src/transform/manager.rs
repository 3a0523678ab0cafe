//! The stream registry.
//!
//! Holds the pool of available streams and, for each transform added,
//! matches the pool against the transform's requested types and scopes:
//! - streams covered entirely are consumed as-is
//! - streams covered partially are split into a consumed restricted copy and
//!   remainder copies that go back into the pool
//! - streams sharing types and a referenced scope are handed over whole and
//!   stay in the pool
//!
//! Registration is single-threaded; callers own the manager mutably and add
//! transforms in a fixed order.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::classify::{ContentTypes, Scopes, describe};
use crate::stream::{Stream, StreamId, StreamLocator, TransformId};

use super::graph::{GraphError, TransformGraph};
use super::issues::{IssueReporter, LoggingReporter};
use super::layout::OutputLayout;
use super::types::{ConfigError, RegisteredTransform, TransformDescriptor};
use super::validate::ValidationPolicy;

/// Result of matching one stream against requested types and scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Match {
  /// No overlap on at least one axis.
  Untouched,
  /// Covered entirely.
  Whole,
  /// Covered partially; the consumed part and what goes back to the pool.
  Split { consumed: Stream, remainders: Vec<Stream> },
}

/// Match `stream` against `types` x `scopes`.
///
/// On partial overlap the consumed copy carries `common_types x common_scopes`.
/// The remainder is at most two copies, `(types \ common) x scopes` and
/// `common_types x (scopes \ common)`, so the consumed copy and the remainders
/// together cover the original product exactly once.
pub(crate) fn match_stream(
  stream: &Stream,
  types: &ContentTypes,
  scopes: &Scopes,
  next_id: &mut impl FnMut() -> StreamId,
) -> Match {
  let common_types: ContentTypes = stream.content_types().intersection(types).copied().collect();
  let common_scopes: Scopes = stream.scopes().intersection(scopes).copied().collect();

  if common_types.is_empty() || common_scopes.is_empty() {
    return Match::Untouched;
  }
  if &common_types == stream.content_types() && &common_scopes == stream.scopes() {
    return Match::Whole;
  }

  let rest_types: ContentTypes = stream.content_types().difference(&common_types).copied().collect();
  let rest_scopes: Scopes = stream.scopes().difference(&common_scopes).copied().collect();

  let consumed = stream.restricted(next_id(), common_types.clone(), common_scopes);
  let mut remainders = Vec::with_capacity(2);
  if !rest_types.is_empty() {
    remainders.push(stream.restricted(next_id(), rest_types, stream.scopes().clone()));
  }
  if !rest_scopes.is_empty() {
    remainders.push(stream.restricted(next_id(), common_types, rest_scopes));
  }

  Match::Split { consumed, remainders }
}

/// Builds the transform pipeline for one variant.
pub struct TransformManager<R: IssueReporter = LoggingReporter> {
  variant: String,
  layout: OutputLayout,
  policy: ValidationPolicy,
  reporter: R,
  streams: Vec<Stream>,
  transforms: Vec<TransformDescriptor>,
  registrations: Vec<RegisteredTransform>,
  next_stream_id: u32,
}

impl TransformManager<LoggingReporter> {
  pub fn new(variant: impl Into<String>, layout: OutputLayout) -> Self {
    Self::with_reporter(variant, layout, LoggingReporter)
  }
}

impl<R: IssueReporter> TransformManager<R> {
  pub fn with_reporter(variant: impl Into<String>, layout: OutputLayout, reporter: R) -> Self {
    Self {
      variant: variant.into(),
      layout,
      policy: ValidationPolicy::default(),
      reporter,
      streams: Vec::new(),
      transforms: Vec::new(),
      registrations: Vec::new(),
      next_stream_id: 0,
    }
  }

  pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn variant(&self) -> &str {
    &self.variant
  }

  pub fn layout(&self) -> &OutputLayout {
    &self.layout
  }

  pub fn reporter(&self) -> &R {
    &self.reporter
  }

  /// Currently available streams, in pool order.
  pub fn streams(&self) -> &[Stream] {
    &self.streams
  }

  /// Every descriptor passed to [`add_transform`](Self::add_transform) that
  /// was accepted, no-ops included.
  pub fn transforms(&self) -> &[TransformDescriptor] {
    &self.transforms
  }

  pub fn registrations(&self) -> &[RegisteredTransform] {
    &self.registrations
  }

  pub fn registration(&self, id: TransformId) -> Option<&RegisteredTransform> {
    self.registrations.get(id.0)
  }

  /// Streams in the pool carrying any of `types` in any of `scopes`.
  pub fn pipeline_output(&self, types: &ContentTypes, scopes: &Scopes) -> Vec<&Stream> {
    self
      .streams
      .iter()
      .filter(|stream| !stream.content_types().is_disjoint(types) && !stream.scopes().is_disjoint(scopes))
      .collect()
  }

  fn allocate_id(&mut self) -> StreamId {
    let id = StreamId(self.next_stream_id);
    self.next_stream_id += 1;
    id
  }

  /// Add a stream of files handed in from outside the pipeline.
  pub fn add_original_stream(
    &mut self,
    name: impl Into<String>,
    content_types: ContentTypes,
    scopes: Scopes,
    jars: Vec<PathBuf>,
    directories: Vec<PathBuf>,
  ) -> Result<StreamId, ConfigError> {
    let name = name.into();
    if content_types.is_empty() || scopes.is_empty() {
      let err = ConfigError::EmptyStream {
        stream: name,
        variant: self.variant.clone(),
      };
      self.reporter.report(&err);
      return Err(err);
    }

    let id = self.allocate_id();
    let stream = Stream::new(
      id,
      name,
      content_types,
      scopes,
      StreamLocator::Original { jars, directories },
      None,
    );
    debug!(stream = %stream, "added original stream");
    self.streams.push(stream);
    Ok(id)
  }

  /// Match the pool against `types` x `scopes` and remove what matched.
  ///
  /// Pool order is kept: a split stream's remainders take its place.
  fn take_matching(&mut self, types: &ContentTypes, scopes: &Scopes) -> (Vec<Stream>, Vec<Stream>) {
    let mut next = self.next_stream_id;
    let mut next_id = || {
      let id = StreamId(next);
      next += 1;
      id
    };

    let mut consumed = Vec::new();
    let mut pool = Vec::with_capacity(self.streams.len());
    for stream in &self.streams {
      match match_stream(stream, types, scopes, &mut next_id) {
        Match::Untouched => pool.push(stream.clone()),
        Match::Whole => consumed.push(stream.clone()),
        Match::Split {
          consumed: part,
          remainders,
        } => {
          debug!(
            stream = %stream,
            consumed = %part,
            remainders = remainders.len(),
            "split stream"
          );
          consumed.push(part);
          pool.extend(remainders);
        }
      }
    }

    self.next_stream_id = next;
    (consumed, pool)
  }

  /// Remove every stream matching `types` x `scopes` without producing an
  /// output. Used when the streams are taken by something outside the
  /// pipeline.
  pub fn consume_streams(&mut self, types: &ContentTypes, scopes: &Scopes) -> Vec<Stream> {
    let (consumed, pool) = self.take_matching(types, scopes);
    debug!(
      types = %describe(types),
      scopes = %describe(scopes),
      consumed = consumed.len(),
      "consumed streams"
    );
    self.streams = pool;
    consumed
  }

  /// Register a transform.
  ///
  /// Returns `Ok(None)` for a no-op transform (empty `scopes`). Configuration
  /// errors are sent to the reporter, returned, and leave the pool unchanged.
  pub fn add_transform(
    &mut self,
    descriptor: TransformDescriptor,
  ) -> Result<Option<RegisteredTransform>, ConfigError> {
    if descriptor.is_no_op() {
      debug!(transform = %descriptor.name, "no-op transform, nothing consumed");
      self.transforms.push(descriptor);
      return Ok(None);
    }

    if let Err(err) = self.policy.validate(&descriptor, &self.variant) {
      self.reporter.report(&err);
      return Err(err);
    }

    let referenced: Vec<Stream> = self
      .streams
      .iter()
      .filter(|stream| {
        !stream.content_types().is_disjoint(&descriptor.input_types)
          && !stream.scopes().is_disjoint(&descriptor.referenced_scopes)
      })
      .cloned()
      .collect();

    let saved_id = self.next_stream_id;
    let (inputs, pool) = self.take_matching(&descriptor.input_types, &descriptor.scopes);

    if inputs.is_empty() && referenced.is_empty() {
      self.next_stream_id = saved_id;
      let err = ConfigError::streams_not_available(&descriptor, &self.variant);
      self.reporter.report(&err);
      return Err(err);
    }

    self.streams = pool;

    let id = TransformId(self.registrations.len());
    let root = self.layout.output_root(&descriptor.name, &self.variant);
    let output_id = self.allocate_id();
    let output = Stream::new(
      output_id,
      descriptor.name.clone(),
      descriptor.output_types().clone(),
      descriptor.scopes.clone(),
      StreamLocator::Intermediate { root },
      Some(id),
    );
    self.streams.push(output.clone());

    let registered = RegisteredTransform {
      id,
      task_name: task_name(&descriptor, &self.variant),
      descriptor: descriptor.clone(),
      inputs,
      referenced,
      output,
    };

    info!(
      transform = %descriptor.name,
      task = %registered.task_name,
      consumed = registered.inputs.len(),
      referenced = registered.referenced.len(),
      output = %registered.output,
      "registered transform"
    );

    self.transforms.push(descriptor);
    self.registrations.push(registered.clone());
    Ok(Some(registered))
  }

  /// Producer to consumer edges between registered transforms.
  pub fn dependency_graph(&self) -> Result<TransformGraph, GraphError> {
    TransformGraph::from_registrations(&self.registrations)
  }
}

/// `transform<Types>With<Name>For<Variant>`, e.g.
/// `transformClassesAndResourcesWithDexForDebug`.
///
/// Types are listed in [`ContentType`](crate::classify::ContentType)
/// declaration order, whatever order the descriptor gave them in.
pub fn task_name(descriptor: &TransformDescriptor, variant: &str) -> String {
  let types: Vec<String> = descriptor.input_types.iter().map(|t| t.task_label()).collect();
  format!(
    "transform{}With{}For{}",
    types.join("And"),
    capitalize(&descriptor.name),
    capitalize(variant)
  )
}

fn capitalize(value: &str) -> String {
  let mut chars = value.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
