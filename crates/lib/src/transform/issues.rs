//! Where configuration errors go besides the caller.

use std::cell::RefCell;

use tracing::error;

use super::types::ConfigError;

/// Receives every configuration error raised while registering transforms.
pub trait IssueReporter {
  fn report(&self, issue: &ConfigError);
}

/// Logs each issue at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReporter;

impl IssueReporter for LoggingReporter {
  fn report(&self, issue: &ConfigError) {
    error!(subject = issue.subject(), variant = issue.variant(), "{}", issue);
  }
}

/// Keeps every issue for later inspection.
#[derive(Debug, Default)]
pub struct CollectingReporter {
  issues: RefCell<Vec<ConfigError>>,
}

impl CollectingReporter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn issues(&self) -> Vec<ConfigError> {
    self.issues.borrow().clone()
  }

  pub fn is_empty(&self) -> bool {
    self.issues.borrow().is_empty()
  }
}

impl IssueReporter for CollectingReporter {
  fn report(&self, issue: &ConfigError) {
    self.issues.borrow_mut().push(issue.clone());
  }
}

impl<R: IssueReporter + ?Sized> IssueReporter for &R {
  fn report(&self, issue: &ConfigError) {
    (**self).report(issue)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tracing_test::traced_test;

  fn issue() -> ConfigError {
    ConfigError::NoInputTypes {
      transform: "dex".to_string(),
      variant: "debug".to_string(),
    }
  }

  #[test]
  #[traced_test]
  fn logging_reporter_emits_error() {
    LoggingReporter.report(&issue());
    assert!(logs_contain("ERROR"));
    assert!(logs_contain("no input content types declared"));
  }

  #[test]
  fn collecting_reporter_keeps_order() {
    let reporter = CollectingReporter::new();
    assert!(reporter.is_empty());
    reporter.report(&issue());
    (&reporter).report(&ConfigError::EmptyStream {
      stream: "jars".to_string(),
      variant: "debug".to_string(),
    });
    let subjects: Vec<String> = reporter.issues().iter().map(|i| i.subject().to_string()).collect();
    assert_eq!(subjects, vec!["dex", "jars"]);
  }
}
