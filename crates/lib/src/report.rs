//! Decoding of compiler dependency reports.
//!
//! A report is a single protobuf `Dependencies` message listing every class-path
//! entry the compiler saw for one target, each tagged with how it was used.
//! Only explicit and implicit entries are kept by the pipeline; the rest were
//! merely visible to the compiler.

use std::io::{self, Read};

use prost::Message;
use thiserror::Error;

/// Wire representation of a report.
pub mod proto {
  /// All dependencies of one compilation.
  #[derive(Clone, PartialEq, prost::Message)]
  pub struct Dependencies {
    #[prost(message, repeated, tag = "1")]
    pub dependency: Vec<Dependency>,
    #[prost(string, optional, tag = "2")]
    pub rule_label: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub success: Option<bool>,
    #[prost(string, repeated, tag = "4")]
    pub contained_package: Vec<String>,
  }

  #[derive(Clone, PartialEq, prost::Message)]
  pub struct Dependency {
    #[prost(string, required, tag = "1")]
    pub path: String,
    #[prost(enumeration = "Kind", required, tag = "2")]
    pub kind: i32,
    #[prost(message, repeated, tag = "3")]
    pub location: Vec<SourceLocation>,
  }

  /// Where in the sources a dependency was referenced.
  #[derive(Clone, PartialEq, prost::Message)]
  pub struct SourceLocation {
    #[prost(string, required, tag = "1")]
    pub path: String,
    #[prost(int32, optional, tag = "2")]
    pub line: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub column: Option<i32>,
  }

  #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
  #[repr(i32)]
  pub enum Kind {
    Explicit = 0,
    Implicit = 1,
    Unused = 2,
    Incomplete = 3,
  }
}

/// How the compiler used a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
  /// Referenced directly by the sources.
  Explicit,
  /// Needed transitively to complete compilation.
  Implicit,
  /// On the class path but never loaded.
  Unused,
  /// Incomplete entries and kinds this crate does not know.
  Other,
}

impl DependencyKind {
  /// Only explicit and implicit dependencies were actually resolved.
  pub fn is_relevant(self) -> bool {
    matches!(self, DependencyKind::Explicit | DependencyKind::Implicit)
  }
}

impl From<i32> for DependencyKind {
  fn from(value: i32) -> Self {
    match proto::Kind::try_from(value) {
      Ok(proto::Kind::Explicit) => DependencyKind::Explicit,
      Ok(proto::Kind::Implicit) => DependencyKind::Implicit,
      Ok(proto::Kind::Unused) => DependencyKind::Unused,
      Ok(proto::Kind::Incomplete) | Err(_) => DependencyKind::Other,
    }
  }
}

impl From<DependencyKind> for i32 {
  fn from(kind: DependencyKind) -> Self {
    match kind {
      DependencyKind::Explicit => proto::Kind::Explicit as i32,
      DependencyKind::Implicit => proto::Kind::Implicit as i32,
      DependencyKind::Unused => proto::Kind::Unused as i32,
      DependencyKind::Other => proto::Kind::Incomplete as i32,
    }
  }
}

/// One decoded report entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
  pub path: String,
  pub kind: DependencyKind,
}

impl DependencyRecord {
  pub fn new(path: impl Into<String>, kind: DependencyKind) -> Self {
    Self {
      path: path.into(),
      kind,
    }
  }
}

/// A decoded report, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepsReport {
  pub rule_label: Option<String>,
  pub success: bool,
  pub records: Vec<DependencyRecord>,
}

impl DepsReport {
  pub fn new(records: Vec<DependencyRecord>) -> Self {
    Self {
      rule_label: None,
      success: true,
      records,
    }
  }

  /// Paths of explicit and implicit dependencies, in their original order.
  ///
  /// No deduplication happens here; the compiler already emits each path once.
  pub fn relevant_paths(&self) -> Vec<String> {
    self
      .records
      .iter()
      .filter(|r| r.kind.is_relevant())
      .map(|r| r.path.clone())
      .collect()
  }

  /// Encode back into the wire format.
  pub fn to_bytes(&self) -> Vec<u8> {
    proto::Dependencies::from(self).encode_to_vec()
  }
}

impl From<proto::Dependencies> for DepsReport {
  fn from(message: proto::Dependencies) -> Self {
    Self {
      rule_label: message.rule_label,
      success: message.success.unwrap_or(false),
      records: message
        .dependency
        .into_iter()
        .map(|d| DependencyRecord {
          kind: DependencyKind::from(d.kind),
          path: d.path,
        })
        .collect(),
    }
  }
}

impl From<&DepsReport> for proto::Dependencies {
  fn from(report: &DepsReport) -> Self {
    Self {
      dependency: report
        .records
        .iter()
        .map(|r| proto::Dependency {
          path: r.path.clone(),
          kind: r.kind.into(),
          location: Vec::new(),
        })
        .collect(),
      rule_label: report.rule_label.clone(),
      success: Some(report.success),
      contained_package: Vec::new(),
    }
  }
}

/// Errors that can occur while decoding a report.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("failed to read dependency report: {0}")]
  Read(#[source] io::Error),

  #[error("malformed dependency report: {0}")]
  Decode(#[source] prost::DecodeError),
}

/// Decode a report from its complete bytes.
pub fn decode_report(bytes: &[u8]) -> Result<DepsReport, DecodeError> {
  let message = proto::Dependencies::decode(bytes).map_err(DecodeError::Decode)?;
  Ok(message.into())
}

/// Read a report to the end of the stream and decode it.
///
/// Returns the report together with the number of bytes consumed.
pub fn read_report(mut reader: impl Read) -> Result<(DepsReport, u64), DecodeError> {
  let mut bytes = Vec::new();
  reader.read_to_end(&mut bytes).map_err(DecodeError::Read)?;
  let report = decode_report(&bytes)?;
  Ok((report, bytes.len() as u64))
}
