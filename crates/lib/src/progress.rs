//! Run telemetry.
//!
//! A load reports to a [`ProgressSink`]: once when the prefetch finishes and
//! once with the overall summary. The default sink writes both to `tracing`.

use tracing::{debug, info};

use crate::fetch::FetchReport;

/// Totals of one successful load.
///
/// Both counts cover successfully decoded reports only. Reports that vanished
/// or failed to decode are logged by the parse stage and left out here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
  /// Reports decoded this run.
  pub reports: usize,
  /// Bytes consumed by those decodes.
  pub bytes_read: u64,
}

impl LoadSummary {
  pub fn kilobytes(&self) -> u64 {
    self.bytes_read / 1024
  }

  pub fn message(&self) -> String {
    format!(
      "Loaded {} dependency reports, total size {}kB",
      self.reports,
      self.kilobytes()
    )
  }
}

/// Receives telemetry from a load.
pub trait ProgressSink: Send + Sync {
  /// Called exactly once per successful load.
  fn summary(&self, summary: &LoadSummary);

  fn fetch_finished(&self, report: &FetchReport) {
    let _ = report;
  }
}

/// Writes telemetry as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
  fn summary(&self, summary: &LoadSummary) {
    info!(reports = summary.reports, bytes = summary.bytes_read, "{}", summary.message());
  }

  fn fetch_finished(&self, report: &FetchReport) {
    debug!(
      fetched = report.stats.fetched,
      bytes = report.stats.bytes,
      elapsed_ms = report.elapsed.as_millis() as u64,
      "fetch finished"
    );
  }
}
