//! Log-based report sink.
//!
//! Implements [`ReportSink`] by writing each report, timestamped, to the
//! ESP-IDF logger (UART / USB-CDC). Used before the broker is up and as
//! the host-side sink.

use log::{info, warn};

use super::time::TimeAdapter;
use crate::app::ports::ReportSink;
use crate::app::report::Report;

#[derive(Debug, Default)]
pub struct LogReportSink {
    time: TimeAdapter,
}

impl LogReportSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for LogReportSink {
    fn publish(&mut self, report: &Report) {
        let json = report.to_json(&self.time.utc_timestamp());
        if report.is_error() {
            warn!("REPORT | {json}");
        } else {
            info!("REPORT | {json}");
        }
    }
}
