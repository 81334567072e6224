//! Progress bars for download runs, driven by orchestrator events.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use vidgrab_core::{DownloadEvent, DownloadEventKind};

const BAR_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}";

/// Renders one bar per download; hidden entirely in quiet mode.
pub(crate) struct ProgressReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    labels: HashMap<String, String>,
}

impl ProgressReporter {
    /// `labels` maps download ids to the text shown next to each bar.
    pub(crate) fn new(visible: bool, labels: HashMap<String, String>) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            labels,
        }
    }

    fn bar_for(&self, id: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(id.to_string())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("━━╌"),
                );
                let label = self
                    .labels
                    .get(id)
                    .filter(|label| !label.is_empty())
                    .map_or(id, String::as_str);
                bar.set_message(label.to_string());
                bar
            })
            .clone()
    }

    fn handle(&self, event: &DownloadEvent) {
        let record = &event.record;
        let bar = self.bar_for(&record.id);
        match event.kind {
            DownloadEventKind::Started => bar.reset(),
            DownloadEventKind::Progress => {
                if record.bytes_total > 0 {
                    bar.set_length(record.bytes_total);
                }
                bar.set_position(record.bytes_downloaded);
            }
            DownloadEventKind::Completed => {
                bar.set_length(record.bytes_total);
                bar.set_position(record.bytes_total);
                let name = record
                    .result_path
                    .as_ref()
                    .and_then(|path| path.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                bar.finish_with_message(format!("saved {name}"));
            }
            DownloadEventKind::Failed => {
                let reason = record.failure_reason.clone().unwrap_or_default();
                bar.abandon_with_message(format!("failed: {reason}"));
            }
            DownloadEventKind::Reset => bar.reset(),
        }
    }
}

impl vidgrab_core::download::DownloadListener for ProgressReporter {
    fn on_event(&self, event: &DownloadEvent) {
        self.handle(event);
    }
}
