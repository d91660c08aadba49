// Progress bar management using indicatif.
// We keep all bars under one MultiProgress so they render on separate lines.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressManager {
    multi: Option<Arc<MultiProgress>>,
}

impl ProgressManager {
    // Create a new manager. If enabled=false, no bars are created.
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            Some(Arc::new(MultiProgress::new()))
        } else {
            None
        };
        Self { multi }
    }

    // Create a bar for file-byte progress with a label.
    pub fn new_file_bar(&self, path: &Path, label: &str) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let bar = mp.add(ProgressBar::new(size));
        bar.set_style(byte_style());
        bar.set_prefix(label.to_string());
        Some(bar)
    }

    // Create a bar counting records (letters written).
    pub fn new_count_bar(&self, total: u64, label: &str) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let bar = mp.add(ProgressBar::new(total));
        bar.set_style(count_style());
        bar.set_prefix(label.to_string());
        Some(bar)
    }
}

fn byte_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:20} {bytes:>10}/{total_bytes:<10} [{bar:50}] {percent:>3}%",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█ ")
}

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:20} {pos:>6}/{len:<6} [{bar:50}] {percent:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█ ")
}
