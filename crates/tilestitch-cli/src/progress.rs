use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tilestitch_core::stitch::{ProgressReporter, Stage};

/// Drives one indicatif bar per stage. Stages without a known item count
/// get a spinner.
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: Stage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg:32} [{bar:40}] {pos}/{len}")
                        .expect("valid progress template")
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
        };
        bar.set_message(stage.to_string());

        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn advance(&self, items_done: usize) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            bar.set_position(items_done as u64);
        }
    }

    fn finish_stage(&self) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).take() {
            bar.finish();
        }
    }
}
