// pixbatch/src/processors/batch.rs
use crate::core::{
    resolve_targets, CancellationToken, ConversionResult, ConversionSettings, ConvertError,
    Converter, FailureReason, FileStatus, ImageFile, Result,
};
use crate::utils::{format_eta, format_file_size, percent_saved};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Cancelling,
}

impl BatchState {
    fn as_u8(self) -> u8 {
        match self {
            BatchState::Idle => 0,
            BatchState::Running => 1,
            BatchState::Cancelling => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => BatchState::Running,
            2 => BatchState::Cancelling,
            _ => BatchState::Idle,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn get(&self) -> BatchState {
        BatchState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: BatchState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Atomically moves `from -> to`; false if the state was not `from`.
    fn transition(&self, from: BatchState, to: BatchState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Reported after every file.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub current_file: String,
    pub eta: Option<Duration>,
}

impl BatchProgress {
    pub fn eta_string(&self) -> Option<String> {
        self.eta.map(format_eta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSummary {
    pub before: u64,
    pub after: u64,
    /// Negative when the outputs are larger than the sources.
    pub saved: i64,
    pub percent_saved: f64,
}

impl fmt::Display for CompressionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let saved = format_file_size(self.saved.unsigned_abs());
        let sign = if self.saved < 0 { "-" } else { "" };
        write!(
            f,
            "{} → {} (saved {}{}, {:.1}%)",
            format_file_size(self.before),
            format_file_size(self.after),
            sign,
            saved,
            self.percent_saved
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    /// Source bytes of single-format successes.
    pub total_size_before: u64,
    /// Output bytes of single-format successes.
    pub total_size_after: u64,
    pub elapsed: Duration,
    /// Set when the output directory exists after the run.
    pub output_directory: Option<PathBuf>,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn compression(&self) -> Option<CompressionSummary> {
        if self.succeeded == 0 {
            return None;
        }

        let before = self.total_size_before;
        let after = self.total_size_after;
        Some(CompressionSummary {
            before,
            after,
            saved: before as i64 - after as i64,
            percent_saved: percent_saved(before, after)?,
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(f, "Cancelled after {} of {} files: ", self.attempted(), self.total)?;
        } else {
            write!(f, "Converted {} files: ", self.attempted())?;
        }
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)?;
        if let Some(compression) = self.compression() {
            write!(f, " | {}", compression)?;
        }
        Ok(())
    }
}

/// Runs the conversion pipeline over a file list, one file at a time in
/// list order.
pub struct BatchProcessor {
    settings: ConversionSettings,
    converter: Converter,
    state: SharedState,
}

impl BatchProcessor {
    pub fn new(settings: ConversionSettings) -> Self {
        Self {
            settings,
            converter: Converter::new(),
            state: SharedState::default(),
        }
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    pub fn state(&self) -> BatchState {
        self.state.get()
    }

    /// Converts every selected file. Per-file failures are recorded on the
    /// file and counted; they never abort the run.
    pub fn run(
        &self,
        files: &mut [ImageFile],
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(&BatchProgress),
    ) -> Result<BatchSummary> {
        if !self.state.transition(BatchState::Idle, BatchState::Running) {
            return Err(ConvertError::Config("a batch is already running".to_string()));
        }

        let summary = self.run_selected(files, cancel, progress);
        self.state.set(BatchState::Idle);

        log::info!("{}", summary);
        Ok(summary)
    }

    /// Runs the batch on the rayon pool and returns immediately.
    pub fn spawn(self, files: Vec<ImageFile>, cancel: CancellationToken) -> BatchHandle {
        let (progress_tx, progress_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let state = self.state.clone();
        let worker_cancel = cancel.clone();

        rayon::spawn(move || {
            let mut files = files;
            let summary = self.run(&mut files, &worker_cancel, &mut |p| {
                // The receiver may be gone if the caller stopped listening.
                let _ = progress_tx.send(p.clone());
            });
            let _ = done_tx.send((files, summary));
        });

        BatchHandle {
            cancel,
            state,
            progress: progress_rx,
            done: done_rx,
        }
    }

    fn run_selected(
        &self,
        files: &mut [ImageFile],
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(&BatchProgress),
    ) -> BatchSummary {
        let started = Instant::now();
        let selected: Vec<usize> = files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.selected)
            .map(|(i, _)| i)
            .collect();

        let mut summary = BatchSummary {
            total: selected.len(),
            ..Default::default()
        };

        if selected.is_empty() {
            log::warn!("No files selected for conversion");
            return summary;
        }

        log::info!("Converting {} files", summary.total);

        for (done, &index) in selected.iter().enumerate() {
            let file = &mut files[index];

            if cancel.is_cancelled() {
                self.state.set(BatchState::Cancelling);
                file.status = FileStatus::Cancelled;
                summary.cancelled = true;
                log::info!("Batch cancelled before {}", file.file_name);
                break;
            }

            file.reset();
            file.status = FileStatus::Converting;
            if file.size_before == 0 {
                if let Ok(meta) = std::fs::metadata(file.full_path()) {
                    file.size_before = meta.len();
                }
            }

            if !self.convert_one(file, cancel, &mut summary) {
                self.state.set(BatchState::Cancelling);
                summary.cancelled = true;
                log::info!("Batch cancelled during {}", file.file_name);
                break;
            }

            let processed = done + 1;
            progress(&BatchProgress {
                processed,
                total: summary.total,
                current_file: file.file_name.clone(),
                eta: Some(estimate_remaining(started.elapsed(), processed, summary.total)),
            });
        }

        summary.elapsed = started.elapsed();
        summary.output_directory = selected.first().and_then(|&i| {
            let dir = self.settings.output_directory_for(&files[i].directory);
            dir.is_dir().then_some(dir)
        });

        summary
    }

    /// Converts one file and records its outcome. Returns false when the file
    /// was cancelled mid-way and nothing was produced.
    fn convert_one(
        &self,
        file: &mut ImageFile,
        cancel: &CancellationToken,
        summary: &mut BatchSummary,
    ) -> bool {
        let targets = resolve_targets(&self.settings, file);

        if self.settings.multi_format_active() {
            let results = self.converter.convert_formats(file, &targets, cancel);
            let succeeded = results.iter().filter(|r| r.is_success()).count();

            if succeeded == 0 && results.iter().any(is_cancelled) {
                file.status = FileStatus::Cancelled;
                return false;
            }

            file.status = if succeeded == results.len() {
                FileStatus::SucceededMulti(succeeded)
            } else if succeeded > 0 {
                FileStatus::Partial {
                    succeeded,
                    total: results.len(),
                }
            } else {
                FileStatus::Failed(results.iter().find_map(ConversionResult::error_message))
            };

            if succeeded > 0 {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            return true;
        }

        let Some(settings) = targets.first() else {
            return true;
        };

        match self.converter.convert(file, settings, cancel) {
            ConversionResult::Success(out) => {
                file.size_after = Some(out.output_size);
                file.dimensions_after = Some((out.width, out.height));
                file.status = FileStatus::Succeeded;
                summary.succeeded += 1;
                summary.total_size_before += file.size_before;
                summary.total_size_after += out.output_size;
            }
            ConversionResult::Failure(ConvertError::Cancelled) => {
                file.status = FileStatus::Cancelled;
                return false;
            }
            ConversionResult::Failure(e) => {
                file.status = FileStatus::Failed(Some(e.to_string()));
                summary.failed += 1;
            }
        }

        true
    }
}

/// Mean time per processed file times the files still to go.
fn estimate_remaining(elapsed: Duration, processed: usize, total: usize) -> Duration {
    if processed == 0 {
        return Duration::ZERO;
    }
    let per_file = elapsed.as_secs_f64() / processed as f64;
    Duration::from_secs_f64(per_file * total.saturating_sub(processed) as f64)
}

fn is_cancelled(result: &ConversionResult) -> bool {
    result.failure_reason() == Some(FailureReason::Cancelled)
}

/// Handle to a batch running in the background.
pub struct BatchHandle {
    cancel: CancellationToken,
    state: SharedState,
    progress: Receiver<BatchProgress>,
    done: Receiver<(Vec<ImageFile>, Result<BatchSummary>)>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.state.transition(BatchState::Running, BatchState::Cancelling);
    }

    pub fn state(&self) -> BatchState {
        self.state.get()
    }

    pub fn progress(&self) -> &Receiver<BatchProgress> {
        &self.progress
    }

    /// Waits for the run to finish and hands back the files with their
    /// final status.
    pub fn join(self) -> Result<(Vec<ImageFile>, BatchSummary)> {
        let (files, summary) = self
            .done
            .recv()
            .map_err(|_| ConvertError::Config("batch worker stopped unexpectedly".to_string()))?;
        Ok((files, summary?))
    }
}
