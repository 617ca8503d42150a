//! Task model: options, lifecycle state and the per-task shared cell
//!
//! A task is created `Pending` by the scheduler. Dispatch turns the cell into a
//! [`RunningTask`] lease which is the only handle allowed to write progress,
//! state and error; finishing the task consumes the lease.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{StageError, WriteError};

/// Opaque task identifier. Ordering follows admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Noise reduction intensity. `Off` removes the stage from the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NoiseLevel {
    Off,
    Light,
    Medium,
    Strong,
}

impl NoiseLevel {
    /// Proportion of the estimated noise removed from gated bins.
    pub fn strength(&self) -> Option<f32> {
        match self {
            NoiseLevel::Off => None,
            NoiseLevel::Light => Some(0.5),
            NoiseLevel::Medium => Some(0.7),
            NoiseLevel::Strong => Some(0.9),
        }
    }
}

/// Speech enhancement intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementLevel {
    Light,
    Medium,
    Strong,
}

impl EnhancementLevel {
    /// Presence boost in dB applied around 3 kHz.
    pub fn presence_gain_db(&self) -> f32 {
        match self {
            EnhancementLevel::Light => 2.0,
            EnhancementLevel::Medium => 4.0,
            EnhancementLevel::Strong => 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Wav,
    Mp3,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
        }
    }

    /// MP3 sources stay MP3, everything else is written as lossless WAV.
    pub fn from_source<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mp3") => OutputFormat::Mp3,
            _ => OutputFormat::Wav,
        }
    }
}

/// Per-task processing options chosen at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    pub noise_level: NoiseLevel,
    pub enhancement_enabled: bool,
    pub enhancement_level: EnhancementLevel,
    pub voice_clarity_boost: bool,
    pub output_format: OutputFormat,
    /// User-chosen destination; derived from the source when `None`.
    pub output_path: Option<PathBuf>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            noise_level: NoiseLevel::Medium,
            enhancement_enabled: true,
            enhancement_level: EnhancementLevel::Medium,
            voice_clarity_boost: true,
            output_format: OutputFormat::Wav,
            output_path: None,
        }
    }
}

impl TaskOptions {
    /// Default options with the output format following the source extension.
    pub fn for_source<P: AsRef<Path>>(source: P) -> Self {
        Self {
            output_format: OutputFormat::from_source(source),
            ..Default::default()
        }
    }

    pub fn resolve_output_path(&self, source: &Path) -> PathBuf {
        match &self.output_path {
            Some(path) => path.clone(),
            None => derive_output_path(source, self.output_format),
        }
    }
}

/// `<dir>/<stem>_cleaned.<ext>` next to the source file.
pub fn derive_output_path(source: &Path, format: OutputFormat) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let file_name = format!("{}_cleaned.{}", stem, format.extension());
    match source.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
    Cancelled = 4,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Succeeded,
            3 => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Structured failure description attached to a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub stage: String,
    pub message: String,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

impl From<StageError> for TaskError {
    fn from(err: StageError) -> Self {
        Self { stage: err.stage.to_string(), message: err.cause }
    }
}

impl From<WriteError> for TaskError {
    fn from(err: WriteError) -> Self {
        Self { stage: "result_writer".to_string(), message: err.to_string() }
    }
}

/// Read-only view of a task handed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub options: TaskOptions,
    pub state: TaskState,
    pub progress: f32,
    pub error: Option<TaskError>,
    pub cancel_requested: bool,
}

/// Shared storage for one task.
///
/// Field writers: the dispatcher moves `Pending -> Running`, the lease holder
/// writes everything else, observers only load.
#[derive(Debug)]
pub(crate) struct TaskCell {
    id: TaskId,
    name: String,
    source_path: PathBuf,
    output_path: PathBuf,
    options: TaskOptions,
    state: AtomicU8,
    progress: AtomicU32,
    cancel_requested: AtomicBool,
    error: OnceLock<TaskError>,
}

impl TaskCell {
    pub(crate) fn new(id: TaskId, source_path: PathBuf, options: TaskOptions) -> Self {
        let name = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.display().to_string());
        let output_path = options.resolve_output_path(&source_path);

        Self {
            id,
            name,
            source_path,
            output_path,
            options,
            state: AtomicU8::new(TaskState::Pending as u8),
            progress: AtomicU32::new(0f32.to_bits()),
            cancel_requested: AtomicBool::new(false),
            error: OnceLock::new(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub(crate) fn options(&self) -> &TaskOptions {
        &self.options
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        self.error.get().cloned()
    }

    /// Sets the cooperative cancel flag. Returns `false` when already terminal.
    pub(crate) fn request_cancel(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.cancel_requested.store(true, Ordering::Release);
        true
    }

    /// `Pending -> Running`; yields the lease exactly once.
    pub(crate) fn start(self: &Arc<Self>) -> Option<RunningTask> {
        self.state
            .compare_exchange(
                TaskState::Pending as u8,
                TaskState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| RunningTask { cell: Arc::clone(self) })
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        let state = self.state();
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            source_path: self.source_path.clone(),
            output_path: self.output_path.clone(),
            options: self.options.clone(),
            state,
            progress: f32::from_bits(self.progress.load(Ordering::Acquire)),
            error: if state == TaskState::Failed { self.error() } else { None },
            cancel_requested: self.cancel_requested.load(Ordering::Acquire),
        }
    }
}

/// Exclusive write access to a running task.
#[derive(Debug)]
pub(crate) struct RunningTask {
    cell: Arc<TaskCell>,
}

impl RunningTask {
    pub(crate) fn id(&self) -> TaskId {
        self.cell.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.cell.name
    }

    pub(crate) fn source_path(&self) -> &Path {
        &self.cell.source_path
    }

    pub(crate) fn output_path(&self) -> &Path {
        &self.cell.output_path
    }

    pub(crate) fn options(&self) -> &TaskOptions {
        &self.cell.options
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cell.cancel_requested
    }

    /// Stores `value` unless it would move progress backwards.
    pub(crate) fn report_progress(&self, value: f32) -> f32 {
        let value = value.clamp(0.0, 1.0);
        let current = f32::from_bits(self.cell.progress.load(Ordering::Acquire));
        let next = current.max(value);
        self.cell.progress.store(next.to_bits(), Ordering::Release);
        next
    }

    pub(crate) fn succeed(self) {
        self.cell.progress.store(1f32.to_bits(), Ordering::Release);
        self.finish(TaskState::Succeeded);
    }

    pub(crate) fn fail(self, error: TaskError) {
        let _ = self.cell.error.set(error);
        self.finish(TaskState::Failed);
    }

    pub(crate) fn cancel(self) {
        self.finish(TaskState::Cancelled);
    }

    fn finish(&self, state: TaskState) {
        self.cell.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for RunningTask {
    fn drop(&mut self) {
        if self.cell.state() != TaskState::Running {
            return;
        }
        let message = if std::thread::panicking() {
            "worker panicked while running the task"
        } else {
            "task abandoned before reaching a terminal state"
        };
        let _ = self.cell.error.set(TaskError {
            stage: "worker".to_string(),
            message: message.to_string(),
        });
        self.finish(TaskState::Failed);
    }
}
