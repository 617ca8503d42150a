mod common;

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use lecture_cleaner::audio::decode;
use lecture_cleaner::audio::mp3::encode_mp3;
use lecture_cleaner::audio::WavEncoding;
use lecture_cleaner::{
    Config, EventKind, EventReceiver, NoiseLevel, OutputFormat, Scheduler, ShutdownMode, TaskEvent, TaskId,
    TaskOptions, TaskState,
};
use tempfile::TempDir;

use common::{read_wav_info, write_noisy_lecture};

fn config(workers: usize) -> Config {
    let mut config = Config::default();
    config.scheduler.workers = workers;
    config
}

/// Collects events until `tasks` terminal events have been seen.
fn collect(events: &EventReceiver, tasks: usize) -> Vec<TaskEvent> {
    let mut seen = Vec::new();
    let mut terminal = 0;
    while terminal < tasks {
        let event = events.recv_timeout(Duration::from_secs(120)).expect("timed out waiting for events");
        if event.kind.is_terminal() {
            terminal += 1;
        }
        seen.push(event);
    }
    seen
}

fn by_task(events: Vec<TaskEvent>) -> HashMap<TaskId, Vec<EventKind>> {
    let mut grouped: HashMap<TaskId, Vec<EventKind>> = HashMap::new();
    for event in events {
        grouped.entry(event.task_id).or_default().push(event.kind);
    }
    grouped
}

#[test]
fn lecture_with_default_options_reports_three_steps() {
    let dir = TempDir::new().unwrap();
    let source = write_noisy_lecture(dir.path(), "lecture1.wav", 16000, 1, 3.0);

    let (scheduler, events) = Scheduler::new(&config(2)).unwrap();
    let options = TaskOptions {
        noise_level: NoiseLevel::Medium,
        enhancement_enabled: true,
        output_format: OutputFormat::Wav,
        ..Default::default()
    };
    let id = scheduler.enqueue(&source, options).unwrap();
    scheduler.start().unwrap();

    let kinds = by_task(collect(&events, 1)).remove(&id).unwrap();
    assert_eq!(kinds.len(), 4, "unexpected events: {:?}", kinds);

    let expected = [0.33f32, 0.67, 1.0];
    for (kind, want) in kinds.iter().zip(expected) {
        match kind {
            EventKind::Progress(value) => assert!((value - want).abs() < 0.01, "{} != {}", value, want),
            other => panic!("expected progress, got {:?}", other),
        }
    }

    let output = dir.path().join("lecture1_cleaned.wav");
    assert_eq!(kinds[3], EventKind::Succeeded { output_path: output.clone() });

    let (spec, frames) = read_wav_info(&output);
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(frames, 48000);

    let stats = scheduler.shutdown(ShutdownMode::Graceful);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(scheduler.snapshot(id).unwrap().state, TaskState::Succeeded);
}

#[test]
fn missing_file_fails_in_first_stage() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nonexistent.wav");

    let (scheduler, events) = Scheduler::new(&config(1)).unwrap();
    let id = scheduler.enqueue(&missing, TaskOptions::default()).unwrap();
    scheduler.start().unwrap();

    let kinds = by_task(collect(&events, 1)).remove(&id).unwrap();
    match kinds.as_slice() {
        [EventKind::Failed(err)] => assert_eq!(err.stage, "noise_reduction"),
        other => panic!("unexpected events: {:?}", other),
    }
    assert!(!dir.path().join("nonexistent_cleaned.wav").exists());

    scheduler.shutdown(ShutdownMode::Graceful);
    let snapshot = scheduler.snapshot(id).unwrap();
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.error.unwrap().stage, "noise_reduction");
}

#[test]
fn running_tasks_never_exceed_worker_count() {
    let dir = TempDir::new().unwrap();
    let (scheduler, events) = Scheduler::new(&config(2)).unwrap();
    for i in 0..6 {
        let source = write_noisy_lecture(dir.path(), &format!("talk{}.wav", i), 16000, 1, 2.0);
        scheduler.enqueue(source, TaskOptions::default()).unwrap();
    }
    scheduler.start().unwrap();

    while scheduler.active_count() > 0 {
        let running = scheduler.snapshots().iter().filter(|s| s.state == TaskState::Running).count();
        assert!(running <= 2, "{} tasks running with 2 workers", running);
        thread::sleep(Duration::from_millis(2));
    }

    let stats = scheduler.shutdown(ShutdownMode::Graceful);
    assert_eq!(stats.succeeded, 6);
    assert!(stats.peak_running >= 1 && stats.peak_running <= 2);
    assert_eq!(events.iter().filter(|e| e.kind.is_terminal()).count(), 6);
}

#[test]
fn progress_is_monotonic_and_ends_at_one() {
    let dir = TempDir::new().unwrap();
    let (scheduler, events) = Scheduler::new(&config(3)).unwrap();
    let level_options = [
        TaskOptions { noise_level: NoiseLevel::Light, ..Default::default() },
        TaskOptions { noise_level: NoiseLevel::Off, ..Default::default() },
        TaskOptions { enhancement_enabled: false, ..Default::default() },
    ];
    for (i, options) in level_options.into_iter().enumerate() {
        let source = write_noisy_lecture(dir.path(), &format!("week{}.wav", i), 22050, 2, 2.0);
        scheduler.enqueue(source, options).unwrap();
    }
    scheduler.start().unwrap();

    for (_, kinds) in by_task(collect(&events, 3)) {
        let progress: Vec<f32> = kinds
            .iter()
            .filter_map(|k| match k {
                EventKind::Progress(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", progress);
        assert_eq!(progress.last().copied(), Some(1.0));
        assert!(matches!(kinds.last(), Some(EventKind::Succeeded { .. })));
    }
    scheduler.shutdown(ShutdownMode::Graceful);
}

#[test]
fn cancel_shutdown_never_writes_cancelled_outputs() {
    let dir = TempDir::new().unwrap();
    let (scheduler, events) = Scheduler::new(&config(1)).unwrap();
    let ids: Vec<_> = (0..4)
        .map(|i| {
            let source = write_noisy_lecture(dir.path(), &format!("seminar{}.wav", i), 16000, 1, 3.0);
            scheduler.enqueue(source, TaskOptions::default()).unwrap()
        })
        .collect();
    scheduler.start().unwrap();

    let stats = scheduler.shutdown(ShutdownMode::Cancel);
    assert!(stats.cancelled >= 1);
    assert_eq!(stats.succeeded + stats.failed + stats.cancelled, 4);

    for id in &ids {
        let snapshot = scheduler.snapshot(*id).unwrap();
        assert!(snapshot.state.is_terminal());
        match snapshot.state {
            TaskState::Cancelled => assert!(!snapshot.output_path.exists()),
            TaskState::Succeeded => assert!(snapshot.output_path.exists()),
            other => panic!("unexpected state {}", other),
        }
    }

    // Exactly one terminal event per task, then the stream closes.
    let grouped = by_task(events.iter().collect());
    for id in ids {
        let terminal = grouped[&id].iter().filter(|k| k.is_terminal()).count();
        assert_eq!(terminal, 1);
    }
}

#[cfg(unix)]
#[test]
fn cancel_during_noise_reduction_finishes_the_stage_and_writes_nothing() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let bytes = std::fs::read(write_noisy_lecture(dir.path(), "recorded.wav", 16000, 1, 20.0)).unwrap();
    let source = common::make_fifo(dir.path(), "streamed.wav");

    let (scheduler, events) = Scheduler::new(&config(1)).unwrap();
    let options = TaskOptions { noise_level: NoiseLevel::Strong, ..Default::default() };
    let id = scheduler.enqueue(&source, options).unwrap();
    scheduler.start().unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            // Returns once the worker has opened the source inside noise_reduction.
            let mut feed = std::fs::OpenOptions::new().write(true).open(&source).unwrap();
            assert_eq!(scheduler.snapshot(id).unwrap().state, TaskState::Running);
            scheduler.cancel(id).unwrap();
            feed.write_all(&bytes).unwrap();
        });
    });

    let kinds = by_task(collect(&events, 1)).remove(&id).unwrap();
    match kinds.as_slice() {
        [EventKind::Progress(value), EventKind::Cancelled] => assert!((value - 1.0 / 3.0).abs() < 1e-6),
        other => panic!("unexpected events: {:?}", other),
    }

    let stats = scheduler.shutdown(ShutdownMode::Graceful);
    assert_eq!(stats.cancelled, 1);
    let snapshot = scheduler.snapshot(id).unwrap();
    assert_eq!(snapshot.state, TaskState::Cancelled);
    assert!(!snapshot.output_path.exists());
    assert!(!dir.path().join("streamed_cleaned.wav").exists());
}

#[test]
fn dropping_a_started_scheduler_finishes_every_task() {
    let dir = TempDir::new().unwrap();
    let (scheduler, events) = Scheduler::new(&config(1)).unwrap();
    for i in 0..3 {
        let source = write_noisy_lecture(dir.path(), &format!("drop{}.wav", i), 16000, 1, 2.0);
        scheduler.enqueue(source, TaskOptions::default()).unwrap();
    }
    scheduler.start().unwrap();
    drop(scheduler);

    let terminal: Vec<_> = events.iter().filter(|e| e.kind.is_terminal()).collect();
    assert_eq!(terminal.len(), 3);
}

#[test]
fn mp3_source_is_cleaned_to_mp3() {
    let dir = TempDir::new().unwrap();
    let wav = write_noisy_lecture(dir.path(), "podcast.wav", 44100, 2, 2.0);
    let buffer = decode::load(&wav).unwrap();
    let source = dir.path().join("podcast.mp3");
    std::fs::write(&source, encode_mp3(&buffer, 128).unwrap()).unwrap();

    let (scheduler, events) = Scheduler::new(&config(1)).unwrap();
    let id = scheduler.enqueue(&source, TaskOptions::for_source(&source)).unwrap();
    scheduler.start().unwrap();
    collect(&events, 1);
    scheduler.shutdown(ShutdownMode::Graceful);

    let snapshot = scheduler.snapshot(id).unwrap();
    assert_eq!(snapshot.state, TaskState::Succeeded, "error: {:?}", snapshot.error);
    assert_eq!(snapshot.output_path, dir.path().join("podcast_cleaned.mp3"));

    let cleaned = decode::load(&snapshot.output_path).unwrap();
    assert_eq!(cleaned.sample_rate(), 44100);
    assert!(cleaned.duration() > 1.5);
}

#[test]
fn explicit_output_path_and_float_encoding() {
    let dir = TempDir::new().unwrap();
    let source = write_noisy_lecture(dir.path(), "lab.wav", 44100, 2, 2.0);
    let output = dir.path().join("out").join("lab-final.wav");

    let mut config = config(1);
    config.processing.wav_encoding = WavEncoding::Float32;
    let (scheduler, events) = Scheduler::new(&config).unwrap();
    let options = TaskOptions { output_path: Some(output.clone()), ..Default::default() };
    scheduler.enqueue(&source, options).unwrap();
    scheduler.start().unwrap();

    let last = collect(&events, 1).pop().unwrap();
    assert_eq!(last.kind, EventKind::Succeeded { output_path: output.clone() });
    scheduler.shutdown(ShutdownMode::Graceful);

    let (spec, frames) = read_wav_info(&output);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(frames, 88200);

    let cleaned = decode::load(&output).unwrap();
    assert!(cleaned.is_finite());
}
