//! Configuration management for batch processing

use crate::audio::WavEncoding;
use crate::error::{CleanerError, Result};
use crate::task::{EnhancementLevel, NoiseLevel, OutputFormat, TaskOptions};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub processing: ProcessingConfig,
    pub defaults: TaskDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads, i.e. the number of tasks allowed to run at once.
    pub workers: usize,
    /// Soft capacity of the progress event queue.
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Leading audio used to estimate the stationary noise profile.
    pub noise_profile_secs: f32,
    pub fft_size: usize,
    /// Internal working rate of the speech enhancement stage.
    pub enhancement_rate: u32,
    pub mp3_bitrate: u32,
    pub wav_encoding: WavEncoding,
    pub verbose: bool,
}

/// Options applied to tasks when the caller does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    pub noise_level: NoiseLevel,
    pub enhancement: bool,
    pub enhancement_level: EnhancementLevel,
    pub voice_clarity_boost: bool,
    /// Output format; follows the source extension when unset.
    pub output_format: Option<OutputFormat>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: utils::cpu_count(),
            event_capacity: 256,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            noise_profile_secs: 1.0,
            fft_size: 2048,
            enhancement_rate: 16000,
            mp3_bitrate: 192,
            wav_encoding: WavEncoding::Int16,
            verbose: false,
        }
    }
}

impl Default for TaskDefaults {
    fn default() -> Self {
        let options = TaskOptions::default();
        Self {
            noise_level: options.noise_level,
            enhancement: options.enhancement_enabled,
            enhancement_level: options.enhancement_level,
            voice_clarity_boost: options.voice_clarity_boost,
            output_format: None,
        }
    }
}

impl TaskDefaults {
    /// Task options for `source` built from these defaults.
    pub fn options_for(&self, source: &Path) -> TaskOptions {
        TaskOptions {
            noise_level: self.noise_level,
            enhancement_enabled: self.enhancement,
            enhancement_level: self.enhancement_level,
            voice_clarity_boost: self.voice_clarity_boost,
            output_format: self.output_format.unwrap_or_else(|| OutputFormat::from_source(source)),
            output_path: None,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "lecture-cleaner", about = "Batch noise reduction and speech enhancement for lecture recordings", version, author)]
pub struct Args {
    #[arg(help = "Input audio files (wav, mp3, m4a, aac, flac, ogg)")]
    pub inputs: Vec<PathBuf>,

    #[arg(short = 'n', long = "noise-level", value_enum, help = "Noise reduction level")]
    pub noise_level: Option<NoiseLevel>,

    #[arg(long = "no-enhancement", help = "Skip speech enhancement")]
    pub no_enhancement: bool,

    #[arg(short = 'e', long = "enhancement-level", value_enum, help = "Speech enhancement level")]
    pub enhancement_level: Option<EnhancementLevel>,

    #[arg(long = "no-clarity-boost", help = "Disable the voice presence boost")]
    pub no_clarity_boost: bool,

    #[arg(short = 'f', long = "format", value_enum, help = "Output format (default: follow the input)")]
    pub format: Option<OutputFormat>,

    #[arg(short = 'o', long = "output", help = "Output file path (single input only)")]
    pub output: Option<PathBuf>,

    #[arg(short = 'w', long = "workers", help = "Number of files processed in parallel")]
    pub workers: Option<usize>,

    #[arg(long = "mp3-bitrate", help = "MP3 bitrate in kbps")]
    pub mp3_bitrate: Option<u32>,

    #[arg(short = 'c', long = "config", help = "Config file path (TOML format)")]
    pub config_file: Option<PathBuf>,

    #[arg(long = "write-config", help = "Write the default config to this path and exit")]
    pub write_config: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,
}

impl Config {
    /// Create config from command line arguments and config file
    pub fn from_args_and_config(args: &Args) -> Result<Self> {
        // First load config file (if provided)
        let mut config = match &args.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // Command line arguments override config file settings
        if let Some(level) = args.noise_level {
            config.defaults.noise_level = level;
        }
        if args.no_enhancement {
            config.defaults.enhancement = false;
        }
        if let Some(level) = args.enhancement_level {
            config.defaults.enhancement_level = level;
        }
        if args.no_clarity_boost {
            config.defaults.voice_clarity_boost = false;
        }
        if let Some(format) = args.format {
            config.defaults.output_format = Some(format);
        }
        if let Some(workers) = args.workers {
            config.scheduler.workers = workers;
        }
        if let Some(bitrate) = args.mp3_bitrate {
            config.processing.mp3_bitrate = bitrate;
        }
        config.processing.verbose |= args.verbose;

        config.validate()?;
        Ok(config)
    }

    /// Load config from TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CleanerError::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| CleanerError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Validate configuration parameter validity
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.workers == 0 {
            return Err(CleanerError::config("Worker count must be greater than 0"));
        }
        if self.scheduler.workers > utils::cpu_count() * 4 {
            return Err(CleanerError::config("Worker count cannot exceed 4x logical CPU cores"));
        }
        if self.scheduler.event_capacity == 0 {
            return Err(CleanerError::config("Event capacity must be greater than 0"));
        }

        if !(self.processing.noise_profile_secs > 0.0 && self.processing.noise_profile_secs <= 30.0) {
            return Err(CleanerError::config("Noise profile length must be in range (0, 30] seconds"));
        }
        if self.processing.fft_size < 256 || !self.processing.fft_size.is_power_of_two() {
            return Err(CleanerError::config("FFT size must be a power of two, at least 256"));
        }
        if !(8000..=48000).contains(&self.processing.enhancement_rate) {
            return Err(CleanerError::config("Enhancement rate must be in range [8000, 48000] Hz"));
        }
        if !(32..=320).contains(&self.processing.mp3_bitrate) {
            return Err(CleanerError::config("MP3 bitrate must be in range [32, 320] kbps"));
        }

        Ok(())
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CleanerError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CleanerError::config(format!("Failed to write config file: {}", e)))
    }

    /// Create default config file
    pub fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save_to_file(path)
    }
}

pub mod utils {
    pub fn cpu_count() -> usize {
        num_cpus::get().max(1)
    }
}
