//! Atomic output commit
//!
//! Output bytes go to a temporary file in the destination directory which is
//! synced and then renamed over the destination. Readers see either the old
//! file or the complete new one.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

use crate::error::WriteError;
use crate::processing::EncodedAudio;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultWriter;

impl ResultWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn commit(&self, path: &Path, audio: &EncodedAudio) -> Result<(), WriteError> {
        self.commit_with(path, |file| file.write_all(audio.bytes()))
    }

    /// Commits whatever `write` produces. The destination is untouched if
    /// `write` fails.
    pub fn commit_with<F>(&self, path: &Path, write: F) -> Result<(), WriteError>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let wrap = |cause: io::Error| WriteError { path: path.to_path_buf(), cause };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(wrap)?;

        let mut temp = NamedTempFile::new_in(dir).map_err(wrap)?;
        write(temp.as_file_mut()).map_err(wrap)?;
        temp.as_file().sync_all().map_err(wrap)?;
        temp.persist(path).map_err(|e| wrap(e.error))?;

        debug!("Committed {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::OutputFormat;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_commit_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("talk_cleaned.wav");
        let audio = EncodedAudio::new(OutputFormat::Wav, b"RIFFdata".to_vec());

        ResultWriter::new().commit(&path, &audio).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFFdata");
        assert_eq!(entries(dir.path()), vec!["talk_cleaned.wav"]);
    }

    #[test]
    fn test_commit_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("talk_cleaned.mp3");
        std::fs::write(&path, b"old").unwrap();

        ResultWriter::new().commit(&path, &EncodedAudio::new(OutputFormat::Mp3, b"new".to_vec())).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_interrupted_write_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("talk_cleaned.wav");
        std::fs::write(&path, b"previous").unwrap();

        let err = ResultWriter::new()
            .commit_with(&path, |file| {
                file.write_all(b"half")?;
                Err(io::Error::other("disk full"))
            })
            .unwrap_err();

        assert_eq!(err.path, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
        assert_eq!(entries(dir.path()), vec!["talk_cleaned.wav"]);
    }

    #[test]
    fn test_missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("talk_cleaned.wav");
        ResultWriter::new().commit(&path, &EncodedAudio::new(OutputFormat::Wav, vec![0; 4])).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_destination_is_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // A regular file cannot act as a directory.
        let path = blocker.join("talk_cleaned.wav");
        assert!(ResultWriter::new().commit(&path, &EncodedAudio::new(OutputFormat::Wav, vec![0; 4])).is_err());
    }
}
