// ============================================================
// Layer 4 — Text Loader
// ============================================================
// Reads a flat UTF-8 text file. The file has no structure: the
// whole contents become one corpus and are tokenised as a single
// stream.
//
// Failure cases (all returned as errors naming the path):
//   - the file does not exist
//   - the file cannot be read
//   - the contents are not valid UTF-8

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use crate::domain::corpus::{Corpus, SourceFingerprint};
use crate::domain::traits::CorpusSource;

/// Loads one plain-text training or evaluation file.
pub struct TextLoader {
    path: PathBuf,
}

impl TextLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CorpusSource for TextLoader {
    fn location(&self) -> &Path {
        &self.path
    }

    fn fingerprint(&self) -> Result<SourceFingerprint> {
        let meta = fs::metadata(&self.path)
            .with_context(|| format!("Cannot access text file '{}'", self.path.display()))?;

        let modified_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| u64::try_from(d.as_nanos()).ok());

        Ok(SourceFingerprint { len: meta.len(), modified_nanos })
    }

    fn load(&self) -> Result<Corpus> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read text file '{}'", self.path.display()))?;

        tracing::debug!("Loaded '{}' ({} bytes)", self.path.display(), text.len());
        Ok(Corpus::new(self.path.display().to_string(), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reads_whole_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.txt");
        fs::write(&path, "first line\nsecond line\n").unwrap();

        let corpus = TextLoader::new(&path).load().unwrap();
        assert_eq!(corpus.text, "first line\nsecond line\n");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir    = tempfile::tempdir().unwrap();
        let loader = TextLoader::new(dir.path().join("nope.txt"));

        let err = loader.load().unwrap_err();
        assert!(format!("{err:#}").contains("nope.txt"));
        assert!(loader.fingerprint().is_err());
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).unwrap();

        assert!(TextLoader::new(&path).load().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_length() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        let before = TextLoader::new(&path).fingerprint().unwrap();

        fs::write(&path, "abcdef").unwrap();
        let after = TextLoader::new(&path).fingerprint().unwrap();

        assert_eq!(before.len, 3);
        assert_eq!(after.len, 6);
        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_sees_rewrite_within_one_second() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let second = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        fs::write(&path, "abc").unwrap();
        fs::File::options().write(true).open(&path).unwrap()
            .set_modified(second + Duration::from_millis(100)).unwrap();
        let before = TextLoader::new(&path).fingerprint().unwrap();

        fs::write(&path, "xyz").unwrap();
        fs::File::options().write(true).open(&path).unwrap()
            .set_modified(second + Duration::from_millis(600)).unwrap();
        let after = TextLoader::new(&path).fingerprint().unwrap();

        assert_eq!(before.len, after.len);
        assert_ne!(before, after);
    }
}
