use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AudioUriError {
    #[error("audio URI cannot be empty")]
    Empty,

    #[error("audio URL is malformed: {raw}")]
    MalformedUrl { raw: String },
}

//
// ─── AUDIO URI ─────────────────────────────────────────────────────────────────
//

/// Location of a workbook's audio prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioUri {
    FilePath(PathBuf),
    Url(Url),
}

impl AudioUri {
    /// # Errors
    ///
    /// Returns `AudioUriError::Empty` for an empty path.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, AudioUriError> {
        let p = path.into();
        if p.as_os_str().is_empty() {
            return Err(AudioUriError::Empty);
        }
        Ok(AudioUri::FilePath(p))
    }

    /// # Errors
    ///
    /// Returns `AudioUriError::Empty` for blank input and
    /// `AudioUriError::MalformedUrl` when the URL does not parse.
    pub fn from_url(url: impl AsRef<str>) -> Result<Self, AudioUriError> {
        let s = url.as_ref().trim();
        if s.is_empty() {
            return Err(AudioUriError::Empty);
        }
        let u = Url::parse(s).map_err(|_| AudioUriError::MalformedUrl { raw: s.to_owned() })?;
        Ok(AudioUri::Url(u))
    }

    /// Parses the persisted form produced by `Display`.
    ///
    /// Anything with a scheme separator is treated as a URL, the rest as a file path.
    ///
    /// # Errors
    ///
    /// Same as `from_url` / `from_file`.
    pub fn parse(raw: &str) -> Result<Self, AudioUriError> {
        if raw.contains("://") {
            Self::from_url(raw)
        } else {
            Self::from_file(raw.trim())
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            AudioUri::FilePath(p) => Some(p.as_path()),
            AudioUri::Url(_) => None,
        }
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            AudioUri::Url(u) => Some(u),
            AudioUri::FilePath(_) => None,
        }
    }
}

impl fmt::Display for AudioUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioUri::FilePath(p) => write!(f, "{}", p.display()),
            AudioUri::Url(u) => write!(f, "{u}"),
        }
    }
}

//
// ─── AUDIO TRACK ───────────────────────────────────────────────────────────────
//

/// Audio prompt plus the number of times the candidate may play it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    uri: AudioUri,
    max_repeats: u32,
}

impl AudioTrack {
    #[must_use]
    pub fn new(uri: AudioUri, max_repeats: u32) -> Self {
        Self { uri, max_repeats }
    }

    #[must_use]
    pub fn uri(&self) -> &AudioUri {
        &self.uri
    }

    #[must_use]
    pub fn max_repeats(&self) -> u32 {
        self.max_repeats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_detects_urls() {
        let uri = AudioUri::parse("https://cdn.example.com/a.mp3").unwrap();
        assert!(uri.as_url().is_some());
    }

    #[test]
    fn parse_falls_back_to_file_path() {
        let uri = AudioUri::parse("audio/part1.mp3").unwrap();
        assert_eq!(uri.as_path(), Some(Path::new("audio/part1.mp3")));
    }

    #[test]
    fn blank_uri_is_rejected() {
        assert_eq!(AudioUri::parse("  ").unwrap_err(), AudioUriError::Empty);
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = AudioUri::from_url("http://").unwrap_err();
        assert!(matches!(err, AudioUriError::MalformedUrl { .. }));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let uri = AudioUri::from_url("https://cdn.example.com/a.mp3").unwrap();
        assert_eq!(AudioUri::parse(&uri.to_string()).unwrap(), uri);
    }
}
