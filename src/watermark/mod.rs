//! Seen/unseen cutoff for proposals.
//!
//! The watermark is the cutoff instant captured at the start of the last
//! completed cycle. It is passed into each cycle and a new one is returned;
//! a `WatermarkStore` keeps it across restarts. File format is a single line
//! `YYYY-MM-DD HH:MM:SS` in UTC.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::proposal::normalize::TIMESTAMP_FORMAT;

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("watermark io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed watermark {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Whole seconds only, matching what the store can represent.
    pub fn new(at: DateTime<Utc>) -> Self {
        Watermark(at.with_nanosecond(0).unwrap_or(at))
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Load from `store`, falling back to "now" when absent or unreadable.
    pub fn restore(store: &dyn WatermarkStore) -> Self {
        match store.load() {
            Ok(Some(wm)) => {
                info!(watermark = %wm, "restored watermark");
                wm
            }
            Ok(None) => {
                info!("no stored watermark, starting from now");
                Self::now()
            }
            Err(e) => {
                warn!(error = %e, "unreadable watermark, starting from now");
                Self::now()
            }
        }
    }

    pub fn parse(s: &str) -> Result<Self, WatermarkError> {
        let trimmed = s.trim();
        NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
            .map(|naive| Watermark::new(naive.and_utc()))
            .map_err(|_| WatermarkError::Malformed(trimmed.to_string()))
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

/// Submission-time range treated as new in one cycle: `[since, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl CycleWindow {
    /// `cutoff` must be captured before any request of the cycle is issued.
    pub fn new(previous: Watermark, cutoff: Watermark) -> Self {
        Self {
            since: previous.at(),
            until: cutoff.at(),
        }
    }

    pub fn contains(&self, submitted: DateTime<Utc>) -> bool {
        submitted >= self.since && submitted < self.until
    }

    /// Watermark to carry into the next cycle.
    pub fn next_watermark(&self) -> Watermark {
        Watermark::new(self.until)
    }
}

/// Persistence for the watermark.
pub trait WatermarkStore: Send + Sync {
    fn load(&self) -> Result<Option<Watermark>, WatermarkError>;
    fn save(&self, watermark: Watermark) -> Result<(), WatermarkError>;
}

/// Single-line text file.
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn load(&self) -> Result<Option<Watermark>, WatermarkError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WatermarkError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        Watermark::parse(&contents).map(Some)
    }

    fn save(&self, watermark: Watermark) -> Result<(), WatermarkError> {
        std::fs::write(&self.path, watermark.to_string()).map_err(|e| WatermarkError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(path = %self.path.display(), watermark = %watermark, "persisted watermark");
        Ok(())
    }
}

/// In-process store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    value: Mutex<Option<Watermark>>,
}

impl MemoryWatermarkStore {
    pub fn new(initial: Option<Watermark>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> Option<Watermark> {
        self.value.lock().ok().and_then(|v| *v)
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn load(&self) -> Result<Option<Watermark>, WatermarkError> {
        Ok(self.get())
    }

    fn save(&self, watermark: Watermark) -> Result<(), WatermarkError> {
        if let Ok(mut v) = self.value.lock() {
            *v = Some(watermark);
        }
        Ok(())
    }
}
