//! Downloader states.

use std::fmt;

/// Progress of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DownloaderState {
    Idle,
    UrlParsed,
    AddressQuery,
    AddressDone,
    HttpConnect,
    HttpContentGet,
    Done,
    Failed,
}

impl DownloaderState {
    /// Get a display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::UrlParsed => "url parsed",
            Self::AddressQuery => "address query",
            Self::AddressDone => "address done",
            Self::HttpConnect => "http connect",
            Self::HttpContentGet => "http content get",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether a download is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Done | Self::Failed)
    }

    /// Whether transport connection resources have been allocated.
    pub fn holds_connection(&self) -> bool {
        matches!(self, Self::HttpConnect | Self::HttpContentGet)
    }
}

impl fmt::Display for DownloaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What is being downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// A detached manifest, kept in the bounded manifest buffer.
    Manifest,
    /// A firmware image, streamed to the device driver.
    Firmware,
}

impl DownloadKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::Firmware => "firmware",
        }
    }
}
