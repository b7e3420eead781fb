//! File downloader.
//!
//! # Architecture
//!
//! ```text
//! Idle ─► UrlParsed ─► AddressQuery ─► AddressDone ─► HttpConnect ─► HttpContentGet ─► Done
//!             │             ▲  │            ▲
//!             │             └──┘ tick:      │
//!             │          re-query with      │
//!             │          doubled timeout    │
//!             └───── literal address ───────┘
//!
//! any error, timeout or hash mismatch ─► Failed (transport released)
//! ```
//!
//! Only DNS is retried. Connection, transfer and hash failures end the
//! download; the workflow decides whether to start another.

mod http;
mod machine;
mod state;
mod transport;
mod url;

pub use http::ThreadedHttpTransport;
pub use machine::{DownloadEvent, DownloadStatus, Downloader};
pub use state::{DownloadKind, DownloaderState};
pub use transport::{Received, Resolution, Transport};
pub use url::{FileUrl, Host, HTTP_PORT};
