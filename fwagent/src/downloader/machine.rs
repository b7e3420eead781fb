//! The download state machine.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::state::{DownloadKind, DownloaderState};
use super::transport::{Received, Resolution, Transport};
use super::url::{FileUrl, Host};
use crate::config::Timeouts;
use crate::device::{Device, DriverCommand};
use crate::error::{AgentError, AgentResult};
use crate::manifest::FileTarget;

/// Something that can move a download forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    DnsResponse,
    ConnectDone,
    Receive,
    Tick,
}

/// Result of driving the downloader.
#[derive(Debug)]
pub enum DownloadStatus {
    /// Nothing finished; more events are needed (or none is running).
    Pending,
    /// The file was received completely and its hash matched.
    Completed,
    /// The download was abandoned and its resources released.
    Failed(AgentError),
}

impl DownloadStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Fetches one file at a time over a [`Transport`], hashing as it goes.
///
/// Firmware chunks are written straight to the device driver; manifest
/// downloads are collected in a buffer bounded by `manifest_capacity`.
pub struct Downloader {
    timeouts: Timeouts,
    manifest_capacity: usize,
    state: DownloaderState,
    kind: DownloadKind,
    target: Option<FileTarget>,
    url: Option<FileUrl>,
    address: Option<SocketAddr>,
    received: u32,
    timeout: u32,
    dns_query_count: u32,
    hasher: Sha256,
    manifest: Vec<u8>,
    /// The driver accepted `Preprocess` for this download.
    driver_prepared: bool,
}

impl Downloader {
    /// Create an idle downloader.
    pub fn new(timeouts: Timeouts, manifest_capacity: usize) -> Self {
        Self {
            timeouts,
            manifest_capacity,
            state: DownloaderState::Idle,
            kind: DownloadKind::Firmware,
            target: None,
            url: None,
            address: None,
            received: 0,
            timeout: 0,
            dns_query_count: 0,
            hasher: Sha256::new(),
            manifest: Vec::new(),
            driver_prepared: false,
        }
    }

    pub fn state(&self) -> DownloaderState {
        self.state
    }

    pub fn kind(&self) -> DownloadKind {
        self.kind
    }

    /// Whether a download is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.is_active()
    }

    /// Resolved server address, once known.
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Body bytes received so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Ticks left before the current wait times out.
    pub fn remaining_ticks(&self) -> u32 {
        self.timeout
    }

    /// DNS queries sent for the current download.
    pub fn dns_queries(&self) -> u32 {
        self.dns_query_count
    }

    /// Take the body of a completed manifest download.
    pub fn take_manifest(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.manifest)
    }

    /// Start downloading `target`.
    ///
    /// # Arguments
    ///
    /// * `kind` - Manifest or firmware
    /// * `target` - File to fetch, with its declared size and digest
    /// * `transport` - Network transport
    /// * `device` - Receives firmware chunks; required for firmware
    pub fn start(
        &mut self,
        kind: DownloadKind,
        target: FileTarget,
        transport: &mut dyn Transport,
        mut device: Option<&mut Device>,
    ) -> DownloadStatus {
        if self.is_busy() {
            return DownloadStatus::Failed(AgentError::InvalidParameter(
                "a download is already in progress".to_string(),
            ));
        }

        self.state = DownloaderState::Idle;
        self.kind = kind;
        self.url = None;
        self.address = None;
        self.received = 0;
        self.timeout = 0;
        self.dns_query_count = 0;
        self.hasher = Sha256::new();
        self.manifest.clear();
        self.driver_prepared = false;

        if target.url.is_empty() || target.sha256.is_empty() || target.size_in_bytes == 0 {
            self.target = Some(target);
            return self.fail(
                AgentError::InvalidParameter("file has no url, hash or size".to_string()),
                transport,
                device,
            );
        }

        info!(
            kind = kind.name(),
            file = %target.id,
            size = target.size_in_bytes,
            url = %target.url,
            "download starting"
        );
        let firmware_size = target.size_in_bytes;
        self.target = Some(target);

        if kind == DownloadKind::Firmware {
            let preprocess = match device.as_deref_mut() {
                Some(device) => device
                    .execute(DriverCommand::Preprocess { firmware_size })
                    .map(|_| ()),
                None => Err(AgentError::InvalidParameter(
                    "firmware download needs a device".to_string(),
                )),
            };
            if let Err(e) = preprocess {
                return self.fail(e, transport, device);
            }
            self.driver_prepared = true;
        }

        let url = match self.target.as_ref().map(|t| FileUrl::parse(&t.url)) {
            Some(Ok(url)) => url,
            Some(Err(e)) => return self.fail(e, transport, device),
            None => return DownloadStatus::Pending,
        };
        let literal = match url.host {
            Host::Address(address) => Some(address),
            Host::Name(_) => None,
        };
        self.url = Some(url);

        match literal {
            Some(address) => {
                self.set_state(DownloaderState::AddressDone);
                self.connect(address, transport, device)
            }
            None => {
                self.set_state(DownloaderState::UrlParsed);
                self.dns_query(transport, device)
            }
        }
    }

    /// Feed an event to the running download.
    pub fn handle(
        &mut self,
        event: DownloadEvent,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        match event {
            DownloadEvent::DnsResponse if self.state == DownloaderState::AddressQuery => {
                self.dns_response(transport, device)
            }
            DownloadEvent::ConnectDone if self.state == DownloaderState::HttpConnect => {
                self.send_request(transport, device)
            }
            DownloadEvent::Receive if self.state == DownloaderState::HttpContentGet => {
                self.receive(transport, device)
            }
            DownloadEvent::Tick => self.tick(transport, device),
            _ => DownloadStatus::Pending,
        }
    }

    /// Release transport resources of an in-flight download.
    pub fn abort(&mut self, transport: &mut dyn Transport) {
        if self.state.holds_connection() {
            transport.release();
        }
        if self.state.is_active() {
            debug!(state = %self.state, "download aborted");
            self.state = DownloaderState::Failed;
        }
    }

    fn tick(&mut self, transport: &mut dyn Transport, device: Option<&mut Device>) -> DownloadStatus {
        if self.timeout == 0 || !self.state.is_active() {
            return DownloadStatus::Pending;
        }
        self.timeout -= 1;
        if self.timeout != 0 {
            return DownloadStatus::Pending;
        }

        match self.state {
            DownloaderState::AddressQuery => self.dns_response(transport, device),
            DownloaderState::HttpConnect | DownloaderState::HttpContentGet => {
                let stage = self.state.name();
                self.fail(
                    AgentError::Transport(format!("{} timed out", stage)),
                    transport,
                    device,
                )
            }
            _ => DownloadStatus::Pending,
        }
    }

    /// Send (or resend) the DNS query with exponential backoff.
    fn dns_query(
        &mut self,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        let Some(host) = self.url.as_ref().map(FileUrl::host_name) else {
            return DownloadStatus::Pending;
        };
        if self.dns_query_count > self.timeouts.dns_retransmit_count {
            return self.fail(
                AgentError::Transport(format!("no DNS answer for {}", host)),
                transport,
                device,
            );
        }

        self.timeout = self
            .timeouts
            .dns_initial
            .checked_shl(self.dns_query_count)
            .unwrap_or(u32::MAX);
        self.dns_query_count += 1;
        self.set_state(DownloaderState::AddressQuery);
        debug!(host = %host, attempt = self.dns_query_count, timeout = self.timeout, "DNS query");

        match transport.dns_query(&host) {
            Ok(Resolution::Resolved(address)) => {
                self.set_state(DownloaderState::AddressDone);
                self.connect(address, transport, device)
            }
            Ok(Resolution::InProgress) => DownloadStatus::Pending,
            Err(e) => self.fail(e, transport, device),
        }
    }

    /// Collect a DNS answer, or query again when there is none.
    fn dns_response(
        &mut self,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        let Some(host) = self.url.as_ref().map(FileUrl::host_name) else {
            return DownloadStatus::Pending;
        };
        match transport.dns_response(&host) {
            Some(address) => {
                self.set_state(DownloaderState::AddressDone);
                self.connect(address, transport, device)
            }
            None if self.timeout == 0 => self.dns_query(transport, device),
            None => DownloadStatus::Pending,
        }
    }

    fn connect(
        &mut self,
        address: Ipv4Addr,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        let Some(url) = self.url.as_ref() else {
            return DownloadStatus::Pending;
        };
        let socket = SocketAddr::V4(SocketAddrV4::new(address, url.port));
        let host = url.host_name();

        self.address = Some(socket);
        self.set_state(DownloaderState::HttpConnect);
        self.timeout = self.timeouts.http_connect;

        match transport.connect(socket, &host) {
            Ok(()) => DownloadStatus::Pending,
            Err(e) => self.fail(e, transport, device),
        }
    }

    fn send_request(
        &mut self,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        let Some(url) = self.url.as_ref() else {
            return DownloadStatus::Pending;
        };
        let host = url.host_name();
        let resource = url.resource.clone();

        self.set_state(DownloaderState::HttpContentGet);
        self.timeout = self.timeouts.http_download;

        match transport.send_request(&host, &resource) {
            Ok(()) => DownloadStatus::Pending,
            Err(e) => self.fail(e, transport, device),
        }
    }

    /// Drain available body data.
    fn receive(
        &mut self,
        transport: &mut dyn Transport,
        mut device: Option<&mut Device>,
    ) -> DownloadStatus {
        let size = self.target.as_ref().map_or(0, |t| t.size_in_bytes);

        while self.received < size {
            let chunk = match transport.receive() {
                Ok(Received::Data(chunk)) => chunk,
                Ok(Received::WouldBlock) => return DownloadStatus::Pending,
                Ok(Received::Done) => break,
                Err(e) => return self.fail(e, transport, device),
            };
            if let Err(e) = self.consume(&chunk, device.as_deref_mut()) {
                return self.fail(e, transport, device);
            }
        }

        self.finish(transport, device)
    }

    fn consume(&mut self, chunk: &[u8], device: Option<&mut Device>) -> AgentResult<()> {
        self.hasher.update(chunk);

        match self.kind {
            DownloadKind::Firmware => {
                let device = device.ok_or_else(|| {
                    AgentError::InvalidParameter("firmware download needs a device".to_string())
                })?;
                device.execute(DriverCommand::Write {
                    offset: self.received,
                    data: chunk,
                })?;
            }
            DownloadKind::Manifest => {
                if self.manifest.len() + chunk.len() > self.manifest_capacity {
                    return Err(AgentError::BufferExhausted("manifest download buffer"));
                }
                self.manifest.extend_from_slice(chunk);
            }
        }

        let len = u32::try_from(chunk.len()).unwrap_or(u32::MAX);
        self.received = self.received.saturating_add(len);
        debug!(received = self.received, "download progress");
        Ok(())
    }

    /// Check the digest of a finished body.
    fn finish(
        &mut self,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        let computed = std::mem::take(&mut self.hasher).finalize();
        let declared = self
            .target
            .as_ref()
            .and_then(|t| STANDARD.decode(t.sha256.as_bytes()).ok());

        if declared.as_deref() != Some(computed.as_slice()) {
            warn!(received = self.received, "downloaded file hash mismatch");
            return self.fail(AgentError::VerificationFailed, transport, device);
        }

        transport.release();
        self.driver_prepared = false;
        self.set_state(DownloaderState::Done);
        info!(
            kind = self.kind.name(),
            received = self.received,
            "download complete"
        );
        DownloadStatus::Completed
    }

    /// Abandon the download, releasing the connection before reporting.
    fn fail(
        &mut self,
        error: AgentError,
        transport: &mut dyn Transport,
        device: Option<&mut Device>,
    ) -> DownloadStatus {
        if self.state.holds_connection() {
            transport.release();
        }
        if self.driver_prepared {
            if let Some(device) = device {
                if let Err(e) = device.execute(DriverCommand::Cancel) {
                    warn!(error = %e, "driver refused to cancel");
                }
            }
            self.driver_prepared = false;
        }

        warn!(
            kind = self.kind.name(),
            state = %self.state,
            error = %error,
            "download failed"
        );
        self.state = DownloaderState::Failed;
        self.timeout = 0;
        self.manifest.clear();
        DownloadStatus::Failed(error)
    }

    fn set_state(&mut self, state: DownloaderState) {
        debug!(from = %self.state, to = %state, "downloader state");
        self.state = state;
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("received", &self.received)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{self, AgentEvent};
    use crate::testing::{DnsMode, MemoryTransport, RecordedCommand, ScriptedDriver};

    const URL: &str = "http://updates.contoso.com/fw.bin";

    fn body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn target(data: &[u8]) -> FileTarget {
        FileTarget {
            id: "f1".to_string(),
            name: "fw.bin".to_string(),
            size_in_bytes: data.len() as u32,
            sha256: STANDARD.encode(Sha256::digest(data)),
            url: URL.to_string(),
        }
    }

    fn device(driver: &ScriptedDriver) -> Device {
        Device::new("Contoso", "IoTDevice", "", driver.boxed())
    }

    fn event_of(event: AgentEvent) -> Option<DownloadEvent> {
        match event {
            AgentEvent::DnsResponse => Some(DownloadEvent::DnsResponse),
            AgentEvent::HttpConnectDone => Some(DownloadEvent::ConnectDone),
            AgentEvent::HttpReceive => Some(DownloadEvent::Receive),
            AgentEvent::Periodic => Some(DownloadEvent::Tick),
            _ => None,
        }
    }

    /// Start a download and pump posted events until it settles.
    fn run(
        downloader: &mut Downloader,
        kind: DownloadKind,
        target: FileTarget,
        transport: &mut MemoryTransport,
        mut device: Option<&mut Device>,
    ) -> DownloadStatus {
        let (notifier, mut rx) = agent::channel();
        transport.attach(notifier);

        let mut status = downloader.start(kind, target, transport, device.as_deref_mut());
        while status.is_pending() {
            let Ok(event) = rx.try_recv() else { break };
            if let Some(event) = event_of(event) {
                status = downloader.handle(event, transport, device.as_deref_mut());
            }
        }
        status
    }

    fn tick(
        downloader: &mut Downloader,
        transport: &mut MemoryTransport,
        ticks: u32,
    ) -> DownloadStatus {
        for _ in 0..ticks {
            let status = downloader.handle(DownloadEvent::Tick, transport, None);
            if !status.is_pending() {
                return status;
            }
        }
        DownloadStatus::Pending
    }

    #[test]
    fn test_firmware_download_completes() {
        let data = body(1024);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data.clone()).unwrap();
        let driver = ScriptedDriver::new();
        let mut device = device(&driver);
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Firmware,
            target(&data),
            &mut transport,
            Some(&mut device),
        );

        assert!(matches!(status, DownloadStatus::Completed));
        assert_eq!(downloader.state(), DownloaderState::Done);
        assert_eq!(downloader.received(), 1024);
        assert_eq!(driver.firmware(), data);
        assert_eq!(driver.commands()[0], RecordedCommand::Preprocess(1024));
        assert_eq!(transport.releases(), 1);
        assert_eq!(transport.requests(), vec!["updates.contoso.com /fw.bin"]);
    }

    #[test]
    fn test_digest_mismatch_fails_and_releases() {
        let data = body(300);
        let mut corrupted = data.clone();
        corrupted[17] ^= 0x01;

        let mut transport = MemoryTransport::new();
        transport.serve(URL, corrupted).unwrap();
        let driver = ScriptedDriver::new();
        let mut device = device(&driver);
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Firmware,
            target(&data),
            &mut transport,
            Some(&mut device),
        );

        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::VerificationFailed)
        ));
        assert_eq!(downloader.state(), DownloaderState::Failed);
        assert_eq!(transport.releases(), 1);
        assert!(!transport.is_connected());
        assert_eq!(driver.commands().last(), Some(&RecordedCommand::Cancel));
    }

    #[test]
    fn test_failure_survives_driver_refusing_cancel() {
        let data = body(300);
        let mut corrupted = data.clone();
        corrupted[0] ^= 0xff;

        let mut transport = MemoryTransport::new();
        transport.serve(URL, corrupted).unwrap();
        let driver = ScriptedDriver::new();
        driver.fail_on("cancel");
        let mut device = device(&driver);
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Firmware,
            target(&data),
            &mut transport,
            Some(&mut device),
        );

        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::VerificationFailed)
        ));
        assert_eq!(downloader.state(), DownloaderState::Failed);
        assert_eq!(driver.commands().last(), Some(&RecordedCommand::Cancel));
        assert_eq!(transport.releases(), 1);
        assert!(!downloader.is_busy());
    }

    #[test]
    fn test_literal_address_skips_dns() {
        let data = body(64);
        let url = "http://10.1.2.3:8080/images/fw.bin";
        let mut transport = MemoryTransport::new();
        transport.serve(url, data.clone()).unwrap();
        let mut downloader = Downloader::new(Timeouts::default(), 1024);
        let mut file = target(&data);
        file.url = url.to_string();

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            file,
            &mut transport,
            None,
        );

        assert!(matches!(status, DownloadStatus::Completed));
        assert_eq!(transport.dns_queries(), 0);
        assert_eq!(downloader.address(), Some("10.1.2.3:8080".parse().unwrap()));
        assert_eq!(downloader.take_manifest(), data);
    }

    #[test]
    fn test_deferred_dns_answer() {
        let data = body(100);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data.clone()).unwrap();
        transport.set_dns_mode(DnsMode::Deferred);
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );

        assert!(matches!(status, DownloadStatus::Completed));
        assert_eq!(transport.dns_queries(), 1);
    }

    #[test]
    fn test_dns_backoff_then_failure() {
        let data = body(10);
        let mut transport = MemoryTransport::new();
        transport.set_dns_mode(DnsMode::Silent);
        let timeouts = Timeouts::default();
        let mut downloader = Downloader::new(timeouts, 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );
        assert!(status.is_pending());
        assert_eq!(downloader.state(), DownloaderState::AddressQuery);
        assert_eq!(downloader.remaining_ticks(), 1);

        // Timeouts 1, 2, 4 and 8 ticks: the first query plus three retries.
        assert!(tick(&mut downloader, &mut transport, 1).is_pending());
        assert_eq!(downloader.remaining_ticks(), 2);
        assert!(tick(&mut downloader, &mut transport, 2).is_pending());
        assert_eq!(downloader.remaining_ticks(), 4);
        assert!(tick(&mut downloader, &mut transport, 4).is_pending());
        assert_eq!(downloader.remaining_ticks(), 8);
        assert_eq!(transport.dns_queries(), 4);

        let status = tick(&mut downloader, &mut transport, 8);
        assert!(matches!(status, DownloadStatus::Failed(AgentError::Transport(_))));
        assert_eq!(transport.dns_queries(), 4);
        assert_eq!(transport.releases(), 0);
    }

    #[test]
    fn test_connect_timeout_releases() {
        let data = body(10);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data.clone()).unwrap();
        transport.set_stall_connect(true);
        let timeouts = Timeouts {
            http_connect: 3,
            ..Timeouts::default()
        };
        let mut downloader = Downloader::new(timeouts, 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );
        assert!(status.is_pending());
        assert_eq!(downloader.state(), DownloaderState::HttpConnect);

        assert!(tick(&mut downloader, &mut transport, 2).is_pending());
        let status = tick(&mut downloader, &mut transport, 1);
        assert!(matches!(status, DownloadStatus::Failed(AgentError::Transport(_))));
        assert_eq!(transport.releases(), 1);
    }

    #[test]
    fn test_transfer_timeout() {
        let data = body(10);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data.clone()).unwrap();
        transport.set_stall_body(true);
        let timeouts = Timeouts {
            http_download: 5,
            ..Timeouts::default()
        };
        let mut downloader = Downloader::new(timeouts, 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );
        assert!(status.is_pending());
        assert_eq!(downloader.state(), DownloaderState::HttpContentGet);

        let status = tick(&mut downloader, &mut transport, 5);
        assert!(matches!(status, DownloadStatus::Failed(AgentError::Transport(_))));
        assert_eq!(transport.releases(), 1);
    }

    #[test]
    fn test_manifest_buffer_is_bounded() {
        let data = body(600);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data.clone()).unwrap();
        let mut downloader = Downloader::new(Timeouts::default(), 512);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );

        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::BufferExhausted(_))
        ));
        assert!(downloader.take_manifest().is_empty());
    }

    #[test]
    fn test_short_body_fails_hash_check() {
        let data = body(200);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data[..150].to_vec()).unwrap();
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );

        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::VerificationFailed)
        ));
        assert_eq!(downloader.received(), 150);
    }

    #[test]
    fn test_missing_resource_fails() {
        let data = body(20);
        let mut transport = MemoryTransport::new();
        transport.serve("http://updates.contoso.com/other.bin", data.clone()).unwrap();
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );

        assert!(matches!(status, DownloadStatus::Failed(AgentError::Transport(_))));
        assert_eq!(transport.releases(), 1);
    }

    #[test]
    fn test_firmware_without_device_is_rejected() {
        let data = body(20);
        let mut transport = MemoryTransport::new();
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        let status = run(
            &mut downloader,
            DownloadKind::Firmware,
            target(&data),
            &mut transport,
            None,
        );
        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_https_url_is_rejected_after_preprocess() {
        let data = body(20);
        let mut transport = MemoryTransport::new();
        let driver = ScriptedDriver::new();
        let mut device = device(&driver);
        let mut downloader = Downloader::new(Timeouts::default(), 1024);
        let mut file = target(&data);
        file.url = "https://updates.contoso.com/fw.bin".to_string();

        let status = run(
            &mut downloader,
            DownloadKind::Firmware,
            file,
            &mut transport,
            Some(&mut device),
        );

        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::InvalidParameter(_))
        ));
        assert_eq!(
            driver.commands(),
            vec![RecordedCommand::Preprocess(20), RecordedCommand::Cancel]
        );
    }

    #[test]
    fn test_second_start_while_busy_is_refused() {
        let data = body(20);
        let mut transport = MemoryTransport::new();
        transport.serve(URL, data.clone()).unwrap();
        transport.set_stall_connect(true);
        let mut downloader = Downloader::new(Timeouts::default(), 1024);

        run(
            &mut downloader,
            DownloadKind::Manifest,
            target(&data),
            &mut transport,
            None,
        );
        assert!(downloader.is_busy());

        let status = downloader.start(DownloadKind::Manifest, target(&data), &mut transport, None);
        assert!(matches!(
            status,
            DownloadStatus::Failed(AgentError::InvalidParameter(_))
        ));
        assert_eq!(downloader.state(), DownloaderState::HttpConnect);
    }
}
