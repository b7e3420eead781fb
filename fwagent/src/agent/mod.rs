//! The update agent.
//!
//! # Architecture
//!
//! ```text
//!  application ──► Agent::handle_properties ─┐
//!  application ──► Agent::tick ──────────────┤        ┌──────────────────┐
//!  transport ───► EventNotifier::post ───────┼──────► │ event queue      │
//!                                            │        └────────┬─────────┘
//!                                            │                 │ process_events
//!                                            ▼                 ▼
//!                                     ┌───────────────────────────────┐
//!                                     │ Mutex<Engine>                 │
//!                                     │  workflow · downloader · devs │
//!                                     └──────────────┬────────────────┘
//!                                                    │ notices (lock released)
//!                                                    ▼
//!                                             NotifyCallback
//! ```
//!
//! Every entry point takes the engine lock, so the agent can be shared across
//! threads. The notification callback runs after the lock is released and may
//! call back into the agent, typically to approve the next phase with
//! [`Agent::update_download_and_install`] or [`Agent::update_apply`].

mod events;

pub use events::{channel, AgentEvent, EventNotifier};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

use crate::config::AgentConfig;
use crate::device::DeviceDriver;
use crate::downloader::{DownloaderState, Transport};
use crate::error::AgentResult;
use crate::manifest::UpdateIdentity;
use crate::report::{CloudClient, Workflow};
use crate::workflow::engine::Engine;
use crate::workflow::{AgentState, StepState};

/// Phase transitions offered to the application for consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateNotice {
    /// An update is available; approve with [`Agent::update_download_and_install`].
    UpdateReceived,
    /// Reserved wire value; the agent does not raise it.
    Downloaded,
    /// Every step is installed; approve with [`Agent::update_apply`].
    Installed,
}

impl UpdateNotice {
    /// Wire code.
    pub fn code(&self) -> u32 {
        match self {
            Self::UpdateReceived => 0,
            Self::Downloaded => 1,
            Self::Installed => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateReceived => "update received",
            Self::Downloaded => "downloaded",
            Self::Installed => "installed",
        }
    }
}

/// Application callback asked to approve each phase.
///
/// Without a callback the agent proceeds through download, install and
/// apply on its own.
pub type NotifyCallback = Box<dyn FnMut(&Agent, UpdateNotice, &UpdateIdentity) + Send>;

/// Secure firmware update agent.
pub struct Agent {
    engine: Mutex<Engine>,
    notifier: EventNotifier,
    events: Mutex<UnboundedReceiver<AgentEvent>>,
    notify: Mutex<Option<NotifyCallback>>,
}

impl Agent {
    /// Start the agent and send the startup report.
    ///
    /// # Arguments
    ///
    /// * `config` - Host identity, capacities, timeouts and root keys
    /// * `cloud` - Outbound reported-property channel
    /// * `transport` - DNS and HTTP plumbing used by the downloader
    /// * `host_driver` - Driver of the host device
    /// * `notify` - Consent callback; `None` runs every phase automatically
    ///
    /// # Errors
    ///
    /// * [`AgentError::InvalidParameter`](crate::AgentError::InvalidParameter) for an unusable configuration
    /// * [`AgentError::DriverError`](crate::AgentError::DriverError) when the host driver fails to initialize
    pub fn start(
        config: AgentConfig,
        cloud: Box<dyn CloudClient>,
        transport: Box<dyn Transport>,
        host_driver: Box<dyn DeviceDriver>,
        notify: Option<NotifyCallback>,
    ) -> AgentResult<Self> {
        let (notifier, events) = channel();
        let engine = Engine::start(
            config,
            cloud,
            transport,
            host_driver,
            notifier.clone(),
            notify.is_some(),
        )?;
        Ok(Self {
            engine: Mutex::new(engine),
            notifier,
            events: Mutex::new(events),
            notify: Mutex::new(notify),
        })
    }

    /// Release network resources. Later events are discarded.
    pub fn stop(&self) {
        self.engine.lock().stop();
    }

    /// Register a proxy device and initialize its driver.
    ///
    /// Returns the device's table index.
    ///
    /// # Errors
    ///
    /// * [`AgentError::InvalidParameter`](crate::AgentError::InvalidParameter) for an empty manufacturer or model
    /// * [`AgentError::BufferExhausted`](crate::AgentError::BufferExhausted) when every proxy slot is taken
    /// * [`AgentError::DriverError`](crate::AgentError::DriverError) when the driver fails to initialize
    pub fn proxy_update_add(
        &self,
        manufacturer: &str,
        model: &str,
        installed_criteria: &str,
        driver: Box<dyn DeviceDriver>,
    ) -> AgentResult<usize> {
        self.engine
            .lock()
            .add_proxy(manufacturer, model, installed_criteria, driver)
    }

    /// Approve downloading and installing the pending update.
    ///
    /// Approving again while a download runs leaves that download alone.
    pub fn update_download_and_install(&self) {
        self.engine.lock().reset_current_step();
        self.notifier.post(AgentEvent::DownloadInstall);
    }

    /// Approve applying the installed update.
    pub fn update_apply(&self) {
        self.notifier.post(AgentEvent::Apply);
    }

    /// Hand a writable-property document to the agent.
    ///
    /// The document is acknowledged before any work starts; the deployment
    /// itself runs from [`process_events`](Self::process_events).
    ///
    /// # Errors
    ///
    /// Returns the parse, verification or manifest error that rejected the
    /// property. It has already been reported to the cloud.
    pub fn handle_properties(&self, document: &[u8], version: u64) -> AgentResult<()> {
        self.engine.lock().handle_properties(document, version)
    }

    /// Queue one timer tick. Call about once per second.
    pub fn tick(&self) {
        self.notifier.post(AgentEvent::Periodic);
    }

    /// Handle every queued event, including those posted while running.
    ///
    /// Returns the number of events handled.
    pub fn process_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.events.lock().try_recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            trace!(event = event.name(), "handling event");
            let notices = {
                let mut engine = self.engine.lock();
                engine.handle_event(event);
                engine.take_notices()
            };
            handled += 1;
            for (notice, update) in notices {
                self.deliver(notice, &update);
            }
        }
        handled
    }

    fn deliver(&self, notice: UpdateNotice, update: &UpdateIdentity) {
        let callback = self.notify.lock().take();
        let Some(mut callback) = callback else {
            debug!(notice = notice.name(), "no consent callback");
            return;
        };
        debug!(notice = notice.name(), version = %update.version, "asking for consent");
        callback(self, notice, update);
        let mut slot = self.notify.lock();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }

    /// A handle for posting events, e.g. from a custom transport.
    pub fn notifier(&self) -> EventNotifier {
        self.notifier.clone()
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn state(&self) -> AgentState {
        self.engine.lock().state()
    }

    pub fn workflow(&self) -> Workflow {
        self.engine.lock().workflow().clone()
    }

    /// State of every step of the current manifest.
    pub fn step_states(&self) -> Vec<StepState> {
        self.engine
            .lock()
            .content()
            .steps
            .iter()
            .map(|step| step.state)
            .collect()
    }

    /// Identity of the current manifest, if one was accepted.
    pub fn update_identity(&self) -> Option<UpdateIdentity> {
        let engine = self.engine.lock();
        let content = engine.content();
        content.has_steps().then(|| content.identity())
    }

    pub fn downloader_state(&self) -> DownloaderState {
        self.engine.lock().downloader().state()
    }

    /// Registered devices, host included.
    pub fn device_count(&self) -> usize {
        self.engine.lock().devices().len()
    }

    /// Installed criteria cached for a device, if any.
    pub fn installed_criteria(&self, device: usize) -> Option<String> {
        self.engine
            .lock()
            .devices()
            .get(device)
            .map(|device| device.installed_criteria.clone())
    }

    pub fn is_stopped(&self) -> bool {
        self.engine.lock().is_stopped()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("engine", &*self.engine.lock())
            .finish_non_exhaustive()
    }
}
