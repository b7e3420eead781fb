//! The update workflow engine.
//!
//! [`Engine`] owns everything the agent mutates: the parsed manifest, the
//! device table, the downloader and the outbound collaborators. Every method
//! runs under the agent lock, one event at a time.
//!
//! Step selection follows the manifest order. The update check walks `Idle`
//! steps, download-and-install walks `FirmwareDownloadStarted` steps, and
//! apply walks `FirmwareInstallSucceeded` steps; each handler re-posts its own
//! event until no step is left for it.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::state::{result_code, AgentState, StepState, WorkflowAction};
use crate::agent::{AgentEvent, EventNotifier, UpdateNotice};
use crate::config::AgentConfig;
use crate::device::{Device, DeviceDriver, DeviceTable, DriverCommand, DriverReply};
use crate::downloader::{DownloadEvent, DownloadKind, DownloadStatus, Downloader, Transport};
use crate::error::{AgentError, AgentResult};
use crate::manifest::{
    self, FileTarget, ManifestCapacity, ScratchArena, StepKind, UpdateIdentity,
    UpdateManifestContent,
};
use crate::report::{
    self, AckStatus, CloudClient, ServiceLimits, ServiceRequest, StateReport, Workflow,
};
use crate::verify::ManifestVerifier;

/// UTF-8 byte order mark some services prepend to detached manifests.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Deserialize)]
struct DetachedManifest {
    #[serde(rename = "updateManifest")]
    update_manifest: String,
}

/// Mutable agent state and the workflow handlers operating on it.
pub(crate) struct Engine {
    config: AgentConfig,
    state: AgentState,
    workflow: Workflow,
    update_manifest: String,
    file_urls: BTreeMap<String, String>,
    content: UpdateManifestContent,
    current_step: Option<usize>,
    /// Step the running download belongs to.
    download_step: Option<usize>,
    update_available: bool,
    consent_required: bool,
    devices: DeviceTable,
    downloader: Downloader,
    detached_manifest: Vec<u8>,
    transport: Box<dyn Transport>,
    cloud: Box<dyn CloudClient>,
    verifier: ManifestVerifier,
    notifier: EventNotifier,
    notices: Vec<(UpdateNotice, UpdateIdentity)>,
    stopped: bool,
}

impl Engine {
    /// Validate the configuration, initialize the host driver and announce
    /// the device.
    ///
    /// # Errors
    ///
    /// * [`AgentError::InvalidParameter`] for an unusable configuration
    /// * [`AgentError::DriverError`] when the host driver fails to initialize
    pub(crate) fn start(
        config: AgentConfig,
        cloud: Box<dyn CloudClient>,
        mut transport: Box<dyn Transport>,
        mut host_driver: Box<dyn DeviceDriver>,
        notifier: EventNotifier,
        consent_required: bool,
    ) -> AgentResult<Self> {
        config.validate()?;
        host_driver.execute(DriverCommand::Initialize)?;

        let mut devices = DeviceTable::new(config.device_count());
        devices.set_host(Device::new(
            config.manufacturer.clone(),
            config.model.clone(),
            config.installed_criteria.clone(),
            host_driver,
        ));
        transport.attach(notifier.clone());

        let mut engine = Self {
            verifier: ManifestVerifier::new(config.root_keys.clone()),
            downloader: Downloader::new(config.timeouts, config.manifest_size()),
            state: AgentState::Idle,
            workflow: Workflow::default(),
            update_manifest: String::new(),
            file_urls: BTreeMap::new(),
            content: UpdateManifestContent::empty(),
            current_step: None,
            download_step: None,
            update_available: false,
            consent_required,
            devices,
            detached_manifest: Vec::new(),
            transport,
            cloud,
            notifier,
            notices: Vec::new(),
            stopped: false,
            config,
        };

        let startup = report::startup(
            &engine.config.manufacturer,
            &engine.config.model,
            &engine.config.agent_version,
            &engine.config.delivery_version,
        );
        engine.report(&startup);
        if engine.verifier.root_keys().is_empty() {
            warn!("no trusted root keys configured, every deployment will be rejected");
        }
        info!(
            manufacturer = %engine.config.manufacturer,
            model = %engine.config.model,
            root_keys = engine.verifier.root_keys().len(),
            "update agent started"
        );
        Ok(engine)
    }

    /// Release network resources and ignore all further events.
    pub(crate) fn stop(&mut self) {
        if self.state == AgentState::DeploymentInProgress {
            self.downloader.abort(self.transport.as_mut());
        }
        self.download_step = None;
        self.stopped = true;
        info!("update agent stopped");
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Register a proxy device after initializing its driver.
    pub(crate) fn add_proxy(
        &mut self,
        manufacturer: &str,
        model: &str,
        installed_criteria: &str,
        mut driver: Box<dyn DeviceDriver>,
    ) -> AgentResult<usize> {
        if manufacturer.is_empty() || model.is_empty() {
            return Err(AgentError::InvalidParameter(
                "proxy device manufacturer and model must not be empty".to_string(),
            ));
        }
        if self.devices.len() >= self.devices.capacity() {
            return Err(AgentError::BufferExhausted("device table"));
        }
        driver.execute(DriverCommand::Initialize)?;
        let index = self.devices.add(Device::new(
            manufacturer,
            model,
            installed_criteria,
            driver,
        ))?;
        info!(index, manufacturer, model, "proxy device added");
        Ok(index)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub(crate) fn state(&self) -> AgentState {
        self.state
    }

    pub(crate) fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub(crate) fn content(&self) -> &UpdateManifestContent {
        &self.content
    }

    pub(crate) fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub(crate) fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    /// Forget the current step so the next handler selects from the start.
    ///
    /// Ignored while a download runs; its step stays selected until the
    /// download completes or fails.
    pub(crate) fn reset_current_step(&mut self) {
        if let Some(step) = self.download_step {
            debug!(step, state = %self.downloader.state(), "download running, step kept");
            return;
        }
        self.current_step = None;
    }

    /// Notifications raised since the last call.
    pub(crate) fn take_notices(&mut self) -> Vec<(UpdateNotice, UpdateIdentity)> {
        std::mem::take(&mut self.notices)
    }

    // ========================================================================
    // Inbound service property
    // ========================================================================

    /// Process a writable-property document.
    ///
    /// # Errors
    ///
    /// Returns the parse, verification or manifest error that rejected the
    /// property. The error has already been acknowledged or reported.
    pub(crate) fn handle_properties(&mut self, document: &[u8], version: u64) -> AgentResult<()> {
        if self.stopped {
            return Ok(());
        }
        if self.state == AgentState::DeploymentInProgress {
            debug!(version, "deployment in progress, service property ignored");
            return Ok(());
        }

        let limits = ServiceLimits::from_config(&self.config);
        let request = match ServiceRequest::from_properties(document, limits) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, version, "service property rejected");
                self.workflow = Workflow::default();
                self.file_urls.clear();
                self.update_manifest.clear();
                let ack = report::service_ack(
                    AckStatus::BadFormat,
                    version,
                    &e.to_string(),
                    &self.workflow,
                    "",
                );
                self.report(&ack);
                return Err(e);
            }
        };

        let ServiceRequest {
            workflow,
            update_manifest,
            update_manifest_signature,
            file_urls,
        } = request;
        self.workflow = workflow;
        self.update_manifest = update_manifest;
        self.file_urls = file_urls;

        let ack = report::service_ack(
            AckStatus::Success,
            version,
            "",
            &self.workflow,
            &self.update_manifest,
        );
        self.report(&ack);

        match self.workflow.action {
            WorkflowAction::Cancel => {
                info!(workflow = %self.workflow.id, "cancel requested");
                self.set_state(AgentState::Idle);
                self.report_state();
                return Ok(());
            }
            WorkflowAction::ApplyDeployment => {}
            WorkflowAction::Other(code) => {
                debug!(action = code, "workflow action ignored");
                return Ok(());
            }
        }

        if let Err(e) = self.accept_manifest(&update_manifest_signature) {
            error!(error = %e, "update manifest rejected");
            self.content = UpdateManifestContent::empty();
            self.current_step = None;
            self.set_state(AgentState::Failed);
            self.report_state();
            return Err(e);
        }

        self.current_step = None;
        self.update_available = false;
        self.set_state(AgentState::DeploymentInProgress);
        self.notifier.post(AgentEvent::Update);
        Ok(())
    }

    fn accept_manifest(&mut self, signature: &str) -> AgentResult<()> {
        let manifest = self.update_manifest.as_bytes();
        self.verifier.check(manifest, signature)?;
        let content = manifest::parse(
            manifest,
            ScratchArena::with_capacity(self.config.scratch_size),
            self.capacity(),
        )?;

        let identity = content.identity();
        info!(
            provider = %identity.provider,
            name = %identity.name,
            version = %identity.version,
            steps = content.steps.len(),
            files = content.files.len(),
            "update manifest accepted"
        );
        self.content = content;
        Ok(())
    }

    fn capacity(&self) -> ManifestCapacity {
        ManifestCapacity {
            steps: self.config.steps_max(),
            files: self.config.files_max(),
        }
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Handle one queued event.
    pub(crate) fn handle_event(&mut self, event: AgentEvent) {
        if self.stopped {
            return;
        }
        match event {
            AgentEvent::Update => self.update_check(),
            AgentEvent::DownloadInstall => self.download_install(),
            AgentEvent::Apply => self.apply(),
            AgentEvent::DnsResponse => self.drive_download(DownloadEvent::DnsResponse),
            AgentEvent::HttpConnectDone => self.drive_download(DownloadEvent::ConnectDone),
            AgentEvent::HttpReceive => self.drive_download(DownloadEvent::Receive),
            AgentEvent::Periodic => self.drive_download(DownloadEvent::Tick),
        }
    }

    fn in_deployment(&self, handler: &'static str) -> bool {
        if self.state == AgentState::DeploymentInProgress {
            return true;
        }
        debug!(handler, state = %self.state, "no deployment in progress");
        false
    }

    // ========================================================================
    // Update check
    // ========================================================================

    fn update_check(&mut self) {
        if !self.in_deployment("update check") {
            return;
        }

        let reselect = match self.current_step.and_then(|i| self.content.steps.get(i)) {
            None => true,
            Some(step) => matches!(
                step.state,
                StepState::FirmwareDownloadStarted | StepState::FirmwareApplySucceeded
            ),
        };
        if reselect {
            match self
                .content
                .steps
                .iter()
                .position(|step| step.state == StepState::Idle)
            {
                Some(index) => self.current_step = Some(index),
                None => {
                    self.update_check_finished();
                    return;
                }
            }
        }

        let Some(index) = self.current_step else {
            return;
        };
        let step = &self.content.steps[index];
        match step.state {
            StepState::Idle => match self.content.step_kind(step) {
                StepKind::Inline | StepKind::Unspecified => {
                    if !self.check_inline_step(index) {
                        return;
                    }
                }
                StepKind::Reference => {
                    self.start_detached_manifest_download(index);
                    return;
                }
                StepKind::Unsupported => {
                    warn!(
                        step = index,
                        step_type = %self.content.text(step.step_type),
                        handler = %self.content.text(step.handler),
                        "unsupported step"
                    );
                    self.step_failed(index);
                    return;
                }
            },
            StepState::ManifestDownloadSucceeded => {
                if !self.check_proxy_step(index) {
                    return;
                }
            }
            _ => return,
        }

        self.notifier.post(AgentEvent::Update);
    }

    /// Every step was checked: hand over to download or finish.
    fn update_check_finished(&mut self) {
        if self.update_available {
            self.report_state();
            if self.consent_required {
                self.notify(UpdateNotice::UpdateReceived);
            } else {
                self.notifier.post(AgentEvent::DownloadInstall);
            }
        } else {
            info!("all updates already installed");
            self.set_state(AgentState::Idle);
            self.report_state();
        }
    }

    /// Check an inline step against its device. Returns false when the step
    /// failed.
    fn check_inline_step(&mut self, index: usize) -> bool {
        let step = &self.content.steps[index];
        let criteria = self.content.installed_criteria(step).to_string();
        let file_id = self.content.text(step.file_id).to_string();
        let manufacturer = self.content.bytes(self.content.compatibility.manufacturer).to_vec();
        let model = self.content.bytes(self.content.compatibility.model).to_vec();

        let outcome = self
            .is_installed(index, &manufacturer, &model, &criteria)
            .and_then(|installed| {
                if installed {
                    Ok(None)
                } else {
                    resolve_file(&self.content, &self.file_urls, &file_id).map(Some)
                }
            });
        self.finish_check(index, outcome)
    }

    /// Resolve a reference step from its downloaded detached manifest.
    /// Returns false when the step failed.
    fn check_proxy_step(&mut self, index: usize) -> bool {
        let outcome = self.load_detached_manifest().and_then(|nested| {
            let proxy = &nested.steps[0];
            let criteria = nested.text(proxy.installed_criteria).to_string();
            let file_id = nested.text(proxy.file_id).to_string();
            self.content.steps[index].proxy_installed_criteria = Some(criteria.clone());

            let manufacturer = nested.bytes(nested.compatibility.manufacturer);
            let model = nested.bytes(nested.compatibility.model);
            if self.is_installed(index, manufacturer, model, &criteria)? {
                Ok(None)
            } else {
                resolve_file(&nested, &self.file_urls, &file_id).map(Some)
            }
        });
        self.finish_check(index, outcome)
    }

    fn finish_check(&mut self, index: usize, outcome: AgentResult<Option<FileTarget>>) -> bool {
        match outcome {
            Ok(None) => {
                info!(step = index, "update already installed");
                self.step_state_update(index, StepState::FirmwareApplySucceeded);
                true
            }
            Ok(Some(target)) => {
                info!(step = index, file = %target.id, size = target.size_in_bytes, "update available");
                self.content.steps[index].target = Some(target);
                self.update_available = true;
                self.step_state_update(index, StepState::FirmwareDownloadStarted);
                true
            }
            Err(e) => {
                warn!(step = index, error = %e, "update check failed");
                self.step_failed(index);
                false
            }
        }
    }

    fn load_detached_manifest(&mut self) -> AgentResult<UpdateManifestContent> {
        let body = std::mem::take(&mut self.detached_manifest);
        let text = unwrap_detached_manifest(&body)?;
        let nested = manifest::parse(
            text.as_bytes(),
            ScratchArena::with_capacity(self.config.scratch_size),
            self.capacity(),
        )?;
        if nested.steps.len() != 1 || nested.dropped_steps != 0 {
            return Err(AgentError::malformed(
                "detached manifest",
                format!(
                    "expected exactly one step, found {}",
                    nested.steps.len() + nested.dropped_steps
                ),
            ));
        }
        Ok(nested)
    }

    fn start_detached_manifest_download(&mut self, index: usize) {
        let step = &self.content.steps[index];
        let id_span = if step.detached_manifest_file_id.is_empty() {
            step.file_id
        } else {
            step.detached_manifest_file_id
        };
        let file_id = self.content.text(id_span).to_string();

        let target = match resolve_file(&self.content, &self.file_urls, &file_id) {
            Ok(target) => target,
            Err(e) => {
                warn!(step = index, error = %e, "detached manifest not found");
                self.step_failed(index);
                return;
            }
        };
        self.step_state_update(index, StepState::ManifestDownloadStarted);
        let status = self.downloader.start(
            DownloadKind::Manifest,
            target,
            self.transport.as_mut(),
            None,
        );
        self.download_step = Some(index);
        self.on_download_status(status);
    }

    /// Whether the step's update is already on its device. Matches the
    /// device and records it on the step.
    fn is_installed(
        &mut self,
        index: usize,
        manufacturer: &[u8],
        model: &[u8],
        criteria: &str,
    ) -> AgentResult<bool> {
        if manufacturer.is_empty() || model.is_empty() || criteria.is_empty() {
            return Err(AgentError::InvalidParameter(
                "step has no compatibility or installed criteria".to_string(),
            ));
        }
        let device_index = self.devices.find(manufacturer, model).ok_or_else(|| {
            AgentError::NotFound(format!(
                "device {}/{}",
                String::from_utf8_lossy(manufacturer),
                String::from_utf8_lossy(model)
            ))
        })?;
        self.content.steps[index].device = Some(device_index);

        let device = self
            .devices
            .get_mut(device_index)
            .ok_or_else(|| AgentError::NotFound(format!("device slot {}", device_index)))?;
        if !device.installed_criteria.is_empty() {
            return Ok(device.installed_criteria == criteria);
        }
        match device.execute(DriverCommand::UpdateCheck {
            installed_criteria: criteria,
        })? {
            DriverReply::Installed(installed) => Ok(installed),
            DriverReply::Done => Ok(false),
        }
    }

    // ========================================================================
    // Download and install
    // ========================================================================

    fn download_install(&mut self) {
        if !self.in_deployment("download and install") {
            return;
        }

        let reselect = match self.current_step.and_then(|i| self.content.steps.get(i)) {
            None => true,
            Some(step) => matches!(
                step.state,
                StepState::FirmwareInstallSucceeded | StepState::FirmwareApplySucceeded
            ),
        };
        if reselect {
            match self
                .content
                .steps
                .iter()
                .position(|step| step.state == StepState::FirmwareDownloadStarted)
            {
                Some(index) => self.current_step = Some(index),
                None => {
                    if self.consent_required {
                        self.notify(UpdateNotice::Installed);
                    } else {
                        self.notifier.post(AgentEvent::Apply);
                    }
                    return;
                }
            }
        }

        let Some(index) = self.current_step else {
            return;
        };
        match self.content.steps[index].state {
            StepState::FirmwareDownloadStarted => self.start_firmware_download(index),
            StepState::FirmwareDownloadSucceeded => self.install(index),
            _ => {}
        }
    }

    fn start_firmware_download(&mut self, index: usize) {
        if self.downloader.is_busy() {
            debug!(step = index, state = %self.downloader.state(), "download already running");
            return;
        }
        let step = &self.content.steps[index];
        let (Some(target), Some(device_index)) = (step.target.clone(), step.device) else {
            warn!(step = index, "step has no resolved file or device");
            self.step_failed(index);
            return;
        };

        let device = self.devices.get_mut(device_index);
        if let Some(device) = &device {
            info!(
                step = index,
                manufacturer = %device.manufacturer,
                model = %device.model,
                "updating firmware"
            );
        }
        let status = self.downloader.start(
            DownloadKind::Firmware,
            target,
            self.transport.as_mut(),
            device,
        );
        self.download_step = Some(index);
        self.on_download_status(status);
    }

    fn install(&mut self, index: usize) {
        let result = match self.content.steps[index]
            .device
            .and_then(|i| self.devices.get_mut(i))
        {
            Some(device) => device.execute(DriverCommand::Install).map(|_| ()),
            None => Err(AgentError::NotFound("device for step".to_string())),
        };
        match result {
            Ok(()) => self.step_state_update(index, StepState::FirmwareInstallSucceeded),
            Err(e) => {
                warn!(step = index, error = %e, "firmware install failed");
                self.step_failed(index);
            }
        }
    }

    fn drive_download(&mut self, event: DownloadEvent) {
        let Some(index) = self.download_step else {
            return;
        };
        let device_index = match self.downloader.kind() {
            DownloadKind::Firmware => self.content.steps.get(index).and_then(|step| step.device),
            DownloadKind::Manifest => None,
        };
        let device = device_index.and_then(|i| self.devices.get_mut(i));
        let status = self
            .downloader
            .handle(event, self.transport.as_mut(), device);
        self.on_download_status(status);
    }

    fn on_download_status(&mut self, status: DownloadStatus) {
        let Some(index) = self.download_step else {
            return;
        };
        if !status.is_pending() {
            self.download_step = None;
        }
        match status {
            DownloadStatus::Pending => {}
            DownloadStatus::Completed => {
                let state = self.content.steps[index].state;
                let Some(next) = state.download_succeeded() else {
                    warn!(step = index, state = %state, "download finished in unexpected step state");
                    return;
                };
                if self.downloader.kind() == DownloadKind::Manifest {
                    self.detached_manifest = self.downloader.take_manifest();
                }
                self.step_state_update(index, next);
            }
            DownloadStatus::Failed(e) => {
                warn!(step = index, error = %e, "download failed");
                self.step_failed(index);
            }
        }
    }

    // ========================================================================
    // Apply
    // ========================================================================

    fn apply(&mut self) {
        if !self.in_deployment("apply") {
            return;
        }

        let mut failed = false;
        for index in 0..self.content.steps.len() {
            match self.content.steps[index].state {
                StepState::FirmwareInstallSucceeded => {
                    if !self.apply_step(index) {
                        failed = true;
                        break;
                    }
                }
                StepState::Failed => {
                    failed = true;
                    break;
                }
                _ => {}
            }
        }

        if failed {
            self.set_state(AgentState::Failed);
        } else {
            info!("update applied");
            self.set_state(AgentState::Idle);
        }
        self.report_state();
    }

    fn apply_step(&mut self, index: usize) -> bool {
        self.set_step_state(index, StepState::FirmwareApplyStarted);
        let criteria = self.content.installed_criteria(&self.content.steps[index]).to_string();

        let result = match self.content.steps[index]
            .device
            .and_then(|i| self.devices.get_mut(i))
        {
            Some(device) => {
                info!(
                    step = index,
                    manufacturer = %device.manufacturer,
                    model = %device.model,
                    "applying firmware"
                );
                device.execute(DriverCommand::Apply).map(|_| {
                    if !device.installed_criteria.is_empty() {
                        device.installed_criteria = criteria;
                    }
                })
            }
            None => Err(AgentError::NotFound("device for step".to_string())),
        };

        match result {
            Ok(()) => {
                self.content.steps[index].result_code = result_code::APPLY_SUCCESS;
                self.set_step_state(index, StepState::FirmwareApplySucceeded);
                true
            }
            Err(e) => {
                warn!(step = index, error = %e, "firmware apply failed");
                self.content.steps[index].result_code = result_code::FAILURE;
                self.set_step_state(index, StepState::Failed);
                false
            }
        }
    }

    // ========================================================================
    // State helpers
    // ========================================================================

    /// Move a step to `state` and raise the follow-up event.
    fn step_state_update(&mut self, index: usize, state: StepState) {
        self.set_step_state(index, state);
        match state {
            StepState::Failed => {
                self.content.steps[index].result_code = result_code::FAILURE;
                self.set_state(AgentState::Failed);
                error!(step = index, "failed to deploy update");
                self.report_state();
            }
            StepState::ManifestDownloadSucceeded => self.notifier.post(AgentEvent::Update),
            StepState::FirmwareDownloadSucceeded | StepState::FirmwareInstallSucceeded => {
                self.notifier.post(AgentEvent::DownloadInstall)
            }
            _ => {}
        }
    }

    fn step_failed(&mut self, index: usize) {
        self.step_state_update(index, StepState::Failed);
    }

    fn set_step_state(&mut self, index: usize, state: StepState) {
        if let Some(step) = self.content.steps.get_mut(index) {
            debug!(step = index, from = %step.state, to = %state, "step state");
            step.state = state;
        }
    }

    fn set_state(&mut self, state: AgentState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "agent state");
        }
        self.state = state;
    }

    fn notify(&mut self, notice: UpdateNotice) {
        self.notices.push((notice, self.content.identity()));
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    pub(crate) fn report_state(&mut self) {
        let update = self.content.identity();
        let document = report::state(&StateReport {
            state: self.state,
            workflow: &self.workflow,
            update: &update,
            step_count: self.content.steps.len(),
        });
        self.report(&document);
    }

    fn report(&mut self, document: &serde_json::Value) {
        if let Err(e) = self.cloud.report(document) {
            warn!(error = %e, "failed to send reported properties");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("current_step", &self.current_step)
            .field("download_step", &self.download_step)
            .field("steps", &self.content.steps.len())
            .field("devices", &self.devices.len())
            .field("downloader", &self.downloader)
            .finish_non_exhaustive()
    }
}

/// Build the download target for `file_id` from a manifest's files and the
/// service's URLs.
///
/// # Errors
///
/// Returns [`AgentError::NotFound`] when the file or its URL is missing.
pub(crate) fn resolve_file(
    content: &UpdateManifestContent,
    file_urls: &BTreeMap<String, String>,
    file_id: &str,
) -> AgentResult<FileTarget> {
    let file = content
        .find_file(file_id)
        .ok_or_else(|| AgentError::NotFound(format!("file '{}'", file_id)))?;
    let url = file_urls
        .get(file_id)
        .ok_or_else(|| AgentError::NotFound(format!("URL for file '{}'", file_id)))?;

    Ok(FileTarget {
        id: file_id.to_string(),
        name: content.text(file.name).to_string(),
        size_in_bytes: file.size_in_bytes,
        sha256: content.text(file.sha256).to_string(),
        url: url.clone(),
    })
}

/// Extract the manifest text from a detached manifest file.
///
/// # Errors
///
/// Returns [`AgentError::Malformed`] unless the body is a JSON object with a
/// string `updateManifest` property.
pub(crate) fn unwrap_detached_manifest(body: &[u8]) -> AgentResult<String> {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    let wrapper: DetachedManifest = serde_json::from_slice(body)
        .map_err(|e| AgentError::malformed("detached manifest", e.to_string()))?;
    Ok(wrapper.update_manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &[u8] = br#"{
        "updateId": {"provider": "Contoso", "name": "Sensor", "version": "2.0"},
        "compatibility": [{"deviceManufacturer": "Contoso", "deviceModel": "Sensor"}],
        "instructions": {"steps": [{"files": ["f1"], "handler": "microsoft/swupdate:1",
            "handlerProperties": {"installedCriteria": "2.0"}}]},
        "files": {"f1": {"fileName": "sensor.bin", "sizeInBytes": 16,
            "hashes": {"sha256": "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="}}}
    }"#;

    fn content() -> UpdateManifestContent {
        manifest::parse(
            MANIFEST,
            ScratchArena::with_capacity(512),
            ManifestCapacity { steps: 1, files: 1 },
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_file() {
        let urls = BTreeMap::from([("f1".to_string(), "http://h/sensor.bin".to_string())]);
        let target = resolve_file(&content(), &urls, "f1").unwrap();
        assert_eq!(target.name, "sensor.bin");
        assert_eq!(target.size_in_bytes, 16);
        assert_eq!(target.url, "http://h/sensor.bin");
    }

    #[test]
    fn test_resolve_file_needs_entry_and_url() {
        let urls = BTreeMap::from([("f2".to_string(), "http://h/x".to_string())]);
        assert!(matches!(
            resolve_file(&content(), &urls, "f2"),
            Err(AgentError::NotFound(_))
        ));
        assert!(matches!(
            resolve_file(&content(), &urls, "f1"),
            Err(AgentError::NotFound(_))
        ));
    }

    #[test]
    fn test_unwrap_detached_manifest_strips_bom() {
        let mut body = UTF8_BOM.to_vec();
        body.extend_from_slice(br#"{"updateManifest": "{\"a\":1}", "other": 2}"#);
        assert_eq!(unwrap_detached_manifest(&body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_unwrap_detached_manifest_requires_wrapper() {
        for body in [&b"{}"[..], b"[]", br#"{"updateManifest": 5}"#, b"\xEF\xBB"] {
            assert!(matches!(
                unwrap_detached_manifest(body),
                Err(AgentError::Malformed { .. })
            ));
        }
    }
}
