//! Session Manager: the event loop wiring the registry and per-session state
//!
//! All per-session state is owned here and mutated through `&mut self`. Backend
//! events arrive on the event bus subscription; transport futures that outlive a
//! single call (transfers, directory listings) are spawned and report back through
//! an internal completion channel. Nothing is applied to a session the registry
//! does not consider addressable.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::event_bus::{BackendEvent, EventBus, EventKind, Subscription};
use crate::metrics::{DropReason, MultiplexerStats};
use crate::navigator::{DirectoryNavigator, ListingRequest, ListingTicket, path};
use crate::output::{MatchLocation, OutputBufferManager, SearchDirection, SearchOptions};
use crate::resize::{AckOutcome, ResizeNegotiator, ResizeRequest, TerminalMetrics};
use crate::transfer::{ProgressOutcome, TransferCoordinator, TransferDirection, TransferId};
use crate::transport::{
    AuthMethod, DirectoryEntry, FileOp, HostParams, LoopbackTransport, TransferRequest, Transport,
    TransportError,
};

use super::action_channel::{ActionChannel, SessionEvent, StatusInfo};
use super::command_router::{CommandRouter, InteractiveCommand};
use super::registry::SessionRegistry;
use super::types::SessionId;

/// Manager lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// Outcome of a spawned transport request
#[derive(Debug)]
enum Completion {
    Transfer {
        session_id: SessionId,
        transfer_id: TransferId,
        result: Result<(), TransportError>,
    },
    Listing {
        session_id: SessionId,
        ticket: ListingTicket,
        path: String,
        result: Result<Vec<DirectoryEntry>, TransportError>,
    },
}

/// Owns every session and routes backend events to per-session state
pub struct SessionManager {
    /// Application configuration
    app_config: Config,
    /// Manager state
    state: ManagerState,
    /// Outbound collaborator
    transport: Arc<dyn Transport>,
    /// Backend event bus and our subscription to it
    bus: EventBus,
    subscription: Option<Subscription>,
    registry: SessionRegistry,
    outputs: OutputBufferManager,
    transfers: TransferCoordinator,
    resize: ResizeNegotiator,
    navigator: DirectoryNavigator,
    /// Spawned transport requests report back here
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    /// Interactive focus; never consulted for event routing
    focused: Option<SessionId>,
    stats: MultiplexerStats,
    /// Command router
    command_router: CommandRouter,
    /// Action channel (Session -> UI)
    action_channel: ActionChannel,
    /// Shutdown signal sender
    shutdown_tx: mpsc::Sender<()>,
    /// Shutdown signal receiver
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl SessionManager {
    /// Create a manager over an existing bus and transport
    ///
    /// Needs no runtime. The bus subscription and its pump task start on the first
    /// [`step`](Self::step) or [`run`](Self::run); until then backend events wait in
    /// the bus's bounded upstream queue.
    pub fn new(app_config: Config, bus: EventBus, transport: Arc<dyn Transport>) -> Self {
        info!("Creating new SessionManager");

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let outputs = OutputBufferManager::new(app_config.buffer.limits());
        let resize = ResizeNegotiator::new(
            app_config.terminal.default_cols,
            app_config.terminal.default_rows,
            app_config.terminal.metrics(),
        );

        Self {
            app_config,
            state: ManagerState::Starting,
            transport,
            bus,
            subscription: None,
            registry: SessionRegistry::new(),
            outputs,
            transfers: TransferCoordinator::new(),
            resize,
            navigator: DirectoryNavigator::new(),
            completion_tx,
            completion_rx,
            focused: None,
            stats: MultiplexerStats::new(),
            command_router: CommandRouter::new(),
            action_channel: ActionChannel::new(),
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
        }
    }

    /// Build a manager backed by an in-process loopback transport
    pub fn with_loopback(app_config: Config) -> (Self, LoopbackTransport) {
        let (bus, sender) = EventBus::new(app_config.event_bus.capacity);
        let transport = LoopbackTransport::new(sender);
        let manager = Self::new(app_config, bus, Arc::new(transport.clone()));
        (manager, transport)
    }

    /// Take the UI event receiver; `None` if already taken
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.action_channel.event_rx()
    }

    /// Sender for interactive commands
    pub fn command_sender(&self) -> mpsc::UnboundedSender<InteractiveCommand> {
        self.command_router.command_sender()
    }

    /// Handle that stops [`run`](Self::run)
    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    // ---- session lifecycle -------------------------------------------------

    /// Open a session; on transport failure nothing is registered
    pub async fn create(&mut self, params: HostParams) -> CoreResult<SessionId> {
        info!("Opening session to {}", params.address());

        let id = match self.transport.create_session(&params).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to open session to {}: {}", params.address(), e);
                return Err(self.outbound_failed(e));
            }
        };

        if let Err(e) = self.registry.register(id.clone(), params.label(), params.address()) {
            if let Err(close_err) = self.transport.close_session(&id).await {
                debug!("Closing rejected session {} failed: {}", id, close_err);
            }
            return Err(e);
        }

        self.outputs.allocate(&id);
        self.resize.allocate(&id);
        let listing = self.navigator.open(&id, None)?;
        self.registry.activate(&id);
        self.stats.record_session_opened();
        self.spawn_listing(&id, listing);

        if let Some(session) = self.registry.get(&id).cloned() {
            info!("Session {} active ({})", id, session.display_name);
            self.forward_to_ui(SessionEvent::SessionOpened { session });
        }
        Ok(id)
    }

    /// Close a session; unknown and already closed ids are a no-op
    pub async fn close(&mut self, id: &SessionId) -> bool {
        if !self.registry.begin_close(id) {
            debug!("Close of session {} ignored", id);
            return false;
        }

        if let Err(e) = self.transport.close_session(id).await {
            warn!("Transport close for {} failed, cleaning up anyway: {}", id, e);
        }
        self.registry.finish_close(id);

        self.outputs.release(id);
        self.resize.release(id);
        self.navigator.release(id);
        let last_transfer = self.transfers.release(id);
        if let Some(op) = last_transfer.as_ref().filter(|op| !op.is_terminal()) {
            info!("Session {} closed with transfer {} still {}", id, op.id, op.state);
        }

        if self.focused.as_ref() == Some(id) {
            self.focused = self.registry.list_active().last().map(|s| s.id.clone());
        }
        self.stats.record_session_closed();
        self.forward_to_ui(SessionEvent::SessionClosed {
            session_id: id.clone(),
            last_transfer,
        });
        true
    }

    // ---- terminal I/O ------------------------------------------------------

    /// Forward input to the remote terminal; never touches the output buffer
    pub async fn write(&mut self, id: &SessionId, data: &[u8]) -> CoreResult<()> {
        self.registry.ensure_addressable(id)?;
        self.transport
            .send_input(id, data)
            .await
            .map_err(|e| self.outbound_failed(e))
    }

    /// Move the search highlight in a session's output
    pub fn search(
        &mut self,
        id: &SessionId,
        query: &str,
        direction: SearchDirection,
        options: SearchOptions,
    ) -> CoreResult<Option<MatchLocation>> {
        self.registry.ensure_addressable(id)?;
        let location = self.outputs.search(id, query, direction, options);
        let line_text = location.and_then(|loc| self.outputs.line(id, loc.line));
        self.forward_to_ui(SessionEvent::SearchResult {
            session_id: id.clone(),
            query: query.to_string(),
            location,
            line_text,
        });
        Ok(location)
    }

    /// Drop a session's scrollback
    pub fn clear_output(&mut self, id: &SessionId) -> CoreResult<()> {
        self.registry.ensure_addressable(id)?;
        self.outputs.clear(id);
        Ok(())
    }

    // ---- geometry ----------------------------------------------------------

    /// Request a geometry; returns the stamp sent to the transport
    pub async fn request_resize(&mut self, id: &SessionId, cols: u16, rows: u16) -> CoreResult<u64> {
        self.registry.ensure_addressable(id)?;
        let request = self
            .resize
            .request_resize(id, cols, rows)
            .ok_or_else(|| CoreError::Unaddressable(id.clone()))?;
        self.send_resize(id, request).await?;
        Ok(request.stamp)
    }

    /// Fit to a pane size; `None` when the grid did not change
    pub async fn fit(&mut self, id: &SessionId, pixel_width: u32, pixel_height: u32) -> CoreResult<Option<u64>> {
        self.registry.ensure_addressable(id)?;
        match self.resize.fit(id, pixel_width, pixel_height) {
            Some(request) => {
                self.send_resize(id, request).await?;
                Ok(Some(request.stamp))
            }
            None => Ok(None),
        }
    }

    /// Replace a session's cell metrics and refit
    pub async fn reconfigure(&mut self, id: &SessionId, metrics: TerminalMetrics) -> CoreResult<Option<u64>> {
        self.registry.ensure_addressable(id)?;
        match self.resize.reconfigure(id, metrics) {
            Some(request) => {
                self.send_resize(id, request).await?;
                Ok(Some(request.stamp))
            }
            None => Ok(None),
        }
    }

    async fn send_resize(&mut self, id: &SessionId, request: ResizeRequest) -> CoreResult<()> {
        self.forward_to_ui(SessionEvent::GeometryChanged {
            session_id: id.clone(),
            cols: request.cols,
            rows: request.rows,
            acknowledged: false,
        });
        self.transport
            .request_resize(id, request.cols, request.rows, request.stamp)
            .await
            .map_err(|e| self.outbound_failed(e))
    }

    // ---- transfers ---------------------------------------------------------

    /// Start a transfer; relative remote paths resolve against the current directory
    pub fn start_transfer(
        &mut self,
        id: &SessionId,
        direction: TransferDirection,
        remote_path: &str,
        local_path: &str,
        total_hint: Option<u64>,
    ) -> CoreResult<TransferId> {
        self.registry.ensure_addressable(id)?;
        let remote = match self.navigator.current_path(id) {
            Some(cwd) => path::resolve(cwd, remote_path)?,
            None => path::normalize(remote_path)?,
        };

        let transfer_id =
            self.transfers
                .start(id, direction, remote.clone(), local_path, total_hint)?;
        self.stats.record_transfer_started();

        let request = TransferRequest {
            direction,
            remote_path: remote,
            local_path: local_path.to_string(),
        };
        let transport = self.transport.clone();
        let completion_tx = self.completion_tx.clone();
        let session_id = id.clone();
        tokio::spawn(async move {
            let result = transport.start_transfer(&session_id, &request).await;
            if let Err(e) = completion_tx.send(Completion::Transfer {
                session_id,
                transfer_id,
                result,
            }) {
                debug!("Transfer completion dropped: {}", e);
            }
        });

        if let Some(operation) = self.transfers.current(id).cloned() {
            self.forward_to_ui(SessionEvent::TransferUpdated { operation });
        }
        Ok(transfer_id)
    }

    /// Cancel the in-flight transfer; `Ok(false)` if it already finished
    pub fn cancel_transfer(&mut self, id: &SessionId) -> CoreResult<bool> {
        self.registry.ensure_addressable(id)?;
        if self.transfers.current(id).is_none() {
            return Err(CoreError::NoTransfer(id.clone()));
        }
        let cancelled = self.transfers.cancel(id);
        if cancelled {
            self.stats.record_transfer_cancelled();
            if let Some(operation) = self.transfers.current(id).cloned() {
                self.forward_to_ui(SessionEvent::TransferUpdated { operation });
            }
        }
        Ok(cancelled)
    }

    // ---- directory browsing ------------------------------------------------

    pub fn navigate_into(&mut self, id: &SessionId, entry: &str) -> CoreResult<()> {
        self.registry.ensure_addressable(id)?;
        let request = self.navigator.navigate_into(id, entry)?;
        self.spawn_listing(id, request);
        Ok(())
    }

    /// Go to the parent directory; `Ok(false)` at the root
    pub fn go_up(&mut self, id: &SessionId) -> CoreResult<bool> {
        self.registry.ensure_addressable(id)?;
        match self.navigator.go_up(id) {
            Some(request) => {
                self.spawn_listing(id, request);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn navigate_to(&mut self, id: &SessionId, target: &str) -> CoreResult<()> {
        self.registry.ensure_addressable(id)?;
        let request = self.navigator.navigate_to(id, target)?;
        self.spawn_listing(id, request);
        Ok(())
    }

    pub fn refresh_directory(&mut self, id: &SessionId) -> CoreResult<()> {
        self.registry.ensure_addressable(id)?;
        let request = self
            .navigator
            .refresh(id)
            .ok_or_else(|| CoreError::Unaddressable(id.clone()))?;
        self.spawn_listing(id, request);
        Ok(())
    }

    /// Apply a file operation, then re-list the current directory
    pub async fn mutate_file(&mut self, id: &SessionId, op: FileOp) -> CoreResult<()> {
        self.registry.ensure_addressable(id)?;
        let resolved = self.navigator.resolve_op(id, &op)?;
        debug!("Session {}: requesting {}", id, resolved.name());
        if let Err(e) = self.transport.mutate_file(id, &resolved).await {
            return Err(self.outbound_failed(e));
        }

        let description = describe_op(&resolved);
        info!("Session {}: {}", id, description);
        self.forward_to_ui(SessionEvent::FileOpCompleted {
            session_id: id.clone(),
            description,
        });

        if let Some(request) = self.navigator.refresh(id) {
            self.spawn_listing(id, request);
        }
        Ok(())
    }

    fn spawn_listing(&self, id: &SessionId, request: ListingRequest) {
        let transport = self.transport.clone();
        let completion_tx = self.completion_tx.clone();
        let session_id = id.clone();
        tokio::spawn(async move {
            let result = transport.list_directory(&session_id, &request.path).await;
            if let Err(e) = completion_tx.send(Completion::Listing {
                session_id,
                ticket: request.ticket,
                path: request.path,
                result,
            }) {
                debug!("Listing completion dropped: {}", e);
            }
        });
    }

    // ---- inbound -----------------------------------------------------------

    /// Route one backend event to the consumer for its kind
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        let kind_name = event.kind.name();
        let BackendEvent { session_id, kind } = event;

        if !self.registry.is_addressable(&session_id) {
            debug!(
                "Dropping {} event for unaddressable session {}",
                kind_name, session_id
            );
            self.stats.record_dropped(kind_name, DropReason::Unaddressable);
            return;
        }

        match kind {
            EventKind::Output(bytes) => {
                if self.outputs.on_output(&self.registry, &session_id, &bytes) {
                    self.stats.record_routed(kind_name);
                    self.stats.record_output(bytes.len());
                    self.forward_to_ui(SessionEvent::OutputAppended { session_id, bytes });
                } else {
                    self.stats.record_dropped(kind_name, DropReason::Unaddressable);
                }
            }
            EventKind::TransferProgress {
                path,
                transferred,
                total,
            } => match self
                .transfers
                .on_progress(&self.registry, &session_id, &path, transferred, total)
            {
                ProgressOutcome::Applied => {
                    self.stats.record_routed(kind_name);
                    if let Some(operation) = self.transfers.current(&session_id).cloned() {
                        self.forward_to_ui(SessionEvent::TransferUpdated { operation });
                    }
                }
                ProgressOutcome::Unmatched => {
                    self.stats
                        .record_dropped(kind_name, DropReason::UnmatchedProgress)
                }
                ProgressOutcome::NoTarget => {
                    self.stats.record_dropped(kind_name, DropReason::NoTransfer)
                }
            },
            EventKind::ResizeAck { cols, rows, stamp } => {
                match self
                    .resize
                    .on_resize_ack(&self.registry, &session_id, cols, rows, stamp)
                {
                    AckOutcome::Adopted => {
                        self.stats.record_routed(kind_name);
                        self.forward_to_ui(SessionEvent::GeometryChanged {
                            session_id,
                            cols,
                            rows,
                            acknowledged: true,
                        });
                    }
                    AckOutcome::Stale => self.stats.record_dropped(kind_name, DropReason::StaleAck),
                    AckOutcome::NoTarget => {
                        self.stats
                            .record_dropped(kind_name, DropReason::Unaddressable)
                    }
                }
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Transfer {
                session_id,
                transfer_id,
                result,
            } => {
                let success = result.is_ok();
                let error = result.err().map(|e| e.to_string());
                if !self.registry.is_addressable(&session_id)
                    || !self
                        .transfers
                        .complete(&session_id, transfer_id, success, error.clone())
                {
                    self.stats.record_stale_completion();
                    return;
                }

                self.stats.record_transfer_finished(success);
                if let Some(operation) = self.transfers.current(&session_id).cloned() {
                    self.forward_to_ui(SessionEvent::TransferUpdated { operation });
                }
                if let Some(error) = error {
                    self.report_error(format!("Transfer {} failed: {}", transfer_id, error));
                }
            }
            Completion::Listing {
                session_id,
                ticket,
                path,
                result,
            } => match result {
                Ok(entries) => {
                    if self
                        .navigator
                        .set_entries(&self.registry, &session_id, ticket, entries)
                    {
                        if let Some(view) = self.navigator.view(&session_id).cloned() {
                            self.forward_to_ui(SessionEvent::DirectoryLoaded { view });
                        }
                    } else {
                        self.stats.record_stale_completion();
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    if self
                        .navigator
                        .set_error(&self.registry, &session_id, ticket, message.clone())
                    {
                        warn!("Listing {} for session {} failed: {}", path, session_id, message);
                        self.forward_to_ui(SessionEvent::DirectoryError {
                            session_id,
                            path,
                            message,
                        });
                    } else {
                        self.stats.record_stale_completion();
                    }
                }
            },
        }
    }

    fn ensure_subscribed(&mut self) {
        if self.subscription.is_none() && !self.bus.is_disposed() {
            self.subscription = Some(self.bus.subscribe());
        }
    }

    /// Process one backend event or completion; false once the bus is gone
    pub async fn step(&mut self) -> bool {
        self.ensure_subscribed();
        tokio::select! {
            Some(completion) = self.completion_rx.recv() => {
                self.handle_completion(completion);
                true
            }
            event = next_backend_event(&mut self.subscription) => match event {
                Some(event) => {
                    self.handle_backend_event(event);
                    true
                }
                None => false,
            }
        }
    }

    // ---- main loop ---------------------------------------------------------

    /// Run the main session loop until shutdown
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting session loop");

        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| anyhow!("Session loop already started"))?;
        self.state = ManagerState::Running;
        self.ensure_subscribed();

        while self.state != ManagerState::Terminated {
            tokio::select! {
                // Handle shutdown signal
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    self.shutdown().await?;
                }

                // Handle commands from command router
                Some(command) = self.command_router.next_command() => {
                    self.handle_command(command).await?;
                }

                // Handle completions of spawned transport requests
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }

                // Handle backend events
                event = next_backend_event(&mut self.subscription) => {
                    match event {
                        Some(event) => self.handle_backend_event(event),
                        None => {
                            warn!("Event bus subscription closed");
                            self.state = ManagerState::Terminated;
                        }
                    }
                }
            }
        }

        info!("Session loop terminated");
        Ok(())
    }

    /// Close every session and dispose the event bus; idempotent
    pub async fn shutdown(&mut self) -> Result<()> {
        if matches!(
            self.state,
            ManagerState::ShuttingDown | ManagerState::Terminated
        ) {
            return Ok(());
        }
        info!("Shutting down session manager");
        self.state = ManagerState::ShuttingDown;

        for id in self.registry.live_ids() {
            self.close(&id).await;
        }

        if let Some(subscription) = self.subscription.as_mut() {
            subscription.dispose();
        }
        self.bus.dispose();
        self.state = ManagerState::Terminated;
        self.forward_to_ui(SessionEvent::ShutdownRequested);
        info!("Session manager shut down");
        Ok(())
    }

    // ---- interactive commands ----------------------------------------------

    /// Handle user command
    pub async fn handle_command(&mut self, command: InteractiveCommand) -> Result<()> {
        debug!("Handling command: {:?}", command);
        self.stats.record_command();

        let outcome = match command {
            InteractiveCommand::Quit => return self.shutdown().await,
            InteractiveCommand::Help => {
                self.send_help();
                Ok(())
            }
            InteractiveCommand::Status => {
                self.send_status();
                Ok(())
            }
            InteractiveCommand::Sessions => {
                self.send_session_list();
                Ok(())
            }
            InteractiveCommand::Config { action } => self.handle_config(action).await,
            InteractiveCommand::Open {
                username,
                host,
                port,
                name,
            } => self.handle_open(username, host, port, name).await,
            InteractiveCommand::Focus { target } => self.handle_focus(&target),
            InteractiveCommand::Close { target } => self.handle_close(target).await,
            other => match self.focused_session() {
                Ok(id) => self.handle_session_command(&id, other).await,
                Err(e) => Err(e),
            },
        };

        if let Err(e) = outcome {
            if matches!(e.downcast_ref::<CoreError>(), Some(CoreError::Transport(_))) {
                debug!("Transport failure already reported: {}", e);
            } else {
                self.report_error(e.to_string());
            }
        }
        Ok(())
    }

    async fn handle_session_command(&mut self, id: &SessionId, command: InteractiveCommand) -> Result<()> {
        match command {
            InteractiveCommand::Send { text } => {
                let mut data = text.into_bytes();
                data.push(b'\n');
                self.write(id, &data).await?;
            }
            InteractiveCommand::Resize { cols, rows } => {
                self.request_resize(id, cols, rows).await?;
            }
            InteractiveCommand::Fit { width, height } => {
                if self.fit(id, width, height).await?.is_none() {
                    debug!("Fit for session {} left geometry unchanged", id);
                }
            }
            InteractiveCommand::Download { remote, local } => {
                self.start_transfer(id, TransferDirection::Download, &remote, &local, None)?;
            }
            InteractiveCommand::Upload { local, remote } => {
                let size = tokio::fs::metadata(&local).await.ok().map(|m| m.len());
                self.start_transfer(id, TransferDirection::Upload, &remote, &local, size)?;
            }
            InteractiveCommand::Cancel => {
                if !self.cancel_transfer(id)? {
                    return Err(anyhow!("Transfer already finished"));
                }
            }
            InteractiveCommand::Ls { path: Some(target) } => self.navigate_to(id, &target)?,
            InteractiveCommand::Ls { path: None } => self.refresh_directory(id)?,
            InteractiveCommand::Cd { path: target } => {
                if target == ".." {
                    self.go_up(id)?;
                } else if target.contains('/') || target == "." {
                    self.navigate_to(id, &target)?;
                } else {
                    self.navigate_into(id, &target)?;
                }
            }
            InteractiveCommand::Up => {
                self.go_up(id)?;
            }
            InteractiveCommand::FileOp { op } => self.mutate_file(id, op).await?,
            InteractiveCommand::Search { query, direction } => {
                self.search(id, &query, direction, SearchOptions::default())?;
            }
            InteractiveCommand::Clear => self.clear_output(id)?,
            other => warn!("Command {:?} does not target a session", other),
        }
        Ok(())
    }

    async fn handle_open(
        &mut self,
        username: String,
        host: String,
        port: u16,
        name: Option<String>,
    ) -> Result<()> {
        let mut params = HostParams::new(host, username, AuthMethod::Agent).with_port(port);
        if let Some(name) = name {
            params = params.with_display_name(name);
        }
        let id = self.create(params).await?;
        self.set_focus(id);
        Ok(())
    }

    fn handle_focus(&mut self, target: &str) -> Result<()> {
        let id = self
            .resolve_target(target)
            .ok_or_else(|| anyhow!("No active session matches {}", target))?;
        self.set_focus(id);
        Ok(())
    }

    async fn handle_close(&mut self, target: Option<String>) -> Result<()> {
        let id = match target {
            Some(target) => self
                .resolve_target(&target)
                .ok_or_else(|| anyhow!("No active session matches {}", target))?,
            None => self.focused_session()?,
        };
        self.close(&id).await;
        Ok(())
    }

    /// Handle config command
    async fn handle_config(&mut self, action: Option<ConfigAction>) -> Result<()> {
        match action {
            Some(ConfigAction::Show) => {
                self.forward_to_ui(SessionEvent::ConfigInfo {
                    config: self.app_config.clone(),
                });
            }
            Some(ConfigAction::Set { key, value }) => {
                self.app_config.set_value(&key, &value)?;
                info!("Updated {} to {}", key, value);
                self.apply_config().await;
                self.forward_to_ui(SessionEvent::ConfigInfo {
                    config: self.app_config.clone(),
                });
            }
            Some(ConfigAction::Reset) => {
                self.app_config = Config::default();
                info!("Configuration reset to defaults");
                self.apply_config().await;
                self.forward_to_ui(SessionEvent::ConfigReset);
                self.forward_to_ui(SessionEvent::ConfigInfo {
                    config: self.app_config.clone(),
                });
            }
            None => {
                let lines = [
                    "Configuration commands:",
                    "  /config show",
                    "  /config set <key> <value>",
                    "  /config reset",
                    "Settable keys: buffer.scrollback_lines, terminal.cell_width, terminal.cell_height",
                ]
                .iter()
                .map(|line| line.to_string())
                .collect();
                self.forward_to_ui(SessionEvent::HelpInfo { lines });
            }
        }
        Ok(())
    }

    /// Push runtime-changeable settings into the live components
    async fn apply_config(&mut self) {
        self.outputs.set_limits(self.app_config.buffer.limits());

        let metrics = self.app_config.terminal.metrics();
        if metrics == self.resize.default_metrics() {
            return;
        }
        self.resize.set_default_metrics(metrics);
        for id in self.resize.session_ids() {
            if !self.registry.is_addressable(&id) {
                continue;
            }
            if let Err(e) = self.reconfigure(&id, metrics).await {
                warn!("Reconfigure of session {} failed: {}", id, e);
            }
        }
    }

    fn resolve_target(&self, target: &str) -> Option<SessionId> {
        let sessions = self.registry.list_active();
        if let Ok(index) = target.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|i| sessions.get(i))
                .map(|s| s.id.clone());
        }
        sessions
            .into_iter()
            .find(|s| s.display_name == target || s.id.as_str().starts_with(target))
            .map(|s| s.id)
    }

    fn focused_session(&self) -> Result<SessionId> {
        self.focused
            .clone()
            .ok_or_else(|| anyhow!("No session focused; use /open or /focus first"))
    }

    fn set_focus(&mut self, id: SessionId) {
        self.focused = Some(id.clone());
        self.forward_to_ui(SessionEvent::FocusChanged { session_id: id });
    }

    fn send_help(&self) {
        let lines = CommandRouter::help_messages()
            .iter()
            .map(|line| (*line).to_string())
            .collect();
        self.forward_to_ui(SessionEvent::HelpInfo { lines });
    }

    fn send_status(&self) {
        let sessions: Vec<String> = self
            .registry
            .list_active()
            .iter()
            .map(|s| format!("{} ({}) {}", s.display_name, s.host_address, s.id))
            .collect();
        let info = StatusInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: format!("{:?}", self.state),
            active_sessions: sessions.len(),
            sessions,
            closed_sessions: self.registry.tombstone_count(),
            transfers_in_flight: self.transfers.in_flight_count(),
            events_delivered: self.bus.delivered(),
            stats: self.stats.clone(),
        };
        self.forward_to_ui(SessionEvent::StatusInfo { info });
    }

    fn send_session_list(&self) {
        self.forward_to_ui(SessionEvent::SessionList {
            sessions: self.registry.list_active(),
            focused: self.focused.clone(),
        });
    }

    /// Report a failed outbound request to the UI and hand it back to the caller
    fn outbound_failed(&mut self, err: TransportError) -> CoreError {
        self.report_error(err.to_string());
        CoreError::Transport(err)
    }

    fn report_error(&mut self, message: String) {
        error!("Session error: {}", message);
        self.stats.record_error();
        self.forward_to_ui(SessionEvent::Error { message });
    }

    /// Forward an event to the UI if a consumer holds the receiver
    fn forward_to_ui(&self, event: SessionEvent) {
        if !self.action_channel.is_attached() {
            return;
        }
        if let Err(e) = self.action_channel.send_event(event) {
            debug!("UI channel unavailable: {}", e);
        }
    }

    // ---- accessors ---------------------------------------------------------

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn outputs(&self) -> &OutputBufferManager {
        &self.outputs
    }

    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }

    pub fn resize_negotiator(&self) -> &ResizeNegotiator {
        &self.resize
    }

    pub fn navigator(&self) -> &DirectoryNavigator {
        &self.navigator
    }

    pub fn stats(&self) -> &MultiplexerStats {
        &self.stats
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.app_config
    }

    pub fn focused(&self) -> Option<&SessionId> {
        self.focused.as_ref()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

async fn next_backend_event(subscription: &mut Option<Subscription>) -> Option<BackendEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => None,
    }
}

fn describe_op(op: &FileOp) -> String {
    match op {
        FileOp::Mkdir { path } => format!("created directory {}", path),
        FileOp::Delete { path } => format!("deleted {}", path),
        FileOp::Rename { from, to } => format!("renamed {} to {}", from, to),
        FileOp::Chmod { path, mode } => format!("changed mode of {} to {:o}", path, mode),
    }
}
