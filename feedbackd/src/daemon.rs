//! Request dispatch
//!
//! The [`Daemon`] validates inbound play requests, resolves them to a
//! prototype, creates and owns the Events, routes asynchronous signals to
//! them and collects one terminal status report per accepted request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use feedback_core::keys;
use feedback_core::{
    Event, EventOptions, EventPrototype, EventStatus, PlayMode, Request, RequestId, Resources,
    Services, Signal, SignalRx, SignalTx,
};
use feedback_store::Proplist;
use tokio::sync::mpsc;

use crate::error::Rejection;

/// Wire code of a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Completed = 0,
    Failed = 1,
    Stopped = 2,
}

impl StatusCode {
    /// `None` for the non-terminal `Started`
    pub fn from_status(status: EventStatus) -> Option<Self> {
        match status {
            EventStatus::Started => None,
            EventStatus::Completed => Some(StatusCode::Completed),
            EventStatus::Failed => Some(StatusCode::Failed),
            EventStatus::Stopped => Some(StatusCode::Stopped),
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Completed => "completed",
            StatusCode::Failed => "failed",
            StatusCode::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Final outcome of one accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub id: RequestId,
    pub code: StatusCode,
}

/// Owns every in-flight Event
pub struct Daemon {
    services: Arc<Services>,
    events: HashMap<RequestId, Event>,
    next_id: u32,
    signals: SignalTx,
    status_tx: mpsc::UnboundedSender<(RequestId, EventStatus)>,
    status_rx: mpsc::UnboundedReceiver<(RequestId, EventStatus)>,
    reports: Vec<StatusReport>,
}

impl Daemon {
    /// Create the daemon and the receiving end of its signal channel
    pub fn new(services: Arc<Services>) -> (Self, SignalRx) {
        let (signals, signal_rx) = feedback_core::signal_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();

        let daemon = Self {
            services,
            events: HashMap::new(),
            next_id: 0,
            signals,
            status_tx,
            status_rx,
            reports: Vec::new(),
        };
        (daemon, signal_rx)
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Initialize sinks and announce that startup is done
    pub fn initialize(&mut self) {
        let sinks = self.services.sinks.initialize_all();
        self.services.hooks.init_done.fire(&mut ());
        tracing::info!(
            "Daemon initialized with {} events and {} sinks",
            self.services.manager.definition_count(),
            sinks
        );
    }

    /// Accept a play request and start its Event
    ///
    /// The `new_request` hook sees the request first and may rewrite its
    /// name and properties. Acceptance then requires a known event name, a
    /// `play.mode` of `long` or `short`, a nonzero `policy.id` and at least
    /// one `media.*` flag. A rejected request leaves no Event behind and
    /// does not consume an id.
    pub fn play(&mut self, event_name: &str, properties: Proplist) -> Result<RequestId, Rejection> {
        let services = Arc::clone(&self.services);

        let previous_id = self.next_id;
        let id = self.allocate_id();
        let mut request = Request::new(id, event_name, properties);
        services.hooks.new_request.fire(&mut request);

        let (prototype, options) = match self.resolve(&request) {
            Ok(resolved) => resolved,
            Err(rejection) => {
                self.next_id = previous_id;
                return Err(rejection);
            }
        };

        let overrides = std::mem::take(&mut request.properties);
        let name = request.name.clone();
        let mut event = Event::new(
            request,
            prototype,
            options,
            Arc::clone(&services),
            self.signals.clone(),
        );
        let status_tx = self.status_tx.clone();
        event.set_callback(move |id, status| {
            let _ = status_tx.send((id, status));
        });

        tracing::info!(
            request = %id,
            "Play {} ({}, {}, policy {})",
            name,
            options.play_mode,
            options.resources,
            options.policy_id
        );
        if let Err(e) = event.start(&overrides) {
            tracing::error!(request = %id, "{}", e);
        }

        self.events.insert(id, event);
        self.collect_statuses();
        Ok(id)
    }

    /// Resolve a hooked request to its prototype and dispatch options
    fn resolve(&self, request: &Request) -> Result<(Arc<EventPrototype>, EventOptions), Rejection> {
        let manager = &self.services.manager;
        let properties = &request.properties;

        let definition = manager
            .definition(&request.name)
            .ok_or_else(|| Rejection::UnknownEvent(request.name.clone()))?;

        let mode_name = properties
            .get_non_empty(keys::PLAY_MODE)
            .ok_or(Rejection::MissingPlayMode)?;
        let play_mode = PlayMode::from_name(mode_name)
            .ok_or_else(|| Rejection::UnknownPlayMode(mode_name.to_string()))?;

        let policy_id = policy_id(properties).ok_or(Rejection::MissingPolicyId)?;

        let resources = Resources::from_properties(properties);
        if resources.is_empty() {
            return Err(Rejection::NoResources);
        }

        let prototype_name =
            definition
                .prototype_for(play_mode)
                .ok_or_else(|| Rejection::UnresolvedPrototype {
                    event: request.name.clone(),
                    mode: play_mode,
                })?;
        let prototype = manager
            .prototype(prototype_name)
            .ok_or_else(|| Rejection::PrototypeNotFound(prototype_name.to_string()))?;

        Ok((
            prototype,
            EventOptions {
                play_mode,
                policy_id,
                resources,
            },
        ))
    }

    /// Stop a request; the status is reported even for unknown ids
    pub fn stop(&mut self, id: RequestId) {
        match self.events.get_mut(&id) {
            Some(event) => {
                tracing::info!(request = %id, "Stop requested");
                event.request_stop();
                self.collect_statuses();
            }
            None => {
                tracing::debug!(request = %id, "Stop for unknown request");
                self.reports.push(StatusReport {
                    id,
                    code: StatusCode::Stopped,
                });
            }
        }
    }

    pub fn pause(&mut self, id: RequestId, paused: bool) {
        match self.events.get_mut(&id) {
            Some(event) => event.pause(paused),
            None => tracing::debug!(request = %id, "Pause for unknown request"),
        }
    }

    /// Route an asynchronous signal to its Event
    pub fn handle_signal(&mut self, id: RequestId, signal: Signal) {
        match self.events.get_mut(&id) {
            Some(event) => {
                event.handle_signal(signal);
                self.collect_statuses();
            }
            None => tracing::trace!(request = %id, "Dropping {:?} for finished request", signal),
        }
    }

    /// Status reports gathered since the last call
    pub fn take_reports(&mut self) -> Vec<StatusReport> {
        std::mem::take(&mut self.reports)
    }

    pub fn active_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_active(&self, id: RequestId) -> bool {
        self.events.contains_key(&id)
    }

    /// Stop every Event and shut the sinks down
    ///
    /// Requests still in flight are reported as stopped.
    pub fn shutdown(&mut self) {
        let mut ids: Vec<RequestId> = self.events.keys().copied().collect();
        ids.sort();

        for id in ids {
            if let Some(mut event) = self.events.remove(&id) {
                event.stop();
                self.reports.push(StatusReport {
                    id,
                    code: StatusCode::Stopped,
                });
            }
        }
        self.collect_statuses();
        self.services.sinks.shutdown_all();
        tracing::info!("Daemon shut down");
    }

    fn allocate_id(&mut self) -> RequestId {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            let id = RequestId::new(self.next_id);
            if self.next_id != 0 && !self.events.contains_key(&id) {
                return id;
            }
        }
    }

    /// Turn terminal Event statuses into reports and drop finished Events
    fn collect_statuses(&mut self) {
        while let Ok((id, status)) = self.status_rx.try_recv() {
            match StatusCode::from_status(status) {
                Some(code) => {
                    self.events.remove(&id);
                    tracing::debug!(request = %id, "Reporting {}", code);
                    self.reports.push(StatusReport { id, code });
                }
                None => tracing::debug!(request = %id, "Started"),
            }
        }
    }
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon")
            .field("active", &self.events.len())
            .field("next_id", &self.next_id)
            .field("pending_reports", &self.reports.len())
            .finish()
    }
}

/// `policy.id` as a nonzero unsigned value
fn policy_id(properties: &Proplist) -> Option<u32> {
    let value = properties.get(keys::POLICY_ID)?;
    value
        .as_uint()
        .or_else(|| value.as_int().and_then(|id| u32::try_from(id).ok()))
        .filter(|id| *id != 0)
}
