//! Request/response correlation over the agent connection.
//! - issue/notify/cancel: outbound start, fire-and-forget and break requests
//! - handle_message: resolve inbound messages to typed events for a cookie
//! - RequestIds: request id allocation for one connection epoch

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde_json::Value;
use smol_str::SmolStr;
use tracing::{debug, trace, warn};

use crate::errcodes;
use crate::error::{ProtocolError, SessionError};
use crate::protocol::{
    decode, describe_id, request_id, BreakParams, EodParams, ErrorObject, FilterReport, Inbound,
    InstanceParams, ReplyResult, Request, EOD_METHOD,
};
use crate::registry::{Correlation, InstanceRegistry};
use crate::transport::Connection;

/// Largest id that survives a round trip through an IEEE double on the agent side.
pub const MAX_REQUEST_ID: u64 = (1 << 53) - 1;

/// Lifecycle of a start request as seen by its cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Issued,
    Started,
    Error,
}

/// Typed event addressed to the cookie that issued the request.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagEvent<K> {
    Status {
        cookie: K,
        status: RequestStatus,
    },
    Progress {
        cookie: K,
        progress: i64,
    },
    Log {
        cookie: K,
        data: Value,
    },
    ErrorLog {
        cookie: K,
        code: Option<i64>,
        data: Option<Value>,
    },
    Eod {
        cookie: K,
        status: i64,
        data: Option<Value>,
        filter: Option<FilterReport>,
    },
}

impl<K> DiagEvent<K> {
    pub fn cookie(&self) -> &K {
        match self {
            Self::Status { cookie, .. }
            | Self::Progress { cookie, .. }
            | Self::Log { cookie, .. }
            | Self::ErrorLog { cookie, .. }
            | Self::Eod { cookie, .. } => cookie,
        }
    }
}

/// Monotonic request ids that skip ids still owned by a live request.
///
/// Once the counter passes `max` every further allocation fails; ids are never
/// wrapped around onto possibly live requests.
#[derive(Debug, Clone)]
pub struct RequestIds {
    next: u64,
    max: u64,
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::with_limit(MAX_REQUEST_ID)
    }
}

impl RequestIds {
    #[must_use]
    pub fn with_limit(max: u64) -> Self {
        Self { next: 0, max }
    }

    /// O(n) in the number of consecutive live ids.
    pub fn allocate(&mut self, is_live: impl Fn(u64) -> bool) -> Option<u64> {
        loop {
            if self.next > self.max {
                return None;
            }
            let id = self.next;
            self.next += 1;
            if !is_live(id) {
                return Some(id);
            }
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.next > self.max
    }
}

/// Correlation state for one connection epoch.
#[derive(Debug)]
pub struct Correlator<K> {
    ids: RequestIds,
    pending: HashMap<u64, Correlation<K>>,
    instances: InstanceRegistry<K>,
    events: VecDeque<DiagEvent<K>>,
    control_method: SmolStr,
}

impl<K: Clone + PartialEq + fmt::Debug> Correlator<K> {
    #[must_use]
    pub fn new(control_method: impl Into<SmolStr>) -> Self {
        Self::with_ids(control_method, RequestIds::default())
    }

    #[must_use]
    pub fn with_ids(control_method: impl Into<SmolStr>, ids: RequestIds) -> Self {
        Self {
            ids,
            pending: HashMap::new(),
            instances: InstanceRegistry::default(),
            events: VecDeque::new(),
            control_method: control_method.into(),
        }
    }

    /// Discard every pending request and instance; they cannot survive a reconnect.
    pub fn reset(&mut self) {
        if !self.pending.is_empty() || !self.instances.is_empty() {
            debug!(
                pending = self.pending.len(),
                instances = self.instances.len(),
                "discarding correlation state from previous epoch"
            );
        }
        self.pending.clear();
        self.instances.clear();
    }

    /// Send a start request for `diag`. A `None` cookie degrades to a notification.
    ///
    /// `Issued` is queued for the cookie before the request hits the wire.
    pub fn issue(
        &mut self,
        connection: &mut Connection,
        cookie: Option<K>,
        diag: &str,
        params: Option<Value>,
    ) -> Result<Option<u64>, SessionError> {
        if !connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let Some(cookie) = cookie else {
            self.notify(connection, diag, params.as_ref())?;
            return Ok(None);
        };
        let pending = &self.pending;
        let id = self
            .ids
            .allocate(|id| pending.contains_key(&id))
            .ok_or(SessionError::IdSpaceExhausted)?;
        let text = Request::call(diag, id, params.as_ref())
            .encode()
            .map_err(|err| SessionError::Transport(err.to_string().into()))?;
        self.pending.insert(
            id,
            Correlation {
                cookie: cookie.clone(),
                diag: SmolStr::new(diag),
                params,
            },
        );
        self.events.push_back(DiagEvent::Status {
            cookie,
            status: RequestStatus::Issued,
        });
        debug!(id, diag, "start request issued");
        connection.send(&text)?;
        Ok(Some(id))
    }

    /// Fire-and-forget message; never correlated.
    pub fn notify(
        &mut self,
        connection: &mut Connection,
        method: &str,
        params: Option<&Value>,
    ) -> Result<(), SessionError> {
        if !connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let text = Request::notify(method, params)
            .encode()
            .map_err(|err| SessionError::Transport(err.to_string().into()))?;
        trace!(method, "notify");
        connection.send(&text)
    }

    /// Ask the agent to break the instance started for `cookie`.
    ///
    /// Returns whether a live instance was found.
    pub fn cancel(&mut self, connection: &mut Connection, cookie: &K) -> bool {
        if !connection.is_connected() {
            return false;
        }
        let Some(name) = self.instances.name_for_cookie(cookie).cloned() else {
            return false;
        };
        let params = match serde_json::to_value(BreakParams { diag: &name }) {
            Ok(params) => params,
            Err(err) => {
                warn!("encode break params: {err}");
                return false;
            }
        };
        let control = self.control_method.clone();
        debug!(instance = %name, "break requested");
        self.notify(connection, &control, Some(&params)).is_ok()
    }

    /// Resolve one inbound message. Malformed or unmatched messages are logged and dropped.
    pub fn handle_message(&mut self, text: &str) {
        let result = decode(text).and_then(|inbound| self.dispatch(inbound));
        if let Err(err) = result {
            debug!("dropping message: {err}");
        }
    }

    fn dispatch(&mut self, inbound: Inbound) -> Result<(), ProtocolError> {
        match inbound {
            Inbound::Reply { id, result } => self.on_reply(&id, &result),
            Inbound::Notification { id, method, params } => {
                self.on_notification(&id, &method, params.as_ref())
            }
            Inbound::ErrorReply { id, error } => self.on_error_reply(&id, &error),
            Inbound::Unrecognized { .. } => Err(ProtocolError::Unrecognized),
        }
    }

    fn on_reply(&mut self, id: &Value, result: &Value) -> Result<(), ProtocolError> {
        if id.is_null() {
            return Err(ProtocolError::NullId);
        }
        let record = request_id(id)
            .and_then(|key| self.pending.remove(&key))
            .ok_or_else(|| ProtocolError::UnknownReference(describe_id(id)))?;

        let reply = match ReplyResult::parse(result) {
            Ok(reply) => reply,
            Err(err) => {
                debug!(diag = %record.diag, "startup failure: {err}");
                self.push_status(record.cookie, RequestStatus::Error);
                return Ok(());
            }
        };
        if let Some(message) = reply.message {
            self.events.push_back(DiagEvent::ErrorLog {
                cookie: record.cookie.clone(),
                code: None,
                data: Some(message),
            });
        }
        let Some(name) = reply.diag else {
            debug!(diag = %record.diag, "agent could not start diagnostic");
            self.push_status(record.cookie, RequestStatus::Error);
            return Ok(());
        };
        match self.instances.promote(name.clone(), record) {
            Ok(instance) => {
                let cookie = instance.cookie.clone();
                debug!(instance = %name, "diagnostic started");
                self.push_status(cookie, RequestStatus::Started);
            }
            Err(record) => {
                warn!(instance = %name, "start reply for already running instance");
                self.push_status(record.cookie, RequestStatus::Error);
            }
        }
        Ok(())
    }

    fn on_notification(
        &mut self,
        id: &Value,
        method: &Value,
        params: Option<&Value>,
    ) -> Result<(), ProtocolError> {
        let Some(method) = method.as_str() else {
            return Err(ProtocolError::UnknownMethod(describe_id(method)));
        };

        if let Some(instance) = self.instances.get(method) {
            if !id.is_null() {
                return Err(ProtocolError::UnexpectedId {
                    context: "method",
                    id: describe_id(id),
                });
            }
            let cookie = instance.cookie.clone();
            let params = InstanceParams::parse(params)?;
            if let Some(progress) = params.progress {
                match progress_value(&progress) {
                    Some(progress) => self.events.push_back(DiagEvent::Progress {
                        cookie: cookie.clone(),
                        progress,
                    }),
                    None => debug!(instance = method, "non numeric progress {progress}"),
                }
            }
            if let Some(data) = params.log {
                self.events.push_back(DiagEvent::Log {
                    cookie: cookie.clone(),
                    data,
                });
            }
            if let Some(data) = params.error {
                self.events.push_back(DiagEvent::ErrorLog {
                    cookie,
                    code: None,
                    data: Some(data),
                });
            }
            return Ok(());
        }

        if method == EOD_METHOD {
            if !id.is_null() {
                return Err(ProtocolError::UnexpectedId {
                    context: "eod",
                    id: describe_id(id),
                });
            }
            let eod = EodParams::parse(params)?;
            let instance = self
                .instances
                .remove(&eod.diag)
                .ok_or_else(|| ProtocolError::UnknownInstance(eod.diag.clone()))?;
            let cookie = instance.cookie;
            match (&eod.data, eod.status == errcodes::SUCCESS) {
                (Some(data), true) => self.events.push_back(DiagEvent::Log {
                    cookie: cookie.clone(),
                    data: data.clone(),
                }),
                (Some(data), false) => self.events.push_back(DiagEvent::ErrorLog {
                    cookie: cookie.clone(),
                    code: Some(eod.status),
                    data: Some(data.clone()),
                }),
                (None, false) => self.events.push_back(DiagEvent::ErrorLog {
                    cookie: cookie.clone(),
                    code: Some(eod.status),
                    data: None,
                }),
                (None, true) => {}
            }
            debug!(instance = %eod.diag, status = eod.status, "end of diagnostic");
            self.events.push_back(DiagEvent::Eod {
                cookie,
                status: eod.status,
                data: eod.data,
                filter: eod.filter,
            });
            return Ok(());
        }

        Err(ProtocolError::UnknownMethod(SmolStr::new(method)))
    }

    fn on_error_reply(&mut self, id: &Value, error: &Value) -> Result<(), ProtocolError> {
        if id.is_null() {
            debug!("agent error without id: {error}");
            return Ok(());
        }
        let record = request_id(id)
            .and_then(|key| self.pending.remove(&key))
            .ok_or_else(|| ProtocolError::UnknownReference(describe_id(id)))?;
        let cookie = record.cookie;
        self.push_status(cookie.clone(), RequestStatus::Error);

        let error = ErrorObject::parse(error);
        if let Some(code) = error.code {
            match error.message {
                Some(message) => self.events.push_back(DiagEvent::ErrorLog {
                    cookie,
                    code: Some(code),
                    data: Some(message),
                }),
                None => debug!(diag = %record.diag, code, "error reply missing message"),
            }
        }
        Ok(())
    }

    fn push_status(&mut self, cookie: K, status: RequestStatus) {
        self.events.push_back(DiagEvent::Status { cookie, status });
    }

    /// Next queued event, in emission order.
    pub fn next_event(&mut self) -> Option<DiagEvent<K>> {
        self.events.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<DiagEvent<K>> {
        self.events.drain(..).collect()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    #[must_use]
    pub fn instances(&self) -> &InstanceRegistry<K> {
        &self.instances
    }

    #[must_use]
    pub fn ids_exhausted(&self) -> bool {
        self.ids.is_exhausted()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn progress_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|progress| progress as i64))
}
