#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use hwst_session::clock::ManualClock;
use hwst_session::error::SessionError;
use hwst_session::transport::{Connector, Transport, TransportEvent};
use hwst_session::{HwstConfig, Session, SessionEvent};
use serde_json::{json, Value};

#[derive(Debug, Default)]
struct Wire {
    inbound: VecDeque<TransportEvent>,
    sent: Vec<String>,
    closed: bool,
}

/// Scripted agent end of an in-memory connection.
#[derive(Debug, Clone, Default)]
pub struct MockAgent {
    wire: Rc<RefCell<Wire>>,
}

impl MockAgent {
    pub fn push(&self, event: TransportEvent) {
        self.wire.borrow_mut().inbound.push_back(event);
    }

    pub fn message(&self, value: &Value) {
        self.push(TransportEvent::Message(value.to_string()));
    }

    pub fn raw(&self, text: &str) {
        self.push(TransportEvent::Message(text.to_owned()));
    }

    /// Start reply naming the instance.
    pub fn started(&self, id: u64, instance: &str) {
        self.message(&json!({"jsonrpc": "2.0", "id": id, "result": {"diag": instance}}));
    }

    pub fn reply(&self, id: u64, result: Value) {
        self.message(&json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    pub fn error(&self, id: u64, code: i64, message: &str) {
        self.message(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }));
    }

    pub fn instance(&self, instance: &str, params: Value) {
        self.message(&json!({"jsonrpc": "2.0", "id": null, "method": instance, "params": params}));
    }

    pub fn eod(&self, instance: &str, status: i64) {
        self.message(&json!({
            "jsonrpc": "2.0",
            "id": null,
            "method": "eod",
            "params": {"status": status, "diag": instance}
        }));
    }

    pub fn eod_with(&self, instance: &str, status: i64, data: Value) {
        self.message(&json!({
            "jsonrpc": "2.0",
            "id": null,
            "method": "eod",
            "params": {"status": status, "diag": instance, "data": data}
        }));
    }

    /// Start, log and finish a stage diagnostic in one go.
    pub fn answer(&self, method: &str, log: Value) {
        let id = self
            .request_id(method)
            .unwrap_or_else(|| panic!("no request for {method}"));
        self.started(id, method);
        self.instance(method, json!({"log": log}));
        self.eod(method, 0);
    }

    pub fn close(&self) {
        self.push(TransportEvent::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.wire.borrow().closed
    }

    pub fn sent(&self) -> Vec<Value> {
        self.wire
            .borrow()
            .sent
            .iter()
            .map(|text| serde_json::from_str(text).expect("client sent invalid json"))
            .collect()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.wire.borrow().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.wire.borrow_mut().sent.clear();
    }

    /// Id of the latest correlated request for `method`.
    pub fn request_id(&self, method: &str) -> Option<u64> {
        self.sent()
            .iter()
            .rev()
            .find(|message| message["method"] == method && message["id"].is_u64())
            .and_then(|message| message["id"].as_u64())
    }

    /// Methods of correlated requests, in send order.
    pub fn requested(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter(|message| message["id"].is_u64())
            .filter_map(|message| message["method"].as_str().map(str::to_owned))
            .collect()
    }

    /// Params of fire-and-forget messages sent on `method`.
    pub fn notifications(&self, method: &str) -> Vec<Value> {
        self.sent()
            .iter()
            .filter(|message| message["id"].is_null() && message["method"] == method)
            .map(|message| message["params"].clone())
            .collect()
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.notifications("LOG")
            .iter()
            .filter_map(|params| {
                params["message"]
                    .as_str()
                    .or_else(|| params["rawmessage"].as_str())
                    .map(str::to_owned)
            })
            .collect()
    }
}

struct MockTransport {
    wire: Rc<RefCell<Wire>>,
}

impl Transport for MockTransport {
    fn send(&mut self, text: &str) -> Result<(), SessionError> {
        self.wire.borrow_mut().sent.push(text.to_owned());
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Option<TransportEvent> {
        self.wire.borrow_mut().inbound.pop_front()
    }

    fn close(&mut self) {
        self.wire.borrow_mut().closed = true;
    }
}

/// Hands out transports bound to one scripted agent.
#[derive(Debug, Default)]
pub struct MockConnector {
    pub agent: MockAgent,
    pub refuse: bool,
    pub connects: usize,
}

impl MockConnector {
    pub fn new(agent: MockAgent) -> Self {
        Self {
            agent,
            refuse: false,
            connects: 0,
        }
    }
}

impl Connector for MockConnector {
    fn connect(&mut self, address: &str) -> Result<Box<dyn Transport>, SessionError> {
        if self.refuse {
            return Err(SessionError::Transport(format!("{address}: refused").into()));
        }
        self.connects += 1;
        let wire = Rc::clone(&self.agent.wire);
        {
            let mut state = wire.borrow_mut();
            state.closed = false;
            state.inbound.push_front(TransportEvent::Opened);
        }
        Ok(Box::new(MockTransport { wire }))
    }
}

/// Pump until neither the transport nor the timers have anything left.
pub fn settle<C: hwst_session::Clock>(session: &mut Session<C>) {
    for _ in 0..10_000 {
        if !session.pump(Duration::ZERO) {
            return;
        }
    }
    panic!("session did not settle");
}

/// Session connected to a fresh agent, still waiting for startup info.
pub fn connected(config: HwstConfig) -> (Session<ManualClock>, MockAgent, ManualClock) {
    let clock = ManualClock::new();
    let agent = MockAgent::default();
    let mut connector = MockConnector::new(agent.clone());
    let mut session = Session::with_clock(config, clock.clone());
    assert_eq!(session.connect(&mut connector), Ok(true));
    settle(&mut session);
    (session, agent, clock)
}

/// Walk the startup stages with the given capability list and previous-results payload.
pub fn ready(
    config: HwstConfig,
    capabilities: &[&str],
    previous: Value,
) -> (Session<ManualClock>, MockAgent, ManualClock) {
    let (mut session, agent, clock) = connected(config);
    agent.answer(
        "sysinfo_info",
        json!({"Vendor": "Acme", "Model": "XG1", "Serial": "S1", "RDK": "2.0", "AgentVersion": "0042"}),
    );
    settle(&mut session);
    agent.answer("capabilities_info", json!({ "diags": capabilities }));
    settle(&mut session);
    agent.answer("previous_results", previous);
    settle(&mut session);
    (session, agent, clock)
}

pub fn events_of<C: hwst_session::Clock>(session: &mut Session<C>) -> Vec<SessionEvent> {
    session.take_events()
}
