//! Diagnostic session: stage machine, orchestration and cancellation.
//! - connect/pump: drive the transport and the stage timers
//! - run/show_previous/cancel_all/request_exit: presentation-layer commands
//! - take_events: typed events for the presentation layer

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::{json, Value};
use smol_str::SmolStr;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::aggregate::{verdict_text, FinalResult};
use crate::catalog::{Catalog, OrderGraph, START_ORDINAL};
use crate::clock::{Clock, StageTimers, StdClock, TimerKind};
use crate::config::HwstConfig;
use crate::correlator::{Correlator, DiagEvent, RequestIds, RequestStatus};
use crate::device::DeviceInfo;
use crate::errcodes;
use crate::error::SessionError;
use crate::events::{Cookie, SessionEvent, Stage};
use crate::plan::{Plan, ResultState};
use crate::previous::PreviousReport;
use crate::protocol::FilterReport;
use crate::transport::{Connection, ConnectionState, Connector, TransportEvent};

const SYSINFO_DIAG: &str = "sysinfo_info";
const CAPABILITIES_DIAG: &str = "capabilities_info";
const PREVIOUS_RESULTS_DIAG: &str = "previous_results";
const LOG_METHOD: &str = "LOG";
const TESTRUN_METHOD: &str = "TESTRUN";
const CANCELLED_DATA: &str = "Cancelled";

/// One client session against one diagnostic agent.
pub struct Session<C: Clock = StdClock> {
    config: HwstConfig,
    clock: C,
    connection: Connection,
    correlator: Correlator<Cookie>,
    stage: Stage,
    catalog: Catalog,
    order: OrderGraph,
    plan: Plan,
    timers: StageTimers,
    device: Option<DeviceInfo>,
    previous: Option<bool>,
    previous_report: Option<PreviousReport>,
    run: u32,
    cancelling: bool,
    final_result: Option<FinalResult>,
    events: VecDeque<SessionEvent>,
}

impl Session<StdClock> {
    #[must_use]
    pub fn new(config: HwstConfig) -> Self {
        Self::with_clock(config, StdClock::new())
    }
}

impl<C: Clock> Session<C> {
    #[must_use]
    pub fn with_clock(config: HwstConfig, clock: C) -> Self {
        Self::with_request_ids(config, clock, RequestIds::default())
    }

    #[must_use]
    pub fn with_request_ids(config: HwstConfig, clock: C, ids: RequestIds) -> Self {
        let catalog = config.catalog.clone();
        let order = OrderGraph::from_rules(&catalog, &config.order);
        let correlator = Correlator::with_ids(config.agent.control_method.clone(), ids);
        Self {
            config,
            clock,
            connection: Connection::new(),
            correlator,
            stage: Stage::Idle,
            catalog,
            order,
            plan: Plan::default(),
            timers: StageTimers::default(),
            device: None,
            previous: None,
            previous_report: None,
            run: 0,
            cancelling: false,
            final_result: None,
            events: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HwstConfig {
        &self.config
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn order_graph(&self) -> &OrderGraph {
        &self.order
    }

    /// Replace the derived order graph until the next capabilities report.
    pub fn set_order_graph(&mut self, order: OrderGraph) {
        self.order = order;
    }

    #[must_use]
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// `None` until the agent's stored results have been checked.
    #[must_use]
    pub fn previous_available(&self) -> Option<bool> {
        self.previous
    }

    #[must_use]
    pub fn previous_report(&self) -> Option<&PreviousReport> {
        self.previous_report.as_ref()
    }

    #[must_use]
    pub fn final_result(&self) -> Option<FinalResult> {
        self.final_result
    }

    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling
    }

    pub fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Open the agent connection. `Ok(false)` when one is already open.
    ///
    /// A new connection starts a fresh epoch: correlation state and the plan are discarded
    /// and the stage machine restarts once the transport reports it is open.
    pub fn connect(&mut self, connector: &mut dyn Connector) -> Result<bool, SessionError> {
        let address = self.config.agent.address.clone();
        if !self.connection.connect(connector, &address)? {
            return Ok(false);
        }
        self.correlator.reset();
        self.timers.disarm_all();
        self.catalog = self.config.catalog.clone();
        self.order = OrderGraph::from_rules(&self.catalog, &self.config.order);
        self.plan = Plan::default();
        self.device = None;
        self.previous = None;
        self.previous_report = None;
        self.cancelling = false;
        self.final_result = None;
        self.transition(Stage::Idle);
        Ok(true)
    }

    pub fn disconnect(&mut self) {
        self.timers.disarm_all();
        self.connection.disconnect();
        self.correlator.reset();
    }

    /// Wait up to `max_wait` for one transport event, then fire due timers.
    ///
    /// Returns whether anything was handled.
    pub fn pump(&mut self, max_wait: Duration) -> bool {
        let wait = match self.timers.next_deadline() {
            Some(deadline) => deadline.saturating_sub(self.clock.now()).min(max_wait),
            None => max_wait,
        };
        let mut handled = false;
        if let Some(event) = self.connection.poll(wait) {
            self.on_transport_event(event);
            handled = true;
        }
        let fired = self.fire_due_timers();
        handled || fired
    }

    /// Fire every stage timer whose deadline has passed.
    pub fn fire_due_timers(&mut self) -> bool {
        let due = self.timers.take_due(self.clock.now());
        for kind in &due {
            self.on_timeout(*kind);
        }
        self.drain_correlator();
        !due.is_empty()
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.stage == Stage::Idle {
                    self.enter_startup_info();
                } else {
                    debug!(stage = %self.stage, "open event outside idle stage");
                }
            }
            TransportEvent::Message(text) => {
                self.correlator.handle_message(&text);
                self.drain_correlator();
            }
            TransportEvent::Errored(err) => warn!("transport error: {err}"),
            TransportEvent::Closed => {
                self.correlator.reset();
                if !self.stage.is_terminal() {
                    self.agent_missing();
                }
            }
        }
    }

    fn on_timeout(&mut self, kind: TimerKind) {
        match (kind, self.stage) {
            (TimerKind::StartupInfo, Stage::StartupInfo) => {
                warn!("agent did not report startup info");
                self.agent_missing();
            }
            (TimerKind::Capabilities, Stage::Capabilities) => {
                warn!("capabilities not reported, keeping the full catalog");
                self.enter_previous_results();
            }
            (TimerKind::PreviousResults, Stage::PreviousResults) => {
                warn!("previous results not reported");
                self.enter_ready();
            }
            (TimerKind::InProgress, Stage::Running) => {
                warn!("run exceeded its time limit, cancelling");
                self.cancel_everything();
            }
            (TimerKind::Inactivity, Stage::Ready | Stage::Cancelling | Stage::Finished) => {
                info!(stage = %self.stage, "inactivity timeout");
                self.request_exit();
            }
            (kind, stage) => debug!(%kind, %stage, "stale timer ignored"),
        }
    }

    fn transition(&mut self, to: Stage) {
        let from = self.stage;
        if from == to {
            return;
        }
        info!(%from, %to, "session stage");
        self.stage = to;
        self.push(SessionEvent::StageChanged { from, to });
    }

    fn push(&mut self, event: SessionEvent) {
        self.events.push_back(event);
    }

    fn agent_missing(&mut self) {
        self.timers.disarm_all();
        self.connection.disconnect();
        self.correlator.reset();
        self.push(SessionEvent::AgentMissing);
        self.transition(Stage::Aborted);
    }

    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        let now = self.now();
        self.timers.arm(kind, now, after);
    }

    fn issue_stage_request(&mut self, cookie: Cookie, diag: &str) {
        if let Err(err) = self
            .correlator
            .issue(&mut self.connection, Some(cookie), diag, None)
        {
            warn!(diag, "stage request not sent: {err}");
        }
    }

    /// Fire-and-forget run-control message; failures are only logged.
    fn notify_agent(&mut self, method: &str, params: &Value) {
        if let Err(err) = self
            .correlator
            .notify(&mut self.connection, method, Some(params))
        {
            debug!(method, "notification not sent: {err}");
        }
    }

    fn enter_startup_info(&mut self) {
        self.transition(Stage::StartupInfo);
        self.arm(TimerKind::StartupInfo, self.config.timeouts.startup_info);
        self.issue_stage_request(Cookie::StartupInfo, SYSINFO_DIAG);
    }

    fn enter_capabilities(&mut self) {
        self.timers.disarm(TimerKind::StartupInfo);
        self.transition(Stage::Capabilities);
        self.arm(TimerKind::Capabilities, self.config.timeouts.capabilities);
        self.issue_stage_request(Cookie::Capabilities, CAPABILITIES_DIAG);
    }

    fn enter_previous_results(&mut self) {
        self.timers.disarm(TimerKind::Capabilities);
        self.transition(Stage::PreviousResults);
        self.arm(
            TimerKind::PreviousResults,
            self.config.timeouts.previous_results,
        );
        self.issue_stage_request(Cookie::PreviousResults, PREVIOUS_RESULTS_DIAG);
    }

    fn enter_ready(&mut self) {
        self.timers.disarm(TimerKind::PreviousResults);
        if self.previous.is_none() {
            self.set_previous_available(false, None);
        }
        self.transition(Stage::Ready);
        self.arm(TimerKind::Inactivity, self.config.timeouts.ready_inactivity);
    }

    fn set_previous_available(&mut self, available: bool, end_time: Option<SmolStr>) {
        if self.previous.is_some() {
            return;
        }
        self.previous = Some(available);
        self.push(SessionEvent::PreviousResults {
            available,
            end_time,
        });
    }

    fn drain_correlator(&mut self) {
        while let Some(event) = self.correlator.next_event() {
            self.route(event);
        }
    }

    fn route(&mut self, event: DiagEvent<Cookie>) {
        match *event.cookie() {
            Cookie::StartupInfo => self.on_startup_info(event),
            Cookie::Capabilities => self.on_capabilities(event),
            Cookie::PreviousResults => self.on_previous_results(event),
            Cookie::Element { run, ordinal } => {
                if run == self.run {
                    self.on_element(ordinal, event);
                } else {
                    self.on_stale_element(event);
                }
            }
        }
    }

    fn on_startup_info(&mut self, event: DiagEvent<Cookie>) {
        if self.stage != Stage::StartupInfo {
            debug!(stage = %self.stage, "late startup-info event ignored");
            return;
        }
        match event {
            DiagEvent::Log { data, .. } => match DeviceInfo::from_payload(&data) {
                Some(device) => {
                    self.device = Some(device.clone());
                    self.push(SessionEvent::DeviceInfo(device));
                }
                None => debug!("startup info payload is not an object"),
            },
            DiagEvent::Eod { status, .. } if status == errcodes::SUCCESS => {
                self.enter_capabilities();
            }
            other => debug!("startup-info event ignored: {other:?}"),
        }
    }

    fn on_capabilities(&mut self, event: DiagEvent<Cookie>) {
        if self.stage != Stage::Capabilities {
            debug!(stage = %self.stage, "late capabilities event ignored");
            return;
        }
        match event {
            DiagEvent::Log { data, .. } => {
                let available: Vec<&str> = data
                    .get("diags")
                    .and_then(Value::as_array)
                    .map(|diags| diags.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                self.catalog = self.config.catalog.prune_to_capabilities(&available);
                self.order = OrderGraph::from_rules(&self.catalog, &self.config.order);
                let groups = self
                    .catalog
                    .groups()
                    .iter()
                    .map(|group| group.name.clone())
                    .collect();
                self.push(SessionEvent::Capabilities { groups });
            }
            DiagEvent::Eod { status, .. } if status == errcodes::SUCCESS => {
                self.enter_previous_results();
            }
            other => debug!("capabilities event ignored: {other:?}"),
        }
    }

    fn on_previous_results(&mut self, event: DiagEvent<Cookie>) {
        if self.stage != Stage::PreviousResults {
            debug!(stage = %self.stage, "late previous-results event ignored");
            return;
        }
        match event {
            DiagEvent::Log { data, .. } => {
                if self.previous.is_some() {
                    return;
                }
                let Some(report) = PreviousReport::parse(&data) else {
                    self.set_previous_available(false, None);
                    return;
                };
                self.plan = Plan::build(&self.catalog);
                self.push(SessionEvent::PlanBuilt {
                    groups: self.plan.groups().len(),
                    elements: self.plan.len(),
                });
                let available = report.apply(&mut self.plan);
                let end_time = Some(report.end_time.clone());
                self.previous_report = Some(report);
                self.set_previous_available(available, end_time);
            }
            DiagEvent::Eod { status, .. } if status == errcodes::SUCCESS => self.enter_ready(),
            other => debug!("previous-results event ignored: {other:?}"),
        }
    }

    /// Start a run from `Ready`, or rerun from `Finished`.
    ///
    /// A rerun is refused until every break of the previous run has landed.
    pub fn run(&mut self) -> Result<(), SessionError> {
        let client = self.config.agent.client_name.clone();
        match self.stage {
            Stage::Ready => {
                let message = format!("Test execution start, {client}");
                self.notify_agent(LOG_METHOD, &json!({ "message": message }));
            }
            Stage::Finished => {
                self.notify_agent(LOG_METHOD, &json!({ "message": "Test execution restart" }));
            }
            Stage::Cancelling => return Err(SessionError::StillCancelling),
            stage => {
                return Err(SessionError::InvalidStage {
                    operation: "run",
                    stage: SmolStr::new(stage.label()),
                })
            }
        }

        self.run += 1;
        self.cancelling = false;
        self.final_result = None;
        self.timers.disarm(TimerKind::Inactivity);
        self.notify_agent(
            TESTRUN_METHOD,
            &json!({ "state": "start", "client": client.as_str() }),
        );
        self.arm(TimerKind::InProgress, self.config.timeouts.in_progress);

        self.plan = Plan::build(&self.catalog);
        self.push(SessionEvent::PlanBuilt {
            groups: self.plan.groups().len(),
            elements: self.plan.len(),
        });
        self.transition(Stage::Running);
        if !self.run_next_set(START_ORDINAL) && self.plan.all_finished() {
            self.finish();
        }
        self.drain_correlator();
        Ok(())
    }

    /// Display the stored results instead of running; only from `Ready` when they exist.
    pub fn show_previous(&mut self) -> Result<(), SessionError> {
        if self.stage != Stage::Ready || self.previous != Some(true) {
            return Err(SessionError::InvalidStage {
                operation: "show_previous",
                stage: SmolStr::new(self.stage.label()),
            });
        }
        let message = format!("Show previous results, {}", self.config.agent.client_name);
        self.notify_agent(LOG_METHOD, &json!({ "message": message }));
        self.timers.disarm(TimerKind::Inactivity);

        let verdict = self
            .plan
            .compute_final(false, self.config.filter.displays_filtered());
        let message = format!(
            "Previous results overall status:{}",
            verdict_text(verdict.displayed())
        );
        self.notify_agent(LOG_METHOD, &json!({ "message": message }));
        self.final_result = Some(verdict);
        self.push(SessionEvent::Final(verdict));
        self.transition(Stage::Finished);
        self.arm(
            TimerKind::Inactivity,
            self.config.timeouts.finished_inactivity,
        );
        Ok(())
    }

    /// Issue every still-unissued successor of `last`. Returns whether any was attempted.
    fn run_next_set(&mut self, last: u32) -> bool {
        let successors = self.order.successors(last).to_vec();
        let mut attempted = false;
        let mut failed = Vec::new();
        for ordinal in successors {
            let Some(element) = self.plan.element_mut(ordinal) else {
                continue;
            };
            if element.issued {
                continue;
            }
            element.issued = true;
            attempted = true;
            let name = element.name.clone();
            let params = element.params.clone();
            let cookie = Cookie::Element {
                run: self.run,
                ordinal,
            };
            if let Err(err) =
                self.correlator
                    .issue(&mut self.connection, Some(cookie), &name, params)
            {
                warn!(diag = %name, "start request not sent: {err}");
                failed.push(ordinal);
            }
        }
        for ordinal in failed {
            self.complete(ordinal, errcodes::STARTUP_FAILURE, None, None);
        }
        attempted
    }

    fn on_element(&mut self, ordinal: u32, event: DiagEvent<Cookie>) {
        if !matches!(
            self.stage,
            Stage::Running | Stage::Cancelling | Stage::Finished
        ) {
            debug!(ordinal, stage = %self.stage, "element event outside a run");
            return;
        }
        let Some(result) = self.plan.element(ordinal).map(|element| element.result) else {
            debug!(ordinal, "event for unknown element");
            return;
        };
        match event {
            DiagEvent::Status { status, cookie } => match status {
                RequestStatus::Issued => {}
                RequestStatus::Started => {
                    if result == ResultState::NotRun && !self.cancelling {
                        if let Some(element) = self.plan.element_mut(ordinal) {
                            element.result = ResultState::Running;
                        }
                        self.push(SessionEvent::Started { ordinal });
                    } else {
                        debug!(ordinal, %result, "started after cancellation, sending break");
                        if result == ResultState::Cancelled && self.stage == Stage::Cancelling {
                            if let Some(element) = self.plan.element_mut(ordinal) {
                                element.result = ResultState::Cancelling;
                            }
                        }
                        self.correlator.cancel(&mut self.connection, &cookie);
                    }
                }
                RequestStatus::Error => {
                    if result == ResultState::Cancelled {
                        debug!(ordinal, "cancelled element failed to start");
                        return;
                    }
                    self.complete(ordinal, errcodes::STARTUP_FAILURE, None, None);
                }
            },
            DiagEvent::Progress { progress, .. } => {
                if result != ResultState::Running {
                    return;
                }
                if let Some(group) = self.plan.set_progress(ordinal, progress) {
                    self.push_progress(ordinal, group);
                }
            }
            DiagEvent::Log { data, .. } => self.push(SessionEvent::Log { ordinal, data }),
            DiagEvent::ErrorLog { code, data, .. } => {
                self.push(SessionEvent::ErrorLog {
                    ordinal,
                    code,
                    data,
                });
            }
            DiagEvent::Eod {
                status,
                data,
                filter,
                ..
            } => self.complete(ordinal, status, data, filter),
        }
    }

    fn on_stale_element(&mut self, event: DiagEvent<Cookie>) {
        if let DiagEvent::Status {
            status: RequestStatus::Started,
            cookie,
        } = event
        {
            debug!(?cookie, "instance from an earlier run started, sending break");
            self.correlator.cancel(&mut self.connection, &cookie);
        }
    }

    fn push_progress(&mut self, ordinal: u32, group: usize) {
        let progress = self.plan.element(ordinal).map_or(0, |element| element.progress);
        let group_progress = self.plan.group(group).map_or(0, |group| group.progress);
        self.push(SessionEvent::Progress {
            ordinal,
            progress,
            group,
            group_progress,
        });
    }

    fn record_result(
        &mut self,
        ordinal: u32,
        status: i64,
        data: Option<Value>,
        filter: Option<FilterReport>,
    ) -> Option<usize> {
        let group = self.plan.set_progress(ordinal, 100)?;
        self.push_progress(ordinal, group);
        self.plan.set_result(ordinal, status, data, filter);
        if let Some(element) = self.plan.element(ordinal) {
            let result = element.result;
            self.push(SessionEvent::ElementResult {
                ordinal,
                result,
                status,
            });
        }
        Some(group)
    }

    fn publish_group(&mut self, group: usize) {
        let Some(result) = self.plan.recompute_group(group) else {
            return;
        };
        let Some(entry) = self.plan.group(group) else {
            return;
        };
        let filtered = entry.filtered_result;
        let message = format!("Test result: {}:{}", entry.name, verdict_text(result));
        self.notify_agent(LOG_METHOD, &json!({ "message": message }));
        self.push(SessionEvent::GroupResult {
            group,
            result,
            filtered,
        });
    }

    /// Terminal status for one element.
    ///
    /// While running this unlocks successors; after cancellation it is only recorded.
    fn complete(
        &mut self,
        ordinal: u32,
        status: i64,
        data: Option<Value>,
        filter: Option<FilterReport>,
    ) {
        let Some(group) = self.record_result(ordinal, status, data, filter) else {
            return;
        };
        if self.stage == Stage::Running && !self.cancelling {
            self.publish_group(group);
            if !self.run_next_set(ordinal) && self.plan.all_finished() {
                self.finish();
            }
            return;
        }

        if let Some(result) = self.plan.recompute_group(group) {
            let filtered = self
                .plan
                .group(group)
                .map_or(ResultState::NotRun, |entry| entry.filtered_result);
            self.push(SessionEvent::GroupResult {
                group,
                result,
                filtered,
            });
        }
        if self.stage == Stage::Cancelling && !self.plan.any_cancelling() {
            self.finish();
        }
    }

    /// Break every running element and close out the ones never started.
    pub fn cancel_all(&mut self) -> Result<(), SessionError> {
        if self.stage != Stage::Running {
            return Err(SessionError::InvalidStage {
                operation: "cancel_all",
                stage: SmolStr::new(self.stage.label()),
            });
        }
        self.cancel_everything();
        self.drain_correlator();
        Ok(())
    }

    fn cancel_everything(&mut self) {
        self.cancelling = true;
        self.timers.disarm(TimerKind::InProgress);
        self.transition(Stage::Cancelling);
        self.arm(
            TimerKind::Inactivity,
            self.config.timeouts.finished_inactivity,
        );

        let groups: Vec<(usize, Vec<u32>)> = self
            .plan
            .groups()
            .iter()
            .enumerate()
            .map(|(index, group)| {
                (
                    index,
                    group.elements.iter().map(|element| element.ordinal).collect(),
                )
            })
            .collect();
        for (group, ordinals) in groups {
            let mut modified = false;
            for ordinal in ordinals {
                let Some(result) = self.plan.element(ordinal).map(|element| element.result)
                else {
                    continue;
                };
                let next = match result {
                    ResultState::Running => {
                        let cookie = Cookie::Element {
                            run: self.run,
                            ordinal,
                        };
                        if !self.correlator.cancel(&mut self.connection, &cookie) {
                            debug!(ordinal, "no live instance to break");
                        }
                        ResultState::Cancelling
                    }
                    ResultState::NotRun => ResultState::Cancelled,
                    _ => continue,
                };
                if let Some(element) = self.plan.element_mut(ordinal) {
                    element.result = next;
                    element.status = errcodes::CANCELLED;
                    element.data = Some(Value::from(CANCELLED_DATA));
                }
                self.plan.set_progress(ordinal, 100);
                self.push_progress(ordinal, group);
                modified = true;
            }
            if modified {
                self.publish_group(group);
            }
        }

        if !self.plan.any_cancelling() {
            self.finish();
        }
    }

    /// Ask the agent to break a single element; true when it has a live instance.
    pub fn cancel(&mut self, ordinal: u32) -> bool {
        let cookie = Cookie::Element {
            run: self.run,
            ordinal,
        };
        self.correlator.cancel(&mut self.connection, &cookie)
    }

    fn finish(&mut self) {
        if !matches!(self.stage, Stage::Running | Stage::Cancelling) {
            return;
        }
        self.timers.disarm(TimerKind::InProgress);
        self.arm(
            TimerKind::Inactivity,
            self.config.timeouts.finished_inactivity,
        );
        let verdict = self
            .plan
            .compute_final(self.cancelling, self.config.filter.displays_filtered());
        let rawmessage = format!(
            "{} Test execution completed:{}",
            timestamp(OffsetDateTime::now_utc()),
            verdict_text(verdict.displayed())
        );
        self.notify_agent(LOG_METHOD, &json!({ "rawmessage": rawmessage }));
        self.notify_agent(TESTRUN_METHOD, &json!({ "state": "finish" }));
        info!(result = %verdict.displayed(), "run finished");
        self.final_result = Some(verdict);
        self.push(SessionEvent::Final(verdict));
        self.transition(Stage::Finished);
    }

    /// Leave the session. Returns whether the agent was still busy breaking diagnostics.
    pub fn request_exit(&mut self) -> bool {
        let agent_busy = self.plan.any_cancelling();
        if agent_busy {
            warn!("exiting while diagnostics are still cancelling");
        }
        self.cancelling = false;
        self.timers.disarm_all();
        self.push(SessionEvent::ExitRequested { agent_busy });
        self.transition(Stage::Exited);
        self.connection.disconnect();
        self.correlator.reset();
        agent_busy
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC.
fn timestamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
