//! Drive one session against a live agent and print its events.

use std::path::PathBuf;
use std::time::Duration;

use hwst_session::{
    HwstConfig, ResultState, Session, SessionEvent, Stage, WsConnector,
};
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::plan::load_config;
use crate::style;

const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// How the session ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Warning,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Failed => 1,
            Self::Warning => 2,
        }
    }

    fn from_result(result: ResultState) -> Self {
        match result {
            ResultState::Passed => Self::Passed,
            state if state.is_failure() => Self::Failed,
            _ => Self::Warning,
        }
    }
}

pub fn run_session(
    config: Option<PathBuf>,
    address: Option<String>,
    show_previous: bool,
) -> anyhow::Result<Outcome> {
    let mut config: HwstConfig = load_config(config)?;
    if let Some(address) = address {
        config.agent.address = SmolStr::new(address);
    }
    info!(address = %config.agent.address, "connecting to diagnostic agent");

    let mut session = Session::new(config);
    session.connect(&mut WsConnector)?;

    let mut started = false;
    let mut outcome = None;
    loop {
        session.pump(PUMP_INTERVAL);
        while let Some(event) = session.next_event() {
            print_event(&session, &event);
            if let SessionEvent::Final(result) = event {
                outcome = Some(Outcome::from_result(result.displayed()));
            }
        }
        if let Some(outcome) = outcome {
            session.request_exit();
            return Ok(outcome);
        }
        match session.stage() {
            Stage::Ready if !started => {
                started = true;
                if show_previous && session.previous_available() == Some(true) {
                    session.show_previous()?;
                } else {
                    if show_previous {
                        println!("{}", style::warning("No complete stored results, running instead"));
                    }
                    session.run()?;
                }
            }
            Stage::Aborted => {
                println!("{}", style::error("Diagnostic agent is not responding"));
                return Ok(Outcome::Failed);
            }
            Stage::Exited => {
                debug!("session exited before a final result");
                return Ok(Outcome::Failed);
            }
            _ => {}
        }
    }
}

fn element_name<'a>(session: &'a Session, ordinal: u32) -> &'a str {
    session
        .plan()
        .element(ordinal)
        .map_or("?", |element| element.name.as_str())
}

fn print_event(session: &Session, event: &SessionEvent) {
    match event {
        SessionEvent::StageChanged { to, .. } => debug!(stage = %to, "stage"),
        SessionEvent::DeviceInfo(device) => {
            for (label, value) in device.rows() {
                println!("{:<8} {value}", style::accent(label));
            }
        }
        SessionEvent::Capabilities { groups } => {
            debug!(groups = groups.len(), "capabilities received");
        }
        SessionEvent::PreviousResults {
            available,
            end_time,
        } => {
            if *available {
                let when = end_time.as_deref().unwrap_or("unknown time");
                println!("Stored results available from {when}");
            }
        }
        SessionEvent::PlanBuilt { groups, elements } => {
            println!("{groups} groups, {elements} diagnostics");
        }
        SessionEvent::Started { ordinal } => {
            println!("  {} started", element_name(session, *ordinal));
        }
        SessionEvent::Progress {
            ordinal, progress, ..
        } => debug!(diag = element_name(session, *ordinal), progress, "progress"),
        SessionEvent::Log { ordinal, data } => {
            debug!(diag = element_name(session, *ordinal), "log: {data}");
        }
        SessionEvent::ErrorLog {
            ordinal,
            code,
            data,
        } => {
            let detail = data.as_ref().map(ToString::to_string).unwrap_or_default();
            let code = code.map(|code| format!(" ({code})")).unwrap_or_default();
            println!(
                "  {}{code} {}",
                element_name(session, *ordinal),
                style::warning(detail)
            );
        }
        SessionEvent::ElementResult {
            ordinal,
            result,
            status,
        } => {
            println!(
                "  {} {} [{status}]",
                element_name(session, *ordinal),
                style::result(*result)
            );
        }
        SessionEvent::GroupResult { group, result, .. } => {
            if let Some(entry) = session.plan().group(*group) {
                debug!(group = %entry.name, result = %result, "group result");
            }
        }
        SessionEvent::Final(result) => {
            println!();
            for group in session.plan().groups() {
                println!("{:<24} {}", group.name, style::result(group.result));
            }
            println!("Overall: {}", style::result(result.displayed()));
        }
        SessionEvent::AgentMissing => {}
        SessionEvent::ExitRequested { agent_busy } => {
            if *agent_busy {
                println!("{}", style::warning("Agent still cancelling diagnostics"));
            }
        }
    }
}
