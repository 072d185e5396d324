mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{events_of, settle, MockAgent, MockConnector};
use hwst_session::config::FilterConfig;
use hwst_session::{
    Catalog, ConnectionState, DiagSpec, FinalResult, GroupSpec, HwstConfig, ManualClock,
    OrderGraph, ResultState, Session, SessionError, SessionEvent, Stage,
};
use serde_json::json;
use smol_str::SmolStr;

fn two_groups() -> HwstConfig {
    HwstConfig {
        catalog: Catalog::new(vec![
            GroupSpec::new("A", [DiagSpec::new("a1"), DiagSpec::new("a2")]),
            GroupSpec::new("B", [DiagSpec::new("b1")]),
        ]),
        order: Vec::new(),
        ..HwstConfig::default()
    }
}

fn ready_two_groups() -> (Session<ManualClock>, MockAgent, ManualClock) {
    let (mut session, agent, clock) = common::ready(
        two_groups(),
        &["a1", "a2", "b1"],
        json!({"results_valid": 1}),
    );
    session.set_order_graph(OrderGraph::new(BTreeMap::from([(0, vec![1, 2, 3])])));
    session.take_events();
    agent.clear_sent();
    (session, agent, clock)
}

fn id(agent: &MockAgent, method: &str) -> u64 {
    agent
        .request_id(method)
        .unwrap_or_else(|| panic!("{method} was not requested"))
}

fn final_of(events: &[SessionEvent]) -> Option<FinalResult> {
    events.iter().find_map(|event| match event {
        SessionEvent::Final(result) => Some(*result),
        _ => None,
    })
}

#[test]
fn startup_stages_reach_ready() {
    let (mut session, agent, _clock) = common::ready(
        two_groups(),
        &["a1", "b1", "zz_unknown"],
        json!({"results_valid": 1}),
    );
    assert_eq!(session.stage(), Stage::Ready);
    assert_eq!(
        agent.requested(),
        vec!["sysinfo_info", "capabilities_info", "previous_results"]
    );
    let device = session.device().unwrap();
    assert_eq!(device.vendor.as_deref(), Some("Acme"));
    assert_eq!(device.agent_version.as_deref(), Some("0042"));
    assert_eq!(session.previous_available(), Some(false));
    assert_eq!(session.catalog().groups().len(), 2);

    let events = events_of(&mut session);
    assert!(events.contains(&SessionEvent::Capabilities {
        groups: vec![SmolStr::new("A"), SmolStr::new("B")]
    }));
    assert!(events.contains(&SessionEvent::PreviousResults {
        available: false,
        end_time: None
    }));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::StageChanged {
            from: Stage::PreviousResults,
            to: Stage::Ready
        })
    );
}

#[test]
fn capabilities_prune_groups() {
    let (session, _agent, _clock) =
        common::ready(two_groups(), &["b1"], json!({"results_valid": 1}));
    let names: Vec<_> = session
        .catalog()
        .groups()
        .iter()
        .map(|group| group.name.as_str())
        .collect();
    assert_eq!(names, vec!["B"]);
}

#[test]
fn full_run_aggregates_groups_and_final_result() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    assert_eq!(session.stage(), Stage::Running);
    assert_eq!(agent.requested(), vec!["a1", "a2", "b1"]);

    agent.started(id(&agent, "a1"), "a1_0");
    agent.instance("a1_0", json!({"progress": 50}));
    settle(&mut session);
    let events = events_of(&mut session);
    assert!(events.contains(&SessionEvent::Started { ordinal: 1 }));
    assert!(events.contains(&SessionEvent::Progress {
        ordinal: 1,
        progress: 50,
        group: 0,
        group_progress: 25
    }));

    agent.eod("a1_0", 0);
    agent.started(id(&agent, "a2"), "a2_0");
    agent.eod("a2_0", -106);
    agent.started(id(&agent, "b1"), "b1_0");
    agent.eod("b1_0", 0);
    settle(&mut session);

    assert_eq!(session.stage(), Stage::Finished);
    let plan = session.plan();
    assert_eq!(plan.element(1).unwrap().result, ResultState::Passed);
    assert_eq!(plan.element(2).unwrap().result, ResultState::Warning);
    assert_eq!(plan.element(2).unwrap().status, -106);
    assert_eq!(plan.group(0).unwrap().result, ResultState::Warning);
    assert_eq!(plan.group(0).unwrap().headline, Some(2));
    assert_eq!(plan.group(1).unwrap().result, ResultState::Passed);

    let verdict = final_of(&events_of(&mut session)).unwrap();
    assert_eq!(verdict.primary, ResultState::Warning);
    assert_eq!(verdict.filtered, ResultState::Passed);
    assert_eq!(session.final_result(), Some(verdict));

    let logs = agent.log_messages();
    assert_eq!(logs[0], "Test execution start, client ver. 000c");
    assert!(logs.contains(&"Test result: B:PASSED".to_owned()));
    assert!(logs.contains(&"Test result: A:WARNING".to_owned()));
    assert!(logs
        .last()
        .unwrap()
        .ends_with(" Test execution completed:WARNING"));
    assert_eq!(
        agent.notifications("TESTRUN"),
        vec![
            json!({"state": "start", "client": "client ver. 000c"}),
            json!({"state": "finish"})
        ]
    );
}

#[test]
fn null_diag_reply_records_startup_failure() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    agent.reply(id(&agent, "a1"), json!({"diag": null}));
    settle(&mut session);

    let element = session.plan().element(1).unwrap();
    assert_eq!(element.result, ResultState::Warning);
    assert_eq!(element.status, -1);
    assert_eq!(element.progress, 100);
    assert_eq!(session.stage(), Stage::Running);
    assert!(events_of(&mut session).contains(&SessionEvent::ElementResult {
        ordinal: 1,
        result: ResultState::Warning,
        status: -1
    }));
}

#[test]
fn hard_failure_fails_the_group() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    for (method, instance, status) in [("a1", "a1_0", -218), ("a2", "a2_0", 0), ("b1", "b1_0", 0)] {
        agent.started(id(&agent, method), instance);
        agent.eod(instance, status);
    }
    settle(&mut session);

    assert_eq!(session.plan().group(0).unwrap().result, ResultState::Failed);
    assert_eq!(session.plan().group(0).unwrap().headline, Some(1));
    let verdict = session.final_result().unwrap();
    assert_eq!(verdict.primary, ResultState::Failed);
    assert_eq!(verdict.filtered, ResultState::Failed);
    assert!(agent
        .log_messages()
        .last()
        .unwrap()
        .ends_with("Test execution completed:FAILED"));
}

#[test]
fn filtered_view_uses_agent_filter_report() {
    let mut config = two_groups();
    config.filter = FilterConfig {
        enabled: true,
        show_filtered: true,
    };
    let (mut session, agent, _clock) =
        common::ready(config, &["a1", "a2", "b1"], json!({"results_valid": 1}));
    agent.clear_sent();
    session.run().unwrap();
    for (method, instance) in [("a1", "a1_0"), ("a2", "a2_0"), ("b1", "b1_0")] {
        agent.started(id(&agent, method), instance);
    }
    agent.eod("a1_0", 0);
    agent.eod("b1_0", 0);
    agent.message(&json!({
        "jsonrpc": "2.0",
        "id": null,
        "method": "eod",
        "params": {"status": -106, "diag": "a2_0", "filterenabled": 1, "filterstatus": 1}
    }));
    settle(&mut session);

    let verdict = session.final_result().unwrap();
    assert_eq!(verdict.primary, ResultState::Warning);
    assert_eq!(verdict.filtered, ResultState::Failed);
    assert_eq!(verdict.displayed(), ResultState::Failed);
    assert_eq!(session.plan().group(0).unwrap().filtered_result, ResultState::Failed);
}

#[test]
fn builtin_order_runs_tuner_after_decoder() {
    let all = [
        "hdd_status",
        "flash_status",
        "dram_status",
        "hdmiout_status",
        "mcard_status",
        "ir_status",
        "rf4ce_status",
        "moca_status",
        "avdecoder_qam_status",
        "tuner_status",
        "modem_status",
    ];
    let (mut session, agent, _clock) =
        common::ready(HwstConfig::default(), &all, json!({"results_valid": 1}));
    agent.clear_sent();
    session.run().unwrap();
    let first: Vec<&str> = all
        .iter()
        .copied()
        .filter(|name| *name != "tuner_status")
        .collect();
    assert_eq!(agent.requested(), first);

    agent.started(id(&agent, "avdecoder_qam_status"), "avdecoder_qam_status");
    agent.eod("avdecoder_qam_status", 0);
    settle(&mut session);
    assert_eq!(agent.requested().last().map(String::as_str), Some("tuner_status"));
}

#[test]
fn pruned_predecessor_moves_tuner_to_first_batch() {
    let (mut session, agent, _clock) = common::ready(
        HwstConfig::default(),
        &["hdd_status", "tuner_status"],
        json!({"results_valid": 1}),
    );
    agent.clear_sent();
    session.run().unwrap();
    assert_eq!(agent.requested(), vec!["hdd_status", "tuner_status"]);
}

#[test]
fn cancel_all_waits_for_breaks_before_final() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    let old_b1 = id(&agent, "b1");
    agent.started(id(&agent, "a1"), "a1_0");
    settle(&mut session);
    session.take_events();

    session.cancel_all().unwrap();
    assert_eq!(session.stage(), Stage::Cancelling);
    assert!(session.is_cancelling());
    assert_eq!(agent.notifications("DIAG"), vec![json!({"break": "a1_0"})]);
    let plan = session.plan();
    assert_eq!(plan.element(1).unwrap().result, ResultState::Cancelling);
    let a2 = plan.element(2).unwrap();
    assert_eq!(a2.result, ResultState::Cancelled);
    assert_eq!(a2.status, -2);
    assert_eq!(a2.data, Some(json!("Cancelled")));
    assert_eq!(plan.element(3).unwrap().result, ResultState::Cancelled);
    assert!(final_of(&events_of(&mut session)).is_none());
    assert_eq!(session.run(), Err(SessionError::StillCancelling));

    // a cancelled element that starts late is broken right away
    agent.started(id(&agent, "a2"), "a2_0");
    settle(&mut session);
    assert_eq!(
        agent.notifications("DIAG"),
        vec![json!({"break": "a1_0"}), json!({"break": "a2_0"})]
    );
    assert_eq!(session.plan().element(2).unwrap().result, ResultState::Cancelling);

    agent.eod("a1_0", -2);
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Cancelling);

    agent.eod("a2_0", -2);
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Finished);
    let a2 = session.plan().element(2).unwrap();
    assert_eq!(a2.result, ResultState::Warning);
    assert_eq!(a2.status, -2);
    let verdict = final_of(&events_of(&mut session)).unwrap();
    assert_eq!(verdict.primary, ResultState::Warning);

    // rerun; the first run's b1 starting now belongs to nobody
    session.run().unwrap();
    assert!(agent
        .log_messages()
        .contains(&"Test execution restart".to_owned()));
    agent.started(old_b1, "b1_0");
    settle(&mut session);
    assert_eq!(
        agent.notifications("DIAG").last(),
        Some(&json!({"break": "b1_0"}))
    );
    assert_eq!(session.plan().element(3).unwrap().result, ResultState::NotRun);
}

#[test]
fn late_starter_outcome_is_recorded_after_cancel_all() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    agent.started(id(&agent, "a1"), "a1_0");
    settle(&mut session);
    session.cancel_all().unwrap();

    agent.started(id(&agent, "a2"), "a2_0");
    agent.eod("a2_0", 1);
    settle(&mut session);
    let a2 = session.plan().element(2).unwrap();
    assert_eq!(a2.result, ResultState::Error);
    assert_eq!(a2.status, 1);
    assert_eq!(session.plan().group(0).unwrap().result, ResultState::Failed);
    assert!(events_of(&mut session).contains(&SessionEvent::ElementResult {
        ordinal: 2,
        result: ResultState::Error,
        status: 1
    }));
    assert_eq!(session.stage(), Stage::Cancelling);

    agent.eod("a1_0", -2);
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Finished);
    assert_eq!(session.final_result().unwrap().primary, ResultState::Failed);
}

#[test]
fn cancel_all_keeps_finished_outcomes() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    agent.started(id(&agent, "a1"), "a1_0");
    agent.eod("a1_0", 0);
    agent.started(id(&agent, "a2"), "a2_0");
    agent.eod("a2_0", 1);
    agent.started(id(&agent, "b1"), "b1_0");
    settle(&mut session);
    assert_eq!(session.plan().group(0).unwrap().result, ResultState::Failed);
    session.take_events();

    session.cancel_all().unwrap();
    assert_eq!(agent.notifications("DIAG"), vec![json!({"break": "b1_0"})]);
    let plan = session.plan();
    let a1 = plan.element(1).unwrap();
    assert_eq!((a1.result, a1.status), (ResultState::Passed, 0));
    let a2 = plan.element(2).unwrap();
    assert_eq!((a2.result, a2.status), (ResultState::Error, 1));
    assert_eq!(plan.group(0).unwrap().result, ResultState::Failed);
    assert_eq!(plan.group(0).unwrap().headline, Some(2));
    assert_eq!(plan.element(3).unwrap().result, ResultState::Cancelling);
    assert!(!events_of(&mut session)
        .iter()
        .any(|event| matches!(event, SessionEvent::GroupResult { group: 0, .. })));
}

#[test]
fn repeated_diag_name_runs_every_listed_copy() {
    let config = HwstConfig {
        catalog: Catalog::new(vec![
            GroupSpec::new("A", [DiagSpec::new("x")]),
            GroupSpec::new("B", [DiagSpec::new("y"), DiagSpec::new("x")]),
        ]),
        order: Vec::new(),
        ..HwstConfig::default()
    };
    let (mut session, agent, _clock) =
        common::ready(config, &["x", "y"], json!({"results_valid": 1}));
    agent.clear_sent();
    session.run().unwrap();
    assert_eq!(agent.requested(), vec!["x", "y", "x"]);
    assert!(session.plan().elements().all(|element| element.issued));
}

#[test]
fn cancel_all_without_running_elements_finishes_at_once() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    session.cancel_all().unwrap();
    assert_eq!(session.stage(), Stage::Finished);
    assert!(agent.notifications("DIAG").is_empty());
    assert_eq!(session.final_result().unwrap().primary, ResultState::Warning);
}

#[test]
fn in_progress_timeout_cancels_the_run() {
    let mut config = two_groups();
    config.timeouts.in_progress = Duration::from_secs(10);
    let (mut session, agent, clock) =
        common::ready(config, &["a1", "a2", "b1"], json!({"results_valid": 1}));
    session.run().unwrap();
    agent.started(id(&agent, "a1"), "a1_0");
    settle(&mut session);

    clock.advance(Duration::from_secs(9));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Running);

    clock.advance(Duration::from_secs(2));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Cancelling);
    assert_eq!(agent.notifications("DIAG"), vec![json!({"break": "a1_0"})]);
}

#[test]
fn startup_timeout_aborts() {
    let (mut session, agent, clock) = common::connected(two_groups());
    assert_eq!(session.stage(), Stage::StartupInfo);

    // a failed startup eod does not advance; the timer decides
    agent.started(id(&agent, "sysinfo_info"), "sysinfo_info");
    agent.eod("sysinfo_info", -1);
    settle(&mut session);
    assert_eq!(session.stage(), Stage::StartupInfo);

    clock.advance(Duration::from_secs(3));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Aborted);
    assert!(events_of(&mut session).contains(&SessionEvent::AgentMissing));
    assert!(agent.is_closed());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn silent_capabilities_and_previous_results_time_out() {
    let (mut session, agent, clock) = common::connected(two_groups());
    agent.answer("sysinfo_info", json!({"Vendor": "Acme"}));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Capabilities);

    clock.advance(Duration::from_secs(3));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::PreviousResults);
    assert_eq!(session.catalog().groups().len(), 2);

    // late capabilities are ignored
    agent.answer("capabilities_info", json!({"diags": ["b1"]}));
    settle(&mut session);
    assert_eq!(session.catalog().groups().len(), 2);

    clock.advance(Duration::from_secs(3));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Ready);
    assert_eq!(session.previous_available(), Some(false));
}

#[test]
fn stored_results_can_be_shown_instead_of_running() {
    let payload = json!({
        "results_valid": 0,
        "start_time": "2024-03-05 07:00:00",
        "end_time": "2024-03-05 07:05:00",
        "results": {
            "a1": {"result": 0},
            "a2": {"result": 0},
            "b1": {"result": -218}
        }
    });
    let (mut session, agent, _clock) = common::ready(two_groups(), &["a1", "a2", "b1"], payload);
    assert_eq!(session.previous_available(), Some(true));
    assert!(events_of(&mut session).contains(&SessionEvent::PreviousResults {
        available: true,
        end_time: Some(SmolStr::new("2024-03-05 07:05:00"))
    }));

    session.show_previous().unwrap();
    assert_eq!(session.stage(), Stage::Finished);
    assert_eq!(session.final_result().unwrap().primary, ResultState::Failed);
    assert_eq!(
        agent.log_messages(),
        vec![
            "Show previous results, client ver. 000c".to_owned(),
            "Previous results overall status:FAILED".to_owned()
        ]
    );
    assert!(agent.notifications("TESTRUN").is_empty());
}

#[test]
fn partial_stored_results_are_unavailable() {
    let payload = json!({
        "results_valid": 0,
        "start_time": "2024-03-05 07:00:00",
        "end_time": "2024-03-05 07:05:00",
        "results": {"a1": {"result": 0}}
    });
    let (mut session, _agent, _clock) = common::ready(two_groups(), &["a1", "a2", "b1"], payload);
    assert_eq!(session.previous_available(), Some(false));
    assert!(matches!(
        session.show_previous(),
        Err(SessionError::InvalidStage { operation: "show_previous", .. })
    ));
}

#[test]
fn transport_close_aborts_and_reconnect_restarts() {
    let (mut session, agent, _clock) = ready_two_groups();
    agent.close();
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Aborted);
    assert!(events_of(&mut session).contains(&SessionEvent::AgentMissing));

    let mut connector = MockConnector::new(agent.clone());
    assert_eq!(session.connect(&mut connector), Ok(true));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::StartupInfo);
    assert!(session.device().is_none());
    assert_eq!(session.previous_available(), None);
    assert_eq!(agent.requested().last().map(String::as_str), Some("sysinfo_info"));
}

#[test]
fn refused_connection_reports_transport_error() {
    let mut session = Session::with_clock(two_groups(), ManualClock::new());
    let mut connector = MockConnector::new(MockAgent::default());
    connector.refuse = true;
    assert!(matches!(
        session.connect(&mut connector),
        Err(SessionError::Transport(_))
    ));
    assert_eq!(session.stage(), Stage::Idle);
    assert!(!session.pump(Duration::ZERO));
}

#[test]
fn ready_inactivity_requests_exit() {
    let (mut session, agent, clock) = ready_two_groups();
    clock.advance(Duration::from_secs(300));
    settle(&mut session);
    assert_eq!(session.stage(), Stage::Exited);
    assert!(events_of(&mut session).contains(&SessionEvent::ExitRequested { agent_busy: false }));
    assert!(agent.is_closed());
}

#[test]
fn exit_while_cancelling_reports_busy_agent() {
    let (mut session, agent, _clock) = ready_two_groups();
    session.run().unwrap();
    agent.started(id(&agent, "a1"), "a1_0");
    settle(&mut session);
    session.cancel_all().unwrap();
    assert!(session.request_exit());
    assert_eq!(session.stage(), Stage::Exited);
}

#[test]
fn commands_are_rejected_outside_their_stage() {
    let (mut session, _agent, _clock) = common::connected(two_groups());
    assert!(matches!(
        session.run(),
        Err(SessionError::InvalidStage { operation: "run", .. })
    ));
    assert!(matches!(
        session.cancel_all(),
        Err(SessionError::InvalidStage { operation: "cancel_all", .. })
    ));
}
