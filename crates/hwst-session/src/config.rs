//! Session configuration loaded from `hwst.toml`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::catalog::{validate_rules, Catalog, DiagSpec, GroupSpec, OrderRule};
use crate::error::SessionError;

pub const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:8002";
pub const DEFAULT_CONTROL_METHOD: &str = "DIAG";
pub const CLIENT_VERSION: &str = "000c";

#[derive(Debug, Clone, PartialEq)]
pub struct HwstConfig {
    pub agent: AgentConfig,
    pub timeouts: Timeouts,
    pub filter: FilterConfig,
    pub catalog: Catalog,
    pub order: Vec<OrderRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub address: SmolStr,
    /// Method carrying break requests.
    pub control_method: SmolStr,
    /// Name reported in run-control log lines.
    pub client_name: SmolStr,
}

/// Stage timeouts; a zero duration disables the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub startup_info: Duration,
    pub capabilities: Duration,
    pub previous_results: Duration,
    pub in_progress: Duration,
    pub ready_inactivity: Duration,
    pub finished_inactivity: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub show_filtered: bool,
}

impl FilterConfig {
    /// Filtered results are displayed only when filtering is on at all.
    #[must_use]
    pub fn displays_filtered(&self) -> bool {
        self.enabled && self.show_filtered
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: SmolStr::new(DEFAULT_ADDRESS),
            control_method: SmolStr::new(DEFAULT_CONTROL_METHOD),
            client_name: SmolStr::new(format!("client ver. {CLIENT_VERSION}")),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_info: Duration::from_secs(3),
            capabilities: Duration::from_secs(3),
            previous_results: Duration::from_secs(3),
            in_progress: Duration::from_secs(180),
            ready_inactivity: Duration::from_secs(300),
            finished_inactivity: Duration::from_secs(600),
        }
    }
}

impl Default for HwstConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            timeouts: Timeouts::default(),
            filter: FilterConfig::default(),
            catalog: Catalog::builtin(),
            order: OrderRule::builtin(),
        }
    }
}

impl HwstConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            SessionError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        let raw: HwstToml = toml::from_str(text)
            .map_err(|err| SessionError::InvalidConfig(format!("hwst.toml: {err}").into()))?;
        raw.into_config()
    }
}

#[derive(Debug, Deserialize)]
struct HwstToml {
    agent: Option<AgentSection>,
    timeouts: Option<TimeoutSection>,
    filter: Option<FilterSection>,
    group: Option<Vec<GroupSection>>,
    order: Option<Vec<OrderSection>>,
}

#[derive(Debug, Deserialize)]
struct AgentSection {
    address: Option<String>,
    control_method: Option<String>,
    client_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeoutSection {
    startup_info: Option<u64>,
    capabilities: Option<u64>,
    previous_results: Option<u64>,
    in_progress: Option<u64>,
    ready_inactivity: Option<u64>,
    finished_inactivity: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilterSection {
    enabled: Option<bool>,
    show_filtered: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GroupSection {
    name: String,
    #[serde(default)]
    diags: Vec<DiagSection>,
}

#[derive(Debug, Deserialize)]
struct DiagSection {
    name: String,
    results_name: Option<String>,
    params: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct OrderSection {
    after: String,
    run: Vec<String>,
}

impl HwstToml {
    fn into_config(self) -> Result<HwstConfig, SessionError> {
        let defaults = HwstConfig::default();

        let agent = match self.agent {
            Some(section) => AgentConfig {
                address: section
                    .address
                    .map_or(defaults.agent.address, SmolStr::new),
                control_method: section
                    .control_method
                    .map_or(defaults.agent.control_method, SmolStr::new),
                client_name: section
                    .client_name
                    .map_or(defaults.agent.client_name, SmolStr::new),
            },
            None => defaults.agent,
        };
        if agent.address.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "agent.address must not be empty".into(),
            ));
        }
        if agent.control_method.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "agent.control_method must not be empty".into(),
            ));
        }

        let timeouts = match self.timeouts {
            Some(section) => {
                let secs = |value: Option<u64>, fallback: Duration| {
                    value.map_or(fallback, Duration::from_secs)
                };
                let base = defaults.timeouts;
                Timeouts {
                    startup_info: secs(section.startup_info, base.startup_info),
                    capabilities: secs(section.capabilities, base.capabilities),
                    previous_results: secs(section.previous_results, base.previous_results),
                    in_progress: secs(section.in_progress, base.in_progress),
                    ready_inactivity: secs(section.ready_inactivity, base.ready_inactivity),
                    finished_inactivity: secs(
                        section.finished_inactivity,
                        base.finished_inactivity,
                    ),
                }
            }
            None => defaults.timeouts,
        };

        let filter = self.filter.map_or(defaults.filter, |section| FilterConfig {
            enabled: section.enabled.unwrap_or(false),
            show_filtered: section.show_filtered.unwrap_or(false),
        });

        let catalog = match self.group {
            Some(groups) if !groups.is_empty() => parse_catalog(groups)?,
            _ => defaults.catalog,
        };

        let order: Vec<OrderRule> = match self.order {
            Some(rules) => rules
                .into_iter()
                .map(|rule| OrderRule::new(rule.after, rule.run))
                .collect(),
            // Built-in rules only survive when the catalog still names both ends.
            None => defaults
                .order
                .into_iter()
                .filter(|rule| {
                    catalog.contains_diag(&rule.after)
                        && rule.run.iter().all(|run| catalog.contains_diag(run))
                })
                .collect(),
        };
        validate_rules(&catalog, &order)?;

        Ok(HwstConfig {
            agent,
            timeouts,
            filter,
            catalog,
            order,
        })
    }
}

fn parse_catalog(groups: Vec<GroupSection>) -> Result<Catalog, SessionError> {
    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(groups.len());
    for group in groups {
        if group.name.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "group.name must not be empty".into(),
            ));
        }
        let mut diags = Vec::with_capacity(group.diags.len());
        for diag in group.diags {
            if diag.name.trim().is_empty() {
                return Err(SessionError::InvalidConfig(
                    format!("group '{}' has a diagnostic without a name", group.name).into(),
                ));
            }
            if !seen.insert(diag.name.clone()) {
                return Err(SessionError::InvalidConfig(
                    format!("diagnostic '{}' listed twice", diag.name).into(),
                ));
            }
            let params = diag
                .params
                .map(serde_json::to_value)
                .transpose()
                .map_err(|err| {
                    SessionError::InvalidConfig(
                        format!("params of '{}': {err}", diag.name).into(),
                    )
                })?;
            diags.push(DiagSpec {
                name: SmolStr::new(&diag.name),
                results_name: diag.results_name.map(SmolStr::new),
                params,
            });
        }
        parsed.push(GroupSpec::new(group.name, diags));
    }
    Ok(Catalog::new(parsed))
}
