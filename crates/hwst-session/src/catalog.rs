//! Diagnostic catalog and run ordering.
//! - Catalog: groups of diagnostics in declaration order, pruned by capabilities
//! - OrderRule/OrderGraph: which ordinals become eligible when another completes

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::SessionError;

/// Ordinal of the synthetic session-start node.
pub const START_ORDINAL: u32 = 0;

/// One diagnostic to run inside a group.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagSpec {
    pub name: SmolStr,
    /// Name used by the agent's stored report, when it differs from `name`.
    pub results_name: Option<SmolStr>,
    pub params: Option<Value>,
}

impl DiagSpec {
    #[must_use]
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            results_name: None,
            params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub name: SmolStr,
    pub diags: Vec<DiagSpec>,
}

impl GroupSpec {
    pub fn new(name: impl Into<SmolStr>, diags: impl IntoIterator<Item = DiagSpec>) -> Self {
        Self {
            name: name.into(),
            diags: diags.into_iter().collect(),
        }
    }
}

/// Immutable input to plan construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
    groups: Vec<GroupSpec>,
}

const DEFAULT_GROUPS: &[(&str, &str)] = &[
    ("Hard Drive", "hdd_status"),
    ("Flash Memory", "flash_status"),
    ("Dynamic RAM", "dram_status"),
    ("HDMI Output", "hdmiout_status"),
    ("Cable Card", "mcard_status"),
    ("IR Remote Interface", "ir_status"),
    ("RF Remote Interface", "rf4ce_status"),
    ("MoCA", "moca_status"),
    ("Audio/Video Decoder", "avdecoder_qam_status"),
    ("Tuner", "tuner_status"),
    ("Cable Modem", "modem_status"),
];

impl Catalog {
    #[must_use]
    pub fn new(groups: Vec<GroupSpec>) -> Self {
        Self { groups }
    }

    /// Built-in set-top box catalog, one diagnostic per group.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_GROUPS
                .iter()
                .map(|(group, diag)| GroupSpec::new(*group, [DiagSpec::new(*diag)]))
                .collect(),
        )
    }

    #[must_use]
    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    pub fn diags(&self) -> impl Iterator<Item = &DiagSpec> {
        self.groups.iter().flat_map(|group| group.diags.iter())
    }

    #[must_use]
    pub fn contains_diag(&self, name: &str) -> bool {
        self.diags().any(|diag| diag.name == name)
    }

    /// Dense 1-based ordinals in declaration order, one per listed diagnostic.
    pub fn ordinals(&self) -> impl Iterator<Item = (u32, &DiagSpec)> {
        (1..).zip(self.diags())
    }

    /// Ordinal of the first diagnostic called `name`.
    #[must_use]
    pub fn ordinal_of(&self, name: &str) -> Option<u32> {
        self.ordinals()
            .find(|(_, diag)| diag.name == name)
            .map(|(ordinal, _)| ordinal)
    }

    /// Keep the groups that contain at least one available diagnostic.
    ///
    /// When nothing matches the report is treated as broken and the full catalog is kept.
    #[must_use]
    pub fn prune_to_capabilities<S: AsRef<str>>(&self, available: &[S]) -> Self {
        let available: HashSet<&str> = available.iter().map(|name| name.as_ref()).collect();
        let groups: Vec<GroupSpec> = self
            .groups
            .iter()
            .filter(|group| {
                group
                    .diags
                    .iter()
                    .any(|diag| available.contains(diag.name.as_str()))
            })
            .cloned()
            .collect();
        if groups.is_empty() {
            warn!("capabilities matched no diagnostics, keeping the full catalog");
            return self.clone();
        }
        debug!(
            kept = groups.len(),
            total = self.groups.len(),
            "catalog pruned to capabilities"
        );
        Self::new(groups)
    }
}

/// `run` diagnostics become eligible once `after` completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRule {
    pub after: SmolStr,
    pub run: Vec<SmolStr>,
}

impl OrderRule {
    pub fn new(after: impl Into<SmolStr>, run: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self {
            after: after.into(),
            run: run.into_iter().map(Into::into).collect(),
        }
    }

    /// Audio/video decoding has to finish before the tuners are exercised.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![Self::new("avdecoder_qam_status", ["tuner_status"])]
    }
}

/// Reject rules naming unknown diagnostics, diagnostics with two predecessors, and cycles.
pub fn validate_rules(catalog: &Catalog, rules: &[OrderRule]) -> Result<(), SessionError> {
    let mut predecessor: HashMap<&str, &str> = HashMap::new();
    for rule in rules {
        if !catalog.contains_diag(&rule.after) {
            return Err(SessionError::InvalidConfig(
                format!("order rule names unknown diagnostic '{}'", rule.after).into(),
            ));
        }
        for run in &rule.run {
            if !catalog.contains_diag(run) {
                return Err(SessionError::InvalidConfig(
                    format!("order rule names unknown diagnostic '{run}'").into(),
                ));
            }
            if let Some(previous) = predecessor.insert(run.as_str(), rule.after.as_str()) {
                return Err(SessionError::InvalidConfig(
                    format!("'{run}' runs after both '{previous}' and '{}'", rule.after).into(),
                ));
            }
        }
    }
    for start in predecessor.keys() {
        let mut seen = HashSet::from([*start]);
        let mut current = *start;
        while let Some(next) = predecessor.get(current) {
            if !seen.insert(*next) {
                return Err(SessionError::InvalidConfig(
                    format!("order rules form a cycle through '{next}'").into(),
                ));
            }
            current = *next;
        }
    }
    Ok(())
}

/// Successor lists keyed by ordinal; ordinal 0 holds the initial batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderGraph {
    successors: BTreeMap<u32, Vec<u32>>,
}

impl OrderGraph {
    #[must_use]
    pub fn new(successors: BTreeMap<u32, Vec<u32>>) -> Self {
        Self { successors }
    }

    /// Derive the graph for `catalog` from name-based rules.
    ///
    /// A diagnostic whose predecessor was pruned away starts with the initial batch.
    #[must_use]
    pub fn from_rules(catalog: &Catalog, rules: &[OrderRule]) -> Self {
        let mut predecessor: HashMap<u32, u32> = HashMap::new();
        for rule in rules {
            let after = catalog.ordinal_of(&rule.after).unwrap_or(START_ORDINAL);
            for run in &rule.run {
                if let Some(ordinal) = catalog.ordinal_of(run) {
                    predecessor.insert(ordinal, after);
                }
            }
        }

        let mut successors: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        successors.insert(START_ORDINAL, Vec::new());
        for (ordinal, _) in catalog.ordinals() {
            let after = predecessor.get(&ordinal).copied().unwrap_or(START_ORDINAL);
            successors.entry(after).or_default().push(ordinal);
        }
        Self { successors }
    }

    /// Ordinals unlocked by completion of `ordinal`.
    #[must_use]
    pub fn successors(&self, ordinal: u32) -> &[u32] {
        self.successors
            .get(&ordinal)
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.successors
            .iter()
            .map(|(ordinal, next)| (*ordinal, next.as_slice()))
    }
}
