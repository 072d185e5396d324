//! Run plan built from a catalog: groups, elements and ordinal lookup.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use smol_str::SmolStr;

use crate::catalog::Catalog;
use crate::errcodes;

/// Flat per-element and per-group status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultState {
    #[default]
    NotRun,
    Running,
    Cancelling,
    Cancelled,
    Passed,
    Failed,
    Disabled,
    Pending,
    Error,
    Warning,
}

impl ResultState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NotRun => "not-run",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Disabled => "disabled",
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    /// Failed and error both count as a hard failure when aggregating.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One diagnostic in the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub ordinal: u32,
    pub name: SmolStr,
    pub results_name: Option<SmolStr>,
    pub params: Option<Value>,
    pub progress: u8,
    pub result: ResultState,
    pub status: i64,
    pub data: Option<Value>,
    pub filter_status: i64,
    pub filter_result: ResultState,
    /// A start request has been sent for this element.
    pub issued: bool,
}

impl Element {
    /// Name the agent's stored report uses for this element.
    #[must_use]
    pub fn report_name(&self) -> &str {
        self.results_name.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.progress == 100
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: SmolStr,
    pub elements: Vec<Element>,
    pub progress: u8,
    pub result: ResultState,
    pub filtered_result: ResultState,
    /// Element whose status explains a non-passed group result.
    pub headline: Option<u32>,
}

impl Group {
    #[must_use]
    pub fn headline_element(&self) -> Option<&Element> {
        let ordinal = self.headline?;
        self.elements.iter().find(|element| element.ordinal == ordinal)
    }
}

/// Groups in catalog order with dense 1-based element ordinals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub(crate) groups: Vec<Group>,
    index: HashMap<u32, (usize, usize)>,
}

impl Plan {
    /// Empty groups are finalized immediately as complete with a warning.
    #[must_use]
    pub fn build(catalog: &Catalog) -> Self {
        let mut groups = Vec::with_capacity(catalog.groups().len());
        let mut index = HashMap::new();
        let mut ordinal = 0_u32;
        for (group_index, spec) in catalog.groups().iter().enumerate() {
            let mut elements = Vec::with_capacity(spec.diags.len());
            for (element_index, diag) in spec.diags.iter().enumerate() {
                ordinal += 1;
                index.insert(ordinal, (group_index, element_index));
                elements.push(Element {
                    ordinal,
                    name: diag.name.clone(),
                    results_name: diag.results_name.clone(),
                    params: diag.params.clone(),
                    progress: 0,
                    result: ResultState::NotRun,
                    status: errcodes::DEFAULT_RESULT_VALUE,
                    data: None,
                    filter_status: errcodes::SUCCESS,
                    filter_result: ResultState::NotRun,
                    issued: false,
                });
            }
            let empty = elements.is_empty();
            groups.push(Group {
                name: spec.name.clone(),
                elements,
                progress: if empty { 100 } else { 0 },
                result: if empty {
                    ResultState::Warning
                } else {
                    ResultState::NotRun
                },
                filtered_result: ResultState::NotRun,
                headline: None,
            });
        }
        Self { groups, index }
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn group(&self, group: usize) -> Option<&Group> {
        self.groups.get(group)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.groups.iter().flat_map(|group| group.elements.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn element(&self, ordinal: u32) -> Option<&Element> {
        let (group, element) = *self.index.get(&ordinal)?;
        self.groups.get(group)?.elements.get(element)
    }

    pub fn element_mut(&mut self, ordinal: u32) -> Option<&mut Element> {
        let (group, element) = *self.index.get(&ordinal)?;
        self.groups.get_mut(group)?.elements.get_mut(element)
    }

    /// Index of the group owning `ordinal`.
    #[must_use]
    pub fn group_of(&self, ordinal: u32) -> Option<usize> {
        self.index.get(&ordinal).map(|(group, _)| *group)
    }

    /// Resolve a stored-report name, preferring the results alias over the plain name.
    #[must_use]
    pub fn ordinal_for_report(&self, name: &str) -> Option<u32> {
        self.elements()
            .find(|element| element.results_name.as_deref() == Some(name))
            .or_else(|| self.elements().find(|element| element.name == name))
            .map(|element| element.ordinal)
    }

    /// Every element has reached 100% progress.
    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.elements().all(Element::is_finished)
    }

    #[must_use]
    pub fn any_cancelling(&self) -> bool {
        self.elements()
            .any(|element| element.result == ResultState::Cancelling)
    }
}
