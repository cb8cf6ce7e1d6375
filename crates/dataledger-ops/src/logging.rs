// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStage {
    Resolve,
    Hash,
    Transfer,
    Diff,
    Record,
    Handoff,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpEvent {
    pub stage: OpStage,
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

/// Structured trail of what one pipeline invocation did, carried on its
/// result so the front end can render it without parsing log output.
#[derive(Debug, Default, Clone)]
pub struct OpLog {
    events: Vec<OpEvent>,
}

impl OpLog {
    pub fn emit(&mut self, stage: OpStage, name: impl Into<String>, fields: &[(&str, String)]) {
        self.events.push(OpEvent {
            stage,
            name: name.into(),
            fields: fields
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect(),
        });
    }

    #[must_use]
    pub fn events(&self) -> &[OpEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<OpEvent> {
        self.events
    }
}
