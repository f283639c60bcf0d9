//! Field selection reconciliation.
//!
//! Resolves a persisted selection / ordering / rename list against the live
//! upstream field set. Matching is by `(id, sourceId)` only; aliases are
//! mutable and never used as identity.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::parse::types::{Field, FieldKey, FieldRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldIssue {
    /// Another selected field with a different identity has the same alias.
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledField {
    #[serde(flatten)]
    pub field: Field,
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FieldIssue>,
    /// The editor should open this row for renaming.
    #[serde(default)]
    pub editing: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Matched fields in saved order, then unmatched upstream fields.
    pub total_fields: Vec<ReconciledField>,
    pub selected_fields: Vec<Field>,
    pub error_fields: Vec<ReconciledField>,
    /// Saved entries with no live counterpart.
    pub orphaned: Vec<FieldRef>,
}

impl Reconciliation {
    /// Collisions or an empty selection must surface as `ConfigError`.
    pub fn is_config_error(&self) -> bool {
        !self.error_fields.is_empty() || self.selected_fields.is_empty()
    }

    /// Refreshed selection to persist back into the operator config.
    pub fn saved_config(&self) -> Vec<FieldRef> {
        self.selected_fields.iter().map(Field::to_ref).collect()
    }
}

/// Reconcile `saved` against `upstream`. Binary fields are never offered.
pub fn check_sort_and_rename_fields(upstream: &[Field], saved: &[FieldRef]) -> Reconciliation {
    let live: Vec<&Field> = upstream
        .iter()
        .filter(|f| !f.data_type.is_binary())
        .collect();

    let mut total_fields = Vec::with_capacity(live.len());
    let mut orphaned = Vec::new();

    if saved.is_empty() {
        total_fields.extend(live.iter().map(|f| ReconciledField {
            field: follow_upstream(f, f.alias.clone()),
            selected: true,
            error: None,
            editing: false,
        }));
    } else {
        let by_key: HashMap<FieldKey, &Field> = live.iter().map(|f| (f.key(), *f)).collect();
        let mut matched: HashSet<FieldKey> = HashSet::new();

        for entry in saved {
            let key = entry.key();
            let Some(current) = by_key.get(&key) else {
                orphaned.push(entry.clone());
                continue;
            };
            if !matched.insert(key) {
                continue;
            }
            total_fields.push(ReconciledField {
                field: follow_upstream(current, resolve_alias(entry, current)),
                selected: true,
                error: None,
                editing: false,
            });
        }

        total_fields.extend(
            live.iter()
                .filter(|f| !matched.contains(&f.key()))
                .map(|f| ReconciledField {
                    field: follow_upstream(f, f.alias.clone()),
                    selected: false,
                    error: None,
                    editing: false,
                }),
        );
    }

    mark_repeats(&mut total_fields);

    let selected_fields = total_fields
        .iter()
        .filter(|f| f.selected)
        .map(|f| f.field.clone())
        .collect();
    let error_fields = total_fields
        .iter()
        .filter(|f| f.error.is_some())
        .cloned()
        .collect();

    Reconciliation {
        total_fields,
        selected_fields,
        error_fields,
        orphaned,
    }
}

/// A saved alias that still equals the name it was saved against follows the
/// live upstream alias; anything else is a user rename and is kept.
pub fn resolve_alias(entry: &FieldRef, current: &Field) -> String {
    let Some(saved_alias) = &entry.alias else {
        return current.alias.clone();
    };
    let follows = match &entry.original_name {
        Some(original) => saved_alias == original,
        None => saved_alias == &current.alias,
    };
    if follows {
        current.alias.clone()
    } else {
        saved_alias.clone()
    }
}

fn follow_upstream(current: &Field, alias: String) -> Field {
    Field {
        alias,
        origin_name: current.alias.clone(),
        ..current.clone()
    }
}

fn mark_repeats(fields: &mut [ReconciledField]) {
    let mut by_alias: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, f) in fields.iter().enumerate() {
        if f.selected {
            by_alias.entry(f.field.alias.clone()).or_default().push(i);
        }
    }
    for indices in by_alias.into_values() {
        let identities: HashSet<FieldKey> = indices.iter().map(|&i| fields[i].field.key()).collect();
        if identities.len() < 2 {
            continue;
        }
        for i in indices {
            fields[i].error = Some(FieldIssue::Repeat);
            fields[i].editing = true;
        }
    }
}
