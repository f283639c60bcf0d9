//! Process-wide field registry and example-data cache.
//!
//! Field metadata is keyed by catalog field id. Example data is keyed by the
//! node or operator that produced it, then by field id; writers from
//! independent branches never clobber each other unless they pass `cover`.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::parse::types::{DataType, Field, FieldRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogField {
    pub id: String,
    /// Business (display) name.
    pub name: String,
    /// Technical column name.
    pub name_en: String,
    pub data_type: DataType,
    /// Form view or operator the field was first seen on.
    pub origin: String,
}

pub type ExampleData = BTreeMap<String, Vec<serde_json::Value>>;

#[derive(Default)]
pub struct FieldCatalog {
    fields: RwLock<HashMap<String, CatalogField>>,
    examples: RwLock<HashMap<String, ExampleData>>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh canonical metadata (catalog-sourced).
    pub fn upsert(&self, field: CatalogField) {
        self.fields.write().insert(field.id.clone(), field);
    }

    /// Record a derived field unless the id is already known.
    pub fn register(&self, field: &Field, origin: &str) {
        let mut fields = self.fields.write();
        fields.entry(field.id.clone()).or_insert_with(|| CatalogField {
            id: field.id.clone(),
            name: field.origin_name.clone(),
            name_en: field.name_en.clone().unwrap_or_else(|| field.alias.clone()),
            data_type: field.data_type,
            origin: origin.to_string(),
        });
    }

    pub fn get(&self, id: &str) -> Option<CatalogField> {
        self.fields.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    /// Fill missing `name_en` / `original_name` / `data_type` from the registry.
    /// Returns whether anything was filled.
    pub fn backfill(&self, field: &mut FieldRef) -> bool {
        if field.name_en.is_some() && field.original_name.is_some() && field.data_type.is_some() {
            return false;
        }
        let fields = self.fields.read();
        let Some(known) = fields.get(&field.id) else {
            return false;
        };
        let mut filled = false;
        if field.name_en.is_none() {
            field.name_en = Some(known.name_en.clone());
            filled = true;
        }
        if field.original_name.is_none() {
            field.original_name = Some(known.name.clone());
            filled = true;
        }
        if field.data_type.is_none() {
            field.data_type = Some(known.data_type);
            filled = true;
        }
        filled
    }

    /// Merge a whole sample set for `key`. Existing columns are kept unless
    /// `cover` is set.
    pub fn add_example_data(&self, key: &str, data: ExampleData, cover: bool) {
        let mut examples = self.examples.write();
        let entry = examples.entry(key.to_string()).or_default();
        if cover {
            *entry = data;
            return;
        }
        for (field_id, values) in data {
            entry.entry(field_id).or_insert(values);
        }
    }

    /// Add sample values for a single field.
    pub fn add_data(&self, key: &str, field_id: &str, values: Vec<serde_json::Value>, cover: bool) {
        let mut examples = self.examples.write();
        let entry = examples.entry(key.to_string()).or_default();
        if cover || !entry.contains_key(field_id) {
            entry.insert(field_id.to_string(), values);
        }
    }

    pub fn example_data(&self, key: &str) -> Option<ExampleData> {
        self.examples.read().get(key).cloned()
    }
}
