//! # Tool Registry
//!
//! Holds every integration registered at startup together with its declared
//! `ToolSpec` and the compiled input schema. Built once, then shared behind an
//! `Arc` and only read.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::integration::Integration;
use crate::domain::errors::RegistryError;
use crate::domain::traits::IntegrationAdapter;
use crate::domain::types::ToolSpec;

struct Entry {
    spec: ToolSpec,
    schema: JSONSchema,
    integration: Integration,
}

#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under the name its spec declares.
    pub fn register(&mut self, adapter: Arc<dyn IntegrationAdapter>) -> Result<(), RegistryError> {
        let spec = adapter.spec();
        if self.index.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name));
        }

        let schema =
            JSONSchema::compile(&spec.input_schema).map_err(|e| RegistryError::InvalidSchema {
                tool: spec.name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(tool = %spec.name, "Registered tool");
        self.index.insert(spec.name.clone(), self.entries.len());
        self.entries.push(Entry {
            spec,
            schema,
            integration: Integration::new(adapter),
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolSpec, RegistryError> {
        self.entry(name).map(|entry| &entry.spec)
    }

    /// Registered specs in registration order.
    pub fn list(&self) -> Vec<&ToolSpec> {
        self.entries.iter().map(|entry| &entry.spec).collect()
    }

    pub fn integration(&self, name: &str) -> Result<&Integration, RegistryError> {
        self.entry(name).map(|entry| &entry.integration)
    }

    /// Checks `arguments` against the tool's input schema. The error lists
    /// every violation found.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), String> {
        let entry = self.entry(name).map_err(|e| e.to_string())?;
        entry.schema.validate(arguments).map_err(|errors| {
            let reasons: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            format!("arguments for {name} do not match its schema: {}", reasons.join("; "))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&Entry, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }
}
