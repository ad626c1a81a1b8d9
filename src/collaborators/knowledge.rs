//! In-memory knowledge graph
//!
//! A small directed graph of named concepts (e.g. `Fever -> Infection`).
//! A label is consistent when the graph knows it as a node.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use super::KnowledgeStore;
use crate::error::{CollaboratorError, ConfigError};

/// TOML shape of a knowledge file
///
/// ```toml
/// nodes = ["Infection", "Fever"]
///
/// [[relations]]
/// from = "Fever"
/// to = "Infection"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeDefinition {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationDefinition {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeSet<String>,
    edges: BTreeMap<String, Vec<String>>,
}

impl KnowledgeGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph with the built-in starter relations
    pub fn seeded() -> Self {
        let mut graph = Self::new();
        graph.add_node("Infection");
        graph.add_node("Fever");
        graph.add_relation("Fever", "Infection");
        graph
    }

    pub fn from_definition(definition: KnowledgeDefinition) -> Result<Self, ConfigError> {
        let mut graph = Self::new();
        for node in definition.nodes {
            if node.trim().is_empty() {
                return Err(ConfigError::Definition("knowledge node name is empty".into()));
            }
            graph.add_node(node);
        }
        for relation in definition.relations {
            if relation.from.trim().is_empty() || relation.to.trim().is_empty() {
                return Err(ConfigError::Definition(
                    "knowledge relation has an empty endpoint".into(),
                ));
            }
            graph.add_relation(relation.from, relation.to);
        }
        Ok(graph)
    }

    pub fn from_toml_str(source: &str, origin: &str) -> Result<Self, ConfigError> {
        let definition: KnowledgeDefinition =
            toml::from_str(source).map_err(|e| ConfigError::Toml {
                path: origin.to_string(),
                source: e,
            })?;
        Self::from_definition(definition)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&source, &path.display().to_string())
    }

    pub fn add_node(&mut self, name: impl Into<String>) {
        self.nodes.insert(name.into());
    }

    /// Add a directed relation, creating both endpoints if needed
    pub fn add_relation(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        let targets = self.edges.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains(name)
    }

    pub fn relations_from(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadth-first reachability from `from` to `to`
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        if from == to {
            return true;
        }

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            for next in self.relations_from(node) {
                if next == to {
                    return true;
                }
                queue.push_back(next.as_str());
            }
        }
        false
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeGraph {
    fn name(&self) -> &'static str {
        "knowledge-graph"
    }

    async fn is_consistent(&self, label: &str) -> Result<bool, CollaboratorError> {
        Ok(self.contains(label))
    }
}
