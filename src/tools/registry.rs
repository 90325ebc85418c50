//! Capability-tagged tool registry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::tool::Tool;
use crate::error::RheoError;
use crate::provider::ToolDeclaration;

/// Priority given to tools registered without one.
pub const DEFAULT_PRIORITY: u8 = 50;

/// What a tool is able to do. Used for discovery, not dispatch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCapability {
    Query,
    Modify,
    SchemaChange,
    Explore,
    Analyze,
    Profile,
    Backup,
    Restore,
    Optimize,
    Memory,
    Export,
    Import,
    Read,
    Write,
    Search,
    Audit,
    Permission,
    External,
    CodeExecution,
    WebAccess,
    FileOperation,
}

/// A registered tool with its discovery metadata.
#[derive(Clone)]
pub struct ToolInfo {
    pub tool: Arc<dyn Tool>,
    pub capabilities: BTreeSet<ToolCapability>,
    pub tags: BTreeSet<String>,
    /// 0 to 100, higher first.
    pub priority: u8,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolInfo {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self {
            tool,
            capabilities: BTreeSet::new(),
            tags: BTreeSet::new(),
            priority: DEFAULT_PRIORITY,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = ToolCapability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }
}

impl std::fmt::Debug for ToolInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInfo")
            .field("name", &self.tool.name())
            .field("capabilities", &self.capabilities)
            .field("tags", &self.tags)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Registered tools keyed by name. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, ToolInfo>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register with default metadata.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RheoError> {
        self.register_info(ToolInfo::new(tool))
    }

    /// Register a tool; names must be unique.
    pub fn register_info(&self, info: ToolInfo) -> Result<(), RheoError> {
        let name = info.name().to_string();
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&name) {
            return Err(RheoError::InvalidArgument(format!(
                "tool '{name}' is already registered"
            )));
        }
        tracing::debug!(tool = %name, capabilities = ?info.capabilities, "Registered tool");
        tools.insert(name, info);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<ToolInfo> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.info(name).map(|info| info.tool)
    }

    pub fn info(&self, name: &str) -> Option<ToolInfo> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All infos, priority descending then name.
    fn sorted(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        infos.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name().cmp(b.name()))
        });
        infos
    }

    pub fn names(&self) -> Vec<String> {
        self.sorted().iter().map(|i| i.name().to_string()).collect()
    }

    /// Declarations for the model backend, in a stable order.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.sorted().iter().map(|i| i.tool.declaration()).collect()
    }

    pub fn by_capability(&self, capability: ToolCapability, min_priority: u8) -> Vec<ToolInfo> {
        self.sorted()
            .into_iter()
            .filter(|i| i.priority >= min_priority && i.capabilities.contains(&capability))
            .collect()
    }

    /// Tools having all (`match_all`) or any of `capabilities`.
    pub fn by_capabilities(
        &self,
        capabilities: &[ToolCapability],
        match_all: bool,
    ) -> Vec<ToolInfo> {
        self.sorted()
            .into_iter()
            .filter(|i| {
                if match_all {
                    capabilities.iter().all(|c| i.capabilities.contains(c))
                } else {
                    capabilities.iter().any(|c| i.capabilities.contains(c))
                }
            })
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<ToolInfo> {
        self.sorted()
            .into_iter()
            .filter(|i| i.tags.contains(tag))
            .collect()
    }

    /// Case-insensitive match on name, description or tags.
    pub fn search(&self, query: &str) -> Vec<ToolInfo> {
        let query = query.to_lowercase();
        self.sorted()
            .into_iter()
            .filter(|i| {
                i.name().to_lowercase().contains(&query)
                    || i.tool.description().to_lowercase().contains(&query)
                    || i.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// Tool names per capability.
    pub fn capability_summary(&self) -> BTreeMap<ToolCapability, Vec<String>> {
        let mut summary: BTreeMap<ToolCapability, Vec<String>> = BTreeMap::new();
        for info in self.sorted() {
            for capability in &info.capabilities {
                summary
                    .entry(*capability)
                    .or_default()
                    .push(info.name().to_string());
            }
        }
        summary
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolOutput, ToolParameters};
    use pretty_assertions::assert_eq;

    fn tool(name: &str, description: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            name,
            description,
            ToolParameters::empty(),
            |_args, _ctx, _cancel, _out| async { Ok(ToolOutput::text("ok")) },
        ))
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .register_info(
                ToolInfo::new(tool("sql", "Run SQL statements"))
                    .with_capabilities([ToolCapability::Query, ToolCapability::Modify])
                    .with_tags(["database"])
                    .with_priority(90),
            )
            .unwrap();
        registry
            .register_info(
                ToolInfo::new(tool("schema", "Inspect tables"))
                    .with_capabilities([ToolCapability::Explore, ToolCapability::Query])
                    .with_tags(["database", "readonly"]),
            )
            .unwrap();
        registry
            .register_info(
                ToolInfo::new(tool("fetch", "Fetch a URL"))
                    .with_capabilities([ToolCapability::WebAccess])
                    .with_priority(20),
            )
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = registry();
        assert!(registry.register(tool("sql", "again")).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn capability_lookup_is_priority_ordered() {
        let names: Vec<String> = registry()
            .by_capability(ToolCapability::Query, 0)
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["sql", "schema"]);

        assert_eq!(registry().by_capability(ToolCapability::Query, 60).len(), 1);
    }

    #[test]
    fn match_all_versus_any() {
        let registry = registry();
        let both =
            registry.by_capabilities(&[ToolCapability::Query, ToolCapability::Explore], true);
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].name(), "schema");

        let any =
            registry.by_capabilities(&[ToolCapability::WebAccess, ToolCapability::Explore], false);
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn tag_and_text_search() {
        let registry = registry();
        assert_eq!(registry.by_tag("readonly").len(), 1);
        assert_eq!(registry.search("URL")[0].name(), "fetch");
        assert_eq!(registry.search("database").len(), 2);
    }

    #[test]
    fn declarations_follow_priority() {
        let names: Vec<String> = registry()
            .declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["sql", "schema", "fetch"]);
    }

    #[test]
    fn summary_groups_names_by_capability() {
        let summary = registry().capability_summary();
        assert_eq!(summary[&ToolCapability::Query], vec!["sql", "schema"]);
        assert_eq!(summary[&ToolCapability::WebAccess], vec!["fetch"]);
    }
}
