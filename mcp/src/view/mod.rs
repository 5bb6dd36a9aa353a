//! Resolved tool views.
//!
//! A view is resolved once from its configuration and the upstream catalogs
//! into a closed set of exposed tools. Dispatch only ever looks tools up in
//! a [`ResolvedView`]; nothing is resolved at call time.

pub mod params;
pub mod resolver;
pub mod search;

use std::{borrow::Cow, collections::BTreeMap, collections::HashMap, fmt, sync::Arc};

use serde_json::{Map, Value};

pub use params::ParamTransforms;
pub use resolver::{resolve_default_view, resolve_view};
pub use search::{rank, SearchHit, DEFAULT_SEARCH_LIMIT};

use crate::{
    composite::CompositeTool,
    core::config::{ExposureMode, Tool},
    custom::CustomTool,
    hooks::HookPipeline,
};

/// An upstream tool exposed under the view's name for it.
#[derive(Debug, Clone)]
pub struct DirectTool {
    pub server: String,
    pub upstream_name: String,
    pub params: ParamTransforms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaAction {
    Search,
    Call,
}

/// Underlying tools reachable through one search/call pair.
#[derive(Debug, Default)]
pub struct SearchCatalog {
    tools: BTreeMap<String, Arc<ResolvedTool>>,
    hits: Vec<SearchHit>,
}

impl SearchCatalog {
    /// Returns false when the name is already taken.
    pub(crate) fn insert(&mut self, tool: ResolvedTool) -> bool {
        if self.tools.contains_key(&tool.name) {
            return false;
        }
        self.hits.push(SearchHit {
            name: tool.name.clone(),
            description: tool.description.clone(),
            server: tool.upstream_server().unwrap_or_default().to_string(),
        });
        self.tools.insert(tool.name.clone(), Arc::new(tool));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResolvedTool>> {
        self.tools.get(name)
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MetaTool {
    pub action: MetaAction,
    /// Server the pair is scoped to in `search_per_server` mode.
    pub scope: Option<String>,
    /// Name of the sibling search tool, quoted in unknown-tool errors.
    pub search_tool_name: String,
    pub catalog: Arc<SearchCatalog>,
}

/// Closed set of things an exposed name can route to.
#[derive(Clone)]
pub enum ToolKind {
    Direct(DirectTool),
    Composite(Arc<CompositeTool>),
    Custom(Arc<dyn CustomTool>),
    Meta(MetaTool),
}

impl fmt::Debug for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Direct(direct) => f.debug_tuple("Direct").field(direct).finish(),
            ToolKind::Composite(composite) => {
                f.debug_tuple("Composite").field(&composite.name).finish()
            }
            ToolKind::Custom(custom) => f.debug_tuple("Custom").field(&custom.name()).finish(),
            ToolKind::Meta(meta) => f
                .debug_struct("Meta")
                .field("action", &meta.action)
                .field("scope", &meta.scope)
                .field("catalog_size", &meta.catalog.len())
                .finish(),
        }
    }
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Direct(_) => "direct",
            ToolKind::Composite(_) => "composite",
            ToolKind::Custom(_) => "custom",
            ToolKind::Meta(_) => "meta",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub name: String,
    pub description: String,
    pub input_schema: Arc<Map<String, Value>>,
    pub kind: ToolKind,
}

impl ResolvedTool {
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: Cow::Owned(self.name.clone()),
            title: None,
            description: Some(Cow::Owned(self.description.clone())),
            input_schema: Arc::clone(&self.input_schema),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }

    pub fn upstream_server(&self) -> Option<&str> {
        match &self.kind {
            ToolKind::Direct(direct) => Some(&direct.server),
            ToolKind::Meta(meta) => meta.scope.as_deref(),
            _ => None,
        }
    }
}

/// A view after resolution: exposed names are pairwise distinct.
#[derive(Clone)]
pub struct ResolvedView {
    pub name: String,
    pub description: Option<String>,
    pub exposure_mode: ExposureMode,
    pub hooks: HookPipeline,
    /// View-level override of the servers' `cache_outputs` flags.
    pub cache_outputs: Option<bool>,
    tools: Vec<Arc<ResolvedTool>>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ResolvedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedView")
            .field("name", &self.name)
            .field("exposure_mode", &self.exposure_mode)
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ResolvedView {
    pub(crate) fn new(
        name: String,
        description: Option<String>,
        exposure_mode: ExposureMode,
        hooks: HookPipeline,
        cache_outputs: Option<bool>,
    ) -> Self {
        Self {
            name,
            description,
            exposure_mode,
            hooks,
            cache_outputs,
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add an exposed tool; returns false when the name is taken.
    pub(crate) fn expose(&mut self, tool: ResolvedTool) -> bool {
        if self.index.contains_key(&tool.name) {
            return false;
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(Arc::new(tool));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResolvedTool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn tools(&self) -> &[Arc<ResolvedTool>] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Whether results from `server` are cached when called through this view.
    pub fn caches_outputs_of(&self, server_flag: bool) -> bool {
        self.cache_outputs.unwrap_or(server_flag)
    }
}
