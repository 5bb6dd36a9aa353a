//! View resolution: configuration plus upstream catalogs in, a
//! collision-checked [`ResolvedView`] out.
//!
//! Resolution is pure. Everything that can be wrong with a view (unknown
//! tools, hooks or handlers, duplicate names, bad templates) surfaces here as
//! a config error, so dispatch never meets an ambiguous name.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{
    DirectTool, MetaAction, MetaTool, ParamTransforms, ResolvedTool, ResolvedView, SearchCatalog,
    ToolKind, DEFAULT_SEARCH_LIMIT,
};
use crate::{
    composite::CompositeTool,
    core::config::{
        ExposureMode, Tool, ToolConfig, ToolViewConfig, UpstreamServerConfig, DEFAULT_VIEW,
    },
    custom::CustomToolRegistry,
    error::{McpError, McpResult},
    hooks::{HookPipeline, HookRegistry},
};

const ORIGINAL_PLACEHOLDER: &str = "{original}";

/// Everything resolution reads besides the view's own configuration.
pub struct ResolveContext<'a> {
    pub servers: &'a BTreeMap<String, UpstreamServerConfig>,
    /// Catalogs of servers that could be listed. A missing entry means the
    /// server is unavailable, not that it has no tools.
    pub catalogs: &'a BTreeMap<String, Vec<Tool>>,
    pub hooks: &'a HookRegistry,
    pub customs: &'a CustomToolRegistry,
}

/// View-level override over server-level override, field by field.
fn merge_overrides(view: Option<&ToolConfig>, server: Option<&ToolConfig>) -> ToolConfig {
    let (view, server) = match (view, server) {
        (None, None) => return ToolConfig::default(),
        (Some(v), None) => return v.clone(),
        (None, Some(s)) => return s.clone(),
        (Some(v), Some(s)) => (v, s),
    };

    let mut parameters = server.parameters.clone();
    parameters.extend(view.parameters.clone());
    ToolConfig {
        name: view.name.clone().or_else(|| server.name.clone()),
        description: view
            .description
            .clone()
            .or_else(|| server.description.clone()),
        enabled: view.enabled && server.enabled,
        aliases: if view.aliases.is_empty() {
            server.aliases.clone()
        } else {
            view.aliases.clone()
        },
        parameters,
    }
}

fn describe(template: Option<&str>, original: &str) -> String {
    match template {
        Some(t) => t.replace(ORIGINAL_PLACEHOLDER, original),
        None => original.to_string(),
    }
}

/// Exposed entries for one upstream tool: none when disabled, one per alias
/// when aliases are configured, else one.
fn resolve_direct(
    server: &str,
    tool: &Tool,
    overrides: &ToolConfig,
) -> McpResult<Vec<ResolvedTool>> {
    if !overrides.enabled {
        debug!(server = %server, tool = %tool.name, "Skipping disabled tool");
        return Ok(Vec::new());
    }

    let params = ParamTransforms::new(&tool.name, &overrides.parameters, &tool.input_schema)?;
    let schema = Arc::new(params.transform_schema(&tool.input_schema));
    let original = tool.description.as_deref().unwrap_or_default();
    let description = describe(overrides.description.as_deref(), original);
    let direct = DirectTool {
        server: server.to_string(),
        upstream_name: tool.name.to_string(),
        params,
    };

    let entry = |name: String, description: String| ResolvedTool {
        name,
        description,
        input_schema: Arc::clone(&schema),
        kind: ToolKind::Direct(direct.clone()),
    };

    if overrides.aliases.is_empty() {
        let name = overrides
            .name
            .clone()
            .unwrap_or_else(|| tool.name.to_string());
        return Ok(vec![entry(name, description)]);
    }
    Ok(overrides
        .aliases
        .iter()
        .map(|alias| {
            let alias_description = alias
                .description
                .as_deref()
                .map(|d| describe(Some(d), original))
                .unwrap_or_else(|| description.clone());
            entry(alias.name.clone(), alias_description)
        })
        .collect())
}

fn find_tool<'t>(catalog: &'t [Tool], name: &str) -> Option<&'t Tool> {
    catalog.iter().find(|t| t.name == name)
}

struct Resolver<'a, 'c> {
    view_name: &'a str,
    config: &'a ToolViewConfig,
    ctx: &'a ResolveContext<'c>,
}

impl<'a, 'c> Resolver<'a, 'c> {
    fn config_error(&self, message: String) -> McpError {
        McpError::Config(format!("view '{}': {}", self.view_name, message))
    }

    fn server(&self, server: &str) -> McpResult<&UpstreamServerConfig> {
        self.ctx
            .servers
            .get(server)
            .ok_or_else(|| self.config_error(format!("unknown server '{}'", server)))
    }

    /// Available catalog of `server`, or None (with a warning) when it could
    /// not be listed.
    fn catalog(&self, server: &str) -> Option<&[Tool]> {
        let catalog = self.ctx.catalogs.get(server).map(Vec::as_slice);
        if catalog.is_none() {
            warn!(
                view = %self.view_name,
                server = %server,
                "Upstream catalog unavailable, its tools are left out of the view"
            );
        }
        catalog
    }

    /// Explicitly listed tools must exist in every catalog we could fetch.
    fn check_listed_tools(&self) -> McpResult<()> {
        for (server, tools) in &self.config.tools {
            self.server(server)?;
            let Some(catalog) = self.ctx.catalogs.get(server) else {
                continue;
            };
            for tool in tools.keys() {
                if find_tool(catalog, tool).is_none() {
                    return Err(self.config_error(format!(
                        "tool '{}' not found on server '{}'",
                        tool, server
                    )));
                }
            }
        }
        Ok(())
    }

    /// Servers whose whole catalog backs the view: the listed ones, or all
    /// of them when none are listed or `include_all` is set.
    fn scope_servers(&self) -> Vec<&'a String> {
        if self.config.include_all || self.config.tools.is_empty() {
            self.ctx.servers.keys().collect()
        } else {
            self.config.tools.keys().collect()
        }
    }

    /// Every tool of `server` with merged overrides applied.
    fn server_catalog(&self, server: &str) -> McpResult<Vec<ResolvedTool>> {
        let upstream = self.server(server)?;
        let Some(catalog) = self.catalog(server) else {
            return Ok(Vec::new());
        };
        let view_overrides = self.config.tools.get(server);
        let mut out = Vec::new();
        for tool in catalog {
            let merged = merge_overrides(
                view_overrides.and_then(|o| o.get(&*tool.name)),
                upstream.tools.get(&*tool.name),
            );
            out.extend(resolve_direct(server, tool, &merged)?);
        }
        Ok(out)
    }

    fn direct_tools(&self) -> McpResult<Vec<ResolvedTool>> {
        let mut out = Vec::new();
        if self.config.include_all {
            for server in self.ctx.servers.keys() {
                out.extend(self.server_catalog(server)?);
            }
            return Ok(out);
        }

        for (server, tools) in &self.config.tools {
            let upstream = self.server(server)?;
            let Some(catalog) = self.catalog(server) else {
                continue;
            };
            for (tool_name, view_override) in tools {
                let tool = find_tool(catalog, tool_name).ok_or_else(|| {
                    self.config_error(format!(
                        "tool '{}' not found on server '{}'",
                        tool_name, server
                    ))
                })?;
                let merged = merge_overrides(Some(view_override), upstream.tools.get(tool_name));
                out.extend(resolve_direct(server, tool, &merged)?);
            }
        }
        Ok(out)
    }

    fn fill_catalog(&self, tools: Vec<ResolvedTool>) -> McpResult<SearchCatalog> {
        let mut catalog = SearchCatalog::default();
        for tool in tools {
            let name = tool.name.clone();
            if !catalog.insert(tool) {
                return Err(self.config_error(format!(
                    "tool name '{}' is exposed more than once in the search catalog",
                    name
                )));
            }
        }
        Ok(catalog)
    }

    fn meta_pair(&self, scope: Option<&str>, catalog: SearchCatalog) -> [ResolvedTool; 2] {
        let prefix = match scope {
            Some(server) => format!("{}_{}", self.view_name, server),
            None => self.view_name.to_string(),
        };
        let search_name = format!("{}_search_tools", prefix);
        let call_name = format!("{}_call_tool", prefix);
        let catalog = Arc::new(catalog);

        let search_description = match scope {
            Some(server) => format!(
                "Search for tools from '{}' in the {} view",
                server, self.view_name
            ),
            None => format!("Search for tools in the {} view", self.view_name),
        };
        let call_description = format!(
            "Call a tool in the {} view by name. Use {} first to find available tools.",
            self.view_name, search_name
        );

        let meta = |action| MetaTool {
            action,
            scope: scope.map(str::to_string),
            search_tool_name: search_name.clone(),
            catalog: Arc::clone(&catalog),
        };
        [
            ResolvedTool {
                name: search_name.clone(),
                description: search_description,
                input_schema: Arc::new(search_schema()),
                kind: ToolKind::Meta(meta(MetaAction::Search)),
            },
            ResolvedTool {
                name: call_name,
                description: call_description,
                input_schema: Arc::new(call_schema()),
                kind: ToolKind::Meta(meta(MetaAction::Call)),
            },
        ]
    }

    /// Search modes expose only meta-tool pairs. Composite and custom tools
    /// are reachable through the catalog like any upstream tool.
    fn meta_tools(&self, local: Vec<ResolvedTool>) -> McpResult<Vec<ResolvedTool>> {
        match self.config.exposure_mode {
            ExposureMode::Direct => Ok(Vec::new()),
            ExposureMode::Search => {
                let mut tools = Vec::new();
                for server in self.scope_servers() {
                    tools.extend(self.server_catalog(server)?);
                }
                tools.extend(local);
                let catalog = self.fill_catalog(tools)?;
                Ok(self.meta_pair(None, catalog).into())
            }
            ExposureMode::SearchPerServer => {
                let mut out = Vec::new();
                for server in self.scope_servers() {
                    if !self.ctx.catalogs.contains_key(server.as_str()) {
                        warn!(view = %self.view_name, server = %server, "No search tools for unavailable server");
                        continue;
                    }
                    let catalog = self.fill_catalog(self.server_catalog(server)?)?;
                    out.extend(self.meta_pair(Some(server.as_str()), catalog));
                }
                // Tools with no upstream server get one view-wide pair.
                if !local.is_empty() {
                    let catalog = self.fill_catalog(local)?;
                    out.extend(self.meta_pair(None, catalog));
                }
                Ok(out)
            }
        }
    }

    fn composite_tools(&self) -> McpResult<Vec<ResolvedTool>> {
        let mut out = Vec::new();
        for (name, composite_config) in &self.config.composite_tools {
            let composite = CompositeTool::from_config(name, composite_config)?;
            for branch in &composite.branches {
                let target = &branch.target;
                self.server(&target.server_key)?;
                let Some(catalog) = self.ctx.catalogs.get(&target.server_key) else {
                    continue;
                };
                if find_tool(catalog, &target.tool_name).is_none() {
                    return Err(self.config_error(format!(
                        "composite '{}' branch '{}' targets unknown tool '{}'",
                        name, branch.name, target
                    )));
                }
            }
            out.push(ResolvedTool {
                name: name.clone(),
                description: composite.description.clone(),
                input_schema: Arc::new(composite.input_schema()),
                kind: ToolKind::Composite(Arc::new(composite)),
            });
        }
        Ok(out)
    }

    fn custom_tools(&self) -> McpResult<Vec<ResolvedTool>> {
        self.config
            .custom_tools
            .iter()
            .map(|binding| {
                let tool = self.ctx.customs.resolve(self.view_name, &binding.handler)?;
                Ok(ResolvedTool {
                    name: binding
                        .name
                        .clone()
                        .unwrap_or_else(|| tool.name().to_string()),
                    description: binding
                        .description
                        .clone()
                        .unwrap_or_else(|| tool.description().to_string()),
                    input_schema: Arc::new(tool.input_schema()),
                    kind: ToolKind::Custom(tool),
                })
            })
            .collect()
    }

    fn resolve(&self) -> McpResult<ResolvedView> {
        self.check_listed_tools()?;
        let hooks = HookPipeline::new(
            self.ctx.hooks.resolve(self.view_name, &self.config.hooks.pre_call)?,
            self.ctx.hooks.resolve(self.view_name, &self.config.hooks.post_call)?,
        );

        let mut view = ResolvedView::new(
            self.view_name.to_string(),
            self.config.description.clone(),
            self.config.exposure_mode,
            hooks,
            self.config.cache_outputs,
        );

        let mut local = self.composite_tools()?;
        local.extend(self.custom_tools()?);
        let exposed = match self.config.exposure_mode {
            ExposureMode::Direct => {
                let mut tools = self.direct_tools()?;
                tools.extend(local);
                tools
            }
            ExposureMode::Search | ExposureMode::SearchPerServer => self.meta_tools(local)?,
        };
        self.expose_all(&mut view, exposed)?;

        debug!(
            view = %self.view_name,
            mode = self.config.exposure_mode.as_str(),
            tools = view.tools().len(),
            "Resolved view"
        );
        Ok(view)
    }

    fn expose_all(&self, view: &mut ResolvedView, tools: Vec<ResolvedTool>) -> McpResult<()> {
        let mut kinds: HashMap<String, &'static str> = HashMap::new();
        for tool in tools {
            let name = tool.name.clone();
            let kind = tool.kind.as_str();
            if !view.expose(tool) {
                return Err(self.config_error(format!(
                    "tool name '{}' collides ({} and {})",
                    name,
                    kinds.get(&name).copied().unwrap_or("unknown"),
                    kind
                )));
            }
            kinds.insert(name, kind);
        }
        Ok(())
    }

    /// Every upstream tool, narrowed to the server-level `tools` selection
    /// where a server has one.
    fn default_tools(&self) -> McpResult<Vec<ResolvedTool>> {
        let mut out = Vec::new();
        for (server, upstream) in self.ctx.servers {
            if upstream.tools.is_empty() {
                out.extend(self.server_catalog(server)?);
                continue;
            }
            let Some(catalog) = self.catalog(server) else {
                continue;
            };
            for (tool_name, overrides) in &upstream.tools {
                match find_tool(catalog, tool_name) {
                    Some(tool) => out.extend(resolve_direct(server, tool, overrides)?),
                    None => warn!(
                        server = %server,
                        tool = %tool_name,
                        "Configured tool missing from upstream catalog"
                    ),
                }
            }
        }
        Ok(out)
    }

    fn resolve_default(&self) -> McpResult<ResolvedView> {
        let mut view = ResolvedView::new(
            self.view_name.to_string(),
            self.config.description.clone(),
            ExposureMode::Direct,
            HookPipeline::default(),
            None,
        );
        // Upstream servers may share tool names; the first server in name
        // order keeps the name so startup never depends on catalog overlap.
        for tool in self.default_tools()? {
            let name = tool.name.clone();
            let server = tool.upstream_server().unwrap_or_default().to_string();
            if !view.expose(tool) {
                warn!(tool = %name, server = %server, "Duplicate tool name left out of the default view");
            }
        }
        Ok(view)
    }
}

fn search_schema() -> Map<String, Value> {
    let schema = json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query to find matching tools"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum number of results to return",
                "default": DEFAULT_SEARCH_LIMIT
            }
        },
        "required": ["query"]
    });
    match schema {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn call_schema() -> Map<String, Value> {
    let schema = json!({
        "type": "object",
        "properties": {
            "tool_name": {
                "type": "string",
                "description": "Name of the tool to call, as returned by search"
            },
            "arguments": {
                "type": "object",
                "description": "Arguments for the tool"
            }
        },
        "required": ["tool_name"]
    });
    match schema {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Resolve one view against the current upstream catalogs.
pub fn resolve_view(
    name: &str,
    config: &ToolViewConfig,
    ctx: &ResolveContext<'_>,
) -> McpResult<ResolvedView> {
    Resolver {
        view_name: name,
        config,
        ctx,
    }
    .resolve()
}

/// The view-less tool set served at the root MCP endpoint: every server's
/// tools with server-level overrides, no hooks.
pub fn resolve_default_view(ctx: &ResolveContext<'_>) -> McpResult<ResolvedView> {
    let config = ToolViewConfig {
        description: Some("All upstream server tools".to_string()),
        ..Default::default()
    };
    Resolver {
        view_name: DEFAULT_VIEW,
        config: &config,
        ctx,
    }
    .resolve_default()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        core::config::ProxyConfig,
        custom::CustomTool,
        dispatch::ToolCallContext,
        test_support::{test_tool, test_tool_with_schema},
    };

    struct Fixture {
        config: ProxyConfig,
        catalogs: BTreeMap<String, Vec<Tool>>,
        hooks: HookRegistry,
        customs: CustomToolRegistry,
    }

    struct Now;

    #[async_trait]
    impl CustomTool for Now {
        fn name(&self) -> &str {
            "now"
        }

        fn description(&self) -> &str {
            "Current time"
        }

        async fn call(&self, _args: Map<String, Value>, _ctx: &ToolCallContext) -> McpResult<Value> {
            Ok(json!("12:00"))
        }
    }

    const SERVERS: &str = r#"
mcp_servers:
  github:
    protocol: stdio
    command: gh-mcp
    tools:
      search_code:
        description: "Server: {original}"
  fs:
    protocol: stdio
    command: fs-mcp
"#;

    fn fixture(views: &str) -> Fixture {
        let config = ProxyConfig::from_yaml(&format!("{}\n{}", SERVERS, views)).unwrap();
        let mut catalogs = BTreeMap::new();
        catalogs.insert(
            "github".to_string(),
            vec![
                test_tool_with_schema(
                    "search_code",
                    "Search code in repositories",
                    json!({
                        "type": "object",
                        "properties": {"q": {"type": "string"}, "org": {"type": "string"}},
                        "required": ["q", "org"]
                    }),
                ),
                test_tool("search_issues", "Search issues"),
                test_tool("delete_repo", "Delete a repository"),
            ],
        );
        catalogs.insert(
            "fs".to_string(),
            vec![
                test_tool("read_file", "Read the contents of a file"),
                test_tool("write_file", "Write a file"),
            ],
        );
        let mut customs = CustomToolRegistry::new();
        customs.register("clock", Arc::new(Now));
        Fixture {
            config,
            catalogs,
            hooks: HookRegistry::with_builtins(),
            customs,
        }
    }

    impl Fixture {
        fn resolve(&self, view: &str) -> McpResult<ResolvedView> {
            let ctx = ResolveContext {
                servers: &self.config.mcp_servers,
                catalogs: &self.catalogs,
                hooks: &self.hooks,
                customs: &self.customs,
            };
            resolve_view(view, self.config.view(view)?, &ctx)
        }
    }

    #[test]
    fn test_direct_overrides_and_aliases() {
        let fx = fixture(
            r#"
tool_views:
  dev:
    tools:
      github:
        search_code:
          name: code_search
          parameters:
            org: {hidden: true, default: "acme"}
        search_issues:
          aliases:
            - {name: find_bugs, description: "Bugs. {original}"}
            - {name: find_tasks}
"#,
        );
        let view = fx.resolve("dev").unwrap();
        assert_eq!(view.tool_names(), vec!["code_search", "find_bugs", "find_tasks"]);

        let code = view.get("code_search").unwrap();
        assert_eq!(code.description, "Server: Search code in repositories");
        assert!(code.input_schema["properties"].get("org").is_none());
        assert_eq!(code.input_schema["required"], json!(["q"]));

        assert_eq!(view.get("find_bugs").unwrap().description, "Bugs. Search issues");
        assert_eq!(view.get("find_tasks").unwrap().description, "Search issues");
        assert!(view.get("search_issues").is_none());
        match &view.get("find_tasks").unwrap().kind {
            ToolKind::Direct(direct) => assert_eq!(direct.upstream_name, "search_issues"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_collision_is_config_error() {
        let fx = fixture(
            r#"
tool_views:
  clash:
    tools:
      github:
        search_code: {name: read_file}
      fs:
        read_file: {}
"#,
        );
        let err = fx.resolve("clash").unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
        assert!(err.to_string().contains("read_file"));

        let fx = fixture(
            r#"
tool_views:
  clash:
    tools:
      fs:
        read_file: {}
    composite_tools:
      read_file:
        parallel:
          a: {tool: fs.read_file, args: {}}
"#,
        );
        assert!(matches!(fx.resolve("clash").unwrap_err(), McpError::Config(_)));
    }

    #[test]
    fn test_include_all_and_disabled() {
        let fx = fixture(
            r#"
tool_views:
  everything:
    include_all: true
    tools:
      github:
        delete_repo: {enabled: false}
"#,
        );
        let view = fx.resolve("everything").unwrap();
        let names = view.tool_names();
        assert_eq!(names.len(), 4);
        assert!(!names.contains(&"delete_repo"));
        assert_eq!(
            view.get("search_code").unwrap().description,
            "Server: Search code in repositories"
        );
    }

    #[test]
    fn test_search_mode_exposes_only_meta_pair() {
        let fx = fixture(
            r#"
tool_views:
  lookup:
    exposure_mode: search
    custom_tools: [clock]
    composite_tools:
      both:
        description: Read a file and search code
        parallel:
          file: {tool: fs.read_file, args: {}}
          code: {tool: github.search_code, args: {}}
"#,
        );
        let view = fx.resolve("lookup").unwrap();
        assert_eq!(view.tool_names(), vec!["lookup_search_tools", "lookup_call_tool"]);
        match &view.get("lookup_call_tool").unwrap().kind {
            ToolKind::Meta(meta) => {
                assert_eq!(meta.action, MetaAction::Call);
                assert_eq!(meta.catalog.len(), 7);
                assert!(meta.catalog.get("read_file").is_some());
                assert!(matches!(
                    meta.catalog.get("both").unwrap().kind,
                    ToolKind::Composite(_)
                ));
                assert!(matches!(
                    meta.catalog.get("now").unwrap().kind,
                    ToolKind::Custom(_)
                ));
                assert_eq!(meta.search_tool_name, "lookup_search_tools");
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_search_catalog_collision_with_local_tool() {
        let fx = fixture(
            r#"
tool_views:
  lookup:
    exposure_mode: search
    composite_tools:
      read_file:
        parallel:
          a: {tool: fs.read_file, args: {}}
"#,
        );
        assert!(matches!(fx.resolve("lookup").unwrap_err(), McpError::Config(_)));
    }

    #[test]
    fn test_search_per_server_local_tools_get_view_pair() {
        let fx = fixture(
            r#"
tool_views:
  scoped:
    exposure_mode: search_per_server
    tools:
      fs: {}
    custom_tools: [clock]
"#,
        );
        let view = fx.resolve("scoped").unwrap();
        assert_eq!(
            view.tool_names(),
            vec![
                "scoped_fs_search_tools",
                "scoped_fs_call_tool",
                "scoped_search_tools",
                "scoped_call_tool"
            ]
        );
        match &view.get("scoped_call_tool").unwrap().kind {
            ToolKind::Meta(meta) => {
                assert!(meta.scope.is_none());
                assert_eq!(meta.catalog.len(), 1);
                assert!(meta.catalog.get("now").is_some());
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_default_view_uses_server_selection() {
        let fx = fixture("");
        let ctx = ResolveContext {
            servers: &fx.config.mcp_servers,
            catalogs: &fx.catalogs,
            hooks: &fx.hooks,
            customs: &fx.customs,
        };
        let view = resolve_default_view(&ctx).unwrap();
        assert_eq!(view.name, DEFAULT_VIEW);
        assert_eq!(view.exposure_mode, ExposureMode::Direct);
        assert!(view.hooks.is_empty());
        // github lists only search_code at server level; fs lists nothing.
        assert_eq!(view.tool_names(), vec!["read_file", "write_file", "search_code"]);
        assert_eq!(
            view.get("search_code").unwrap().description,
            "Server: Search code in repositories"
        );
    }

    #[test]
    fn test_search_per_server_scopes() {
        let fx = fixture(
            r#"
tool_views:
  scoped:
    exposure_mode: search_per_server
"#,
        );
        let view = fx.resolve("scoped").unwrap();
        assert_eq!(
            view.tool_names(),
            vec![
                "scoped_fs_search_tools",
                "scoped_fs_call_tool",
                "scoped_github_search_tools",
                "scoped_github_call_tool"
            ]
        );
        match &view.get("scoped_fs_search_tools").unwrap().kind {
            ToolKind::Meta(meta) => {
                assert_eq!(meta.scope.as_deref(), Some("fs"));
                assert_eq!(meta.catalog.len(), 2);
                assert!(meta.catalog.get("search_code").is_none());
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_references() {
        let fx = fixture(
            r#"
tool_views:
  missing_tool:
    tools:
      fs:
        remove_file: {}
  missing_hook:
    hooks: {pre_call: nope}
  missing_handler:
    custom_tools: [nope]
  bad_branch:
    composite_tools:
      combo:
        parallel:
          a: {tool: fs.nope, args: {}}
"#,
        );
        for view in ["missing_tool", "missing_hook", "missing_handler", "bad_branch"] {
            let err = fx.resolve(view).unwrap_err();
            assert!(matches!(err, McpError::Config(_)), "{}: {:?}", view, err);
        }
    }

    #[test]
    fn test_unavailable_catalog_skips_direct_tools() {
        let mut fx = fixture(
            r#"
tool_views:
  partial:
    tools:
      github:
        search_issues: {}
      fs:
        read_file: {}
    composite_tools:
      both:
        parallel:
          a: {tool: github.search_issues, args: {}}
          b: {tool: fs.read_file, args: {}}
"#,
        );
        fx.catalogs.remove("github");
        let view = fx.resolve("partial").unwrap();
        assert_eq!(view.tool_names(), vec!["read_file", "both"]);
    }

    #[test]
    fn test_view_override_wins_over_server() {
        let fx = fixture(
            r#"
tool_views:
  dev:
    tools:
      github:
        search_code:
          description: "View: {original}"
"#,
        );
        let view = fx.resolve("dev").unwrap();
        assert_eq!(
            view.get("search_code").unwrap().description,
            "View: Search code in repositories"
        );
    }
}
