//! Proxy configuration types and loading.
//!
//! Defines upstream servers, tool views, composite tools and cache settings.
//! The loaded [`ProxyConfig`] is an immutable startup snapshot.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::LazyLock,
};

use regex::Regex;
pub use rmcp::model::Tool;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{McpError, McpResult};

/// Name of the view-less tool set served at the root MCP endpoint. Reserved:
/// no configured view may use it.
pub const DEFAULT_VIEW: &str = "default";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Upstream servers keyed by server id.
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, UpstreamServerConfig>,

    /// Tool views keyed by view name.
    #[serde(default)]
    pub tool_views: BTreeMap<String, ToolViewConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub restart: RestartConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamServerConfig {
    #[serde(flatten)]
    pub transport: McpTransport,

    /// Server-level tool overrides, applied when a view does not override the tool.
    #[serde(default, deserialize_with = "tool_overrides")]
    pub tools: BTreeMap<String, ToolConfig>,

    /// Cache large outputs of this server's tools.
    #[serde(default)]
    pub cache_outputs: bool,

    /// Defer connection until the first list or call.
    #[serde(default)]
    pub lazy: bool,

    /// Startup fails when a required server cannot be reached.
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: HashMap<String, String>,
    },
    Sse {
        url: String,
        /// Bearer token for Authorization header
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    Streamable {
        url: String,
        /// Bearer token for Authorization header
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl McpTransport {
    /// Subprocess sessions cannot interleave in-flight requests.
    pub fn is_subprocess(&self) -> bool {
        matches!(self, McpTransport::Stdio { .. })
    }

    fn expand_env(&mut self) {
        match self {
            McpTransport::Stdio { envs, .. } => {
                for value in envs.values_mut() {
                    *value = expand_env_vars(value);
                }
            }
            McpTransport::Sse {
                url,
                token,
                headers,
            }
            | McpTransport::Streamable {
                url,
                token,
                headers,
            } => {
                *url = expand_env_vars(url);
                if let Some(tok) = token.as_mut() {
                    *tok = expand_env_vars(tok);
                }
                for value in headers.values_mut() {
                    *value = expand_env_vars(value);
                }
            }
        }
    }
}

impl fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpTransport::Stdio {
                command,
                args,
                envs,
            } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("envs", &format!("{} vars", envs.len()))
                .finish(),
            McpTransport::Sse {
                url,
                token,
                headers,
            } => f
                .debug_struct("Sse")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "****"))
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
            McpTransport::Streamable {
                url,
                token,
                headers,
            } => f
                .debug_struct("Streamable")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "****"))
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
        }
    }
}

/// Per-tool override: rename, description, aliases and parameter transforms.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Exposed name (defaults to the upstream name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Description; `{original}` is replaced by the upstream description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra exposed names for the same upstream tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<AliasConfig>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterConfig>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            enabled: true,
            aliases: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AliasConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParameterConfig {
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureMode {
    #[default]
    Direct,
    Search,
    SearchPerServer,
}

impl ExposureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureMode::Direct => "direct",
            ExposureMode::Search => "search",
            ExposureMode::SearchPerServer => "search_per_server",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolViewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub exposure_mode: ExposureMode,

    /// server id -> upstream tool name -> override
    #[serde(default, deserialize_with = "view_tool_selection")]
    pub tools: BTreeMap<String, BTreeMap<String, ToolConfig>>,

    /// Expose every tool of every upstream server.
    #[serde(default)]
    pub include_all: bool,

    #[serde(default)]
    pub hooks: HookBindings,

    #[serde(default)]
    pub custom_tools: Vec<CustomToolBinding>,

    #[serde(default)]
    pub composite_tools: BTreeMap<String, CompositeToolConfig>,

    /// Overrides the servers' `cache_outputs` flag for calls through this view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_outputs: Option<bool>,
}

/// Ordered hook keys; YAML accepts a single key or a list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HookBindings {
    #[serde(default, deserialize_with = "one_or_many")]
    pub pre_call: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub post_call: Vec<String>,
}

/// A custom tool bound by registry key. Name and description override the
/// registered tool's own.
#[derive(Debug, Clone, Serialize)]
pub struct CustomToolBinding {
    pub handler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl<'de> Deserialize<'de> for CustomToolBinding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Key(String),
            Full {
                handler: String,
                #[serde(default)]
                name: Option<String>,
                #[serde(default)]
                description: Option<String>,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Key(handler) => CustomToolBinding {
                handler,
                name: None,
                description: None,
            },
            Raw::Full {
                handler,
                name,
                description,
            } => CustomToolBinding {
                handler,
                name,
                description,
            },
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompositeToolConfig {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputSpec>,

    /// Branches in declaration order.
    #[serde(default, deserialize_with = "ordered_branches")]
    pub parallel: Vec<BranchConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSpec {
    #[serde(rename = "type", default = "default_input_type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchConfig {
    pub name: String,
    /// Target in `server.tool` form.
    pub tool: String,
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// HMAC key for capability URLs. Required when caching is enabled.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,

    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Results larger than this many bytes are cached.
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Public base URL used in retrieval links.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,

    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Maximum nesting depth for custom tools re-entering dispatch.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_composite_timeout")]
    pub composite_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestartConfig {
    /// Consecutive reconnect attempts before a server is marked degraded.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_input_type() -> String {
    "string".to_string()
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_min_size() -> usize {
    10_000
}

fn default_preview_chars() -> usize {
    500
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_max_total_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_purge_interval() -> u64 {
    60
}

fn default_max_depth() -> usize {
    8
}

fn default_call_timeout() -> u64 {
    60
}

fn default_composite_timeout() -> u64 {
    120
}

fn default_max_restarts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: None,
            ttl_seconds: default_ttl_seconds(),
            min_size: default_min_size(),
            preview_chars: default_preview_chars(),
            base_url: default_base_url(),
            max_total_bytes: default_max_total_bytes(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            call_timeout_secs: default_call_timeout(),
            composite_timeout_secs: default_composite_timeout(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(key)) => vec![key],
        Some(OneOrMany::Many(keys)) => keys,
    })
}

/// `tool_name:` with no body is an override with all defaults.
fn tool_overrides<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, ToolConfig>, D::Error> {
    let raw: Option<BTreeMap<String, Option<ToolConfig>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, cfg)| (name, cfg.unwrap_or_default()))
        .collect())
}

fn view_tool_selection<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, BTreeMap<String, ToolConfig>>, D::Error> {
    type Raw = BTreeMap<String, Option<BTreeMap<String, Option<ToolConfig>>>>;

    let raw: Option<Raw> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(server, tools)| {
            let tools = tools
                .unwrap_or_default()
                .into_iter()
                .map(|(name, cfg)| (name, cfg.unwrap_or_default()))
                .collect();
            (server, tools)
        })
        .collect())
}

/// Deserialize the `parallel` mapping while keeping document order.
fn ordered_branches<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<BranchConfig>, D::Error> {
    #[derive(Deserialize)]
    struct RawBranch {
        tool: String,
        #[serde(default)]
        args: Map<String, Value>,
    }

    struct BranchVisitor;

    impl<'de> Visitor<'de> for BranchVisitor {
        type Value = Vec<BranchConfig>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of branch name to {tool, args}")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
            let mut branches: Vec<BranchConfig> = Vec::new();
            while let Some((name, raw)) = map.next_entry::<String, RawBranch>()? {
                if branches.iter().any(|b| b.name == name) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate branch name '{}'",
                        name
                    )));
                }
                branches.push(BranchConfig {
                    name,
                    tool: raw.tool,
                    args: raw.args,
                });
            }
            Ok(branches)
        }
    }

    deserializer.deserialize_any(BranchVisitor)
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Expand `${VAR}` references. Unset variables become empty strings.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| {
                warn!("Environment variable '{}' is not set", name);
                String::new()
            })
        })
        .into_owned()
}

/// Split a `server.tool` reference at the first dot.
pub fn split_tool_ref(reference: &str) -> Option<(&str, &str)> {
    let (server, tool) = reference.split_once('.')?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

impl ProxyConfig {
    /// Load configuration from a YAML file
    pub async fn from_file(path: &str) -> McpResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Parse, expand environment references and validate.
    pub fn from_yaml(content: &str) -> McpResult<Self> {
        let mut config: Self = serde_yaml::from_str(content)?;
        for server in config.mcp_servers.values_mut() {
            server.transport.expand_env();
        }
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need upstream catalogs.
    pub fn validate(&self) -> McpResult<()> {
        if self.dispatch.max_depth == 0 {
            return Err(McpError::Config("dispatch.max_depth must be positive".into()));
        }

        if self.cache.enabled {
            match self.cache.secret.as_deref() {
                Some(secret) if !secret.is_empty() => {}
                _ => {
                    return Err(McpError::Config(
                        "cache.secret is required when caching is enabled".into(),
                    ))
                }
            }
            if self.cache.preview_chars > self.cache.min_size {
                return Err(McpError::Config(
                    "cache.preview_chars must not exceed cache.min_size".into(),
                ));
            }
        }

        if self.tool_views.contains_key(DEFAULT_VIEW) {
            return Err(McpError::Config(format!(
                "view name '{}' is reserved for the root endpoint",
                DEFAULT_VIEW
            )));
        }

        for (view_name, view) in &self.tool_views {
            for server in view.tools.keys() {
                if !self.mcp_servers.contains_key(server) {
                    return Err(McpError::Config(format!(
                        "view '{}' references unknown server '{}'",
                        view_name, server
                    )));
                }
            }

            for (tool_name, composite) in &view.composite_tools {
                if composite.parallel.is_empty() {
                    return Err(McpError::Config(format!(
                        "composite tool '{}' in view '{}' has no branches",
                        tool_name, view_name
                    )));
                }
                for branch in &composite.parallel {
                    let Some((server, _)) = split_tool_ref(&branch.tool) else {
                        return Err(McpError::Config(format!(
                            "branch '{}' of '{}' must target 'server.tool', got '{}'",
                            branch.name, tool_name, branch.tool
                        )));
                    };
                    if !self.mcp_servers.contains_key(server) {
                        return Err(McpError::Config(format!(
                            "branch '{}' of '{}' references unknown server '{}'",
                            branch.name, tool_name, server
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn view(&self, name: &str) -> McpResult<&ToolViewConfig> {
        self.tool_views
            .get(name)
            .ok_or_else(|| McpError::ViewNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_default_cache_config() {
        let config = CacheConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.min_size, 10_000);
        assert_eq!(config.preview_chars, 500);
    }

    #[test]
    fn test_yaml_minimal_config() {
        let yaml = r#"
mcp_servers:
  fs:
    protocol: stdio
    command: "fs-server"
"#;

        let config = ProxyConfig::from_yaml(yaml).expect("Failed to parse YAML");
        assert_eq!(config.mcp_servers.len(), 1);
        let fs = &config.mcp_servers["fs"];
        assert!(!fs.lazy);
        assert!(!fs.cache_outputs);
        assert!(fs.transport.is_subprocess());
        assert_eq!(config.dispatch.max_depth, 8);
        assert_eq!(config.restart.max_restarts, 3);
    }

    #[test]
    fn test_yaml_full_view_config() {
        let yaml = r#"
mcp_servers:
  github:
    protocol: streamable
    url: "https://example.com/mcp"
    cache_outputs: true
    tools:
      search_code:
        description: "Search code. {original}"
  fs:
    protocol: stdio
    command: "fs-server"
    lazy: true

tool_views:
  research:
    description: "Research tools"
    exposure_mode: search_per_server
    hooks:
      pre_call: audit
      post_call: [redact, audit]
    tools:
      github:
        search_code:
        get_file:
          name: fetch_file
          parameters:
            ref:
              hidden: true
              default: main
            path:
              rename: file_path
    custom_tools:
      - summarize
      - handler: word_count
        name: count_words
    composite_tools:
      multi_search:
        description: "Search everywhere"
        inputs:
          query: {type: string, required: true}
        parallel:
          zeta:
            tool: github.search_code
            args: {q: "{inputs.query}"}
          alpha:
            tool: fs.grep
            args: {pattern: "{inputs.query}"}
"#;

        let config = ProxyConfig::from_yaml(yaml).expect("Failed to parse YAML");
        let view = config.view("research").unwrap();
        assert_eq!(view.exposure_mode, ExposureMode::SearchPerServer);
        assert_eq!(view.hooks.pre_call, vec!["audit"]);
        assert_eq!(view.hooks.post_call, vec!["redact", "audit"]);

        let github = &view.tools["github"];
        assert!(github["search_code"].enabled);
        assert_eq!(github["get_file"].name.as_deref(), Some("fetch_file"));
        let ref_param = &github["get_file"].parameters["ref"];
        assert!(ref_param.hidden);
        assert_eq!(ref_param.default, Some(Value::from("main")));

        assert_eq!(view.custom_tools.len(), 2);
        assert_eq!(view.custom_tools[0].handler, "summarize");
        assert_eq!(view.custom_tools[1].name.as_deref(), Some("count_words"));

        // Branch order follows the document, not key order.
        let composite = &view.composite_tools["multi_search"];
        let names: Vec<&str> = composite.parallel.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(composite.inputs["query"].required);
    }

    #[test]
    fn test_transport_streamable_debug_masks_token() {
        let yaml = r#"
protocol: streamable
url: "http://localhost:3000/mcp"
token: "secret"
"#;

        let config: UpstreamServerConfig =
            serde_yaml::from_str(yaml).expect("Failed to parse streamable");
        let debug = format!("{:?}", config.transport);
        assert!(debug.contains("****"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_unknown_server_in_view_rejected() {
        let yaml = r#"
tool_views:
  broken:
    tools:
      missing:
        some_tool:
"#;

        let err = ProxyConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[test]
    fn test_default_view_name_reserved() {
        let yaml = r#"
tool_views:
  default:
    include_all: true
"#;

        let err = ProxyConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_cache_requires_secret() {
        let yaml = r#"
cache:
  enabled: true
"#;

        let err = ProxyConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("cache.secret"));
    }

    #[test]
    fn test_bad_branch_target_rejected() {
        let yaml = r#"
mcp_servers:
  fs:
    protocol: stdio
    command: "fs-server"
tool_views:
  v:
    composite_tools:
      c:
        parallel:
          a:
            tool: "no_dot"
"#;

        let err = ProxyConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("server.tool"));
    }

    #[test]
    #[serial]
    fn test_env_expansion() {
        std::env::set_var("VIEW_PROXY_TEST_TOKEN", "tok-123");
        std::env::remove_var("VIEW_PROXY_TEST_UNSET");

        let yaml = r#"
mcp_servers:
  remote:
    protocol: sse
    url: "https://${VIEW_PROXY_TEST_UNSET}example.com/sse"
    headers:
      X-Api-Key: "${VIEW_PROXY_TEST_TOKEN}"
"#;

        let config = ProxyConfig::from_yaml(yaml).unwrap();
        match &config.mcp_servers["remote"].transport {
            McpTransport::Sse { url, headers, .. } => {
                assert_eq!(url, "https://example.com/sse");
                assert_eq!(headers["X-Api-Key"], "tok-123");
            }
            other => panic!("Expected Sse transport, got {:?}", other),
        }

        std::env::remove_var("VIEW_PROXY_TEST_TOKEN");
    }

    #[test]
    fn test_split_tool_ref() {
        assert_eq!(split_tool_ref("fs.read_file"), Some(("fs", "read_file")));
        assert_eq!(split_tool_ref("fs.ns.tool"), Some(("fs", "ns.tool")));
        assert_eq!(split_tool_ref("nodot"), None);
        assert_eq!(split_tool_ref(".tool"), None);
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mcp_servers:\n  fs:\n    protocol: stdio\n    command: fs-server\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = ProxyConfig::from_file(&path).await.unwrap();
        assert!(config.mcp_servers.contains_key("fs"));
    }
}
