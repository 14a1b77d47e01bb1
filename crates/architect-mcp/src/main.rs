use architect_core::{AttributeSet, FileStorage, PromptKind, PromptStats, TemplateStore, TextField};
use architect_suggest::{AssistantSession, LlmTransport, SendOutcome, FAILURE_NOTICE};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AttributesRequest {
    /// Prompt kind: "IMAGE" or "TEXT"
    kind: PromptKind,
    /// Field values keyed by field name (see list_fields). Omitted fields are empty.
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ExportRequest {
    /// Prompt kind: "IMAGE" or "TEXT"
    kind: PromptKind,
    /// Field values keyed by field name. Omitted fields are exported as empty strings.
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    /// Optional file path. When set, the export JSON is also written there verbatim.
    path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct KindRequest {
    /// Prompt kind: "IMAGE" or "TEXT"
    kind: PromptKind,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SaveTemplateRequest {
    /// Display name. Must not be blank; duplicates are allowed.
    name: String,
    /// Prompt kind: "IMAGE" or "TEXT"
    kind: PromptKind,
    /// Field values to snapshot. Omitted fields are saved as empty strings.
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct TemplateIdRequest {
    /// Template ID as returned by list_templates or save_template
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AskAssistantRequest {
    /// What to change about the prompt, e.g. "darker mood" or "more detail"
    message: String,
    /// Prompt kind of the current selections: "IMAGE" or "TEXT"
    kind: PromptKind,
    /// Current field values. Their assembled prompt is sent as context.
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

// --- Server ---

#[derive(Clone)]
pub struct ArchitectServer {
    tool_router: ToolRouter<Self>,
    templates: Arc<TemplateStore<FileStorage>>,
    assistant: Arc<AssistantSession>,
}

#[tool_router]
impl ArchitectServer {
    pub fn new() -> Self {
        let transport = Arc::new(LlmTransport::from_global());
        Self::with_parts(
            Arc::new(TemplateStore::global()),
            Arc::new(AssistantSession::new(transport)),
        )
    }

    pub fn with_parts(
        templates: Arc<TemplateStore<FileStorage>>,
        assistant: Arc<AssistantSession>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            templates,
            assistant,
        }
    }

    #[tool(description = "List the attribute fields of a prompt kind with a short hint for each. Image fields are listed in assembly priority order.")]
    fn list_fields(
        &self,
        Parameters(req): Parameters<KindRequest>,
    ) -> Result<CallToolResult, McpError> {
        let text = field_hints(req.kind)
            .into_iter()
            .map(|(key, hint)| format!("{}: {}", key, hint))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Assemble the natural-language prompt for a set of attributes. Image prompts join the non-empty values in a fixed priority order (subject, environment, time of day, art style, mood, lighting, color palette, camera angle, shot type, depth of field, resolution, aspect ratio). Text prompts lay out Task, Context, Target Audience, Output Requirements and Additional Instructions sections. Returns the prompt followed by character and word counts."
    )]
    fn assemble_prompt(
        &self,
        Parameters(req): Parameters<AttributesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let set = match build_set(req.kind, &req.attributes) {
            Ok(s) => s,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        let prompt = set.assemble();
        let stats = PromptStats::of(&prompt);
        Ok(CallToolResult::success(vec![
            Content::text(prompt),
            Content::text(format!("Chars: {}  Words: {}", stats.chars, stats.words)),
        ]))
    }

    #[tool(
        description = "Export the attributes as the canonical JSON document: {_meta: {generator, type, timestamp}, prompt, parameters}. `parameters` always contains every field of the kind, empty ones included. Pass `path` to also write the document to a file."
    )]
    fn export_prompt(
        &self,
        Parameters(req): Parameters<ExportRequest>,
    ) -> Result<CallToolResult, McpError> {
        let set = match build_set(req.kind, &req.attributes) {
            Ok(s) => s,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        let json = match set.export(chrono::Utc::now()).to_json_pretty() {
            Ok(j) => j,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        };

        let mut contents = vec![Content::text(json.clone())];
        if let Some(path) = req.path {
            if let Err(e) = std::fs::write(&path, &json) {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to write '{}': {}",
                    path, e
                ))]));
            }
            info!(path = %path, "wrote prompt export");
            contents.push(Content::text(format!("Wrote {}", path)));
        }
        Ok(CallToolResult::success(contents))
    }

    #[tool(description = "List saved templates of one kind, oldest first. Returns a JSON array of {id, name, type, data, timestamp}.")]
    fn list_templates(
        &self,
        Parameters(req): Parameters<KindRequest>,
    ) -> Result<CallToolResult, McpError> {
        let templates = self.templates.list(req.kind);
        if templates.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "No {} templates saved. Use save_template to create one.",
                req.kind
            ))]));
        }
        let json = serde_json::to_string_pretty(&templates)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Save the given attributes as a named template. Names need not be unique; the returned ID identifies the template.")]
    fn save_template(
        &self,
        Parameters(req): Parameters<SaveTemplateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let set = match build_set(req.kind, &req.attributes) {
            Ok(s) => s,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        match self.templates.save(&req.name, &set) {
            Ok(template) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Saved {} template '{}' with id {}",
                template.kind(),
                template.name,
                template.id
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Load a template by ID. Returns {kind, attributes, prompt} where attributes holds every field of the template's kind.")]
    fn load_template(
        &self,
        Parameters(req): Parameters<TemplateIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.templates.get(&req.id) {
            Ok(template) => {
                let result = serde_json::json!({
                    "kind": template.kind(),
                    "name": template.name,
                    "attributes": template.snapshot,
                    "prompt": template.snapshot.assemble(),
                });
                Ok(CallToolResult::success(vec![Content::text(
                    serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|e| format!("Serialization error: {}", e)),
                )]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Delete a template by ID. Deleting an unknown ID is a no-op.")]
    fn delete_template(
        &self,
        Parameters(req): Parameters<TemplateIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.templates.delete(&req.id) {
            Ok(true) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted template '{}'",
                req.id
            ))])),
            Ok(false) => Ok(CallToolResult::success(vec![Content::text(format!(
                "No template '{}'; nothing deleted",
                req.id
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Ask the prompt assistant for 3 variations of the current prompt, from subtle refinement to creative reimagining. The assembled prompt of the given attributes is sent as context along with your message. Returns a JSON array of {title, content, reasoning}, or the assistant's raw text when it did not answer in that shape. The conversation continues across calls until reset_assistant."
    )]
    async fn ask_assistant(
        &self,
        Parameters(req): Parameters<AskAssistantRequest>,
    ) -> Result<CallToolResult, McpError> {
        let set = match build_set(req.kind, &req.attributes) {
            Ok(s) => s,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        let current_prompt = set.assemble();

        let result = match self.assistant.send(&req.message, &current_prompt).await {
            SendOutcome::Suggestions(suggestions) => CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&suggestions)
                    .unwrap_or_else(|e| format!("Serialization error: {}", e)),
            )]),
            SendOutcome::Fallback(text) => CallToolResult::success(vec![Content::text(text)]),
            SendOutcome::Failed(e) => CallToolResult::error(vec![
                Content::text(FAILURE_NOTICE),
                Content::text(e.to_string()),
            ]),
            SendOutcome::Ignored => {
                CallToolResult::error(vec![Content::text("Message must not be empty.")])
            }
            SendOutcome::Busy => CallToolResult::error(vec![Content::text(
                "The assistant is still answering the previous request.",
            )]),
            SendOutcome::Stale => CallToolResult::error(vec![Content::text(
                "The assistant was reset before the reply arrived.",
            )]),
        };
        Ok(result)
    }

    #[tool(description = "Get the assistant conversation so far as a JSON array of turns.")]
    async fn get_conversation(&self) -> Result<CallToolResult, McpError> {
        let turns = self.assistant.turns().await;
        let json = serde_json::to_string_pretty(&turns)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Clear the assistant conversation and start a fresh session. A reply still in flight is discarded.")]
    async fn reset_assistant(&self) -> Result<CallToolResult, McpError> {
        self.assistant.reset().await;
        Ok(CallToolResult::success(vec![Content::text(
            "Assistant conversation cleared.",
        )]))
    }
}

#[tool_handler]
impl ServerHandler for ArchitectServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn build_set(kind: PromptKind, attributes: &BTreeMap<String, String>) -> Result<AttributeSet, String> {
    AttributeSet::from_fields(kind, attributes.iter().map(|(k, v)| (k, v.clone())))
        .map_err(|e| format!("{}. Valid fields: {}", e, AttributeSet::keys(kind).join(", ")))
}

fn field_hints(kind: PromptKind) -> Vec<(&'static str, &'static str)> {
    match kind {
        PromptKind::Image => architect_core::ImageField::PRIORITY
            .iter()
            .map(|f| (f.key(), f.hint()))
            .collect(),
        PromptKind::Text => TextField::ALL.iter().map(|f| (f.key(), f.hint())).collect(),
    }
}

const INSTRUCTIONS: &str = r#"PromptArchitect builds structured prompts for image and text generation from discrete attributes.

## Kinds
- **IMAGE**: mainSubject, environment, timeOfDay, artStyle, mood, lighting, colorPalette, cameraAngle, shotType, depthOfField, resolution, aspectRatio.
- **TEXT**: purpose, context, audience, writingStyle, tone, length, additionalInstructions.

All values are free-form strings; an empty or omitted field is unset. Call `list_fields` for hints.

## Workflow
1. Fill attributes and call `assemble_prompt` to preview the prompt. Order and layout are fixed by the kind, not by the order you pass fields in.
2. Call `export_prompt` for the canonical JSON document (optionally written to a file).
3. Use `save_template` / `list_templates` / `load_template` / `delete_template` to keep favorite configurations. Templates are scoped by kind.
4. Call `ask_assistant` with the current attributes and a request such as "make it moodier" to get 3 ready-to-use variations. Use `reset_assistant` to start over."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if std::env::args().nth(1).as_deref() == Some("init") {
        if let Err(e) = init_project() {
            eprintln!("architect-mcp init: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let server = ArchitectServer::new();
    server.assistant.initialize().await;

    let service = server
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

// --- Init ---

/// Key our server is registered under in client configs.
const SERVER_KEY: &str = "prompt-architect";

/// MCP clients that `architect-mcp init` can register with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum McpClient {
    ClaudeCode,
    Codex,
}

impl McpClient {
    const ALL: [McpClient; 2] = [McpClient::ClaudeCode, McpClient::Codex];

    fn label(self) -> &'static str {
        match self {
            McpClient::ClaudeCode => "Claude Code",
            McpClient::Codex => "Codex",
        }
    }

    /// Executable whose presence on PATH means the client is installed.
    fn command(self) -> &'static str {
        match self {
            McpClient::ClaudeCode => "claude",
            McpClient::Codex => "codex",
        }
    }

    fn config_path(self, project: &Path) -> PathBuf {
        match self {
            McpClient::ClaudeCode => project.join(".mcp.json"),
            McpClient::Codex => project.join(".codex").join("config.toml"),
        }
    }

    fn merge(self, existing: Option<&str>, binary_path: &str) -> Result<String, String> {
        match self {
            McpClient::ClaudeCode => merge_mcp_json(existing, binary_path),
            McpClient::Codex => merge_codex_toml(existing, binary_path),
        }
    }
}

/// Register architect-mcp in the project-scoped config of every installed
/// client, in the current directory.
fn init_project() -> Result<(), Box<dyn std::error::Error>> {
    let binary_path = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .into_owned();
    let project = std::env::current_dir()?;

    let clients: Vec<McpClient> = McpClient::ALL
        .into_iter()
        .filter(|c| which::which(c.command()).is_ok())
        .collect();
    if clients.is_empty() {
        return Err("neither `claude` nor `codex` is on PATH; install one and re-run".into());
    }

    for &client in &clients {
        let path = register(client, &project, &binary_path)?;
        eprintln!("Wrote {}", path.display());
    }

    let labels: Vec<&str> = clients.iter().map(|c| c.label()).collect();
    eprintln!(
        "\nDone. {} will start architect-mcp in this project.",
        labels.join(" and ")
    );
    Ok(())
}

/// Merge our server entry into `client`'s config under `project`. An
/// existing file that cannot be parsed is left untouched.
fn register(
    client: McpClient,
    project: &Path,
    binary_path: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = client.config_path(project);
    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let merged = client
        .merge(existing.as_deref(), binary_path)
        .map_err(|reason| format!("refusing to rewrite {}: {}", path.display(), reason))?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, merged)?;
    info!(client = client.label(), path = %path.display(), "registered MCP server");
    Ok(path)
}

/// `.mcp.json` with `mcpServers.prompt-architect` set, other entries kept.
fn merge_mcp_json(existing: Option<&str>, binary_path: &str) -> Result<String, String> {
    let mut root = match existing {
        Some(contents) => serde_json::from_str::<serde_json::Value>(contents)
            .map_err(|e| format!("invalid JSON ({})", e))?,
        None => serde_json::json!({}),
    };
    let servers = root
        .as_object_mut()
        .ok_or("top level is not an object")?
        .entry("mcpServers")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .ok_or("`mcpServers` is not an object")?;
    servers.insert(
        SERVER_KEY.to_string(),
        serde_json::json!({
            "type": "stdio",
            "command": binary_path,
            "args": [],
        }),
    );
    serde_json::to_string_pretty(&root).map_err(|e| e.to_string())
}

/// `.codex/config.toml` with `[mcp_servers.prompt-architect]` set, other
/// tables and formatting kept.
fn merge_codex_toml(existing: Option<&str>, binary_path: &str) -> Result<String, String> {
    let mut doc: toml_edit::DocumentMut = existing
        .unwrap_or_default()
        .parse()
        .map_err(|e| format!("invalid TOML ({})", e))?;

    let servers = doc
        .entry("mcp_servers")
        .or_insert(toml_edit::table())
        .as_table_mut()
        .ok_or("`mcp_servers` is not a table")?;

    let mut entry = toml_edit::Table::new();
    entry["command"] = toml_edit::value(binary_path);
    entry["args"] = toml_edit::value(toml_edit::Array::new());
    servers.insert(SERVER_KEY, toml_edit::Item::Table(entry));

    Ok(doc.to_string())
}
