//! Multi-agent registry — multiplex tool calls across several named remote agents.
//!
//! [`Manager`] holds one [`A2AClient`] per registered agent, keyed by the
//! agent's self-declared `agentCard.name`. Callers route opaque tool calls to
//! a named agent; the manager opens a `message/stream`, folds the
//! heterogeneous event sequence into a list of [`AgentResponse`] records, and
//! classifies any non-text parts as inline images or file references.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::client::{A2AClient, AuthConfig, BootCall, CardResolver, JsonRpcTransport};
use crate::error::{A2AError, A2AResult};
use crate::types::{
    FileContent, Message, Part, Role, SendMessageParams, StreamResponse, TaskState,
};

/// PNG file signature: `\x89PNG`.
const PNG_SIGNATURE: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
/// JPEG file signature: `\xFF\xD8\xFF`.
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];
/// GIF file signature: `GIF`.
const GIF_SIGNATURE: [u8; 3] = [0x47, 0x49, 0x46];

/// An inline image extracted from a non-text part.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Name of the image, taken from the artifact name or a fresh UUID.
    pub name: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

/// A file reference extracted from a non-text part — either inline bytes or
/// a remote URL.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    /// Name of the file, if known.
    pub name: Option<String>,
    /// Inline bytes, if the part carried them.
    pub data: Option<Vec<u8>>,
    /// Remote URL, if the part referenced one instead of carrying bytes.
    pub url: Option<String>,
}

/// One aggregated response folded from a remote agent's event stream.
///
/// Multiple `AgentResponse` records may be emitted for a single
/// [`Manager::agent_call`] — once per streaming chunk or per terminal
/// artifact — in the order they were received.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentResponse {
    /// Accumulated text content for this response.
    pub content: String,
    /// Images extracted from non-text parts.
    pub images: Vec<Image>,
    /// File references extracted from non-text parts.
    pub files: Vec<FileRef>,
}

/// A tool-call request routed to the manager, mirroring the shape of a
/// function/tool call from an LLM tool-use loop.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Name of the target agent (matched against `agentCard.name`).
    pub name: String,
    /// Tool call arguments. Must be a JSON object carrying `instructions`.
    pub arguments: serde_json::Value,
}

/// A tool definition describing one registered agent, in the shape an LLM
/// tool-use loop expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The agent's name, used as the tool name.
    pub name: String,
    /// The agent's description.
    pub description: String,
    /// Discriminator identifying this as an A2A-agent-backed tool.
    #[serde(rename = "type")]
    pub kind: String,
    /// JSON Schema for the tool's single `instructions` parameter.
    pub parameters: serde_json::Value,
}

/// Auth/boot configuration for one server entry in an agent config file.
#[derive(Debug, Clone, Deserialize)]
pub struct BootConfig {
    /// Command to spawn.
    pub command: String,
    /// Arguments to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the spawned process, merged over
    /// [`ManagerConfig::global_env`].
    #[serde(default)]
    pub env: HashMap<String, serde_json::Value>,
}

/// Connection details for an already-running server entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Base URL of the running agent.
    pub url: String,
    /// Bearer token, if the agent requires one.
    pub token: Option<String>,
    /// API key, if the agent requires one.
    pub api_key: Option<String>,
}

/// One entry in an agent config file's `a2aServers` map.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    /// How to start the agent, if it isn't already running.
    pub boot: Option<BootConfig>,
    /// How to reach the agent, if it's already running.
    pub run: Option<RunConfig>,
}

/// Top-level shape of the manager's agent config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Servers to register, keyed by an arbitrary config-file label (not
    /// necessarily the agent's self-declared name — that's resolved once the
    /// agent card is fetched).
    #[serde(rename = "a2aServers")]
    pub a2a_servers: HashMap<String, ServerEntry>,
    /// Environment applied to every booted server, overridden per-server.
    #[serde(rename = "globalEnv", default)]
    pub global_env: HashMap<String, serde_json::Value>,
}

/// Flatten a JSON env value to its wire string form: booleans become
/// `"true"`/`"false"`, numbers their decimal form, strings pass through.
fn flatten_env_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Merge `global_env` and a server's own `env`, with the server's own values
/// taking precedence.
fn merged_env(
    global_env: &HashMap<String, serde_json::Value>,
    server_env: &HashMap<String, serde_json::Value>,
) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for (k, v) in global_env {
        if let Some(flat) = flatten_env_value(v) {
            merged.insert(k.clone(), flat);
        }
    }
    for (k, v) in server_env {
        if let Some(flat) = flatten_env_value(v) {
            merged.insert(k.clone(), flat);
        }
    }
    merged
}

/// Registry of remote A2A agents, keyed by their self-declared name.
///
/// Routes opaque [`ToolCall`]s to the named agent and folds the resulting
/// event stream into [`AgentResponse`] records.
pub struct Manager {
    clients: RwLock<HashMap<String, Arc<A2AClient>>>,
}

impl Manager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Build a manager from a pre-built list of clients, keyed by each
    /// client's cached agent card name.
    ///
    /// Clients without a resolved agent card are skipped.
    pub async fn from_clients(clients: Vec<A2AClient>) -> Self {
        let manager = Self::new();
        for client in clients {
            if let Ok(card) = client.get_card() {
                let name = card.name.clone();
                manager.register(name, Arc::new(client)).await;
            }
        }
        manager
    }

    /// Build a manager from a parsed [`ManagerConfig`], booting or
    /// connecting to each declared server and registering it under its
    /// resolved `agentCard.name`.
    ///
    /// A server that fails to boot, connect, or resolve its card is skipped
    /// with a `tracing::warn!`; one bad entry does not prevent the rest of
    /// the config from loading.
    pub async fn from_config(config: &ManagerConfig) -> Self {
        let manager = Self::new();

        for (label, entry) in &config.a2a_servers {
            match build_client(&config.global_env, entry).await {
                Ok(client) => match client.get_card() {
                    Ok(card) => {
                        let name = card.name.clone();
                        manager.register(name, Arc::new(client)).await;
                    }
                    Err(e) => {
                        tracing::warn!("server '{label}' produced no agent card: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!("failed to connect to server '{label}': {e}");
                }
            }
        }

        manager
    }

    /// Register a client under `name`, replacing any prior registration.
    pub async fn register(&self, name: String, client: Arc<A2AClient>) {
        let mut clients = self.clients.write().await;
        clients.insert(name, client);
    }

    /// Remove a client by name, returning it if it was registered.
    pub async fn remove(&self, name: &str) -> Option<Arc<A2AClient>> {
        let mut clients = self.clients.write().await;
        clients.remove(name)
    }

    /// Produce one tool definition per registered client with a resolved
    /// agent card.
    pub async fn available_tools(&self) -> Vec<ToolDefinition> {
        let clients: Vec<Arc<A2AClient>> = {
            let guard = self.clients.read().await;
            guard.values().cloned().collect()
        };

        clients
            .iter()
            .filter_map(|client| client.get_card().ok())
            .map(|card| ToolDefinition {
                name: card.name.clone(),
                description: card.description.clone(),
                kind: "a2aAgent".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "instructions": { "type": "string" }
                    },
                    "required": ["instructions"]
                }),
            })
            .collect()
    }

    /// Route `call` to the matching registered agent and fold its event
    /// stream into a list of [`AgentResponse`]s.
    ///
    /// Returns an empty list — never an error — if no agent matches the
    /// call's name or the call's arguments are malformed: a single bad tool
    /// call must not poison a batch of sibling calls.
    pub async fn agent_call(&self, call: &ToolCall) -> Vec<AgentResponse> {
        let client = {
            let guard = self.clients.read().await;
            guard.get(&call.name).cloned()
        };
        let Some(client) = client else {
            return Vec::new();
        };

        let Some(instructions) = call
            .arguments
            .as_object()
            .and_then(|obj| obj.get("instructions"))
            .and_then(|v| v.as_str())
        else {
            return Vec::new();
        };

        let message = Message {
            message_id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            kind: "message".to_string(),
            parts: vec![Part::text(instructions)],
            context_id: None,
            task_id: None,
            reference_task_ids: None,
            metadata: None,
            extensions: None,
        };
        let params = SendMessageParams {
            message,
            configuration: None,
            metadata: None,
            tenant: None,
        };

        let mut stream = match client.send_message_stream(params).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("agent '{}' stream failed: {e}", call.name);
                return Vec::new();
            }
        };

        let mut responses = Vec::new();
        let mut pending_text = String::new();
        let mut pending_images = Vec::new();
        let mut pending_files = Vec::new();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!("dropping malformed agent event: {e}");
                    continue;
                }
            };

            match event {
                StreamResponse::Message(message) => {
                    let (text, images, files) = split_parts(&message.parts, None);
                    responses.push(AgentResponse {
                        content: text,
                        images,
                        files,
                    });
                }
                StreamResponse::Task(task) => {
                    for artifact in task.artifacts.into_iter().flatten() {
                        let (text, images, files) = split_parts(&artifact.parts, artifact.name.as_deref());
                        responses.push(AgentResponse {
                            content: text,
                            images,
                            files,
                        });
                    }
                }
                StreamResponse::ArtifactUpdate(update) => {
                    let (text, images, files) =
                        split_parts(&update.artifact.parts, update.artifact.name.as_deref());

                    if update.append == Some(true) {
                        if !pending_text.is_empty() && !text.is_empty() {
                            pending_text.push(' ');
                        }
                        pending_text.push_str(&text);
                    } else {
                        pending_text = text;
                    }
                    pending_images.extend(images);
                    pending_files.extend(files);

                    if update.last_chunk == Some(true) {
                        responses.push(AgentResponse {
                            content: std::mem::take(&mut pending_text),
                            images: std::mem::take(&mut pending_images),
                            files: std::mem::take(&mut pending_files),
                        });
                    }
                }
                StreamResponse::StatusUpdate(update) => {
                    if update.status.state == TaskState::Completed && !pending_text.is_empty() {
                        responses.push(AgentResponse {
                            content: std::mem::take(&mut pending_text),
                            images: std::mem::take(&mut pending_images),
                            files: std::mem::take(&mut pending_files),
                        });
                    }
                }
            }
        }

        responses
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a list of parts into joined text content plus classified
/// non-text (image/file) parts.
fn split_parts(parts: &[Part], artifact_name: Option<&str>) -> (String, Vec<Image>, Vec<FileRef>) {
    let mut texts = Vec::new();
    let mut images = Vec::new();
    let mut files = Vec::new();

    for part in parts {
        match part {
            Part::Text { text, .. } => {
                if !text.is_empty() {
                    texts.push(text.clone());
                }
            }
            Part::File { .. } => match part.decode_file() {
                Some(Ok(FileContent::Bytes(bytes))) => {
                    classify_bytes(bytes, artifact_name, &mut images, &mut files);
                }
                Some(Ok(FileContent::Url(url))) => {
                    files.push(FileRef {
                        name: artifact_name.map(str::to_string),
                        data: None,
                        url: Some(url),
                    });
                }
                _ => {}
            },
            Part::Data { .. } => {
                if let Some(Ok(bytes)) = part.decode_data() {
                    classify_bytes(bytes, artifact_name, &mut images, &mut files);
                }
            }
        }
    }

    (texts.join(" "), images, files)
}

/// Classify decoded bytes as an image (by signature sniffing) or an opaque
/// file reference.
fn classify_bytes(
    bytes: Vec<u8>,
    artifact_name: Option<&str>,
    images: &mut Vec<Image>,
    files: &mut Vec<FileRef>,
) {
    if is_image(&bytes) {
        let name = artifact_name
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        images.push(Image { name, bytes });
    } else {
        files.push(FileRef {
            name: artifact_name.map(str::to_string),
            data: Some(bytes),
            url: None,
        });
    }
}

/// Sniff the leading bytes for a recognized image signature (PNG, JPEG, GIF).
fn is_image(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE) || bytes.starts_with(&JPEG_SIGNATURE) || bytes.starts_with(&GIF_SIGNATURE)
}

/// Connect to (or boot, then connect to) one server entry, returning a ready
/// [`A2AClient`] with its agent card resolved.
async fn build_client(
    global_env: &HashMap<String, serde_json::Value>,
    entry: &ServerEntry,
) -> A2AResult<A2AClient> {
    let run = entry.run.as_ref().ok_or_else(|| {
        A2AError::Transport("server entry has no 'run' connection details".to_string())
    })?;

    let boot = entry.boot.as_ref().map(|boot| {
        let env = merged_env(global_env, &boot.env);
        let mut call = BootCall::new(boot.command.clone());
        for arg in &boot.args {
            call = call.arg(arg.clone());
        }
        for (key, value) in env {
            call = call.env(key, value);
        }
        call
    });

    let resolver = CardResolver::new();
    let card = resolver.resolve_with_boot(&run.url, boot.as_ref()).await?;

    let url = CardResolver::get_a2a_url(&card).ok_or_else(|| {
        A2AError::Transport(format!(
            "agent card for '{}' has no JSONRPC interface",
            card.name
        ))
    })?;

    let auth = AuthConfig {
        bearer_token: run.token.clone(),
        api_key: run.api_key.clone(),
    };
    let transport = JsonRpcTransport::new(url).with_auth(auth);

    Ok(A2AClient::from_card_with_transport(card, Box::new(transport)))
}
