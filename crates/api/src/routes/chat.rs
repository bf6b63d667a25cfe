//! Streaming chat route.
//!
//! A turn resolves (or creates) the conversation, assembles the system
//! prompt, persists the user message and then streams the model's answer as
//! Server-Sent Events. Tool calls requested by the model are executed
//! between rounds; the assistant message is persisted once the turn ends,
//! even if the client has gone away.

use std::convert::Infallible;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chat_tools::{ToolContext, IMAGE_TOOL, SAVE_MEMORY_TOOL};
use database::validation::{parse_role, validate_message_content, validate_required, validate_uuid};
use database::{
    attachment, conversation, message, AttachmentSource, MessageRole, MessageStatus,
    NewAttachment, NewMessage, TokenUsage, ValidationError,
};
use futures_util::StreamExt;
use llm_client::{
    hash_prompt, ChatMessage, ChatRequest, ContentPart, EventStream, MessageContent, Persona,
    StreamEvent, ToolCallAccumulator, ToolDefinition, Usage,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::auth::MaybeUser;
use crate::error::{ApiError, ApiJson, Result};
use crate::routes::conversations::{create_coalesced, draft_title};
use crate::state::AppState;

/// Model rounds per turn; the last round is offered no tools.
const MAX_ROUNDS: usize = 5;

/// Buffered SSE events before the turn task waits on the client.
const EVENT_BUFFER: usize = 64;

/// Longest accepted attachment URL.
const MAX_URL_LENGTH: usize = 2048;

/// Response header telling the client whether the turn is persisted.
pub const AUTHENTICATED_HEADER: &str = "x-authenticated";
/// Response header carrying the conversation id (authenticated turns only).
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// A prior or current message sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

/// A file attached to the current user message.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl ChatBody {
    fn validate(&self) -> Result<()> {
        let Some(last) = self.messages.last() else {
            return Err(ApiError::BadRequest("messages cannot be empty".to_string()));
        };

        for msg in &self.messages {
            match parse_role(&msg.role)? {
                MessageRole::User | MessageRole::Assistant => {}
                other => {
                    return Err(ApiError::BadRequest(format!(
                        "messages cannot have role '{}'",
                        other.as_str()
                    )))
                }
            }
            validate_message_content(&msg.content)?;
        }

        if last.role != MessageRole::User.as_str() {
            return Err(ApiError::BadRequest(
                "the last message must come from the user".to_string(),
            ));
        }
        if last.content.trim().is_empty() && self.attachments.is_empty() {
            return Err(ValidationError::Empty("content".to_string()).into());
        }

        if let Some(id) = &self.conversation_id {
            validate_uuid("conversation_id", id)?;
        }
        for attachment in &self.attachments {
            validate_required("url", &attachment.url, MAX_URL_LENGTH)?;
        }
        Ok(())
    }

    /// Text of the first user message, used for the draft title.
    fn first_user_text(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::User.as_str())
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Content of the current user message with attachments as extra parts:
/// images become `image_url` parts, other files a text reference.
fn user_content(text: &str, attachments: &[AttachmentRef]) -> MessageContent {
    if attachments.is_empty() {
        return MessageContent::from(text);
    }

    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.trim().is_empty() {
        parts.push(ContentPart::text(text));
    }
    for attachment in attachments {
        if attachment.file_type.starts_with("image/") {
            parts.push(ContentPart::image(&attachment.url));
        } else {
            let name = if attachment.file_name.is_empty() {
                "file"
            } else {
                attachment.file_name.as_str()
            };
            parts.push(ContentPart::text(format!(
                "[Attached file: {} ({}) at {}]",
                name, attachment.file_type, attachment.url
            )));
        }
    }
    MessageContent::Parts(parts)
}

/// Model messages for the turn: system prompt, history, current message.
fn model_messages(system_prompt: String, body: &ChatBody) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(body.messages.len() + 1);
    messages.push(ChatMessage::system(system_prompt));

    let Some((current, history)) = body.messages.split_last() else {
        return messages;
    };
    for msg in history {
        if msg.role == MessageRole::Assistant.as_str() {
            messages.push(ChatMessage::assistant(msg.content.as_str()));
        } else {
            messages.push(ChatMessage::user(msg.content.as_str()));
        }
    }
    messages.push(ChatMessage::user(user_content(&current.content, &body.attachments)));
    messages
}

/// Use the caller's conversation if they own it, otherwise start one.
/// Returns the conversation id and whether it was created for this turn.
async fn resolve_conversation(
    state: &AppState,
    user_id: &str,
    requested: Option<&str>,
    first_message: &str,
) -> Result<(String, bool)> {
    if let Some(id) = requested {
        match conversation::get_conversation(state.db.pool(), user_id, id).await {
            Ok(existing) => return Ok((existing.id, false)),
            Err(e) if e.is_not_found() => {
                debug!(conversation_id = id, "Requested conversation not found, starting a new one");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let created = create_coalesced(state, user_id, &draft_title(first_message)).await?;
    Ok((created.id, true))
}

/// Stream a chat turn.
pub async fn chat(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiJson(body): ApiJson<ChatBody>,
) -> Result<Response> {
    let started = Instant::now();
    body.validate()?;

    let model = state.llm.config().resolve_model(body.model.as_deref())?;
    let persona = body
        .persona
        .as_deref()
        .map(Persona::parse)
        .unwrap_or(Persona::Default);
    let user_id = user.map(|u| u.id);

    let system_prompt = state.system_prompt(user_id.as_deref(), persona).await?;
    let prompt_hash = hash_prompt(&system_prompt);
    let messages = model_messages(system_prompt, &body);

    let tools: Vec<ToolDefinition> = state
        .tools
        .specs()
        .into_iter()
        .map(|spec| ToolDefinition::function(spec.name, spec.description, spec.parameters))
        .collect();

    let first_request = ChatRequest::new(messages.clone())
        .with_model(&model)
        .with_tools(if MAX_ROUNDS > 1 { tools.clone() } else { Vec::new() });
    // Nothing is written until the model has accepted the request.
    let events = state.llm.stream_chat(first_request).await?;

    let (conversation_id, new_conversation) = match &user_id {
        Some(uid) => {
            let (id, created) =
                resolve_conversation(&state, uid, body.conversation_id.as_deref(), body.first_user_text())
                    .await?;
            let current = body.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            persist_user_message(&state, uid, &id, current, &body.attachments).await?;
            (Some(id), created)
        }
        None => (None, false),
    };

    info!(
        user_id = user_id.as_deref().unwrap_or("anonymous"),
        conversation_id = conversation_id.as_deref().unwrap_or("-"),
        model = %model,
        persona = persona.id(),
        "Chat turn started"
    );

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let authenticated = user_id.is_some();
    let turn = Turn {
        state,
        user_id,
        conversation_id: conversation_id.clone(),
        new_conversation,
        first_message: body.first_user_text().to_string(),
        model,
        persona,
        prompt_hash,
        messages,
        tools,
        tx,
        started,
    };
    tokio::spawn(turn.run(events));

    let mut response = Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(AUTHENTICATED_HEADER),
        HeaderValue::from_static(if authenticated { "true" } else { "false" }),
    );
    if let Some(value) = conversation_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        headers.insert(HeaderName::from_static(CONVERSATION_ID_HEADER), value);
    }

    Ok(response)
}

async fn persist_user_message(
    state: &AppState,
    user_id: &str,
    conversation_id: &str,
    content: &str,
    attachments: &[AttachmentRef],
) -> Result<()> {
    let pool = state.db.pool();
    let saved =
        message::insert_message(pool, &NewMessage::new(conversation_id, MessageRole::User, content))
            .await?;

    if !attachments.is_empty() {
        let urls: Vec<String> = attachments.iter().map(|a| a.url.clone()).collect();
        let linked = attachment::link_to_message(pool, user_id, &saved.id, &urls).await?;
        debug!(message_id = %saved.id, linked, "Linked attachments to user message");
    }

    conversation::touch(pool, conversation_id).await?;
    Ok(())
}

/// What a turn produced.
#[derive(Debug, Default)]
struct TurnOutcome {
    content: String,
    reasoning: String,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    tool_results: Vec<Value>,
    images: Vec<String>,
    rounds: usize,
    error: Option<String>,
}

impl TurnOutcome {
    fn add_usage(&mut self, usage: Usage) {
        let total = self.usage.get_or_insert_with(Usage::default);
        total.prompt_tokens += usage.prompt_tokens;
        total.completion_tokens += usage.completion_tokens;
        total.total_tokens += usage.total_tokens;
    }
}

/// A chat turn running on its own task, feeding the SSE channel.
struct Turn {
    state: AppState,
    user_id: Option<String>,
    conversation_id: Option<String>,
    new_conversation: bool,
    first_message: String,
    model: String,
    persona: Persona,
    prompt_hash: String,
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDefinition>,
    tx: mpsc::Sender<std::result::Result<Event, Infallible>>,
    started: Instant,
}

impl Turn {
    /// Send an event to the client. A closed channel is ignored so the turn
    /// still completes and persists.
    async fn emit(&self, name: &str, data: Value) {
        match Event::default().event(name).json_data(data) {
            Ok(event) => {
                if self.tx.send(Ok(event)).await.is_err() {
                    debug!(event = name, "Client disconnected, dropping event");
                }
            }
            Err(e) => warn!(event = name, "Failed to encode SSE event: {}", e),
        }
    }

    fn request(&self, round: usize) -> ChatRequest {
        let tools = if round + 1 < MAX_ROUNDS {
            self.tools.clone()
        } else {
            Vec::new()
        };
        ChatRequest::new(self.messages.clone())
            .with_model(&self.model)
            .with_tools(tools)
    }

    fn tool_context(&self) -> ToolContext {
        match &self.user_id {
            Some(id) => ToolContext::for_user(id.as_str()),
            None => ToolContext::anonymous(),
        }
    }

    async fn run(mut self, first: EventStream) {
        let mut outcome = TurnOutcome::default();
        let mut pending = Some(first);

        for round in 0..MAX_ROUNDS {
            let mut events = match pending.take() {
                Some(events) => events,
                None => match self.state.llm.stream_chat(self.request(round)).await {
                    Ok(events) => events,
                    Err(e) => {
                        outcome.error = Some(e.to_string());
                        break;
                    }
                },
            };
            outcome.rounds = round + 1;

            let mut calls = ToolCallAccumulator::new();
            let mut round_text = String::new();

            while let Some(event) = events.next().await {
                match event {
                    Ok(StreamEvent::TextDelta(delta)) => {
                        round_text.push_str(&delta);
                        self.emit("text", json!({ "delta": delta })).await;
                    }
                    Ok(StreamEvent::ReasoningDelta(delta)) => {
                        outcome.reasoning.push_str(&delta);
                        self.emit("reasoning", json!({ "delta": delta })).await;
                    }
                    Ok(StreamEvent::ToolCallDelta {
                        index,
                        id,
                        name,
                        arguments,
                    }) => calls.push(index, id.as_deref(), name.as_deref(), &arguments),
                    Ok(StreamEvent::Usage(usage)) => outcome.add_usage(usage),
                    Ok(StreamEvent::Finish { finish_reason }) => {
                        outcome.finish_reason = Some(finish_reason);
                    }
                    Err(e) => {
                        outcome.error = Some(e.to_string());
                        break;
                    }
                }
            }

            outcome.content.push_str(&round_text);
            if outcome.error.is_some() {
                break;
            }

            let tool_calls = calls.finish();
            if tool_calls.is_empty() {
                break;
            }

            let text = (!round_text.is_empty()).then_some(round_text);
            self.messages
                .push(ChatMessage::assistant_tool_calls(text, tool_calls.clone()));

            for call in tool_calls {
                let name = call.function.name.as_str();
                self.emit(
                    "tool_call",
                    json!({ "id": call.id, "name": name, "arguments": call.function.arguments }),
                )
                .await;

                let output = self
                    .state
                    .tools
                    .execute_json(name, &call.function.arguments, self.tool_context())
                    .await;

                if output.success {
                    match name {
                        SAVE_MEMORY_TOOL => {
                            if let Some(uid) = &self.user_id {
                                self.state.invalidate_user(uid).await;
                            }
                        }
                        IMAGE_TOOL => {
                            if let Some(url) = output.card.get("url").and_then(Value::as_str) {
                                outcome.images.push(url.to_string());
                            }
                        }
                        _ => {}
                    }
                }

                self.emit(
                    "tool_result",
                    json!({ "id": call.id, "name": name, "result": output.card }),
                )
                .await;

                self.messages
                    .push(ChatMessage::tool_result(call.id.as_str(), output.content()));
                outcome.tool_results.push(json!({
                    "id": call.id,
                    "name": name,
                    "arguments": call.function.arguments,
                    "result": output.card,
                    "success": output.success,
                }));
            }
        }

        let message_id = match self.persist(&outcome).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to persist assistant message: {}", e);
                None
            }
        };

        match &outcome.error {
            Some(error) => {
                warn!(
                    conversation_id = self.conversation_id.as_deref().unwrap_or("-"),
                    "Chat turn failed: {}",
                    error
                );
                self.emit("error", json!({ "message": error })).await;
            }
            None => {
                info!(
                    conversation_id = self.conversation_id.as_deref().unwrap_or("-"),
                    rounds = outcome.rounds,
                    tools = outcome.tool_results.len(),
                    total_tokens = outcome.usage.map(|u| u.total_tokens).unwrap_or(0),
                    "Chat turn finished"
                );
                self.emit(
                    "finish",
                    json!({
                        "finish_reason": outcome.finish_reason.as_deref().unwrap_or("stop"),
                        "usage": outcome.usage,
                        "message_id": message_id,
                    }),
                )
                .await;
                self.spawn_title();
            }
        }
    }

    /// Save the assistant message and generated images. Anonymous turns
    /// are not persisted.
    async fn persist(&self, outcome: &TurnOutcome) -> Result<Option<String>> {
        let (Some(user_id), Some(conversation_id)) = (&self.user_id, &self.conversation_id) else {
            return Ok(None);
        };
        let pool = self.state.db.pool();

        let mut metadata = json!({
            "tool_results": outcome.tool_results,
            "prompt_hash": self.prompt_hash,
            "persona": self.persona.id(),
            "finish_reason": outcome.finish_reason,
        });
        if !outcome.reasoning.is_empty() {
            metadata["reasoning"] = json!(outcome.reasoning);
        }
        if let Some(error) = &outcome.error {
            metadata["error"] = json!(error);
        }

        let mut reply = NewMessage::new(conversation_id, MessageRole::Assistant, &outcome.content);
        reply.model = Some(self.model.clone());
        reply.usage = outcome.usage.map(|u| TokenUsage {
            prompt_tokens: i64::from(u.prompt_tokens),
            completion_tokens: i64::from(u.completion_tokens),
            total_tokens: i64::from(u.total_tokens),
        });
        reply.response_time_ms = Some(self.started.elapsed().as_millis() as i64);
        reply.status = if outcome.error.is_some() {
            MessageStatus::Failed
        } else {
            MessageStatus::Completed
        };
        reply.metadata = metadata;

        let saved = message::insert_message(pool, &reply).await?;

        for url in &outcome.images {
            attachment::insert_attachment(
                pool,
                &NewAttachment {
                    message_id: Some(saved.id.clone()),
                    user_id: user_id.clone(),
                    file_name: "generated-image.png".to_string(),
                    file_type: "image/png".to_string(),
                    file_size: 0,
                    url: url.clone(),
                    storage_path: None,
                    source: AttachmentSource::Generated,
                },
            )
            .await?;
        }

        conversation::touch(pool, conversation_id).await?;
        debug!(message_id = %saved.id, "Persisted assistant message");
        Ok(Some(saved.id))
    }

    /// Ask the model for a title for a conversation started by this turn.
    fn spawn_title(&self) {
        if !self.new_conversation || !self.state.config.generate_titles {
            return;
        }
        let (Some(user_id), Some(conversation_id)) =
            (self.user_id.clone(), self.conversation_id.clone())
        else {
            return;
        };

        let state = self.state.clone();
        let first_message = self.first_message.clone();
        tokio::spawn(async move {
            let title = match state.llm.generate_title(&first_message).await {
                Ok(title) if !title.is_empty() => title,
                Ok(_) => return,
                Err(e) => {
                    warn!(conversation_id = %conversation_id, "Title generation failed: {}", e);
                    return;
                }
            };

            match conversation::update_title(state.db.pool(), &user_id, &conversation_id, &title)
                .await
            {
                Ok(_) => debug!(conversation_id = %conversation_id, title = %title, "Titled conversation"),
                Err(e) => warn!(conversation_id = %conversation_id, "Failed to save title: {}", e),
            }
        });
    }
}
