//! The ReAct loop controller.
//!
//! One state machine per request: ask the model, parse the reply, and either
//! dispatch a tool call or terminate with a final answer. There is exactly
//! one implementation — streaming is an observability overlay, fed through an
//! optional event sink, and `run()` is the non-streaming projection of
//! `run_stream()`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use toolflow_core::error::{Error, SessionError};
use toolflow_core::{Message, ProviderRequest};
use toolflow_registry::aggregate;
use toolflow_session::RepetitionLedger;

use crate::context::OrchestratorContext;
use crate::dispatcher;
use crate::event::EngineEvent;
use crate::parser::{ModelReply, parse_reply};
use crate::prompt::{cap_messages, cap_prompt, system_prompt, truncate_chars};

/// One chat request from a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub agent_id: Option<String>,

    /// Scalar context supplied by the client (merged into session state).
    #[serde(default)]
    pub client_state: Option<serde_json::Value>,
}

/// The final outcome of one request. The caller always receives one of these
/// when the loop starts at all; internal recoveries are invisible except
/// through `tools_used`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub intent: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    pub session_id: String,
    pub tools_used: Vec<String>,
    pub turns: usize,
}

/// Run a request without streaming.
pub async fn run(ctx: &OrchestratorContext, request: ChatRequest) -> Result<ChatOutcome, Error> {
    run_inner(ctx, request, None).await
}

/// Run a request, emitting every side effect as an `EngineEvent` before the
/// loop continues. Dispatch semantics are identical to `run()`.
pub async fn run_stream(
    ctx: &OrchestratorContext,
    request: ChatRequest,
    events: mpsc::Sender<EngineEvent>,
) -> Result<ChatOutcome, Error> {
    run_inner(ctx, request, Some(&events)).await
}

/// Best-effort emit: a disconnected client discards events, never the work.
async fn emit(sink: Option<&mpsc::Sender<EngineEvent>>, event: EngineEvent) {
    if let Some(sink) = sink {
        let _ = sink.send(event).await;
    }
}

async fn run_inner(
    ctx: &OrchestratorContext,
    request: ChatRequest,
    sink: Option<&mpsc::Sender<EngineEvent>>,
) -> Result<ChatOutcome, Error> {
    if ctx.sessions.is_empty() {
        return Err(SessionError::NoSessions.into());
    }

    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let agent = ctx.agent(request.agent_id.as_deref());
    let engine = &ctx.config.engine;

    if let Some(serde_json::Value::Object(map)) = &request.client_state {
        ctx.state.apply_sticky(&session_id, "client_state", map).await;
    }

    // The catalog is rebuilt per request; backends may change between them.
    let catalog = aggregate(&ctx.sessions, &agent, &ctx.config.custom_tools).await;
    info!(
        session = %session_id,
        agent = %agent.id,
        tools = catalog.len(),
        "request started"
    );

    let history = ctx.transcripts.history(&session_id, &agent.id).await;
    let mut ledger = RepetitionLedger::new();
    let mut context_text = format!("User request: {}\n", request.message);
    let mut tools_used: Vec<String> = Vec::new();
    let mut final_response: Option<String> = None;
    let mut intent = "conversation".to_string();
    let mut data: Option<serde_json::Value> = None;
    let mut tool_name: Option<String> = None;
    let mut turns = 0;

    while turns < engine.max_turns {
        turns += 1;
        let snapshot = ctx.state.snapshot(&session_id).await;
        let system = system_prompt(&catalog, &snapshot, engine.rag_freshness_secs);
        let system_len = system.chars().count();

        let mut messages = vec![Message::system(system)];
        if turns == 1 {
            let mut active = Vec::with_capacity(history.len() * 2 + 1);
            for exchange in &history {
                active.push(Message::user(exchange.user.clone()));
                active.push(Message::assistant(exchange.assistant.clone()));
            }
            active.push(Message::user(request.message.clone()));
            messages.extend(cap_messages(system_len, active, engine.prompt_char_cap));
        } else {
            // Later turns carry accumulated context instead of history, so
            // nothing is duplicated.
            let capped = cap_prompt(system_len, context_text.clone(), engine.prompt_char_cap);
            messages.push(Message::user(capped));
        }

        emit(sink, EngineEvent::Status { message: "thinking".into() }).await;
        let response = ctx
            .provider
            .complete(ProviderRequest {
                model: ctx.config.provider.model.clone(),
                messages,
                temperature: ctx.config.provider.temperature,
                max_tokens: ctx.config.provider.max_tokens,
            })
            .await?;
        emit(
            sink,
            EngineEvent::Thinking {
                content: response.content.clone(),
            },
        )
        .await;

        match parse_reply(&response.content) {
            ModelReply::Final(text) => {
                final_response = Some(text);
                break;
            }

            ModelReply::Malformed => {
                debug!(turn = turns, "malformed model reply, corrective retry");
                context_text.push_str(
                    "\nSystem: Your last reply was not valid JSON. Reply with exactly \
                     one JSON object {\"tool\": \"<name>\", \"arguments\": {...}}, or \
                     plain text for a final answer.\n",
                );
            }

            ModelReply::Call(call) => {
                emit(
                    sink,
                    EngineEvent::ToolExecution {
                        tool: call.tool.clone(),
                        arguments: call.arguments_value(),
                    },
                )
                .await;

                let dispatch =
                    dispatcher::execute(ctx, &session_id, &agent, &catalog, &mut ledger, &call)
                        .await;

                if dispatch.executed {
                    tools_used.push(call.tool.clone());
                }
                emit(
                    sink,
                    EngineEvent::ToolResult {
                        tool: call.tool.clone(),
                        summary: truncate_chars(&dispatch.context_delta, 200),
                        success: dispatch.executed,
                    },
                )
                .await;

                if let Some(dispatched_intent) = dispatch.intent {
                    intent = dispatched_intent;
                }
                if dispatch.data.is_some() {
                    data = dispatch.data;
                }
                if dispatch.tool_name.is_some() {
                    tool_name = dispatch.tool_name;
                }

                if dispatch.auth_required {
                    final_response = Some(
                        "Authentication is required before this tool can be used. Please \
                         authenticate and try again."
                            .to_string(),
                    );
                    break;
                }

                context_text.push('\n');
                context_text.push_str(&dispatch.context_delta);
                context_text.push('\n');
            }
        }
    }

    let response_text = final_response.unwrap_or_else(|| {
        "I couldn't complete this request within the allotted steps. Please narrow \
         the question and try again."
            .to_string()
    });

    ctx.transcripts
        .append(
            &session_id,
            &agent.id,
            request.message.clone(),
            response_text.clone(),
            tools_used.clone(),
        )
        .await;
    ctx.memory
        .record(
            &session_id,
            format!("User: {} | Assistant: {}", request.message, response_text),
            vec!["conversation".into()],
        )
        .await;

    emit(
        sink,
        EngineEvent::Response {
            content: response_text.clone(),
            intent: intent.clone(),
            data: data.clone(),
            tool_name: tool_name.clone(),
        },
    )
    .await;
    emit(
        sink,
        EngineEvent::Done {
            session_id: session_id.clone(),
            turns,
            tools_used: tools_used.clone(),
        },
    )
    .await;
    info!(session = %session_id, turns, tools = tools_used.len(), "request finished");

    Ok(ChatOutcome {
        response: response_text,
        intent,
        data,
        tool_name,
        session_id,
        tools_used,
        turns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use toolflow_config::AppConfig;
    use toolflow_core::error::{ProviderError, ToolError};
    use toolflow_core::{
        Provider, ProviderResponse, ToolDescriptor, ToolOutput, ToolSession,
    };

    /// Returns canned replies in order; repeats the last when exhausted.
    struct SequentialMockProvider {
        replies: Vec<String>,
        index: AtomicUsize,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl SequentialMockProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies.iter().map(|r| r.to_string()).collect(),
                index: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for SequentialMockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().await.push(request);
            let index = self.index.fetch_add(1, Ordering::SeqCst);
            let content = self
                .replies
                .get(index)
                .or_else(|| self.replies.last())
                .cloned()
                .unwrap_or_default();
            Ok(ProviderResponse {
                content,
                model: "mock".into(),
                usage: None,
            })
        }
    }

    /// Emits a fresh tool call every turn (distinct args defeat the
    /// repetition guard), so only the turn budget can stop the loop.
    struct RelentlessProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for RelentlessProvider {
        fn name(&self) -> &str {
            "relentless"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResponse {
                content: format!(r#"{{"tool": "lookup_account", "arguments": {{"i": {n}}}}}"#),
                model: "relentless".into(),
                usage: None,
            })
        }
    }

    struct CannedSession {
        reply: String,
        calls: AtomicUsize,
    }

    impl CannedSession {
        fn new(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolSession for CannedSession {
        fn name(&self) -> &str {
            "mock"
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Ok(vec![ToolDescriptor {
                name: "lookup_account".into(),
                description: "Look up an account".into(),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn call_tool(&self, _name: &str, _args: Value) -> Result<ToolOutput, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text(self.reply.clone()))
        }
    }

    fn context(provider: Arc<dyn Provider>, session: Arc<CannedSession>) -> OrchestratorContext {
        let mut sessions: HashMap<String, Arc<dyn ToolSession>> = HashMap::new();
        sessions.insert("mock".into(), session);
        OrchestratorContext::new(provider, sessions, AppConfig::default())
    }

    fn request(message: &str, session_id: &str) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            session_id: Some(session_id.into()),
            agent_id: None,
            client_state: None,
        }
    }

    #[tokio::test]
    async fn plain_text_reply_ends_on_first_turn() {
        let provider = SequentialMockProvider::new(&["The total is $1,240."]);
        let ctx = context(provider, CannedSession::new("{}"));

        let outcome = run(&ctx, request("what's the total?", "s1")).await.unwrap();
        assert_eq!(outcome.response, "The total is $1,240.");
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.intent, "conversation");
        assert!(outcome.tools_used.is_empty());
    }

    #[tokio::test]
    async fn oversized_first_message_is_capped() {
        let provider = SequentialMockProvider::new(&["done"]);
        let ctx = context(provider.clone(), CannedSession::new("{}"));
        let cap = ctx.config.engine.prompt_char_cap;

        let huge = "x".repeat(500_000);
        run(&ctx, request(&huge, "s-cap")).await.unwrap();

        let requests = provider.requests.lock().await;
        let total: usize = requests[0]
            .messages
            .iter()
            .map(|m| m.content.chars().count())
            .sum();
        assert!(total <= cap, "turn-1 request was {total} chars");
        // The user message survives, truncated rather than dropped.
        assert!(requests[0].messages.last().unwrap().content.starts_with("xxx"));
    }

    #[tokio::test]
    async fn tool_call_then_final_answer() {
        let provider = SequentialMockProvider::new(&[
            r#"{"tool": "lookup_account", "arguments": {"q": "ada"}}"#,
            "Found account acc-7.",
        ]);
        let session = CannedSession::new(r#"{"account_id": "acc-7"}"#);
        let ctx = context(provider, session.clone());

        let outcome = run(&ctx, request("find ada's account", "s1")).await.unwrap();
        assert_eq!(outcome.response, "Found account acc-7.");
        assert_eq!(outcome.tools_used, vec!["lookup_account"]);
        assert_eq!(outcome.intent, "tool_execution");
        assert_eq!(outcome.tool_name.as_deref(), Some("lookup_account"));
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_reply_triggers_corrective_retry() {
        let provider =
            SequentialMockProvider::new(&[r#"{"tool": "broken, "#, "Recovered answer."]);
        let ctx = context(provider.clone(), CannedSession::new("{}"));

        let outcome = run(&ctx, request("hello", "s1")).await.unwrap();
        assert_eq!(outcome.response, "Recovered answer.");
        assert_eq!(outcome.turns, 2);

        // The retry prompt carries the corrective note.
        let requests = provider.requests.lock().await;
        let second_prompt = &requests[1].messages.last().unwrap().content;
        assert!(second_prompt.contains("was not valid JSON"));
    }

    #[tokio::test]
    async fn identical_tool_call_twice_executes_once() {
        let provider = SequentialMockProvider::new(&[
            r#"{"tool": "lookup_account", "arguments": {"q": "ada"}}"#,
            r#"{"tool": "lookup_account", "arguments": {"q": "ada"}}"#,
            "Summarized.",
        ]);
        let session = CannedSession::new("{}");
        let ctx = context(provider, session.clone());

        let outcome = run(&ctx, request("find ada", "s1")).await.unwrap();
        assert_eq!(outcome.response, "Summarized.");
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.tools_used.len(), 1);
    }

    #[tokio::test]
    async fn turn_budget_yields_nonempty_fallback() {
        let provider = Arc::new(RelentlessProvider {
            calls: AtomicUsize::new(0),
        });
        let session = CannedSession::new("{}");
        let ctx = context(provider, session.clone());

        let outcome = run(&ctx, request("loop forever", "s1")).await.unwrap();
        assert_eq!(outcome.turns, ctx.config.engine.max_turns);
        assert!(!outcome.response.is_empty());
        assert_eq!(
            session.calls.load(Ordering::SeqCst),
            ctx.config.engine.max_turns
        );
    }

    #[tokio::test]
    async fn auth_sentinel_short_circuits_the_loop() {
        let provider = SequentialMockProvider::new(&[
            r#"{"tool": "lookup_account", "arguments": {}}"#,
            "this reply is never requested",
        ]);
        let ctx = context(
            provider.clone(),
            CannedSession::new(r#"{"error": "auth_required"}"#),
        );

        let outcome = run(&ctx, request("find ada", "s1")).await.unwrap();
        assert_eq!(outcome.intent, "auth_required");
        assert!(outcome.response.contains("Authentication"));
        assert_eq!(provider.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn transcript_carries_context_to_the_next_request() {
        let provider =
            SequentialMockProvider::new(&["Noted, I'll remember the code.", "It was 42."]);
        let ctx = context(provider.clone(), CannedSession::new("{}"));

        run(&ctx, request("The code is 42. Remember it.", "s1"))
            .await
            .unwrap();
        let outcome = run(&ctx, request("What was the code?", "s1")).await.unwrap();
        assert_eq!(outcome.response, "It was 42.");

        // The second request's first turn includes the prior exchange.
        let requests = provider.requests.lock().await;
        let replayed = requests[1]
            .messages
            .iter()
            .any(|m| m.content.contains("The code is 42"));
        assert!(replayed, "prior exchange missing from second request prompt");
    }

    #[tokio::test]
    async fn no_sessions_is_rejected_before_the_loop() {
        let provider = SequentialMockProvider::new(&["never"]);
        let ctx = OrchestratorContext::new(provider, HashMap::new(), AppConfig::default());

        let err = run(&ctx, request("hello", "s1")).await.unwrap_err();
        assert!(err.to_string().contains("No tool sessions"));
    }

    #[tokio::test]
    async fn streaming_emits_response_and_done() {
        let provider = SequentialMockProvider::new(&["All good."]);
        let ctx = context(provider, CannedSession::new("{}"));
        let (tx, mut rx) = mpsc::channel(32);

        let outcome = run_stream(&ctx, request("hi", "s1"), tx).await.unwrap();
        assert_eq!(outcome.response, "All good.");

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert!(types.contains(&"status"));
        assert!(types.contains(&"thinking"));
        assert!(types.contains(&"response"));
        assert_eq!(types.last(), Some(&"done"));
    }

    #[tokio::test]
    async fn client_state_scalars_are_recorded() {
        let provider = SequentialMockProvider::new(&["ok"]);
        let ctx = context(provider, CannedSession::new("{}"));
        let req = ChatRequest {
            message: "hi".into(),
            session_id: Some("s1".into()),
            agent_id: None,
            client_state: Some(json!({"facility_id": "fac-3", "nested": {"x": 1}})),
        };

        run(&ctx, req).await.unwrap();
        let snapshot = ctx.state.snapshot("s1").await;
        assert_eq!(snapshot.fields["facility_id"], json!("fac-3"));
        assert!(!snapshot.fields.contains_key("nested"));
    }
}
