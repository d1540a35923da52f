//! Guarded tool dispatch.
//!
//! Dispatch order (first match wins): always-allowed virtual tools bypass the
//! allow-list; allow-list guard; repetition guard; internal tools (in-process,
//! no network); webhook tools (one HTTP request); subprocess tools via the
//! registry's routing. Guard rejections are corrective system messages, not
//! errors — the loop continues so the model can self-correct.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use toolflow_core::{AgentProfile, ToolCall, WebhookToolDef};
use toolflow_indexer::{decide_search_or_analyze, summarize_report};
use toolflow_registry::{ALWAYS_ALLOWED, Catalog, INTERNAL_TOOLS, Route};
use toolflow_session::{ClearScope, ReportContext, RepetitionLedger};

use crate::context::OrchestratorContext;
use crate::prompt::truncate_chars;

/// The outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// Text appended to the conversation context for the next turn.
    pub context_delta: String,

    /// Intent surfaced to the caller when this was the last dispatch.
    pub intent: Option<String>,

    /// Structured payload for the caller (filtered webhook body, etc.).
    pub data: Option<Value>,

    pub tool_name: Option<String>,

    /// `{"error": "auth_required"}` sentinel seen — short-circuit the loop.
    pub auth_required: bool,

    /// Whether a backend (or internal tool) actually executed.
    pub executed: bool,
}

impl Dispatch {
    fn corrective(message: impl Into<String>) -> Self {
        Self {
            context_delta: message.into(),
            intent: None,
            data: None,
            tool_name: None,
            auth_required: false,
            executed: false,
        }
    }

    fn executed(tool: &str, delta: String, data: Option<Value>) -> Self {
        Self {
            context_delta: delta,
            intent: Some("tool_execution".into()),
            data,
            tool_name: Some(tool.to_string()),
            auth_required: false,
            executed: true,
        }
    }
}

/// Dispatch one parsed tool call.
pub async fn execute(
    ctx: &OrchestratorContext,
    session_id: &str,
    agent: &AgentProfile,
    catalog: &Catalog,
    ledger: &mut RepetitionLedger,
    call: &ToolCall,
) -> Dispatch {
    let always_allowed = ALWAYS_ALLOWED.contains(&call.tool.as_str());

    if !always_allowed && !catalog.is_allowed(&call.tool) {
        debug!(agent = %agent.id, tool = %call.tool, "tool blocked by allow-list");
        return Dispatch::corrective(format!(
            "System: Tool '{}' is not permitted for this agent. Choose one of the \
             allowed tools or answer directly.",
            call.tool
        ));
    }

    if ledger.record(call) {
        debug!(tool = %call.tool, "repeated identical call blocked");
        return Dispatch::corrective(format!(
            "System: You already called '{}' with these exact arguments in this \
             request. Do not repeat the call — summarize the data you have and \
             answer the user.",
            call.tool
        ));
    }

    if INTERNAL_TOOLS.contains(&call.tool.as_str()) {
        let dispatch = execute_internal(ctx, session_id, call).await;
        if dispatch.executed {
            ctx.memory
                .record_tool_execution(
                    session_id,
                    &call.tool,
                    &truncate_chars(&dispatch.context_delta, 500),
                )
                .await;
        }
        return dispatch;
    }

    match catalog.route(&call.tool) {
        Some(Route::Webhook(def)) => execute_webhook(ctx, session_id, call, def).await,
        Some(Route::Session(name)) => execute_subprocess(ctx, session_id, call, name).await,
        Some(Route::Virtual) | None => Dispatch::corrective(format!(
            "System: Error executing tool '{}': tool not found in the catalog.",
            call.tool
        )),
    }
}

// --- internal (in-process) tools ---

async fn execute_internal(ctx: &OrchestratorContext, session_id: &str, call: &ToolCall) -> Dispatch {
    match call.tool.as_str() {
        "get_current_session_context" => {
            let snapshot = ctx.state.snapshot(session_id).await;
            let data = json!({
                "fields": snapshot.fields,
                "last_report_context": snapshot.last_report_context,
            });
            Dispatch::executed(
                &call.tool,
                format!("Tool 'get_current_session_context' Output: {data}"),
                Some(data),
            )
        }

        "clear_session_context" => {
            let scope_str = call
                .arguments
                .get("scope")
                .and_then(Value::as_str)
                .unwrap_or("all");
            let Some(scope) = ClearScope::parse(scope_str) else {
                return Dispatch::corrective(format!(
                    "System: Invalid clear scope '{scope_str}'. Use 'all', 'transient', \
                     or 'ids_only'."
                ));
            };
            let removed = ctx.state.clear(session_id, scope).await;
            if scope.wipes_embeddings() {
                ctx.indexer.clear_session(session_id).await;
                ctx.forget_report_rows(session_id).await;
            }
            let data = json!({"cleared": removed});
            Dispatch::executed(
                &call.tool,
                format!("Tool 'clear_session_context' Output: cleared keys {data}"),
                Some(data),
            )
        }

        "query_past_conversations" => {
            let Some(query) = call.arguments.get("query").and_then(Value::as_str) else {
                return Dispatch::corrective(
                    "System: Tool 'query_past_conversations' requires a 'query' argument."
                        .to_string(),
                );
            };
            let limit = call
                .arguments
                .get("limit")
                .and_then(Value::as_u64)
                .unwrap_or(5) as usize;
            let records = ctx.memory.search(query, limit).await;
            let text = if records.is_empty() {
                "no matching past conversations".to_string()
            } else {
                records
                    .iter()
                    .map(|r| format!("[{}] {}", r.created_at.to_rfc3339(), r.content))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Dispatch::executed(
                &call.tool,
                format!("Tool 'query_past_conversations' Output: {text}"),
                None,
            )
        }

        "decide_search_or_analyze" => {
            let question = call
                .arguments
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or("");
            let row_count = ctx
                .state
                .report_context(session_id)
                .await
                .map_or(0, |r| r.row_count);
            let decision = decide_search_or_analyze(question, row_count);
            let data = serde_json::to_value(&decision).unwrap_or(Value::Null);
            Dispatch::executed(
                &call.tool,
                format!("Tool 'decide_search_or_analyze' Output: {data}"),
                Some(data),
            )
        }

        "search_embedded_report" => {
            let Some(query) = call.arguments.get("query").and_then(Value::as_str) else {
                return Dispatch::corrective(
                    "System: Tool 'search_embedded_report' requires a 'query' argument."
                        .to_string(),
                );
            };
            let n = call.arguments.get("n").and_then(Value::as_u64).unwrap_or(5) as usize;
            match ctx.indexer.search(session_id, query, n).await {
                Ok(chunks) if chunks.is_empty() => Dispatch::executed(
                    &call.tool,
                    "Tool 'search_embedded_report' Output: no embedded report data for \
                     this session."
                        .to_string(),
                    None,
                ),
                Ok(chunks) => {
                    let text = chunks
                        .iter()
                        .map(|c| format!("[chunk {}] {}", c.chunk_index, c.chunk_text))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let capped = truncate_chars(&text, ctx.config.engine.context_char_cap);
                    Dispatch::executed(
                        &call.tool,
                        format!("Tool 'search_embedded_report' Output: {capped}"),
                        None,
                    )
                }
                Err(e) => Dispatch::corrective(format!(
                    "System: Error executing tool 'search_embedded_report': {e}"
                )),
            }
        }

        "embed_report_for_exploration" => {
            let Some((report_type, rows)) = ctx.recall_report_rows(session_id).await else {
                return Dispatch::corrective(
                    "System: No report data available to embed. Run a report tool first."
                        .to_string(),
                );
            };
            let chunk_size = call
                .arguments
                .get("chunk_size")
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            match ctx
                .indexer
                .embed_report(session_id, &report_type, &rows, chunk_size)
                .await
            {
                Ok(chunks) => {
                    ctx.state
                        .set_report_context(
                            session_id,
                            ReportContext {
                                report_type: report_type.clone(),
                                row_count: rows.len(),
                                timestamp: Utc::now(),
                            },
                        )
                        .await;
                    Dispatch::executed(
                        &call.tool,
                        format!(
                            "Tool 'embed_report_for_exploration' Output: embedded {chunks} \
                             chunks of report '{report_type}' ({} rows).",
                            rows.len()
                        ),
                        None,
                    )
                }
                Err(e) => Dispatch::corrective(format!(
                    "System: Error executing tool 'embed_report_for_exploration': {e}"
                )),
            }
        }

        other => Dispatch::corrective(format!(
            "System: Error executing tool '{other}': tool not found in the catalog."
        )),
    }
}

// --- webhook tools ---

async fn execute_webhook(
    ctx: &OrchestratorContext,
    session_id: &str,
    call: &ToolCall,
    def: &WebhookToolDef,
) -> Dispatch {
    // Report throttle: same report type within the window is not re-run.
    if def.is_report()
        && let Some(report) = ctx.state.report_context(session_id).await
        && report.report_type == def.name
    {
        let age = Utc::now()
            .signed_duration_since(report.timestamp)
            .num_seconds();
        if age >= 0 && age < ctx.config.engine.report_throttle_secs {
            debug!(tool = %def.name, age, "report call throttled");
            return Dispatch::corrective(format!(
                "System: Report '{}' data from {age}s ago is already in context. Do \
                 not re-run it — answer from the existing data, or use \
                 search_embedded_report for specifics.",
                def.name
            ));
        }
    }

    ctx.state
        .apply_sticky(session_id, &call.tool, &call.arguments)
        .await;

    let body = match send_webhook(ctx, call, def).await {
        Ok(body) => body,
        Err(reason) => {
            warn!(tool = %def.name, %reason, "webhook call failed");
            return Dispatch::corrective(format!(
                "System: Error executing tool '{}': {reason}",
                def.name
            ));
        }
    };

    let serialized = body.to_string();
    ctx.state.extract_ids(session_id, &call.tool, &serialized).await;

    let mut delta_text = truncate_chars(&serialized, ctx.config.engine.context_char_cap);
    if def.is_report() {
        let rows = extract_rows(&body);
        if !rows.is_empty() {
            match ctx.indexer.embed_report(session_id, &def.name, &rows, None).await {
                Ok(chunks) => {
                    debug!(tool = %def.name, chunks, rows = rows.len(), "report embedded");
                    ctx.state
                        .set_report_context(
                            session_id,
                            ReportContext {
                                report_type: def.name.clone(),
                                row_count: rows.len(),
                                timestamp: Utc::now(),
                            },
                        )
                        .await;
                    ctx.remember_report_rows(session_id, &def.name, rows.clone()).await;
                }
                Err(e) => warn!(tool = %def.name, error = %e, "report embedding failed"),
            }
            // Oversized reports enter context as a summary; the raw rows stay
            // retrievable through search_embedded_report only.
            if serialized.chars().count() > ctx.config.engine.report_char_threshold {
                delta_text = summarize_report(&def.name, &rows);
            }
        }
    }

    let filtered = filter_output(&body, def.output_schema.as_ref());
    ctx.memory
        .record_tool_execution(session_id, &call.tool, &truncate_chars(&serialized, 500))
        .await;

    Dispatch::executed(
        &call.tool,
        format!("Tool '{}' Output: {delta_text}", def.name),
        Some(filtered),
    )
}

async fn send_webhook(
    ctx: &OrchestratorContext,
    call: &ToolCall,
    def: &WebhookToolDef,
) -> Result<Value, String> {
    let method: reqwest::Method = def
        .method
        .to_uppercase()
        .parse()
        .map_err(|_| format!("invalid HTTP method '{}'", def.method))?;

    let mut request = ctx.http.request(method.clone(), &def.url);
    for (key, value) in &def.headers {
        request = request.header(key, value);
    }
    if method == reqwest::Method::GET {
        let pairs = query_pairs(&call.arguments_value());
        if !pairs.is_empty() {
            request = request.query(&pairs);
        }
    } else {
        request = request.json(&call.arguments_value());
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("webhook returned status {status}"));
    }
    response.json::<Value>().await.map_err(|e| e.to_string())
}

/// Flatten call arguments into query parameters for GET webhooks; non-string
/// values keep their JSON rendering.
fn query_pairs(args: &Value) -> Vec<(String, String)> {
    let Some(map) = args.as_object() else {
        return Vec::new();
    };
    map.iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

/// Keep only the top-level keys the output schema declares, when one exists.
fn filter_output(body: &Value, output_schema: Option<&Value>) -> Value {
    let Some(schema) = output_schema else {
        return body.clone();
    };
    let keys = schema
        .get("properties")
        .and_then(Value::as_object)
        .or_else(|| schema.as_object());
    match (body.as_object(), keys) {
        (Some(body_map), Some(schema_map)) => {
            let filtered: serde_json::Map<String, Value> = body_map
                .iter()
                .filter(|(k, _)| schema_map.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(filtered)
        }
        _ => body.clone(),
    }
}

/// Find the report's row array: the body itself, a conventional key, or the
/// first array-valued field.
fn extract_rows(body: &Value) -> Vec<Value> {
    if let Some(rows) = body.as_array() {
        return rows.clone();
    }
    let Some(map) = body.as_object() else {
        return Vec::new();
    };
    for key in ["rows", "data", "results"] {
        if let Some(rows) = map.get(key).and_then(Value::as_array) {
            return rows.clone();
        }
    }
    map.values()
        .find_map(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// --- subprocess tools ---

async fn execute_subprocess(
    ctx: &OrchestratorContext,
    session_id: &str,
    call: &ToolCall,
    session_name: &str,
) -> Dispatch {
    let Some(session) = ctx.sessions.get(session_name) else {
        return Dispatch::corrective(format!(
            "System: Error executing tool '{}': session '{session_name}' is not \
             registered.",
            call.tool
        ));
    };

    ctx.state
        .apply_sticky(session_id, &call.tool, &call.arguments)
        .await;

    let output = match session.call_tool(&call.tool, call.arguments_value()).await {
        Ok(output) => output,
        Err(e) => {
            warn!(tool = %call.tool, session = %session_name, error = %e, "tool call failed");
            return Dispatch::corrective(format!(
                "System: Error executing tool '{}': {e}",
                call.tool
            ));
        }
    };

    let text = output.joined_text();

    // The auth sentinel bypasses further turns entirely.
    if let Ok(parsed) = serde_json::from_str::<Value>(&text)
        && parsed.get("error").and_then(Value::as_str) == Some("auth_required")
    {
        return Dispatch {
            context_delta: format!("System: Tool '{}' requires authentication.", call.tool),
            intent: Some("auth_required".into()),
            data: Some(parsed),
            tool_name: Some(call.tool.clone()),
            auth_required: true,
            executed: true,
        };
    }

    ctx.state.extract_ids(session_id, &call.tool, &text).await;
    ctx.memory
        .record_tool_execution(session_id, &call.tool, &truncate_chars(&text, 500))
        .await;

    let capped = truncate_chars(&text, ctx.config.engine.context_char_cap);
    Dispatch::executed(&call.tool, format!("Tool '{}' Output: {capped}", call.tool), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolflow_config::AppConfig;
    use toolflow_core::error::{ProviderError, ToolError};
    use toolflow_core::{
        AgentType, AllowList, Provider, ProviderRequest, ProviderResponse, ToolDescriptor,
        ToolOutput, ToolSession,
    };
    use toolflow_registry::aggregate;

    struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("null".into()))
        }
    }

    /// Mock session returning a canned reply and counting invocations.
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

    async fn test_context(session: Arc<CannedSession>) -> (OrchestratorContext, Catalog) {
        let mut sessions: HashMap<String, Arc<dyn ToolSession>> = HashMap::new();
        sessions.insert("mock".into(), session);
        let ctx = OrchestratorContext::new(Arc::new(NullProvider), sessions, AppConfig::default());
        let agent = AgentProfile::unrestricted("default");
        let catalog = aggregate(&ctx.sessions, &agent, &[]).await;
        (ctx, catalog)
    }

    fn call(tool: &str, args: Value) -> ToolCall {
        ToolCall {
            tool: tool.into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn allow_list_blocks_without_backend_invocation() {
        let session = CannedSession::new("{}");
        let (ctx, _) = test_context(session.clone()).await;
        let agent = AgentProfile {
            id: "narrow".into(),
            name: String::new(),
            agent_type: AgentType::General,
            allowed_tools: AllowList::Named(vec!["something_else".into()]),
        };
        let catalog = aggregate(&ctx.sessions, &agent, &[]).await;
        let mut ledger = RepetitionLedger::new();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("lookup_account", json!({})),
        )
        .await;

        assert!(!dispatch.executed);
        assert!(dispatch.context_delta.contains("not permitted"));
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn always_allowed_tools_bypass_the_allow_list() {
        let session = CannedSession::new("{}");
        let (ctx, _) = test_context(session).await;
        let agent = AgentProfile {
            id: "narrow".into(),
            name: String::new(),
            agent_type: AgentType::General,
            allowed_tools: AllowList::Named(vec![]),
        };
        let catalog = aggregate(&ctx.sessions, &agent, &[]).await;
        let mut ledger = RepetitionLedger::new();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("get_current_session_context", json!({})),
        )
        .await;

        assert!(dispatch.executed);
    }

    #[tokio::test]
    async fn internal_executions_reach_the_memory_log() {
        let session = CannedSession::new("{}");
        let (ctx, catalog) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("get_current_session_context", json!({})),
        )
        .await;

        assert!(dispatch.executed);
        assert_eq!(ctx.memory.count().await, 1);
        let records = ctx.memory.search("get_current_session_context", 5).await;
        assert!(!records.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_call_executes_once() {
        let session = CannedSession::new(r#"{"account_id": "acc-1"}"#);
        let (ctx, catalog) = test_context(session.clone()).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();
        let tool_call = call("lookup_account", json!({"q": "ada"}));

        let first = execute(&ctx, "s1", &agent, &catalog, &mut ledger, &tool_call).await;
        let second = execute(&ctx, "s1", &agent, &catalog, &mut ledger, &tool_call).await;

        assert!(first.executed);
        assert!(!second.executed);
        assert!(second.context_delta.contains("already called"));
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subprocess_output_feeds_id_extraction() {
        let session = CannedSession::new(r#"{"account": {"account_id": "acc-7"}}"#);
        let (ctx, catalog) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();

        execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("lookup_account", json!({})),
        )
        .await;

        let snapshot = ctx.state.snapshot("s1").await;
        assert_eq!(snapshot.fields["account_id"], json!("acc-7"));
    }

    #[tokio::test]
    async fn auth_sentinel_short_circuits() {
        let session = CannedSession::new(r#"{"error": "auth_required"}"#);
        let (ctx, catalog) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("lookup_account", json!({})),
        )
        .await;

        assert!(dispatch.auth_required);
        assert_eq!(dispatch.intent.as_deref(), Some("auth_required"));
    }

    #[tokio::test]
    async fn report_webhook_is_throttled_within_window() {
        let session = CannedSession::new("{}");
        let (ctx, _) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let def = WebhookToolDef {
            name: "usage_report".into(),
            description: String::new(),
            method: "POST".into(),
            // Never contacted: the throttle fires before any HTTP.
            url: "http://127.0.0.1:1/never".into(),
            headers: HashMap::new(),
            input_schema: json!({}),
            output_schema: None,
            tool_type: Some("report".into()),
        };
        ctx.state
            .set_report_context(
                "s1",
                ReportContext {
                    report_type: "usage_report".into(),
                    row_count: 100,
                    timestamp: Utc::now(),
                },
            )
            .await;
        let catalog = aggregate(&ctx.sessions, &agent, std::slice::from_ref(&def)).await;
        let mut ledger = RepetitionLedger::new();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("usage_report", json!({})),
        )
        .await;

        assert!(!dispatch.executed);
        assert!(dispatch.context_delta.contains("already in context"));
    }

    #[tokio::test]
    async fn clear_session_context_wipes_embeddings_for_all_scope() {
        let session = CannedSession::new("{}");
        let (ctx, catalog) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();

        let args = json!({"facility_id": "f-1"});
        ctx.state
            .apply_sticky("s1", "t", args.as_object().unwrap())
            .await;
        ctx.indexer
            .embed_report("s1", "usage", &[json!({"kwh": 1})], None)
            .await
            .unwrap();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("clear_session_context", json!({"scope": "all"})),
        )
        .await;

        assert!(dispatch.executed);
        assert!(ctx.state.snapshot("s1").await.fields.is_empty());
        assert_eq!(ctx.indexer.chunk_count("s1").await, 0);
    }

    #[tokio::test]
    async fn decide_tool_reports_row_count_from_session() {
        let session = CannedSession::new("{}");
        let (ctx, catalog) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();
        ctx.state
            .set_report_context(
                "s1",
                ReportContext {
                    report_type: "usage".into(),
                    row_count: 500,
                    timestamp: Utc::now(),
                },
            )
            .await;

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("decide_search_or_analyze", json!({"question": "total on March 3?"})),
        )
        .await;

        assert!(dispatch.context_delta.contains("semantic_search"));
    }

    #[tokio::test]
    async fn embed_without_report_data_is_corrective() {
        let session = CannedSession::new("{}");
        let (ctx, catalog) = test_context(session).await;
        let agent = AgentProfile::unrestricted("default");
        let mut ledger = RepetitionLedger::new();

        let dispatch = execute(
            &ctx,
            "s1",
            &agent,
            &catalog,
            &mut ledger,
            &call("embed_report_for_exploration", json!({})),
        )
        .await;

        assert!(!dispatch.executed);
        assert!(dispatch.context_delta.contains("No report data"));
    }

    #[test]
    fn filter_output_keeps_declared_keys_only() {
        let body = json!({"total": 42, "rows": [1, 2], "debug": "x"});
        let schema = json!({"properties": {"total": {}, "rows": {}}});
        let filtered = filter_output(&body, Some(&schema));
        assert_eq!(filtered, json!({"total": 42, "rows": [1, 2]}));
    }

    #[test]
    fn query_pairs_renders_scalars_for_get_webhooks() {
        let args = json!({"facility_id": "fac-9", "limit": 25, "active": true});
        let pairs = query_pairs(&args);
        assert!(pairs.contains(&("facility_id".into(), "fac-9".into())));
        assert!(pairs.contains(&("limit".into(), "25".into())));
        assert!(pairs.contains(&("active".into(), "true".into())));
        assert!(query_pairs(&json!(null)).is_empty());
    }

    #[test]
    fn extract_rows_finds_conventional_keys() {
        assert_eq!(extract_rows(&json!([{"a": 1}])).len(), 1);
        assert_eq!(extract_rows(&json!({"rows": [{"a": 1}, {"a": 2}]})).len(), 2);
        assert_eq!(extract_rows(&json!({"meta": 1, "items": [{"a": 1}]})).len(), 1);
        assert!(extract_rows(&json!({"total": 42})).is_empty());
    }
}
