//! Tool dispatcher: turns streamed function calls into single side effects.
//!
//! The model streams a call as `response.output_item.added` (name and call
//! id), any number of `response.function_call_arguments.delta` fragments and
//! one `response.function_call_arguments.done`. Fragments are appended in
//! arrival order and parsed once, on `done`. Each call id is dispatched at
//! most once.
//!
//! Every tool but `transfer_to_human` finishes inside [`ToolDispatcher::complete`].
//! A transfer can ring for over a minute, so it leaves as a [`PendingTransfer`]
//! the session polls next to the model event stream. At most one transfer is
//! in flight per call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};

use super::error::BridgeError;
use super::state::CallState;
use crate::core::realtime::{ClientEvent, ConversationItem, ModelLink};
use crate::core::records::{CallRecordStore, NewCallRecord};
use crate::core::session::Tool;
use crate::core::transfer::{CallControl, TRANSFER_TIMEOUT, TransferRegistry, TransferStatus};
use crate::utils::{clean_e164, validate_phone_number};

/// Line number reported busy by `check_status`.
pub const BUSY_LINE: i64 = 1;

/// Status reported when no transfer outcome arrived in time.
pub const PENDING_TIMEOUT: &str = "pending_timeout";

/// Shared collaborators a dispatcher needs to execute tools.
#[derive(Clone)]
pub struct ToolContext {
    pub registry: Arc<TransferRegistry>,
    /// `None` when the telephony REST credentials are not configured.
    pub call_control: Option<Arc<dyn CallControl>>,
    pub records: Arc<dyn CallRecordStore>,
    /// Transfer line number to E.164 destination
    pub transfer_lines: BTreeMap<u8, String>,
    pub transfer_timeout: Duration,
}

impl ToolContext {
    pub fn new(
        registry: Arc<TransferRegistry>,
        call_control: Option<Arc<dyn CallControl>>,
        records: Arc<dyn CallRecordStore>,
        transfer_lines: BTreeMap<u8, String>,
    ) -> Self {
        Self {
            registry,
            call_control,
            records,
            transfer_lines,
            transfer_timeout: TRANSFER_TIMEOUT,
        }
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }
}

/// How a transfer redirect ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The call-control request itself failed.
    RedirectFailed(String),
    /// A terminal status arrived from the dial callbacks.
    Settled(TransferStatus),
    /// No terminal status before the transfer timeout.
    TimedOut,
}

/// A transfer whose redirect and outcome wait run beside the event loop.
pub struct PendingTransfer {
    call_id: String,
    call_sid: String,
    destination: String,
    outcome: BoxFuture<'static, TransferOutcome>,
}

impl PendingTransfer {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    /// Drive the redirect and the wait.
    ///
    /// Cancel safe: dropping the returned future keeps the progress, so it can
    /// be raced in `select!` and polled again. Must not be polled after it
    /// has returned.
    pub async fn outcome(&mut self) -> TransferOutcome {
        (&mut self.outcome).await
    }
}

impl std::fmt::Debug for PendingTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransfer")
            .field("call_id", &self.call_id)
            .field("call_sid", &self.call_sid)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// Per-session tool-call bookkeeping.
pub struct ToolDispatcher {
    ctx: ToolContext,
    buffers: HashMap<String, String>,
    names: HashMap<String, String>,
    completed: HashSet<String>,
}

impl ToolDispatcher {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            ctx,
            buffers: HashMap::new(),
            names: HashMap::new(),
            completed: HashSet::new(),
        }
    }

    /// Remember the tool name announced for `call_id`.
    pub fn track_call(&mut self, call_id: &str, name: &str) {
        self.names.insert(call_id.to_string(), name.to_string());
    }

    /// Append an argument fragment for `call_id`.
    pub fn append_arguments(&mut self, call_id: &str, delta: &str) {
        if self.completed.contains(call_id) {
            tracing::debug!(call_id = %call_id, "Ignoring argument delta for a finished call");
            return;
        }
        self.buffers
            .entry(call_id.to_string())
            .or_default()
            .push_str(delta);
    }

    /// Consume the buffered arguments for `call_id`.
    ///
    /// No fragments yields `{}`; so does text that is not valid JSON.
    pub fn take_arguments(&mut self, call_id: &str) -> Value {
        let text = self.buffers.remove(call_id).unwrap_or_default();
        if text.trim().is_empty() {
            return Value::Object(Map::new());
        }
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(call_id = %call_id, "Unparseable tool arguments, using {{}}: {}", e);
                Value::Object(Map::new())
            }
        }
    }

    pub fn pending_calls(&self) -> usize {
        self.buffers.len()
    }

    /// Handle an `arguments.done` event: dispatch the tool and report back.
    ///
    /// The arguments are exactly the fragments streamed for `call_id`; any
    /// argument text echoed on the `done` event itself is not consulted.
    ///
    /// A transfer that passes validation is handed back as a
    /// [`PendingTransfer`] so the session can keep relaying while it rings;
    /// its result is reported by [`ToolDispatcher::finish_transfer`]. Only an
    /// identity-integrity violation is returned as an error; every other
    /// failure becomes a tool result.
    pub async fn complete(
        &mut self,
        call_id: &str,
        name: Option<&str>,
        state: &CallState,
        model: &ModelLink,
    ) -> Result<Option<PendingTransfer>, BridgeError> {
        if !self.completed.insert(call_id.to_string()) {
            tracing::debug!(call_id = %call_id, "Duplicate tool completion ignored");
            return Ok(None);
        }

        let args = self.take_arguments(call_id);

        let tracked = self.names.remove(call_id);
        let name = name.map(str::to_string).or(tracked).unwrap_or_default();
        tracing::info!(call_id = %call_id, tool = %name, "Tool call");

        let result = match Tool::from_name(&name) {
            None => {
                tracing::warn!(tool = %name, "Unknown tool requested");
                json!({"ok": false, "error": format!("Unknown tool {name}")})
            }
            Some(Tool::RecordCallData) => self.record_call_data(&args, state).await?,
            Some(Tool::CheckStatus) => check_status(&args),
            Some(Tool::EndCall) => end_call(&args),
            Some(Tool::TransferToHuman) => match self.start_transfer(call_id, &args, state) {
                Ok(transfer) => return Ok(Some(transfer)),
                Err(result) => result,
            },
        };

        deliver_result(model, call_id, &result).await;
        Ok(None)
    }

    async fn record_call_data(&self, args: &Value, state: &CallState) -> Result<Value, BridgeError> {
        let trusted = state.caller_phone().ok_or_else(|| {
            BridgeError::IdentityIntegrity("caller phone missing from call origination".into())
        })?;
        let caller_phone = validate_phone_number(&trusted)
            .map_err(|e| BridgeError::IdentityIntegrity(e.to_string()))?;

        let record = NewCallRecord {
            caller_phone,
            task_type: string_arg(args, "task_type"),
            call_summary: string_arg(args, "call_summary"),
            detail_info: string_arg(args, "detail_info"),
        };

        Ok(match self.ctx.records.insert(record).await {
            Ok(id) => {
                tracing::info!(record_id = id, "Call record stored");
                json!({"ok": true, "id": id})
            }
            Err(e) => {
                tracing::error!("Failed to store call record: {}", e);
                json!({"ok": false, "error": e.to_string()})
            }
        })
    }

    /// Validate a transfer request and build its redirect-and-wait future.
    ///
    /// Validation failures are returned as the tool result to report.
    fn start_transfer(
        &self,
        call_id: &str,
        args: &Value,
        state: &CallState,
    ) -> Result<PendingTransfer, Value> {
        let reason = args.get("reason").and_then(Value::as_str).unwrap_or("");

        let destination = self
            .resolve_destination(args)
            .map_err(|error| json!({"ok": false, "error": error}))?;

        let Some(call_sid) = state.call_sid() else {
            return Err(json!({"ok": false, "error": "missing_call_sid"}));
        };

        let Some(call_control) = self.ctx.call_control.clone() else {
            return Err(json!({"ok": false, "error": "call control is not configured"}));
        };

        if !state.begin_transfer() {
            tracing::warn!(call_sid = %call_sid, "Transfer requested while another is in flight");
            return Err(json!({"ok": false, "error": "transfer_in_progress"}));
        }

        tracing::info!(call_sid = %call_sid, destination = %destination, reason = %reason, "Starting transfer");

        let registry = self.ctx.registry.clone();
        let timeout = self.ctx.transfer_timeout;
        let (sid, target) = (call_sid.clone(), destination.clone());
        let outcome = Box::pin(async move {
            if let Err(e) = call_control.redirect_to_transfer(&sid, &target).await {
                return TransferOutcome::RedirectFailed(e.to_string());
            }
            match registry.wait_for_terminal(&sid, timeout).await {
                Some(status) => TransferOutcome::Settled(status),
                None => TransferOutcome::TimedOut,
            }
        });

        Ok(PendingTransfer {
            call_id: call_id.to_string(),
            call_sid,
            destination,
            outcome,
        })
    }

    /// Report the outcome of a transfer started by [`ToolDispatcher::complete`].
    ///
    /// A connected transfer sets the terminal transferred flag and closes the
    /// model without a tool result. Any other outcome is reported to the
    /// model and the conversation continues.
    pub async fn finish_transfer(
        &self,
        transfer: PendingTransfer,
        outcome: TransferOutcome,
        state: &CallState,
        model: &ModelLink,
    ) {
        let PendingTransfer {
            call_id,
            call_sid,
            destination,
            ..
        } = transfer;
        state.end_transfer();

        let result = match outcome {
            TransferOutcome::RedirectFailed(error) => {
                tracing::error!(call_sid = %call_sid, "Transfer redirect failed: {}", error);
                json!({"ok": false, "error": error})
            }
            TransferOutcome::Settled(status) if status.is_success() => {
                tracing::info!(call_sid = %call_sid, status = %status, "Transfer connected");
                state.mark_transferred();
                model.close().await;
                tracing::info!(call_id = %call_id, "Call transferred, no tool result sent");
                return;
            }
            TransferOutcome::Settled(status) => {
                tracing::warn!(call_sid = %call_sid, status = %status, "Transfer failed");
                json!({
                    "ok": false,
                    "transferred_to": destination,
                    "status": status.as_str(),
                    "error": "transfer_failed"
                })
            }
            TransferOutcome::TimedOut => {
                tracing::warn!(call_sid = %call_sid, "No transfer outcome before the timeout");
                json!({"ok": true, "transferred_to": destination, "status": PENDING_TIMEOUT})
            }
        };

        deliver_result(model, &call_id, &result).await;
    }

    /// Current registry status of a call's transfer.
    pub fn transfer_status(&self, call_sid: &str) -> Option<TransferStatus> {
        self.ctx.registry.get_status(call_sid)
    }

    /// `target_number` wins over `line_number`.
    fn resolve_destination(&self, args: &Value) -> Result<String, String> {
        if let Some(target) = args.get("target_number").and_then(Value::as_str)
            && !target.trim().is_empty()
        {
            return validate_phone_number(&clean_e164(target))
                .map_err(|e| format!("invalid target_number: {e}"));
        }

        match args.get("line_number") {
            None | Some(Value::Null) => Err("missing line_number or target_number".to_string()),
            Some(raw) => {
                let destination = line_number(raw)
                    .and_then(|line| u8::try_from(line).ok())
                    .and_then(|line| self.ctx.transfer_lines.get(&line));
                match destination {
                    Some(number) => Ok(number.clone()),
                    None => Err(format!("invalid line_number: {raw}")),
                }
            }
        }
    }
}

/// Send the tool result and ask the model to continue. Failures mean the
/// model connection is closing and are only logged.
async fn deliver_result(model: &ModelLink, call_id: &str, result: &Value) {
    let item = ConversationItem::function_call_output(call_id, result.to_string());
    if let Err(e) = model
        .send(ClientEvent::ConversationItemCreate { item })
        .await
    {
        tracing::debug!(call_id = %call_id, "Tool result not delivered: {}", e);
        return;
    }
    if let Err(e) = model.send(ClientEvent::ResponseCreate).await {
        tracing::debug!(call_id = %call_id, "response.create not delivered: {}", e);
    }
}

fn string_arg(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Accept `2` as well as `"2"`.
fn line_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_status(args: &Value) -> Value {
    let mut status = Map::new();
    let requested = args
        .get("line_numbers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for raw in &requested {
        let Some(line) = line_number(raw) else {
            tracing::debug!("Skipping unreadable line number {}", raw);
            continue;
        };
        let label = if line == BUSY_LINE { "busy" } else { "available" };
        status.insert(line.to_string(), Value::String(label.to_string()));
    }

    json!({"ok": true, "status": status})
}

fn end_call(args: &Value) -> Value {
    let reason = args.get("reason").and_then(Value::as_str).unwrap_or("");
    tracing::info!(reason = %reason, "Model ended the call");
    json!({"ended": true, "reason": reason})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::state::CallIdentity;
    use crate::core::realtime::ModelCommand;
    use crate::core::records::InMemoryCallRecordStore;

    fn context() -> ToolContext {
        let mut lines = BTreeMap::new();
        lines.insert(1, "+14155550101".to_string());
        lines.insert(2, "+14155550102".to_string());
        ToolContext::new(
            Arc::new(TransferRegistry::new()),
            None,
            Arc::new(InMemoryCallRecordStore::new()),
            lines,
        )
    }

    fn state_with_phone(phone: Option<&str>) -> CallState {
        let state = CallState::new();
        state.attach_stream(CallIdentity {
            stream_sid: Some("MZ1".into()),
            call_sid: Some("CA1".into()),
            caller_phone: phone.map(str::to_string),
        });
        state
    }

    fn output_of(command: ModelCommand) -> Value {
        match command {
            ModelCommand::Event(ClientEvent::ConversationItemCreate { item }) => {
                serde_json::from_str(item.output.as_deref().unwrap()).unwrap()
            }
            other => panic!("expected tool output, got {other:?}"),
        }
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let mut dispatcher = ToolDispatcher::new(context());
        dispatcher.append_arguments("X", "{\"a\":");
        dispatcher.append_arguments("X", "1}");
        assert_eq!(dispatcher.take_arguments("X"), json!({"a": 1}));
        assert_eq!(dispatcher.pending_calls(), 0);
    }

    #[test]
    fn test_missing_and_malformed_arguments_become_empty() {
        let mut dispatcher = ToolDispatcher::new(context());
        assert_eq!(dispatcher.take_arguments("none"), json!({}));

        dispatcher.append_arguments("bad", "{\"a\":");
        assert_eq!(dispatcher.take_arguments("bad"), json!({}));
    }

    #[test]
    fn test_check_status_reports_every_line() {
        let result = check_status(&json!({"line_numbers": [1, 2, 3]}));
        assert_eq!(
            result,
            json!({"ok": true, "status": {"1": "busy", "2": "available", "3": "available"}})
        );
    }

    #[test]
    fn test_check_status_without_lines() {
        assert_eq!(check_status(&json!({})), json!({"ok": true, "status": {}}));
    }

    #[test]
    fn test_resolve_destination() {
        let dispatcher = ToolDispatcher::new(context());
        assert_eq!(
            dispatcher.resolve_destination(&json!({"line_number": 2})),
            Ok("+14155550102".to_string())
        );
        assert_eq!(
            dispatcher.resolve_destination(&json!({"line_number": "1"})),
            Ok("+14155550101".to_string())
        );
        assert_eq!(
            dispatcher.resolve_destination(&json!({"target_number": "+1 (415) 555-0199", "line_number": 1})),
            Ok("+14155550199".to_string())
        );
        assert!(dispatcher.resolve_destination(&json!({"line_number": 7})).is_err());
        assert_eq!(
            dispatcher.resolve_destination(&json!({"reason": "x"})),
            Err("missing line_number or target_number".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_and_continues() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, mut rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("+14155550001"));

        dispatcher
            .complete("c1", Some("play_music"), &state, &model)
            .await
            .unwrap();

        let output = output_of(rx.recv().await.unwrap());
        assert_eq!(output, json!({"ok": false, "error": "Unknown tool play_music"}));
        assert!(matches!(
            rx.recv().await,
            Some(ModelCommand::Event(ClientEvent::ResponseCreate))
        ));
    }

    #[tokio::test]
    async fn test_name_falls_back_to_tracked_call() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, mut rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("+14155550001"));

        dispatcher.track_call("c1", "end_call");
        dispatcher.append_arguments("c1", r#"{"reason":"done"}"#);
        dispatcher
            .complete("c1", None, &state, &model)
            .await
            .unwrap();

        let output = output_of(rx.recv().await.unwrap());
        assert_eq!(output, json!({"ended": true, "reason": "done"}));
    }

    #[tokio::test]
    async fn test_duplicate_done_is_ignored() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, mut rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("+14155550001"));

        for _ in 0..2 {
            dispatcher
                .complete("c1", Some("end_call"), &state, &model)
                .await
                .unwrap();
        }

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_done_without_fragments_yields_empty_arguments() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, mut rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("+14155550001"));

        dispatcher
            .complete("c1", Some("check_status"), &state, &model)
            .await
            .unwrap();

        let output = output_of(rx.recv().await.unwrap());
        assert_eq!(output, json!({"ok": true, "status": {}}));
    }

    #[tokio::test]
    async fn test_record_requires_trusted_phone() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, _rx) = ModelLink::channel(8);
        let state = state_with_phone(None);

        dispatcher.append_arguments(
            "c1",
            r#"{"task_type":"x","call_summary":"y","caller_phone":"+14155550999"}"#,
        );
        let err = dispatcher
            .complete("c1", Some("record_call_data"), &state, &model)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::IdentityIntegrity(_)));
    }

    #[tokio::test]
    async fn test_record_rejects_malformed_trusted_phone() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, _rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("anonymous"));

        let err = dispatcher
            .complete("c1", Some("record_call_data"), &state, &model)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::IdentityIntegrity(_)));
    }

    #[tokio::test]
    async fn test_transfer_without_call_control_is_an_error_result() {
        let mut dispatcher = ToolDispatcher::new(context());
        let (model, mut rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("+14155550001"));

        dispatcher.append_arguments("c1", r#"{"line_number":2}"#);
        let transfer = dispatcher
            .complete("c1", Some("transfer_to_human"), &state, &model)
            .await
            .unwrap();
        assert!(transfer.is_none());

        let output = output_of(rx.recv().await.unwrap());
        assert_eq!(output["ok"], json!(false));
        assert!(!state.is_transferred());
        assert!(!state.transfer_in_flight());
    }

    #[tokio::test]
    async fn test_invalid_line_is_reported_without_side_effects() {
        let ctx = context();
        let registry = ctx.registry.clone();
        let mut dispatcher = ToolDispatcher::new(ctx);
        let (model, mut rx) = ModelLink::channel(8);
        let state = state_with_phone(Some("+14155550001"));

        dispatcher.append_arguments("c1", r#"{"line_number":9}"#);
        let transfer = dispatcher
            .complete("c1", Some("transfer_to_human"), &state, &model)
            .await
            .unwrap();
        assert!(transfer.is_none());

        let output = output_of(rx.recv().await.unwrap());
        assert_eq!(output["ok"], json!(false));
        assert!(registry.is_empty());
    }
}
