//! Bridge session: one call, two relay loops.
//!
//! The caller loop feeds caller audio to the model and tracks the stream
//! identity. The model loop plays assistant audio back to the caller,
//! handles interruptions and dispatches tool calls. Both loops are polled
//! concurrently on the same task and the session ends as soon as either
//! ends.
//!
//! A transfer in flight is raced against the model event stream rather than
//! awaited, so model events keep draining while it rings. A stalled event
//! stream would back up the model connection and, through it, caller audio.

use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::caller::{CallerInbound, CallerLink, CallerOutbound, MARK_NAME, StartPayload};
use super::dispatcher::{PendingTransfer, ToolContext, ToolDispatcher, TransferOutcome};
use super::error::BridgeError;
use super::interruption::handle_interruption;
use super::state::{CallIdentity, CallState};
use crate::core::realtime::{ClientEvent, ModelLink, ServerEvent};
use crate::core::session::caller_metadata_update;

/// Custom stream parameter carrying the trusted caller number.
pub const CALLER_PHONE_PARAM: &str = "caller_phone";

/// Custom stream parameter carrying the call id, used when `start` omits it.
pub const CALL_SID_PARAM: &str = "call_sid";

pub struct BridgeSession {
    state: Arc<CallState>,
    dispatcher: ToolDispatcher,
    model: ModelLink,
    caller: CallerLink,
}

impl BridgeSession {
    pub fn new(ctx: ToolContext, model: ModelLink, caller: CallerLink) -> Self {
        Self {
            state: Arc::new(CallState::new()),
            dispatcher: ToolDispatcher::new(ctx),
            model,
            caller,
        }
    }

    /// Shared handle to the call state, valid after the session ends.
    pub fn state(&self) -> Arc<CallState> {
        self.state.clone()
    }

    /// Relay until the caller disconnects, the model connection ends or the
    /// call is transferred. The model connection is closed on return.
    pub async fn run<S>(
        self,
        inbound: S,
        events: mpsc::Receiver<ServerEvent>,
    ) -> Result<(), BridgeError>
    where
        S: Stream<Item = String> + Unpin,
    {
        let BridgeSession {
            state,
            mut dispatcher,
            model,
            caller,
        } = self;

        let result = tokio::select! {
            _ = caller_loop(&state, &model, inbound) => Ok(()),
            result = model_loop(&state, &mut dispatcher, &model, &caller, events) => result,
        };

        model.close().await;

        let identity = state.identity();
        if state.transfer_in_flight() && !state.is_transferred() {
            // The platform ends the media stream when it redirects the call leg.
            let transfer_status = identity
                .call_sid
                .as_deref()
                .and_then(|call_sid| dispatcher.transfer_status(call_sid));
            tracing::info!(
                call_sid = ?identity.call_sid,
                transfer_status = ?transfer_status,
                "Caller leg ended while a transfer was in flight"
            );
        }
        match &result {
            Ok(()) => tracing::info!(
                call_sid = ?identity.call_sid,
                caller_phone = ?identity.caller_phone,
                transferred = state.is_transferred(),
                transfer_in_flight = state.transfer_in_flight(),
                "Bridge session ended"
            ),
            Err(e) => tracing::error!(
                call_sid = ?identity.call_sid,
                caller_phone = ?identity.caller_phone,
                "Bridge session aborted: {}", e
            ),
        }
        result
    }
}

// =============================================================================
// Caller -> Model
// =============================================================================

async fn caller_loop<S>(state: &CallState, model: &ModelLink, mut inbound: S)
where
    S: Stream<Item = String> + Unpin,
{
    while let Some(text) = inbound.next().await {
        let message = match serde_json::from_str::<CallerInbound>(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring malformed caller message: {}", e);
                continue;
            }
        };

        match message {
            CallerInbound::Media { media } => {
                state.set_latest_timestamp(media.timestamp);
                if model.is_open() {
                    let append = ClientEvent::InputAudioBufferAppend {
                        audio: media.payload,
                    };
                    if let Err(e) = model.send(append).await {
                        tracing::debug!("Caller audio dropped: {}", e);
                    }
                }
            }
            CallerInbound::Start { start } => on_stream_start(state, model, start).await,
            CallerInbound::Mark => {
                state.pop_mark();
            }
            CallerInbound::Stop => {
                tracing::info!(stream_sid = ?state.stream_sid(), "Caller stream stopped");
                break;
            }
            CallerInbound::Connected | CallerInbound::Other => {}
        }
    }

    if model.is_open() {
        model.close().await;
    }
}

async fn on_stream_start(state: &CallState, model: &ModelLink, start: StartPayload) {
    let caller_phone = non_empty(start.custom_parameters.get(CALLER_PHONE_PARAM));
    let call_sid = start
        .call_sid
        .clone()
        .or_else(|| non_empty(start.custom_parameters.get(CALL_SID_PARAM)));

    state.attach_stream(CallIdentity {
        stream_sid: Some(start.stream_sid.clone()),
        call_sid: call_sid.clone(),
        caller_phone: caller_phone.clone(),
    });

    tracing::info!(
        stream_sid = %start.stream_sid,
        call_sid = ?call_sid,
        caller_phone = ?caller_phone,
        "Caller stream started"
    );
    if caller_phone.is_none() {
        tracing::warn!(stream_sid = %start.stream_sid, "Stream started without a caller phone");
    }

    if model.is_open() {
        let update = caller_metadata_update(
            caller_phone.as_deref(),
            call_sid.as_deref(),
            &start.stream_sid,
        );
        if let Err(e) = model.send(update).await {
            tracing::debug!("Caller metadata not delivered: {}", e);
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

// =============================================================================
// Model -> Caller
// =============================================================================

async fn model_loop(
    state: &CallState,
    dispatcher: &mut ToolDispatcher,
    model: &ModelLink,
    caller: &CallerLink,
    mut events: mpsc::Receiver<ServerEvent>,
) -> Result<(), BridgeError> {
    let mut transfer: Option<PendingTransfer> = None;

    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            outcome = transfer_outcome(&mut transfer) => {
                if let Some(pending) = transfer.take() {
                    tracing::debug!(call_id = %pending.call_id(), outcome = ?outcome, "Transfer settled");
                    dispatcher.finish_transfer(pending, outcome, state, model).await;
                }
                if state.is_transferred() {
                    model.close().await;
                    return Ok(());
                }
                continue;
            }
        };

        if state.is_transferred() {
            model.close().await;
            return Ok(());
        }

        log_event(&event);

        match event {
            ServerEvent::OutputAudioDelta { item_id, delta, .. } => {
                let Some(stream_sid) = state.stream_sid() else {
                    tracing::debug!("Audio before stream start dropped");
                    continue;
                };
                let audio = match ServerEvent::decode_audio_delta(&delta) {
                    Ok(audio) => audio,
                    Err(e) => {
                        tracing::warn!(item_id = %item_id, "Undecodable audio delta: {}", e);
                        continue;
                    }
                };

                let media = CallerOutbound::media(&stream_sid, BASE64_STANDARD.encode(audio));
                if caller.send(media).await.is_err() {
                    return Ok(());
                }

                if state.track_playback(&item_id) {
                    tracing::debug!(item_id = %item_id, start = state.playback_start(), "Assistant utterance started");
                }

                if caller.send(CallerOutbound::mark(&stream_sid)).await.is_err() {
                    return Ok(());
                }
                state.push_mark(MARK_NAME);
            }
            ServerEvent::SpeechStarted { .. } => {
                if let Some(timing) = state.check_interruption() {
                    tracing::debug!(
                        speaking_ms = timing.speaking_ms,
                        since_last_ms = timing.since_last_ms,
                        interrupt = timing.interrupt,
                        "Interruption check"
                    );
                    if timing.interrupt {
                        handle_interruption(model, caller, state.stream_sid().as_deref()).await;
                    }
                }
            }
            ServerEvent::OutputItemAdded { item, .. } if item.item_type == "function_call" => {
                if let (Some(call_id), Some(name)) = (item.call_id.as_deref(), item.name.as_deref()) {
                    dispatcher.track_call(call_id, name);
                }
            }
            ServerEvent::FunctionCallArgumentsDelta { call_id, delta, .. } => {
                dispatcher.append_arguments(&call_id, &delta);
            }
            ServerEvent::FunctionCallArgumentsDone { call_id, name, .. } => {
                if let Some(pending) = dispatcher
                    .complete(&call_id, name.as_deref(), state, model)
                    .await?
                {
                    tracing::debug!(call_sid = %pending.call_sid(), "Transfer pending");
                    transfer = Some(pending);
                }
            }
            ServerEvent::Error { error } => {
                tracing::error!(code = ?error.code, "Model error: {}", error.message);
            }
            ServerEvent::ResponseDone { response } => {
                tracing::info!(response_id = ?response.id, status = ?response.status, "Response done");
            }
            _ => {}
        }
    }

    tracing::info!("Model event stream ended");
    Ok(())
}

/// Resolves with the outcome of the transfer in flight; never resolves
/// when there is none.
async fn transfer_outcome(transfer: &mut Option<PendingTransfer>) -> TransferOutcome {
    match transfer {
        Some(pending) => pending.outcome().await,
        None => std::future::pending().await,
    }
}

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::OutputAudioDelta { delta, .. } => {
            tracing::trace!(len = delta.len(), "Audio delta");
        }
        event if event.is_notable() => tracing::info!(event = event.event_type(), "Model event"),
        event => tracing::trace!(event = event.event_type(), "Model event"),
    }
}
