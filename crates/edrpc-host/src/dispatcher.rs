//! Request routing: decode → route → execute → encode → send.
//!
//! [`Dispatcher::on_frame`] runs on the receive loop and never blocks it:
//! `initialize` and `tools/list` are answered inline from static data, while
//! `tools/call` is validated, submitted to the executor, and answered from a
//! spawned task once the owner thread has run the handler. Further incoming
//! messages are accepted while calls execute.

use std::sync::Arc;

use edrpc_common::protocol::builtin::{
    CapabilityDescriptor, CapabilityListing, InvokeParams, ServerInfo, METHOD_INITIALIZE,
    METHOD_INVOKE, METHOD_LIST_CAPABILITIES,
};
use edrpc_common::protocol::envelope::{
    CorrelationId, Message, RequestEnvelope, ResponseEnvelope,
};
use edrpc_common::protocol::error::{BridgeError, CallOutcome};
use serde_json::Value;

use crate::connection::PeerSender;
use crate::executor::TickExecutor;
use crate::registry::CapabilityRegistry;

pub(crate) struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    executor: Arc<TickExecutor>,
    server_name: String,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<CapabilityRegistry>,
        executor: Arc<TickExecutor>,
        server_name: String,
    ) -> Self {
        Self {
            registry,
            executor,
            server_name,
        }
    }

    /// Handles one raw frame from the peer.
    ///
    /// Malformed frames become a protocol error response when a correlation
    /// id could be recovered; otherwise they are logged and dropped.
    pub(crate) fn on_frame(&self, peer: &PeerSender, frame: Vec<u8>) {
        match Message::decode(&frame) {
            Ok(Message::Request(request)) => self.on_request(peer, request),
            Ok(Message::Response(response)) => {
                // The host never issues calls; a response here is stale or
                // misdirected and settles nothing.
                tracing::debug!(id = ?response.id, "ignoring response envelope on host side");
            }
            Err(decode_err) => {
                tracing::warn!("dropping malformed message: {}", decode_err.detail);
                if decode_err.id.is_some() {
                    let error = BridgeError::Protocol(decode_err.detail);
                    send_failure(peer, decode_err.id, &error);
                }
            }
        }
    }

    fn on_request(&self, peer: &PeerSender, request: RequestEnvelope) {
        tracing::debug!(id = %request.id, method = %request.method, "request received");
        match request.method.as_str() {
            METHOD_INITIALIZE => {
                let info = ServerInfo::new(&self.server_name);
                send_serialized(peer, request.id, &info);
            }
            METHOD_LIST_CAPABILITIES => {
                let listing = CapabilityListing {
                    tools: self
                        .registry
                        .names()
                        .into_iter()
                        .map(|name| CapabilityDescriptor { name })
                        .collect(),
                };
                send_serialized(peer, request.id, &listing);
            }
            METHOD_INVOKE => self.on_invoke(peer, request),
            other => {
                let error = BridgeError::UnknownMethod(format!("Unknown method: {}", other));
                send_failure(peer, Some(request.id), &error);
            }
        }
    }

    fn on_invoke(&self, peer: &PeerSender, request: RequestEnvelope) {
        let params: InvokeParams = match serde_json::from_value(Value::Object(request.params)) {
            Ok(params) => params,
            Err(e) => {
                let error = BridgeError::InvalidArguments(format!("Invalid invoke params: {}", e));
                send_failure(peer, Some(request.id), &error);
                return;
            }
        };

        // Unknown capabilities are rejected here, before anything reaches
        // the registry or the owner thread.
        if !self.registry.contains(&params.name) {
            let error = BridgeError::UnknownMethod(format!("Unknown method: {}", params.name));
            send_failure(peer, Some(request.id), &error);
            return;
        }

        let completion = self
            .executor
            .submit(request.id.clone(), params.name, params.arguments);

        let peer = peer.clone();
        let id = request.id;
        tokio::spawn(async move {
            let outcome = match completion.await {
                Ok(outcome) => outcome,
                // Completion sink dropped without a result: executor torn down.
                Err(_) => Err(BridgeError::ShuttingDown),
            };
            send_outcome(&peer, id, outcome);
        });
    }
}

fn send_outcome(peer: &PeerSender, id: CorrelationId, outcome: CallOutcome) {
    match outcome {
        Ok(value) => send_response(peer, ResponseEnvelope::success(id, value)),
        Err(error) => send_failure(peer, Some(id), &error),
    }
}

fn send_serialized<T: serde::Serialize>(peer: &PeerSender, id: CorrelationId, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => send_response(peer, ResponseEnvelope::success(id, value)),
        Err(e) => send_failure(peer, Some(id), &BridgeError::Json(e)),
    }
}

fn send_failure(peer: &PeerSender, id: Option<CorrelationId>, error: &BridgeError) {
    let rpc_error = error.to_rpc_error();
    tracing::debug!(id = ?id, code = rpc_error.code, "responding with error: {}", rpc_error.message);
    send_response(peer, ResponseEnvelope::failure(id, rpc_error.code, rpc_error.message));
}

fn send_response(peer: &PeerSender, response: ResponseEnvelope) {
    match response.encode() {
        Ok(frame) => peer.send(frame),
        Err(e) => tracing::error!("failed to encode response envelope: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edrpc_common::protocol::envelope::ArgMap;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct TestRig {
        dispatcher: Dispatcher,
        registry: Arc<CapabilityRegistry>,
        executor: Arc<TickExecutor>,
        peer: PeerSender,
        outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    fn rig(build: impl FnOnce(&mut CapabilityRegistry)) -> TestRig {
        let mut registry = CapabilityRegistry::new();
        build(&mut registry);
        let registry = Arc::new(registry);
        let executor = Arc::new(TickExecutor::new());
        let dispatcher = Dispatcher::new(registry.clone(), executor.clone(), "test-host".into());
        let (tx, outbound) = mpsc::unbounded_channel();
        TestRig {
            dispatcher,
            registry,
            executor,
            peer: PeerSender::new(tx),
            outbound,
        }
    }

    fn request(id: &str, method: &str, params: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    async fn next_response(outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Value {
        let frame = outbound.recv().await.expect("expected a response frame");
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_is_answered_inline() {
        let mut rig = rig(|_| {});

        rig.dispatcher
            .on_frame(&rig.peer, request("1", "initialize", json!({})));

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response["id"], json!("1"));
        assert_eq!(response["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(response["result"]["serverInfo"]["name"], json!("test-host"));
    }

    #[tokio::test]
    async fn test_list_capabilities() {
        let mut rig = rig(|registry| {
            registry.register("ping", |_| Ok(Value::Null));
            registry.register("echo", |args| Ok(Value::Object(args.clone())));
        });

        rig.dispatcher
            .on_frame(&rig.peer, request("2", "tools/list", json!({})));

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(
            response["result"],
            json!({"tools": [{"name": "echo"}, {"name": "ping"}]})
        );
    }

    #[tokio::test]
    async fn test_invoke_round_trip_through_drain() {
        let mut rig = rig(|registry| {
            registry.register("echo", |args| Ok(Value::Object(args.clone())));
        });

        rig.dispatcher.on_frame(
            &rig.peer,
            request("1", "tools/call", json!({"name": "echo", "arguments": {"x": 5}})),
        );

        // Nothing is sent until the owner thread drains.
        assert_eq!(rig.executor.queued(), 1);
        rig.executor.drain_once(&rig.registry);

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response, json!({"jsonrpc": "2.0", "id": "1", "result": {"x": 5}}));
    }

    #[tokio::test]
    async fn test_unknown_capability_never_reaches_executor() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut rig = rig(|registry| {
            registry.register("real", |_| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            });
        });

        rig.dispatcher.on_frame(
            &rig.peer,
            request("9", "tools/call", json!({"name": "ghost", "arguments": {}})),
        );

        assert_eq!(rig.executor.queued(), 0);
        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response["error"]["code"], json!(-32601));
        assert_eq!(response["error"]["message"], json!("Unknown method: ghost"));
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_top_level_method() {
        let mut rig = rig(|_| {});

        rig.dispatcher
            .on_frame(&rig.peer, request("3", "resources/list", json!({})));

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn test_invoke_without_name_is_invalid_arguments() {
        let mut rig = rig(|registry| {
            registry.register("echo", |args| Ok(Value::Object(args.clone())));
        });

        rig.dispatcher.on_frame(
            &rig.peer,
            request("4", "tools/call", json!({"arguments": {}})),
        );

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response["error"]["code"], json!(-32602));
        assert_eq!(rig.executor.queued(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_with_id_gets_protocol_error() {
        let mut rig = rig(|_| {});

        rig.dispatcher
            .on_frame(&rig.peer, br#"{"jsonrpc":"2.0","id":"7"}"#.to_vec());

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response["id"], json!("7"));
        assert_eq!(response["error"]["code"], json!(-32600));
    }

    #[tokio::test]
    async fn test_malformed_frame_without_id_is_dropped() {
        let mut rig = rig(|_| {});

        rig.dispatcher.on_frame(&rig.peer, b"{garbage".to_vec());
        rig.dispatcher.on_frame(&rig.peer, b"[1,2]".to_vec());

        assert!(rig.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_response_envelope_is_ignored() {
        let mut rig = rig(|_| {});

        rig.dispatcher.on_frame(
            &rig.peer,
            br#"{"jsonrpc":"2.0","id":"1","result":{"stale":true}}"#.to_vec(),
        );

        assert!(rig.outbound.try_recv().is_err());
        assert_eq!(rig.executor.queued(), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_response_format() {
        let mut rig = rig(|registry| {
            registry.register("broken", |_| {
                Err(crate::registry::HandlerFailure::new("IoError", "disk on fire"))
            });
        });

        rig.dispatcher.on_frame(
            &rig.peer,
            request("5", "tools/call", json!({"name": "broken", "arguments": {}})),
        );
        rig.executor.drain_once(&rig.registry);

        let response = next_response(&mut rig.outbound).await;
        assert_eq!(response["error"]["code"], json!(-32000));
        assert_eq!(response["error"]["message"], json!("[broken] IoError: disk on fire"));
    }
}
