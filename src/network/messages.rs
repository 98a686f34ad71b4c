// src/network/messages.rs
//! Protocol messages exchanged with the node
//!
//! Outbound traffic is a [`Request`] wrapped in an [`Envelope`] carrying its
//! request id. Inbound traffic decodes to a [`NodeMessage`]. The JSON shapes
//! live in the private `Wire*` structs and are only touched by the codec.

use crate::miner::job::Job;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// A solution ready to be reported to the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Edge bits of the graph the proof was found in
    pub edge_bits: u8,
    /// Job the attempt was started from
    pub job_id: u64,
    /// Height of that job
    pub height: u64,
    /// Nonce the graph keys were derived from
    pub nonce: u64,
    /// Cycle edges
    pub pow: Vec<u64>,
}

/// Session requests sent to the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Opens the session
    Login {
        /// Login identity (usually a wallet or user name)
        login: String,
        /// Optional credential; sent as an empty string when absent
        password: Option<String>,
        /// Client name and version
        agent: String,
    },
    /// Keeps an idle session open
    KeepAlive,
    /// Asks for the current job template
    GetJob,
    /// Reports a found cycle
    Submit(Submission),
}

impl Request {
    /// JSON-RPC method name of the request
    pub fn method(&self) -> &'static str {
        match self {
            Request::Login { .. } => "login",
            Request::KeepAlive => "keepalive",
            Request::GetJob => "getjobtemplate",
            Request::Submit(_) => "submit",
        }
    }

    fn params(&self) -> Value {
        match self {
            Request::Login {
                login,
                password,
                agent,
            } => json!({
                "login": login,
                "pass": password.as_deref().unwrap_or_default(),
                "agent": agent,
            }),
            Request::KeepAlive | Request::GetJob => Value::Null,
            Request::Submit(s) => json!({
                "edge_bits": s.edge_bits,
                "height": s.height,
                "job_id": s.job_id,
                "nonce": s.nonce,
                "pow": s.pow,
            }),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Submit(s) => write!(f, "submit (job {}, nonce {})", s.job_id, s.nonce),
            other => f.write_str(other.method()),
        }
    }
}

/// A request tagged with its per-session id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Id echoed back by the node in the matching response
    pub id: u64,
    /// The request itself
    pub request: Request,
}

/// Error object returned by the node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcError {
    /// Numeric error code
    pub code: i64,
    /// Human readable reason
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Acknowledgment of an earlier request
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    /// Id of the request being answered, if the node echoed one
    pub id: Option<u64>,
    /// Method of the request being answered
    pub method: String,
    /// `Ok` with the result payload, or the node's error
    pub outcome: Result<Value, RpcError>,
}

/// Messages received from the node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeMessage {
    /// New work, from a `job` notification or a `getjobtemplate` response
    Job(Job),
    /// Response to a login, keep-alive, submit or failed job request
    Ack(Ack),
    /// Notification this client does not act on
    Unsupported(String),
}

/// Outbound JSON-RPC frame
#[derive(Serialize)]
struct WireRequest<'a> {
    id: String,
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
}

/// Inbound JSON-RPC frame; responses and notifications share one shape
#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct WireJob {
    job_id: u64,
    height: u64,
    difficulty: u64,
    pre_pow: String,
}

impl WireJob {
    fn into_job(self) -> Result<Job, MinerError> {
        Ok(Job {
            id: self.job_id,
            height: self.height,
            difficulty: self.difficulty,
            pre_pow: hex::decode(self.pre_pow)?,
        })
    }
}

/// Serializes an envelope as one JSON object (no trailing newline)
pub(crate) fn to_json(envelope: &Envelope) -> Result<Vec<u8>, MinerError> {
    let frame = WireRequest {
        id: envelope.id.to_string(),
        jsonrpc: "2.0",
        method: envelope.request.method(),
        params: envelope.request.params(),
    };
    Ok(serde_json::to_vec(&frame)?)
}

/// Parses one JSON object received from the node
pub(crate) fn from_json(line: &[u8]) -> Result<NodeMessage, MinerError> {
    let msg: WireMessage = serde_json::from_slice(line)?;
    let method = msg
        .method
        .ok_or_else(|| MinerError::ProtocolError("Message without method".to_string()))?;

    // job notifications may carry an id too, so only params mark a notification
    let is_response =
        msg.result.is_some() || msg.error.is_some() || (msg.params.is_none() && msg.id.is_some());
    if !is_response {
        return match method.as_str() {
            "job" => {
                let params = msg
                    .params
                    .ok_or_else(|| MinerError::ProtocolError("Missing params object".to_string()))?;
                let job: WireJob = serde_json::from_value(params)?;
                Ok(NodeMessage::Job(job.into_job()?))
            }
            _ => Ok(NodeMessage::Unsupported(method)),
        };
    }

    if method == "getjobtemplate" && msg.error.is_none() {
        if let Some(result) = msg.result {
            let job: WireJob = serde_json::from_value(result)?;
            return Ok(NodeMessage::Job(job.into_job()?));
        }
    }

    let outcome = match msg.error {
        Some(error) => Err(error),
        None => Ok(msg.result.unwrap_or(Value::Null)),
    };
    Ok(NodeMessage::Ack(Ack {
        id: msg.id.as_ref().and_then(parse_id),
        method,
        outcome,
    }))
}

fn parse_id(id: &Value) -> Option<u64> {
    match id {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(envelope: &Envelope) -> Value {
        serde_json::from_slice(&to_json(envelope).unwrap()).unwrap()
    }

    #[test]
    fn login_carries_identity_and_agent() {
        let v = frame(&Envelope {
            id: 0,
            request: Request::Login {
                login: "alice".into(),
                password: None,
                agent: "test/1".into(),
            },
        });
        assert_eq!(v["id"], "0");
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["method"], "login");
        assert_eq!(v["params"]["login"], "alice");
        assert_eq!(v["params"]["pass"], "");
        assert_eq!(v["params"]["agent"], "test/1");
    }

    #[test]
    fn submit_carries_proof() {
        let v = frame(&Envelope {
            id: 9,
            request: Request::Submit(Submission {
                edge_bits: 31,
                job_id: 7,
                height: 100,
                nonce: 12345,
                pow: vec![1, 2, 3],
            }),
        });
        assert_eq!(v["method"], "submit");
        assert_eq!(v["params"]["edge_bits"], 31);
        assert_eq!(v["params"]["job_id"], 7);
        assert_eq!(v["params"]["height"], 100);
        assert_eq!(v["params"]["nonce"], 12345);
        assert_eq!(v["params"]["pow"], json!([1, 2, 3]));
    }

    #[test]
    fn keepalive_and_getjob_have_null_params() {
        for request in [Request::KeepAlive, Request::GetJob] {
            let v = frame(&Envelope { id: 1, request });
            assert!(v["params"].is_null());
        }
    }

    #[test]
    fn job_notification_decodes() {
        let msg = from_json(
            br#"{"jsonrpc":"2.0","method":"job","params":{"job_id":7,"height":100,"difficulty":1,"pre_pow":"00ff"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            NodeMessage::Job(Job {
                id: 7,
                height: 100,
                difficulty: 1,
                pre_pow: vec![0x00, 0xff],
            })
        );
    }

    #[test]
    fn getjobtemplate_result_is_a_job() {
        let msg = from_json(
            br#"{"id":"3","jsonrpc":"2.0","method":"getjobtemplate","result":{"job_id":8,"height":101,"difficulty":4,"pre_pow":"ab"},"error":null}"#,
        )
        .unwrap();
        assert!(matches!(msg, NodeMessage::Job(Job { id: 8, .. })));
    }

    #[test]
    fn getjobtemplate_error_is_an_ack() {
        let msg = from_json(
            br#"{"id":"3","jsonrpc":"2.0","method":"getjobtemplate","result":null,"error":{"code":-32000,"message":"Node is syncing - Please wait"}}"#,
        )
        .unwrap();
        match msg {
            NodeMessage::Ack(ack) => {
                assert_eq!(ack.id, Some(3));
                assert_eq!(ack.outcome.unwrap_err().code, -32000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn submit_ack_accepts_numeric_id() {
        let msg = from_json(br#"{"id":5,"method":"submit","result":"ok"}"#).unwrap();
        assert_eq!(
            msg,
            NodeMessage::Ack(Ack {
                id: Some(5),
                method: "submit".into(),
                outcome: Ok(json!("ok")),
            })
        );
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(from_json(b"not json").is_err());
        assert!(from_json(br#"{"id":"1","result":"ok"}"#).is_err());
        assert!(from_json(br#"{"method":"job","params":{"job_id":1}}"#).is_err());
        assert!(
            from_json(br#"{"method":"job","params":{"job_id":1,"height":1,"difficulty":1,"pre_pow":"zz"}}"#)
                .is_err()
        );
    }

    #[test]
    fn null_result_is_still_an_ack() {
        let msg =
            from_json(br#"{"id":"2","method":"keepalive","result":null,"error":null}"#).unwrap();
        assert!(matches!(msg, NodeMessage::Ack(Ack { id: Some(2), .. })));
    }

    #[test]
    fn unknown_notifications_are_not_errors() {
        assert_eq!(
            from_json(br#"{"method":"status","params":{}}"#).unwrap(),
            NodeMessage::Unsupported("status".into())
        );
    }
}
