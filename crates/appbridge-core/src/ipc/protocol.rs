//! Agent transport framing and dispatch envelopes.
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON:
//!
//! ```text
//! [u32 BE: len][JSON bytes of len]
//! ```
//!
//! The host sends [`DispatchCall`]s. The agent answers each one with a
//! [`DispatchReply`] carrying the same `id`; replies may come back in any order.

use crate::config::IpcConfig;
use crate::error::{BridgeError, Result};
use crate::models::ContentApp;
use crate::router::RouteRequest;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const JSONRPC_VERSION: &str = "2.0";

/// Params of a `content_app.dispatch` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchParams {
    pub app: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub request: RouteRequest,
}

impl DispatchParams {
    pub fn new(app: &ContentApp, request: &RouteRequest) -> Self {
        Self {
            app: app.name.clone(),
            vendor_id: app.vendor_id,
            product_id: app.product_id,
            request: request.clone(),
        }
    }
}

/// One routed request on its way to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchCall {
    pub jsonrpc: String,
    pub method: String,
    pub id: u64,
    pub params: DispatchParams,
}

impl DispatchCall {
    pub fn new(id: u64, params: DispatchParams) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: IpcConfig::DISPATCH_METHOD.to_string(),
            id,
            params,
        }
    }
}

/// The agent's answer to a [`DispatchCall`].
///
/// `id` is `None` only when the agent could not read the call at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReply {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub code: i32,
    pub message: String,
}

impl DispatchReply {
    /// The content app's response string for call `id`.
    pub fn answered(id: u64, response: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(serde_json::Value::String(response.into())),
            error: None,
        }
    }

    pub fn failed(id: Option<u64>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(ReplyError {
                code,
                message: message.into(),
            }),
        }
    }

    /// The response string, or the agent's error.
    ///
    /// A non-string result is passed on as its JSON text.
    pub fn into_response(self) -> std::result::Result<String, ReplyError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        match self.result {
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(other) => Ok(other.to_string()),
            None => Err(ReplyError {
                code: -32603,
                message: "reply carries neither result nor error".to_string(),
            }),
        }
    }
}

/// Serialize `value` and prepend the length prefix.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(value)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| (*len as usize) <= IpcConfig::MAX_IPC_MESSAGE_SIZE)
        .ok_or_else(|| oversized(payload.len()))?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Bytes read from the socket stay buffered across calls, so a
/// [`read_frame`](Self::read_frame) future may be dropped at any await point
/// without losing or splitting a frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(prefix) = self.buf.get(..4) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if len > IpcConfig::MAX_IPC_MESSAGE_SIZE {
            return Err(oversized(len));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let frame = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(frame))
    }

    /// Read until a whole frame is available.
    ///
    /// Returns `None` on a clean EOF between frames.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.next_frame()? {
                return Ok(Some(frame));
            }
            if reader.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed with {} bytes of a partial frame", self.buf.len()),
                )
                .into());
            }
        }
    }
}

fn oversized(len: usize) -> BridgeError {
    BridgeError::Validation {
        field: "ipc_frame".to_string(),
        message: format!(
            "IPC message size {} exceeds maximum {}",
            len,
            IpcConfig::MAX_IPC_MESSAGE_SIZE
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EndpointId;

    fn params() -> DispatchParams {
        DispatchParams {
            app: "vid-lib".to_string(),
            vendor_id: 42,
            product_id: 7,
            request: RouteRequest::read_attribute(EndpointId::new(5), 1289, 1),
        }
    }

    #[test]
    fn test_dispatch_call_envelope() {
        let value = serde_json::to_value(DispatchCall::new(3, params())).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "content_app.dispatch");
        assert_eq!(value["id"], 3);
        assert_eq!(value["params"]["app"], "vid-lib");
        assert_eq!(value["params"]["request"]["kind"], "read_attribute");
        assert_eq!(value["params"]["request"]["attribute_id"], 1);
    }

    #[test]
    fn test_reply_into_response() {
        assert_eq!(
            DispatchReply::answered(1, r#"{"value":1}"#).into_response(),
            Ok(r#"{"value":1}"#.to_string())
        );

        let structured: DispatchReply =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":2,"result":{"count":3}}"#).unwrap();
        assert_eq!(structured.into_response(), Ok(r#"{"count":3}"#.to_string()));

        let err = DispatchReply::failed(Some(4), -32002, "no such app")
            .into_response()
            .unwrap_err();
        assert_eq!(err.code, -32002);

        let empty: DispatchReply = serde_json::from_str(r#"{"jsonrpc":"2.0","id":5}"#).unwrap();
        assert!(empty.into_response().is_err());
    }

    #[test]
    fn test_failed_reply_omits_result() {
        let json = serde_json::to_string(&DispatchReply::failed(None, -32700, "bad")).unwrap();
        assert!(!json.contains("\"result\""));
        assert!(json.contains("-32700"));
    }

    #[test]
    fn test_frame_has_big_endian_length_prefix() {
        let frame = encode_frame(&serde_json::json!({})).unwrap();
        assert_eq!(frame, vec![0, 0, 0, 2, b'{', b'}']);
    }

    #[test]
    fn test_frame_buffer_splits_back_to_back_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.buf.extend(encode_frame(&serde_json::json!(1)).unwrap());
        buffer.buf.extend(encode_frame(&serde_json::json!("two")).unwrap());
        buffer.buf.extend_from_slice(&[0, 0, 0]);

        assert_eq!(buffer.next_frame().unwrap(), Some(b"1".to_vec()));
        assert_eq!(buffer.next_frame().unwrap(), Some(br#""two""#.to_vec()));
        assert_eq!(buffer.next_frame().unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_across_partial_reads() {
        let frame = encode_frame(&serde_json::json!({"a": 1})).unwrap();
        let (head, tail) = frame.split_at(3);
        let mut reader = tokio_test_reader(&[head, tail]);

        let mut buffer = FrameBuffer::new();
        let payload = buffer.read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(payload, br#"{"a":1}"#.to_vec());
        assert!(buffer.read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_error() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_be_bytes());
        data.extend_from_slice(b"abc");

        let mut cursor = std::io::Cursor::new(data);
        assert!(FrameBuffer::new().read_frame(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let huge = (IpcConfig::MAX_IPC_MESSAGE_SIZE + 1) as u32;
        let mut cursor = std::io::Cursor::new(huge.to_be_bytes().to_vec());
        let result = FrameBuffer::new().read_frame(&mut cursor).await;
        assert!(matches!(result, Err(BridgeError::Validation { .. })));
    }

    /// Reader that yields each chunk from a separate read call.
    fn tokio_test_reader(chunks: &[&[u8]]) -> impl AsyncRead + Unpin {
        let (client, mut server) = tokio::io::duplex(64);
        let chunks: Vec<Vec<u8>> = chunks.iter().map(|c| c.to_vec()).collect();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for chunk in chunks {
                server.write_all(&chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        client
    }
}
