//! Capability API server over newline-delimited JSON-RPC.

use std::sync::Arc;
use std::time::Duration;

use authority::{Authority, Intent, IssueRequest};
use policy::ActionType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Interval;

use crate::error::{Error, Result};
use crate::protocol::{
    ApiError, CallbackParams, CallbackResult, IssueCapabilityParams, IssueCapabilityResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse,
};

/// Mint a capability.
pub const METHOD_ISSUE: &str = "capabilities/issue";

/// Spend a capability on a callback.
pub const METHOD_CALLBACK: &str = "actions/callback";

/// Maximum request line size (64KiB).
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Server tuning.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// How often to drop expired capabilities; `None` never does.
    pub purge_interval: Option<Duration>,
}

/// Handle one request line. Returns `None` for notifications.
pub fn handle_line(authority: &Authority, line: &str) -> Option<JsonRpcResponse> {
    if line.len() > MAX_REQUEST_SIZE {
        return Some(too_large(line.len()));
    }

    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::failure(
                None,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::failure(
            request.id,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        ));
    }

    let outcome = dispatch(authority, &request.method, request.params);
    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "notification handled, no response sent");
        return None;
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(Some(id), result),
        Err(error) => JsonRpcResponse::failure(Some(id), error),
    })
}

fn too_large(len: usize) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        None,
        JsonRpcError::new(
            JsonRpcError::INVALID_REQUEST,
            format!("request too large: {len} bytes (max {MAX_REQUEST_SIZE})"),
        ),
    )
}

fn dispatch(
    authority: &Authority,
    method: &str,
    params: Option<Value>,
) -> std::result::Result<Value, JsonRpcError> {
    match method {
        METHOD_ISSUE => {
            let params: IssueCapabilityParams = parse_params(params)?;
            let request = IssueRequest {
                intent: Intent::new(params.client_id, params.phone),
                action_type: params.action_type,
                source_module: params.source_module,
            };
            let token = authority
                .issue(&params.context, &request)
                .map_err(|e| domain_error(&e))?;
            to_result(IssueCapabilityResult {
                capability_token: token.capability_id.to_string(),
                expires_in_seconds: token.expires_in_seconds,
            })
        }
        METHOD_CALLBACK => {
            let params: CallbackParams = parse_params(params)?;
            let receipt = authority
                .consume(
                    &params.context,
                    &params.capability_token.into(),
                    &ActionType::callback(),
                    &Intent::new(params.client_id, params.phone),
                )
                .map_err(|e| domain_error(&e))?;
            to_result(CallbackResult {
                status: "OK".to_string(),
                action_id: receipt.action_id.to_string(),
            })
        }
        other => Err(JsonRpcError::new(
            JsonRpcError::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|e| {
        let message = format!("invalid params: {e}");
        JsonRpcError::new(JsonRpcError::INVALID_PARAMS, &message).with_data(ApiError {
            reason_code: authority::ReasonCode::RequestInvalid,
            message,
        })
    })
}

fn domain_error(e: &authority::Error) -> JsonRpcError {
    JsonRpcError::new(JsonRpcError::DOMAIN_ERROR, e.to_string()).with_data(ApiError::from(e))
}

fn to_result(value: impl Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}

/// Serve requests from `reader` until EOF, writing one response line per
/// request to `writer`.
///
/// Requests are handled concurrently; responses go out as they complete and
/// correlate by id. If the writer fails, reading stops at once and its error
/// is returned; requests already in flight are abandoned.
pub async fn serve<R, W>(
    authority: Arc<Authority>,
    reader: R,
    writer: W,
    options: ServerOptions,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let mut writer_task = tokio::spawn(write_responses(writer, rx));

    let mut frames = FrameReader::new(reader);
    let mut purge = options.purge_interval.map(tokio::time::interval);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            written = &mut writer_task => {
                return match written.map_err(|e| Error::Writer(e.to_string()))? {
                    Err(e) => Err(e),
                    Ok(()) => Err(Error::Writer("response writer exited early".into())),
                };
            }
            _ = tick(&mut purge) => {
                authority.purge_expired();
            }
            Some(joined) = in_flight.join_next() => {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "request task failed");
                }
            }
            frame = frames.next_frame() => {
                let line = match frame? {
                    None => break,
                    Some(Frame::Oversized(len)) => {
                        tracing::warn!(len, "discarded oversized request");
                        let _ = tx.send(too_large(len));
                        continue;
                    }
                    Some(Frame::Line(line)) => line,
                };
                if line.trim().is_empty() {
                    continue;
                }
                let authority = Arc::clone(&authority);
                let tx = tx.clone();
                in_flight.spawn(async move {
                    // Nobody can hear the answer; do not act on the request.
                    if tx.is_closed() {
                        return;
                    }
                    if let Some(response) = handle_line(&authority, &line) {
                        let _ = tx.send(response);
                    }
                });
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "request task failed");
        }
    }
    drop(tx);

    writer_task
        .await
        .map_err(|e| Error::Writer(e.to_string()))?
}

/// One unit read off the wire.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    /// A line longer than [`MAX_REQUEST_SIZE`]; only its length is kept.
    Oversized(usize),
}

/// Newline framing that never buffers more than [`MAX_REQUEST_SIZE`] bytes
/// of a single line.
///
/// All progress lives in the struct, so a `next_frame` future dropped by
/// `select!` loses nothing.
struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
    discarded: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            discarded: 0,
        }
    }

    async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.buf.is_empty() && self.discarded == 0 {
                    return Ok(None);
                }
                return Ok(Some(self.finish_frame()));
            }

            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            let content = &available[..if complete { used - 1 } else { used }];
            if self.discarded == 0 && self.buf.len() + content.len() <= MAX_REQUEST_SIZE {
                self.buf.extend_from_slice(content);
            } else {
                self.discarded += self.buf.len() + content.len();
                self.buf = Vec::new();
            }
            self.reader.consume(used);

            if complete {
                return Ok(Some(self.finish_frame()));
            }
        }
    }

    fn finish_frame(&mut self) -> Frame {
        if self.discarded > 0 {
            return Frame::Oversized(std::mem::take(&mut self.discarded));
        }
        let mut bytes = std::mem::take(&mut self.buf);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Frame::Line(String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use authority::{AuthorityConfig, ReasonCode};
    use policy::Policy;
    use serde_json::json;

    fn authority() -> Authority {
        Authority::new(Policy::default(), AuthorityConfig::default().without_rate_limit()).unwrap()
    }

    fn call(authority: &Authority, id: i64, method: &str, params: Value) -> JsonRpcResponse {
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method).with_params(params)).unwrap();
        handle_line(authority, &line).unwrap()
    }

    fn reason(response: JsonRpcResponse) -> ReasonCode {
        response.into_result().unwrap_err().api_error().unwrap().reason_code
    }

    fn issue_params(role: &str, client_id: &str) -> Value {
        json!({
            "context": {"userId": "operator-1", "role": role},
            "clientId": client_id,
            "phone": "+79001234567",
            "actionType": "crm:callback",
            "sourceModule": "mf-a",
        })
    }

    #[test]
    fn issue_then_callback() {
        let authority = authority();
        let issued = call(&authority, 1, METHOD_ISSUE, issue_params("OPERATOR", "C-105"));
        let issued: IssueCapabilityResult =
            serde_json::from_value(issued.into_result().unwrap()).unwrap();
        assert_eq!(issued.expires_in_seconds, 30);

        let params = json!({
            "context": {"userId": "operator-1", "role": "OPERATOR"},
            "capabilityToken": issued.capability_token,
            "clientId": "C-105",
            "phone": "+79001234567",
        });
        let done = call(&authority, 2, METHOD_CALLBACK, params.clone());
        assert_eq!(done.id, Some(RequestId::Number(2)));
        let done: CallbackResult = serde_json::from_value(done.into_result().unwrap()).unwrap();
        assert_eq!(done.status, "OK");
        assert!(done.action_id.starts_with("CALL-"));

        let replay = call(&authority, 3, METHOD_CALLBACK, params);
        assert_eq!(reason(replay), ReasonCode::CapabilityReplay);
    }

    #[test]
    fn policy_denials_carry_reason_codes() {
        let authority = authority();
        let trainee = call(&authority, 1, METHOD_ISSUE, issue_params("TRAINEE", "C-105"));
        assert_eq!(reason(trainee), ReasonCode::RoleForbidden);

        let out_of_scope = call(&authority, 2, METHOD_ISSUE, issue_params("OPERATOR", "C-999"));
        let error = out_of_scope.into_result().unwrap_err();
        assert_eq!(error.code, JsonRpcError::DOMAIN_ERROR);
        assert_eq!(error.api_error().unwrap().reason_code, ReasonCode::ClientOutOfScope);
    }

    #[test]
    fn unknown_role_is_invalid_params() {
        let authority = authority();
        let response = call(&authority, 1, METHOD_ISSUE, issue_params("ADMIN", "C-105"));
        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert_eq!(error.api_error().unwrap().reason_code, ReasonCode::RequestInvalid);
        assert_eq!(authority.record_count(), 0);
    }

    #[test]
    fn unknown_token() {
        let authority = authority();
        let params = json!({
            "context": {"userId": "operator-1", "role": "OPERATOR"},
            "capabilityToken": "cap-forged",
            "clientId": "C-105",
            "phone": "+79001234567",
        });
        assert_eq!(
            reason(call(&authority, 1, METHOD_CALLBACK, params)),
            ReasonCode::CapabilityUnknown
        );
    }

    #[test]
    fn malformed_lines() {
        let authority = authority();

        let garbage = handle_line(&authority, "{not json").unwrap();
        assert_eq!(garbage.id, None);
        assert_eq!(garbage.into_result().unwrap_err().code, JsonRpcError::PARSE_ERROR);

        let wrong_version =
            handle_line(&authority, r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#).unwrap();
        assert_eq!(
            wrong_version.into_result().unwrap_err().code,
            JsonRpcError::INVALID_REQUEST
        );

        let unknown = handle_line(&authority, r#"{"jsonrpc":"2.0","id":1,"method":"x"}"#).unwrap();
        assert_eq!(unknown.into_result().unwrap_err().code, JsonRpcError::METHOD_NOT_FOUND);

        let huge = "x".repeat(MAX_REQUEST_SIZE + 1);
        let too_large = handle_line(&authority, &huge).unwrap();
        assert_eq!(too_large.into_result().unwrap_err().code, JsonRpcError::INVALID_REQUEST);
    }

    #[test]
    fn notifications_get_no_response() {
        let authority = authority();
        let mut request = JsonRpcRequest::new(1, METHOD_ISSUE).with_params(issue_params("OPERATOR", "C-105"));
        request.id = None;
        let line = serde_json::to_string(&request).unwrap();
        assert!(handle_line(&authority, &line).is_none());
    }

    async fn frames(input: &[u8]) -> Vec<Frame> {
        // A tiny buffer forces lines to span several reads.
        let mut reader = FrameReader::new(tokio::io::BufReader::with_capacity(7, input));
        let mut out = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn frames_split_on_newlines() {
        let out = frames(b"first line\r\n\nsecond line without newline").await;
        assert_eq!(
            out,
            vec![
                Frame::Line("first line".into()),
                Frame::Line(String::new()),
                Frame::Line("second line without newline".into()),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_line_is_discarded_not_buffered() {
        let mut input = vec![b'x'; MAX_REQUEST_SIZE * 3];
        input.extend_from_slice(b"\nnext\n");
        let mut reader = FrameReader::new(input.as_slice());

        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some(Frame::Oversized(MAX_REQUEST_SIZE * 3))
        );
        assert!(reader.buf.capacity() <= MAX_REQUEST_SIZE);
        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Line("next".into())));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_at_the_limit_is_kept() {
        let mut input = vec![b'y'; MAX_REQUEST_SIZE];
        input.push(b'\n');
        let out = frames(&input).await;
        assert_eq!(out, vec![Frame::Line("y".repeat(MAX_REQUEST_SIZE))]);
    }
}
