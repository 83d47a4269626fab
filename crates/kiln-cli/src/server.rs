use kiln_agent::{ToolCall, ToolSession};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

const JSONRPC_VERSION: &str = "2.0";
const PROTOCOL_VERSION: &str = "2024-11-05";
const ERROR_PARSE: i64 = -32700;
const ERROR_INVALID_REQUEST: i64 = -32600;
const ERROR_METHOD_NOT_FOUND: i64 = -32601;
const ERROR_INVALID_PARAMS: i64 = -32602;
const ERROR_INTERNAL: i64 = -32603;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ServeReport {
    pub processed_lines: usize,
    pub error_count: usize,
}

#[derive(Debug)]
struct JsonRpcRequest {
    /// `None` for notifications, which never get a response.
    id: Option<Value>,
    method: String,
    params: Map<String, Value>,
}

#[derive(Debug)]
struct DispatchError {
    id: Value,
    code: i64,
    message: String,
}

impl DispatchError {
    fn new(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            code,
            message: message.into(),
        }
    }
}

/// Serves newline-delimited JSON-RPC until the reader reaches EOF.
pub(crate) async fn serve_jsonrpc_lines<R, W>(
    reader: R,
    writer: &mut W,
    session: &mut ToolSession,
) -> std::io::Result<ServeReport>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut report = ServeReport::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        report.processed_lines += 1;

        let response = match serde_json::from_str::<Value>(&line) {
            Err(error) => Some(jsonrpc_error_frame(
                Value::Null,
                ERROR_PARSE,
                format!("failed to parse request: {error}"),
            )),
            Ok(frame) => match parse_jsonrpc_request(&frame) {
                Err(error) => Some(jsonrpc_error_frame(error.id, error.code, error.message)),
                Ok(request) => {
                    let outcome = dispatch_jsonrpc_request(&request, session).await;
                    match (request.id, outcome) {
                        (None, Ok(_)) => None,
                        (None, Err(error)) => {
                            debug!(method = %request.method, reason = %error.message, "notification ignored");
                            None
                        }
                        (Some(id), Ok(result)) => Some(jsonrpc_result_frame(id, result)),
                        (Some(_), Err(error)) => {
                            Some(jsonrpc_error_frame(error.id, error.code, error.message))
                        }
                    }
                }
            },
        };

        if let Some(response) = response {
            if response.get("error").is_some() {
                report.error_count += 1;
            }
            write_frame(writer, &response).await?;
        }
    }
    info!(
        processed = report.processed_lines,
        errors = report.error_count,
        "protocol input closed"
    );
    Ok(report)
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

fn parse_jsonrpc_request(value: &Value) -> Result<JsonRpcRequest, DispatchError> {
    let Some(object) = value.as_object() else {
        return Err(DispatchError::new(
            Value::Null,
            ERROR_INVALID_REQUEST,
            "jsonrpc request must be an object",
        ));
    };
    let id = object.get("id").cloned();
    let reply_id = id.clone().unwrap_or(Value::Null);
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(DispatchError::new(
            reply_id,
            ERROR_INVALID_REQUEST,
            format!("jsonrpc must be '{JSONRPC_VERSION}'"),
        ));
    }
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .ok_or_else(|| {
            DispatchError::new(
                reply_id.clone(),
                ERROR_INVALID_REQUEST,
                "jsonrpc request must include non-empty method",
            )
        })?;
    let params = match object.get("params") {
        Some(Value::Object(params)) => params.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(_) => {
            return Err(DispatchError::new(
                reply_id,
                ERROR_INVALID_PARAMS,
                "jsonrpc request params must be an object",
            ));
        }
    };
    Ok(JsonRpcRequest {
        id,
        method: method.to_string(),
        params,
    })
}

async fn dispatch_jsonrpc_request(
    request: &JsonRpcRequest,
    session: &mut ToolSession,
) -> Result<Value, DispatchError> {
    let id = request.id.clone().unwrap_or(Value::Null);
    match request.method.as_str() {
        "initialize" => Ok(handle_initialize()),
        "notifications/initialized" | "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": session.list_tools() })),
        "tools/call" => {
            let call = match parse_tool_call(&request.params) {
                Ok(call) => call,
                Err(message) => return Err(DispatchError::new(id, ERROR_INVALID_PARAMS, message)),
            };
            let response = session.call(call).await;
            serde_json::to_value(response).map_err(|error| {
                warn!(%error, "tool response could not be encoded");
                DispatchError::new(id, ERROR_INTERNAL, error.to_string())
            })
        }
        other => Err(DispatchError::new(
            id,
            ERROR_METHOD_NOT_FOUND,
            format!("unsupported method '{other}'"),
        )),
    }
}

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": "kiln",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": { "listChanged": false }
        }
    })
}

fn parse_tool_call(params: &Map<String, Value>) -> Result<ToolCall, String> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "tools/call requires non-empty field 'name'".to_string())?;
    let arguments = match params.get("arguments") {
        Some(Value::Object(arguments)) => Value::Object(arguments.clone()),
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(_) => return Err("tools/call field 'arguments' must be an object".to_string()),
    };
    Ok(ToolCall::new(name, arguments))
}

fn jsonrpc_result_frame(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

fn jsonrpc_error_frame(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}
