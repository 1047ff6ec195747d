//! Blocking Moonraker HTTP client.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::websocket::WebSocketFeed;
use super::{ConsoleFeed, PrinterApi};
use crate::error::ApiError;
use crate::model::{ConsoleMessage, Directory, GcodeFile};
use crate::paths::GCODES_ROOT;

const API_KEY_HEADER: &str = "X-Api-Key";
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket read timeout for the live feed; bounds how long a cancel waits.
const FEED_POLL: Duration = Duration::from_millis(200);

/// HTTP client for one Moonraker instance. Cheap to clone the config into a
/// second instance with a different timeout (see [`MoonrakerClient::with_timeout`]).
pub struct MoonrakerClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for MoonrakerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoonrakerClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MoonrakerClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|e| ApiError::Connection {
            message: format!("invalid Moonraker URL {base_url}: {e}"),
        })?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ApiError::Auth { message: format!("invalid API key: {e}") })?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key,
            timeout,
        })
    }

    /// Same host and credentials, different request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Result<Self, ApiError> {
        Self::new(&self.base_url, self.api_key.clone(), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(self.http.get(self.endpoint(path)))
    }

    fn post(&self, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let req = self.http.post(self.endpoint(path));
        match body {
            Some(body) => self.send(req.json(&body)),
            None => self.send(req),
        }
    }

    fn send(&self, req: RequestBuilder) -> Result<Value, ApiError> {
        let resp = req.send()?;
        let status = resp.status();
        let body = resp.text()?;
        unwrap_envelope(status, &body)
    }
}

/// Moonraker wraps successes in `{"result": ...}` and failures in
/// `{"error": {"code", "message"}}`.
pub(crate) fn unwrap_envelope(status: StatusCode, body: &str) -> Result<Value, ApiError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(error) = parsed.as_ref().and_then(|v| v.get("error")) {
        let code = error
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(status.as_u16());
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(match code {
            401 | 403 => ApiError::Auth { message },
            _ => ApiError::Remote {
                status: Some(code),
                message,
            },
        });
    }

    if !status.is_success() {
        let message = body.trim().to_string();
        return Err(match status.as_u16() {
            401 | 403 => ApiError::Auth { message },
            code => ApiError::Remote {
                status: Some(code),
                message,
            },
        });
    }

    let value = parsed.ok_or_else(|| ApiError::protocol("response is not JSON"))?;
    Ok(match value {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    })
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::protocol(e.to_string()))
}

/// `root/path` from an `{"item": {...}}` file-operation result.
fn item_path(result: &Value) -> Option<String> {
    let item = result.get("item")?;
    let path = item.get("path").and_then(Value::as_str)?;
    Some(match item.get("root").and_then(Value::as_str) {
        Some(root) => format!("{root}/{path}"),
        None => path.to_string(),
    })
}

fn console_message(entry: Value) -> Option<ConsoleMessage> {
    match entry {
        Value::String(message) => Some(ConsoleMessage {
            message,
            time: None,
            kind: crate::model::EventKind::Response,
        }),
        entry @ Value::Object(_) => serde_json::from_value(entry).ok(),
        _ => None,
    }
}

impl PrinterApi for MoonrakerClient {
    fn server_info(&self) -> Result<Value, ApiError> {
        self.get("/server/info")
    }

    fn printer_info(&self) -> Result<Value, ApiError> {
        self.get("/printer/info")
    }

    fn list_objects(&self) -> Result<Vec<String>, ApiError> {
        let mut result = self.get("/printer/objects/list")?;
        decode(result.get_mut("objects").map(Value::take).unwrap_or(Value::Null))
    }

    fn query_objects(&self, objects: &[&str]) -> Result<Map<String, Value>, ApiError> {
        let query = objects
            .iter()
            .map(|o| urlencoding::encode(o).into_owned())
            .collect::<Vec<_>>()
            .join("&");
        debug!(objects = ?objects, "query objects");
        let mut result = self.get(&format!("/printer/objects/query?{query}"))?;
        match result.get_mut("status").map(Value::take) {
            Some(Value::Object(status)) => Ok(status),
            _ => Ok(Map::new()),
        }
    }

    fn run_gcode(&self, script: &str) -> Result<String, ApiError> {
        debug!(script, "run gcode");
        let path = format!("/printer/gcode/script?script={}", urlencoding::encode(script));
        Ok(match self.post(&path, None)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    fn gcode_help(&self) -> Result<BTreeMap<String, String>, ApiError> {
        match self.get("/printer/gcode/help")? {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(name, help)| {
                    let text = help.as_str().map_or_else(|| help.to_string(), str::to_string);
                    (name, text)
                })
                .collect()),
            _ => Err(ApiError::protocol("gcode help is not an object")),
        }
    }

    fn console_history(&self, count: usize) -> Result<Vec<ConsoleMessage>, ApiError> {
        let mut result = self.get(&format!("/server/gcode_store?count={count}"))?;
        let entries = match result.get_mut("gcode_store").map(Value::take) {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        let mut messages: Vec<ConsoleMessage> =
            entries.into_iter().filter_map(console_message).collect();
        if messages.len() > count {
            messages.drain(..messages.len() - count);
        }
        Ok(messages)
    }

    fn endstops(&self) -> Result<BTreeMap<String, String>, ApiError> {
        decode(self.get("/printer/query_endstops/status")?)
    }

    fn list_files(&self, root: &str) -> Result<Vec<GcodeFile>, ApiError> {
        let result = self.get(&format!("/server/files/list?root={}", urlencoding::encode(root)))?;
        match result {
            Value::Array(_) => decode(result),
            Value::Object(mut map) => decode(map.remove("files").unwrap_or(Value::Array(Vec::new()))),
            _ => Ok(Vec::new()),
        }
    }

    fn file_metadata(&self, filename: &str) -> Result<GcodeFile, ApiError> {
        let mut value = self.get(&format!(
            "/server/files/metadata?filename={}",
            urlencoding::encode(filename)
        ))?;
        if let Value::Object(map) = &mut value {
            map.entry("filename").or_insert_with(|| Value::String(filename.to_string()));
        }
        decode(value)
    }

    fn delete_file(&self, filename: &str) -> Result<(), ApiError> {
        let path = format!("/server/files/{GCODES_ROOT}/{}", encode_path(filename));
        self.send(self.http.delete(self.endpoint(&path))).map(|_| ())
    }

    fn move_file(&self, source: &str, dest: &str) -> Result<(), ApiError> {
        let body = json!({
            "source": format!("{GCODES_ROOT}/{source}"),
            "dest": format!("{GCODES_ROOT}/{dest}"),
        });
        self.post("/server/files/move", Some(body)).map(|_| ())
    }

    fn copy_file(&self, source: &str, dest: &str) -> Result<(), ApiError> {
        let body = json!({
            "source": format!("{GCODES_ROOT}/{source}"),
            "dest": format!("{GCODES_ROOT}/{dest}"),
        });
        self.post("/server/files/copy", Some(body)).map(|_| ())
    }

    fn start_print(&self, filename: &str) -> Result<(), ApiError> {
        self.post("/printer/print/start", Some(json!({ "filename": filename })))
            .map(|_| ())
    }

    fn create_directory(&self, path: &str) -> Result<String, ApiError> {
        let result = self.post("/server/files/directory", Some(json!({ "path": path })))?;
        Ok(item_path(&result).unwrap_or_else(|| path.to_string()))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<Directory>, ApiError> {
        let mut result = self.get(&format!(
            "/server/files/directory?path={}&extended=true",
            urlencoding::encode(path)
        ))?;
        decode(result.get_mut("dirs").map_or(Value::Array(Vec::new()), Value::take))
    }

    fn upload_file(&self, local: &Path, remote_dir: &str) -> Result<String, ApiError> {
        if !local.is_file() {
            return Err(ApiError::Io {
                message: format!("Local file not found: {}", local.display()),
            });
        }
        let (root, sub) = remote_dir.split_once('/').unwrap_or((remote_dir, ""));
        let form = multipart::Form::new()
            .text("root", root.to_string())
            .text("path", sub.to_string())
            .file("file", local)?;

        debug!(local = %local.display(), remote_dir, "upload");
        let result = self.send(self.http.post(self.endpoint("/server/files/upload")).multipart(form))?;
        let fallback = || {
            let name = local.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            format!("{}/{name}", remote_dir.trim_end_matches('/'))
        };
        Ok(item_path(&result).unwrap_or_else(fallback))
    }

    fn download_file(&self, remote: &str, local: &Path) -> Result<u64, ApiError> {
        let resp = self
            .http
            .get(self.endpoint(&format!("/server/files/{}", encode_path(remote))))
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(unwrap_envelope(status, &body).err().unwrap_or(ApiError::Remote {
                status: Some(status.as_u16()),
                message: format!("download of {remote} failed"),
            }));
        }
        let bytes = resp.bytes()?;
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(local, &bytes)?;
        Ok(bytes.len() as u64)
    }

    fn emergency_stop(&self) -> Result<(), ApiError> {
        self.post("/printer/emergency_stop", None).map(|_| ())
    }

    fn restart(&self) -> Result<(), ApiError> {
        self.post("/printer/restart", None).map(|_| ())
    }

    fn firmware_restart(&self) -> Result<(), ApiError> {
        self.post("/printer/firmware_restart", None).map(|_| ())
    }

    fn subscribe_console(&self) -> Result<Box<dyn ConsoleFeed>, ApiError> {
        let feed = WebSocketFeed::connect(
            &self.base_url,
            self.api_key.as_deref(),
            self.timeout.min(MAX_CONNECT_TIMEOUT),
            FEED_POLL,
        )?;
        Ok(Box::new(feed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_result_is_unwrapped() {
        let v = unwrap_envelope(StatusCode::OK, r#"{"result": {"objects": ["fan"]}}"#).unwrap();
        assert_eq!(v, json!({ "objects": ["fan"] }));
    }

    #[test]
    fn envelope_error_maps_to_remote() {
        let err = unwrap_envelope(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"code": 400, "message": "Unknown command: FOO"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ApiError::Remote {
                status: Some(400),
                message: "Unknown command: FOO".into()
            }
        );
    }

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = unwrap_envelope(StatusCode::UNAUTHORIZED, "Unauthorized").unwrap_err();
        assert!(matches!(err, ApiError::Auth { .. }));
    }

    #[test]
    fn non_json_success_is_protocol_error() {
        let err = unwrap_envelope(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, ApiError::Protocol { .. }));
    }

    #[test]
    fn paths_are_encoded_per_segment() {
        assert_eq!(encode_path("parts/my benchy.gcode"), "parts/my%20benchy.gcode");
    }

    #[test]
    fn item_path_joins_root() {
        let result = json!({ "item": { "path": "parts", "root": "gcodes" }, "action": "create_dir" });
        assert_eq!(item_path(&result).as_deref(), Some("gcodes/parts"));
        assert_eq!(item_path(&json!({})), None);
    }

    #[test]
    fn history_entries_accept_strings() {
        let m = console_message(json!("ok")).unwrap();
        assert_eq!(m.message, "ok");
        assert_eq!(m.time, None);
        assert!(console_message(json!(42)).is_none());
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = MoonrakerClient::new("not a url", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ApiError::Connection { .. }));
    }
}
