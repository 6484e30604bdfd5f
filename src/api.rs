// API client module: a small blocking HTTP client that talks to the
// denoising inference server. Four remote operations (health check, single
// upload, batch upload, video upload) plus artifact download. Responses
// are decoded into typed structures here, at a single boundary; the rest
// of the crate never pokes at raw JSON.

use crate::config::ServerConfig;
use crate::error::ClientError;
use reqwest::blocking::{multipart, Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};

const IMAGE_MIME: &str = "image/jpeg";
const VIDEO_MIME: &str = "video/mp4";

/// Blocking client holding the reqwest client and the server base URL.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Fields of a single-image inference response. Every field has a defined
/// default so a sparse or oddly-typed server reply degrades instead of
/// failing the call.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SingleFields {
    pub saved_filename: String,
    pub inference_result: Value,
    pub processed_image_url: Option<String>,
}

/// Per-item fields of a batch response. `original_filename` is the
/// reconciliation key back to the local file set.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BatchItemFields {
    pub original_filename: String,
    pub saved_filename: String,
    pub inference_result: Value,
    pub processed_image_url: Option<String>,
}

/// Typed fields plus the raw server object, kept verbatim for the audit
/// record.
pub struct SingleResponse {
    pub raw: Value,
    pub fields: SingleFields,
}

pub struct BatchItem {
    pub raw: Value,
    pub fields: BatchItemFields,
}

pub struct BatchResponse {
    pub total_images: u64,
    /// Items in server-given order, which need not match upload order.
    pub items: Vec<BatchItem>,
}

impl ApiClient {
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::ClientBuild)?;
        Ok(ApiClient {
            client,
            base_url: config.base_url(),
        })
    }

    /// GET /api/hello. Returns the server's JSON status body.
    pub fn health(&self) -> Result<Value, ClientError> {
        let url = format!("{}/api/hello", self.base_url);
        let res = self.client.get(&url).send().map_err(ClientError::Unreachable)?;
        decode_object(check_status(res)?)
    }

    /// POST one image as multipart field `image` to /api/f32_inference.
    pub fn upload_image(&self, path: &Path) -> Result<SingleResponse, ClientError> {
        let url = format!("{}/api/f32_inference", self.base_url);
        let part = file_part(path, IMAGE_MIME)?;
        let form = multipart::Form::new().part("image", part);
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(ClientError::Unreachable)?;
        let raw = decode_object(check_status(res)?)?;
        let fields = decode_fields(&raw);
        Ok(SingleResponse { raw, fields })
    }

    /// POST every file as a distinct part under the multipart field
    /// `images` to /api/f32_inference_multiple, in one request. All files
    /// are opened before the request is issued; the handles move into the
    /// form, so they are closed on every exit path, including a failed
    /// send.
    pub fn upload_batch(&self, files: &[PathBuf]) -> Result<BatchResponse, ClientError> {
        let url = format!("{}/api/f32_inference_multiple", self.base_url);

        let mut opened = Vec::with_capacity(files.len());
        for path in files {
            opened.push((basename(path), File::open(path)?));
        }
        let mut form = multipart::Form::new();
        for (name, file) in opened {
            let part = multipart::Part::reader(file)
                .file_name(name)
                .mime_str(IMAGE_MIME)
                .expect("static mime type");
            form = form.part("images", part);
        }

        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(ClientError::Unreachable)?;
        let raw = decode_object(check_status(res)?)?;

        let total_images = raw.get("total_images").and_then(Value::as_u64).unwrap_or(0);
        let items = raw
            .get("results")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(decode_item).collect())
            .unwrap_or_default();
        Ok(BatchResponse { total_images, items })
    }

    /// POST one video as multipart field `video` to /api/video_denoise.
    /// Success is a raw binary body (the denoised video), not JSON.
    pub fn upload_video(&self, path: &Path) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/api/video_denoise", self.base_url);
        let part = file_part(path, VIDEO_MIME)?;
        let form = multipart::Form::new().part("video", part);
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(ClientError::Unreachable)?;
        let res = check_status(res)?;
        let bytes = res.bytes().map_err(ClientError::Unreachable)?;
        Ok(bytes.to_vec())
    }

    /// GET a processed artifact by the absolute URL the server returned.
    pub fn download(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let res = self.client.get(url).send().map_err(ClientError::Unreachable)?;
        let res = check_status(res)?;
        let bytes = res.bytes().map_err(ClientError::Unreachable)?;
        Ok(bytes.to_vec())
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}

fn file_part(path: &Path, mime: &str) -> Result<multipart::Part, ClientError> {
    let file = File::open(path)?;
    Ok(multipart::Part::reader(file)
        .file_name(basename(path))
        .mime_str(mime)
        .expect("static mime type"))
}

/// Non-2xx becomes `RequestFailed` with a best-effort message: if the
/// body is JSON carrying an `error` field, use that, otherwise the raw
/// text.
fn check_status(res: Response) -> Result<Response, ClientError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let text = res.text().unwrap_or_default();
    let body = extract_error_message(&text).unwrap_or(text);
    Err(ClientError::RequestFailed { status, body })
}

fn extract_error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

/// Body → JSON object, or one of the two parse failures from the error
/// taxonomy.
fn decode_object(res: Response) -> Result<Value, ClientError> {
    let text = res.text().map_err(ClientError::Unreachable)?;
    parse_object(text)
}

fn parse_object(text: String) -> Result<Value, ClientError> {
    let value: Value = serde_json::from_str(&text)
        .map_err(|_| ClientError::InvalidResponse { body: text.clone() })?;
    if !value.is_object() {
        return Err(ClientError::InvalidResponseType { body: value.to_string() });
    }
    Ok(value)
}

fn decode_fields(raw: &Value) -> SingleFields {
    serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
        log::warn!("response fields did not decode cleanly: {}", e);
        SingleFields::default()
    })
}

fn decode_item(raw: &Value) -> BatchItem {
    let fields = serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
        log::warn!("batch item did not decode cleanly: {}", e);
        BatchItemFields::default()
    });
    BatchItem { raw: raw.clone(), fields }
}
