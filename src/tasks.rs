// Workflow layer: one function per client operation (single image, batch
// folder, video). Each uploads, reconciles the server's answer against the
// local inputs, fetches any processed artifacts, and writes a JSON audit
// record into the result store. Fatal conditions come back as
// `ClientError`; per-item download or copy failures are soft and only
// leave a null in the audit record.

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::store::{self, ResultStore};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// Audit sub-record for one image, shared by the single and batch
/// workflows. `result_json` is only present on single-call records; batch
/// items live inside one aggregate file instead.
#[derive(Debug, Serialize)]
struct LocalSavedFiles {
    original_copy: Option<String>,
    processed_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_json: Option<String>,
}

#[derive(Debug, Serialize)]
struct ItemAudit {
    original_image: Option<String>,
    original_copy: Option<String>,
    upload_time: String,
    server_response: Value,
    local_saved_files: LocalSavedFiles,
}

#[derive(Debug, Serialize)]
struct BatchInfo {
    folder_path: String,
    total_images: usize,
    processed_time: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct BatchAudit {
    batch_info: BatchInfo,
    individual_results: Vec<ItemAudit>,
}

#[derive(Debug, Serialize)]
struct VideoAudit {
    original_video: String,
    processed_video: String,
    processed_time: String,
    timestamp: String,
}

/// Upload one image, fetch its processed artifact, copy the original and
/// write a `result_{name}_{timestamp}.json` audit record.
pub fn single_inference(
    api: &ApiClient,
    store: &ResultStore,
    image_path: &Path,
) -> Result<(), ClientError> {
    store.ensure_images()?;

    let spinner = spinner("Uploading image...");
    let response = api.upload_image(image_path);
    spinner.finish_and_clear();
    let response = response?;
    println!("upload ok");

    println!("saved on server: {}", display_name(&response.fields.saved_filename));
    println!(
        "prediction result: {}",
        describe_inference(&response.fields.inference_result)
    );

    let stamp = store::timestamp();
    let name = stem_of(image_path);
    let processed = fetch_processed(
        api,
        store,
        response.fields.processed_image_url.as_deref(),
        &name,
        &stamp,
    );
    let original_copy = copy_original(store, image_path, &name, &stamp);

    let result_path = store.single_result_path(&name, &stamp);
    let record = ItemAudit {
        original_image: Some(image_path.display().to_string()),
        original_copy: original_copy.as_deref().map(display_of),
        upload_time: store::now_iso(),
        server_response: response.raw,
        local_saved_files: LocalSavedFiles {
            original_copy: original_copy.as_deref().map(display_of),
            processed_image: processed.as_deref().map(display_of),
            result_json: Some(result_path.display().to_string()),
        },
    };
    store.write_json(&result_path, &record)?;
    println!("complete result saved: {}", result_path.display());
    Ok(())
}

/// Upload every recognized image in `folder_path` in one multipart
/// request, then reconcile each server result back to its source file by
/// basename, fetch artifacts, and write one aggregate audit record.
/// Returns the number of items processed.
pub fn batch_inference(
    api: &ApiClient,
    store: &ResultStore,
    folder_path: &Path,
) -> Result<usize, ClientError> {
    store.ensure_images()?;

    let image_files = collect_image_files(folder_path)?;
    if image_files.is_empty() {
        return Err(ClientError::NoImagesFound(folder_path.to_path_buf()));
    }
    println!("found {} images", image_files.len());

    let spinner = spinner("Uploading batch...");
    let response = api.upload_batch(&image_files);
    spinner.finish_and_clear();
    let response = response?;
    println!("batch upload ok");
    println!("server reports {} images", response.total_images);

    let stamp = store::timestamp();
    let bar = ProgressBar::new(response.items.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}").unwrap(),
    );

    // Server order drives the loop; it need not match upload order, and a
    // result that names no local file still gets an audit entry.
    let mut individual = Vec::with_capacity(response.items.len());
    for (i, item) in response.items.into_iter().enumerate() {
        println!("--- image {} ---", i + 1);
        println!("server save path: {}", display_name(&item.fields.saved_filename));
        println!("denoise result: {}", describe_inference(&item.fields.inference_result));

        let name = stem_str(&item.fields.original_filename);
        let processed = fetch_processed(
            api,
            store,
            item.fields.processed_image_url.as_deref(),
            &name,
            &stamp,
        );

        let original_file = find_original(&image_files, &item.fields.original_filename);
        if original_file.is_none() {
            log::warn!(
                "no local file matches server result {:?}",
                item.fields.original_filename
            );
        }
        let original_copy =
            original_file.and_then(|path| copy_original(store, path, &name, &stamp));

        individual.push(ItemAudit {
            original_image: original_file.map(display_of),
            original_copy: original_copy.as_deref().map(display_of),
            upload_time: store::now_iso(),
            server_response: item.raw,
            local_saved_files: LocalSavedFiles {
                original_copy: original_copy.as_deref().map(display_of),
                processed_image: processed.as_deref().map(display_of),
                result_json: None,
            },
        });
        bar.inc(1);
    }
    bar.finish_and_clear();

    let count = individual.len();
    let folder_name = folder_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("batch");
    let result_path = store.batch_result_path(folder_name, &stamp);
    let record = BatchAudit {
        batch_info: BatchInfo {
            folder_path: folder_path.display().to_string(),
            total_images: count,
            processed_time: store::now_iso(),
            timestamp: stamp,
        },
        individual_results: individual,
    };
    store.write_json(&result_path, &record)?;
    println!("batch process complete, results saved: {}", result_path.display());
    Ok(count)
}

/// Upload one MP4, write the binary response body as the denoised video
/// and record both paths in a small audit file. Returns the output path.
pub fn video_denoise(
    api: &ApiClient,
    store: &ResultStore,
    video_path: &Path,
) -> Result<PathBuf, ClientError> {
    let is_mp4 = video_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false);
    if !is_mp4 || !video_path.is_file() {
        return Err(ClientError::InvalidVideo(video_path.to_path_buf()));
    }
    store.ensure_videos()?;

    let video_name = video_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    println!("uploading video: {}", video_name);
    let spinner = spinner("Denoising video...");
    let result = api.upload_video(video_path);
    spinner.finish_and_clear();
    let bytes = result?;

    let stamp = store::timestamp();
    let name = stem_of(video_path);
    let output_path = store.denoised_video_path(&name, &stamp);
    fs::write(&output_path, &bytes)?;
    println!("video processing completed");
    println!("processed video saved: {}", output_path.display());

    let result_path = store.video_result_path(&name, &stamp);
    let record = VideoAudit {
        original_video: video_path.display().to_string(),
        processed_video: output_path.display().to_string(),
        processed_time: store::now_iso(),
        timestamp: stamp,
    };
    store.write_json(&result_path, &record)?;
    println!("results saved: {}", result_path.display());
    Ok(output_path)
}

/// Non-recursive listing of `folder` filtered to recognized image
/// extensions (case-insensitive), sorted by path for determinism.
pub fn collect_image_files(folder: &Path) -> Result<Vec<PathBuf>, ClientError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some(e) if IMAGE_EXTENSIONS.contains(&e)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Exact, case-sensitive basename match of a server-reported
/// `original_filename` against the uploaded file set.
fn find_original<'a>(files: &'a [PathBuf], original_filename: &str) -> Option<&'a Path> {
    if original_filename.is_empty() {
        return None;
    }
    files
        .iter()
        .find(|p| p.file_name().and_then(|s| s.to_str()) == Some(original_filename))
        .map(PathBuf::as_path)
}

/// Best-effort rendering of the opaque `inference_result` value: a
/// dictionary-shaped result prints class and confidence, anything else
/// prints as raw JSON.
fn describe_inference(value: &Value) -> String {
    #[derive(Deserialize)]
    struct Summary {
        class: Option<String>,
        confidence: Option<f64>,
    }
    if value.is_object() {
        let summary: Summary = serde_json::from_value(value.clone()).unwrap_or(Summary {
            class: None,
            confidence: None,
        });
        format!(
            "{} (confidence: {:.2})",
            summary.class.as_deref().unwrap_or("N/A"),
            summary.confidence.unwrap_or(0.0)
        )
    } else {
        value.to_string()
    }
}

/// Soft step: download the processed artifact if the server gave a
/// non-empty URL. Failure is logged and yields None.
fn fetch_processed(
    api: &ApiClient,
    store: &ResultStore,
    url: Option<&str>,
    name: &str,
    stamp: &str,
) -> Option<PathBuf> {
    let url = url.filter(|u| !u.is_empty())?;
    match api.download(url) {
        Ok(bytes) => {
            let path = store.processed_image_path(name, stamp);
            match fs::write(&path, bytes) {
                Ok(()) => {
                    println!("processed image saved: {}", path.display());
                    Some(path)
                }
                Err(e) => {
                    log::warn!("failed to write processed image: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            log::warn!("failed to download processed image: {}", e);
            None
        }
    }
}

/// Soft step: copy the original input next to the processed artifact.
fn copy_original(store: &ResultStore, original: &Path, name: &str, stamp: &str) -> Option<PathBuf> {
    let dest = store.original_copy_path(name, stamp);
    match fs::copy(original, &dest) {
        Ok(_) => {
            println!("original copy saved: {}", dest.display());
            Some(dest)
        }
        Err(e) => {
            log::warn!("failed to save original copy: {}", e);
            None
        }
    }
}

fn spinner(msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    pb.set_message(msg);
    pb
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "unknown"
    } else {
        name
    }
}

fn display_of(path: &Path) -> String {
    path.display().to_string()
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

fn stem_str(name: &str) -> String {
    stem_of(Path::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    /// Client pointed at a reserved port nothing listens on; any request
    /// through it would fail, which proves a test never reached the
    /// network when it errors with something other than `Unreachable`.
    fn unroutable_api() -> ApiClient {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 9,
            timeout: Duration::from_secs(1),
        };
        ApiClient::new(&config).unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"data").unwrap();
    }

    /// One-shot HTTP server on an ephemeral port: drains one request and
    /// answers 200 with the given JSON body.
    fn serve_json(body: String) -> ServerConfig {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        ServerConfig {
            host: "127.0.0.1".into(),
            port,
            timeout: Duration::from_secs(5),
        }
    }

    /// Drain one request fully, handling both a Content-Length body and
    /// the chunked encoding reqwest uses for streamed multipart parts, so
    /// the client never sees the connection close mid-write.
    fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
            let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&request[..pos]).to_ascii_lowercase();
            let content_length = headers.lines().find_map(|l| {
                l.strip_prefix("content-length:")
                    .and_then(|v| v.trim().parse::<usize>().ok())
            });
            if let Some(len) = content_length {
                if request.len() >= pos + 4 + len {
                    return;
                }
            } else if headers.contains("transfer-encoding: chunked") {
                if request.ends_with(b"0\r\n\r\n") {
                    return;
                }
            } else {
                return;
            }
        }
    }

    /// Fetch the audit record the workflow wrote under the store root.
    fn read_audit(store: &ResultStore, prefix: &str) -> Value {
        let entry = fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .expect("audit record written");
        serde_json::from_str(&fs::read_to_string(entry.path()).unwrap()).unwrap()
    }

    #[test]
    fn filtering_keeps_only_image_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.png");
        touch(tmp.path(), "b.jpg");
        touch(tmp.path(), "notes.txt");
        fs::create_dir(tmp.path().join("nested.png")).unwrap();
        let files = collect_image_files(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
    }

    #[test]
    fn filtering_is_case_insensitive_on_extension() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "loud.PNG");
        touch(tmp.path(), "scan.TiF");
        let files = collect_image_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn file_list_is_sorted_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "z.bmp");
        touch(tmp.path(), "a.jpeg");
        touch(tmp.path(), "m.tif");
        let files = collect_image_files(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "m.tif", "z.bmp"]);
    }

    #[test]
    fn empty_folder_fails_before_any_network_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        let folder = tmp.path().join("empty");
        fs::create_dir(&folder).unwrap();
        touch(&folder, "readme.md");
        let err = batch_inference(&unroutable_api(), &store, &folder).unwrap_err();
        assert!(matches!(err, ClientError::NoImagesFound(_)), "got {:?}", err);
    }

    #[test]
    fn reconciliation_is_exact_and_case_sensitive() {
        let files = vec![PathBuf::from("/in/a.png"), PathBuf::from("/in/b.jpg")];
        assert_eq!(find_original(&files, "b.jpg"), Some(Path::new("/in/b.jpg")));
        assert_eq!(find_original(&files, "B.jpg"), None);
        assert_eq!(find_original(&files, "c.png"), None);
        assert_eq!(find_original(&files, ""), None);
    }

    #[test]
    fn inference_summary_renders_class_and_confidence() {
        let value = json!({"class": "clean", "confidence": 0.97});
        assert_eq!(describe_inference(&value), "clean (confidence: 0.97)");
    }

    #[test]
    fn opaque_inference_renders_as_raw_json() {
        assert_eq!(describe_inference(&json!("denoised")), "\"denoised\"");
        assert_eq!(describe_inference(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn malformed_inference_object_falls_back_to_defaults() {
        let value = json!({"class": 7, "confidence": "high"});
        assert_eq!(describe_inference(&value), "N/A (confidence: 0.00)");
    }

    #[test]
    fn invalid_video_path_fails_before_any_network_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        let api = unroutable_api();

        let missing = tmp.path().join("gone.mp4");
        let err = video_denoise(&api, &store, &missing).unwrap_err();
        assert!(matches!(err, ClientError::InvalidVideo(_)));

        touch(tmp.path(), "clip.avi");
        let err = video_denoise(&api, &store, &tmp.path().join("clip.avi")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidVideo(_)));
        assert!(!store.videos_dir().exists());
    }

    #[test]
    fn video_extension_check_ignores_case() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        touch(tmp.path(), "clip.MP4");
        // passes validation, then fails at the network with the
        // unroutable client rather than with InvalidVideo
        let err = video_denoise(&unroutable_api(), &store, &tmp.path().join("clip.MP4"))
            .unwrap_err();
        assert!(matches!(err, ClientError::Unreachable(_)), "got {:?}", err);
    }

    #[test]
    fn batch_audit_covers_every_server_result() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        let folder = tmp.path().join("inputs");
        fs::create_dir(&folder).unwrap();
        touch(&folder, "a.png");

        // two server results, only one of which names a local file
        let body = json!({
            "total_images": 2,
            "results": [
                {
                    "original_filename": "a.png",
                    "saved_filename": "srv_a.png",
                    "inference_result": {"class": "clean", "confidence": 0.9}
                },
                {
                    "original_filename": "ghost.png",
                    "saved_filename": "srv_ghost.png",
                    "inference_result": "opaque"
                }
            ]
        })
        .to_string();
        let api = ApiClient::new(&serve_json(body)).unwrap();

        let count = batch_inference(&api, &store, &folder).unwrap();
        assert_eq!(count, 2);

        let audit = read_audit(&store, "batch_result_");
        assert_eq!(audit["batch_info"]["total_images"], 2);
        let items = audit["individual_results"].as_array().unwrap();
        assert_eq!(items.len(), 2);

        // matched item: original copied to disk and recorded
        let copy = items[0]["original_copy"].as_str().expect("copy recorded");
        assert!(Path::new(copy).is_file());
        assert_eq!(items[0]["server_response"]["original_filename"], "a.png");

        // unmatched item: soft reconciliation miss, nulls instead of an error
        assert!(items[1]["original_image"].is_null());
        assert!(items[1]["original_copy"].is_null());
        assert_eq!(items[1]["server_response"]["original_filename"], "ghost.png");
    }

    #[test]
    fn single_success_records_missing_artifact_as_null() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        touch(tmp.path(), "noisy.png");

        let body = json!({
            "saved_filename": "x.png",
            "inference_result": {"class": "clean", "confidence": 0.97}
        })
        .to_string();
        let api = ApiClient::new(&serve_json(body)).unwrap();

        single_inference(&api, &store, &tmp.path().join("noisy.png")).unwrap();

        let audit = read_audit(&store, "result_");
        assert_eq!(audit["server_response"]["saved_filename"], "x.png");
        assert!(audit["local_saved_files"]["processed_image"].is_null());
        let copy = audit["local_saved_files"]["original_copy"]
            .as_str()
            .expect("copy recorded");
        assert!(Path::new(copy).is_file());
    }

    #[test]
    fn absent_artifact_serializes_as_null() {
        let record = ItemAudit {
            original_image: None,
            original_copy: None,
            upload_time: store::now_iso(),
            server_response: json!({"original_filename": "ghost.png"}),
            local_saved_files: LocalSavedFiles {
                original_copy: None,
                processed_image: None,
                result_json: None,
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["original_copy"].is_null());
        assert!(value["local_saved_files"]["processed_image"].is_null());
        // result_json only appears on single-call records
        assert!(value["local_saved_files"].get("result_json").is_none());
    }
}
