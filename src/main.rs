// Entrypoint for the CLI application.
// - Runs the fixed demo sequence: health check, results cleanup, one
//   single-image inference, one batch inference, and a video pass when the
//   sample clip is present.
// - A failing step is reported and does not stop the following steps.

use denoise_cli::{api::ApiClient, config::ServerConfig, store::ResultStore, tasks};
use std::path::Path;

const SINGLE_IMAGE: &str = "test_img/noisy35/noisy_0.png";
const BATCH_FOLDER: &str = "test_img/clips";
const SAMPLE_VIDEO: &str = "test_img/video/cropped_noisy.mp4";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Host, port and timeout come from DENOISE_SERVER_* environment
    // variables, defaulting to localhost. See `config::ServerConfig`.
    let config = ServerConfig::from_env();
    let api = ApiClient::new(&config)?;
    let store = ResultStore::new("results");

    match api.health() {
        Ok(body) => println!("ok: {}", body),
        Err(e) => println!("ng: {}", e),
    }

    store.reset()?;

    if let Err(e) = tasks::single_inference(&api, &store, Path::new(SINGLE_IMAGE)) {
        println!("single inference failed: {}", e);
    }

    match tasks::batch_inference(&api, &store, Path::new(BATCH_FOLDER)) {
        Ok(count) => println!("batch inference processed {} images", count),
        Err(e) => println!("batch inference failed: {}", e),
    }

    let video = Path::new(SAMPLE_VIDEO);
    if video.is_file() {
        if let Err(e) = tasks::video_denoise(&api, &store, video) {
            println!("video denoise failed: {}", e);
        }
    } else {
        log::info!("sample video {} not present, skipping", SAMPLE_VIDEO);
    }

    Ok(())
}
