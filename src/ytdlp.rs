//! The local download path: drives the `yt-dlp` binary directly.

use crate::{
    error::AppError,
    models::{LocalFormat, LocalFormats, MediaFormat, Quality, VideoReference, YtDlpFormat, YtDlpInfo},
};
use std::path::Path;
use tokio::process::Command;

const YTDLP: &str = "yt-dlp";

/// Returns the installed `yt-dlp` version, or an error when the tool is missing.
pub async fn version() -> Result<String, AppError> {
    let output = Command::new(YTDLP)
        .arg("--version")
        .output()
        .await
        .map_err(|e| AppError::YtDlp(format!("yt-dlp is not available: {}", e)))?;

    if !output.status.success() {
        return Err(AppError::YtDlp(String::from_utf8_lossy(&output.stderr).to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs `yt-dlp --dump-json` for a single video.
pub async fn dump_info(reference: &VideoReference) -> Result<YtDlpInfo, AppError> {
    let output = Command::new(YTDLP)
        .args(["--dump-json", "--no-playlist", "--"])
        .arg(reference.watch_url())
        .output()
        .await?;

    if !output.status.success() {
        let error_message = String::from_utf8_lossy(&output.stderr).to_string();
        tracing::error!("yt-dlp failed: {}", error_message);
        return Err(AppError::YtDlp(error_message));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Keeps the four tallest muxed formats and the three best audio-only ones.
pub fn summarize_formats(formats: &[YtDlpFormat]) -> LocalFormats {
    let has = |codec: &Option<String>| codec.as_deref().map_or(false, |c| c != "none");

    let mut video: Vec<&YtDlpFormat> = formats.iter().filter(|f| has(&f.vcodec) && has(&f.acodec)).collect();
    video.sort_by(|a, b| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)));

    let mut audio: Vec<&YtDlpFormat> = formats.iter().filter(|f| has(&f.acodec) && !has(&f.vcodec)).collect();
    audio.sort_by(|a, b| b.abr.unwrap_or(0.0).total_cmp(&a.abr.unwrap_or(0.0)));

    LocalFormats {
        video: video
            .into_iter()
            .take(4)
            .map(|f| LocalFormat {
                quality: f.height.map_or_else(|| "unknown".to_string(), |h| format!("{}p", h)),
                format: f.ext.as_deref().map_or_else(|| "MP4".to_string(), str::to_uppercase),
                filesize: filesize_label(f.filesize),
            })
            .collect(),
        audio: audio
            .into_iter()
            .take(3)
            .map(|f| LocalFormat {
                quality: f.abr.map_or_else(|| "128kbps".to_string(), |abr| format!("{}kbps", abr.round() as u32)),
                format: "MP3".to_string(),
                filesize: filesize_label(f.filesize),
            })
            .collect(),
    }
}

fn filesize_label(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.0} MB", bytes as f64 / 1024.0 / 1024.0),
        None => "N/A".to_string(),
    }
}

/// Command-line arguments for a download written to `<output_stem>.<ext>`.
/// Only the canonical watch URL is passed, after `--`, so nothing from the
/// request can be read as an option or pull in a playlist.
pub fn download_args(
    reference: &VideoReference,
    quality: Quality,
    format: MediaFormat,
    output_stem: &Path,
) -> Vec<String> {
    let output = format!("{}.%(ext)s", output_stem.to_string_lossy());
    let mut args: Vec<String> = vec!["--no-playlist".to_string()];

    match format {
        MediaFormat::Mp3 => {
            args.extend(["-x", "--audio-format", "mp3", "--audio-quality", "0"].map(String::from));
        }
        MediaFormat::Mp4 => {
            let selector = match quality.height() {
                Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
                None => "bestvideo+bestaudio/best".to_string(),
            };
            args.extend(["-f".to_string(), selector, "--merge-output-format".to_string(), "mp4".to_string()]);
        }
    }
    args.extend(["-o".to_string(), output, "--".to_string(), reference.watch_url()]);
    args
}

/// Downloads into `dir` and returns the produced file name.
pub async fn download(
    reference: &VideoReference,
    quality: Quality,
    format: MediaFormat,
    dir: &Path,
) -> Result<String, AppError> {
    tokio::fs::create_dir_all(dir).await?;

    let millis = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)?.as_millis();
    let stem = format!("{}_{}", reference.id, millis);
    let args = download_args(reference, quality, format, &dir.join(&stem));
    tracing::info!("Executing yt-dlp {}", args.join(" "));

    let output = Command::new(YTDLP).args(&args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        tracing::error!("Download failed for {}: {}", reference.id, &stderr);
        return Err(AppError::YtDlp(stderr));
    }

    find_output(dir, &stem)
        .await?
        .ok_or_else(|| AppError::YtDlp("Download failed - file not found".to_string()))
}

async fn find_output(dir: &Path, stem: &str) -> std::io::Result<Option<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(stem) {
            return Ok(Some(name));
        }
    }
    Ok(None)
}
