use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Video codecs that stream without a full transcode.
const NATIVE_VIDEO_FORMATS: [&str; 2] = ["AVC", "HEVC"];
const NATIVE_AUDIO_FORMAT: &str = "AAC";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run media probe: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("media probe exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("unreadable probe report: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Streamability and codec verdict for one local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecFlags {
    pub is_faststart: bool,
    pub is_h264: bool,
    pub is_aac: bool,
}

impl CodecFlags {
    pub fn is_native_codec(&self) -> bool {
        self.is_h264 && self.is_aac
    }
}

/// Metadata tag attached to stored artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    media: Option<MediaBlock>,
}

#[derive(Debug, Deserialize)]
struct MediaBlock {
    #[serde(default)]
    track: Vec<Track>,
}

// MediaInfo reports every value as a string in its JSON output.
#[derive(Debug, Deserialize)]
struct Track {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "Format")]
    format: Option<String>,
    #[serde(rename = "IsStreamable")]
    is_streamable: Option<String>,
    #[serde(rename = "Width")]
    width: Option<String>,
    #[serde(rename = "Height")]
    height: Option<String>,
    #[serde(rename = "Duration")]
    duration: Option<String>,
}

pub(crate) fn probe_codec_flags(
    mediainfo_path: &Path,
    source: &Path,
) -> Result<CodecFlags, ProbeError> {
    let tracks = run_probe(mediainfo_path, source)?;
    Ok(codec_flags_from_tracks(&tracks))
}

/// Reprobe a finished artifact for the metadata the sink attaches to it.
pub(crate) fn probe_media_info(
    mediainfo_path: &Path,
    source: &Path,
) -> Result<MediaInfo, ProbeError> {
    let tracks = run_probe(mediainfo_path, source)?;
    Ok(media_info_from_tracks(&tracks))
}

fn run_probe(mediainfo_path: &Path, source: &Path) -> Result<Vec<Track>, ProbeError> {
    let output = Command::new(mediainfo_path)
        .arg("--Output=JSON")
        .arg("--File_TestContinuousFileNames=0")
        .arg(source.as_os_str())
        .output()
        .map_err(ProbeError::Spawn)?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let report: ProbeReport = serde_json::from_slice(&output.stdout)?;
    Ok(report.media.map(|m| m.track).unwrap_or_default())
}

fn codec_flags_from_tracks(tracks: &[Track]) -> CodecFlags {
    // A file with no tracks of a given kind passes that predicate.
    let is_faststart = tracks
        .iter()
        .filter(|t| t.kind == "General")
        .all(|t| t.is_streamable.as_deref() == Some("Yes"));
    let is_h264 = tracks.iter().filter(|t| t.kind == "Video").all(|t| {
        t.format
            .as_deref()
            .is_some_and(|f| NATIVE_VIDEO_FORMATS.contains(&f))
    });
    let is_aac = tracks
        .iter()
        .filter(|t| t.kind == "Audio")
        .all(|t| t.format.as_deref() == Some(NATIVE_AUDIO_FORMAT));
    CodecFlags {
        is_faststart,
        is_h264,
        is_aac,
    }
}

fn media_info_from_tracks(tracks: &[Track]) -> MediaInfo {
    let video = tracks.iter().find(|t| t.kind == "Video");
    let general = tracks.iter().find(|t| t.kind == "General");
    let duration_seconds = general
        .and_then(|t| t.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    MediaInfo {
        width: video
            .and_then(|t| t.width.as_deref())
            .and_then(|w| w.parse().ok()),
        height: video
            .and_then(|t| t.height.as_deref())
            .and_then(|h| h.parse().ok()),
        duration_ms: duration_seconds.map(|d| (d * 1000.0) as u64),
    }
}
