use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::info;

use crate::faststart_core::probe::CodecFlags;

pub const SHELL_LOG_FILENAME: &str = "shell.log";

const H264_CRF: &str = "18";
const H264_PRESET: &str = "veryslow";
const MP4_FLAGS: &str = "+faststart";
const MUXING_QUEUE_SIZE: &str = "1024";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to open {SHELL_LOG_FILENAME}: {0}")]
    Log(#[source] std::io::Error),
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Build the encoder argument list for one job. Stream-copies whatever is
/// already native and re-encodes the rest; `-map 0` keeps subtitles and any
/// other extra streams, and the enlarged muxing queue works around corrupted
/// frames on some inputs.
pub(crate) fn build_transcode_args(
    raw_path: &Path,
    output_path: &Path,
    flags: &CodecFlags,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        raw_path.to_string_lossy().into_owned(),
        "-movflags".to_string(),
        MP4_FLAGS.to_string(),
    ];
    if flags.is_aac {
        args.extend(["-c:a".to_string(), "copy".to_string()]);
    }
    if flags.is_h264 {
        args.extend(["-c:v".to_string(), "copy".to_string()]);
    } else {
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            H264_CRF.to_string(),
            "-preset".to_string(),
            H264_PRESET.to_string(),
        ]);
    }
    args.extend([
        "-map".to_string(),
        "0".to_string(),
        "-max_muxing_queue_size".to_string(),
        MUXING_QUEUE_SIZE.to_string(),
        output_path.to_string_lossy().into_owned(),
    ]);
    args
}

/// Run the encoder with cwd = scratch dir, appending merged stdout+stderr to
/// `shell.log` next to the output.
pub(crate) fn run_transcode(
    ffmpeg_path: &Path,
    args: &[String],
    scratch_dir: &Path,
) -> Result<ExitStatus, TranscodeError> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(scratch_dir.join(SHELL_LOG_FILENAME))
        .map_err(TranscodeError::Log)?;
    let log_err = log.try_clone().map_err(TranscodeError::Log)?;

    info!("{} {}", ffmpeg_path.display(), args.join(" "));
    let mut child = Command::new(ffmpeg_path)
        .args(args)
        .current_dir(scratch_dir)
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(log_err)
        .spawn()
        .map_err(TranscodeError::Spawn)?;
    child.wait().map_err(TranscodeError::Spawn)
}
