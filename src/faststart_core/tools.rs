use std::path::PathBuf;

pub const FFMPEG_ENV: &str = "FASTSTART_FFMPEG";
pub const MEDIAINFO_ENV: &str = "FASTSTART_MEDIAINFO";

const FFMPEG_DEFAULT: &str = "ffmpeg";
const MEDIAINFO_DEFAULT: &str = "mediainfo";

/// Resolved external tool binaries. Both default to PATH lookup and can be
/// pointed at explicit binaries through the environment, which is also how
/// tests substitute stub tools.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    pub ffmpeg: PathBuf,
    pub mediainfo: PathBuf,
}

impl ExternalTools {
    pub fn from_env() -> Self {
        Self {
            ffmpeg: resolve(FFMPEG_ENV, FFMPEG_DEFAULT),
            mediainfo: resolve(MEDIAINFO_ENV, MEDIAINFO_DEFAULT),
        }
    }
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self::from_env()
    }
}

fn resolve(env_key: &str, default: &str) -> PathBuf {
    std::env::var_os(env_key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
