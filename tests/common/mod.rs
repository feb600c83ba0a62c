#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use faststart::ExternalTools;

/// Stub mediainfo: the verdict is keyed off the probed file name. Files with
/// `native` in the name report a streamable AVC+AAC layout; everything else
/// reports a non-streamable foreign container.
const MEDIAINFO_STUB: &str = r#"#!/bin/sh
for arg in "$@"; do target="$arg"; done
case "$target" in
*native*) cat <<'EOF'
{"media":{"track":[{"@type":"General","IsStreamable":"Yes","Duration":"10.0"},{"@type":"Video","Format":"AVC","Width":"640","Height":"360"},{"@type":"Audio","Format":"AAC"}]}}
EOF
;;
*) cat <<'EOF'
{"media":{"track":[{"@type":"General","IsStreamable":"No","Duration":"10.0"},{"@type":"Video","Format":"MPEG-4 Visual"},{"@type":"Audio","Format":"AC-3"}]}}
EOF
;;
esac
"#;

/// Stub encoder: copies the input straight to the output path.
const FFMPEG_STUB: &str = r#"#!/bin/sh
in=""
prev=""
last=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  prev="$a"
  last="$a"
done
cp "$in" "$last"
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body).expect("write stub script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

pub fn stub_tools(dir: &Path) -> ExternalTools {
    ExternalTools {
        ffmpeg: write_script(dir, "ffmpeg", FFMPEG_STUB),
        mediainfo: write_script(dir, "mediainfo", MEDIAINFO_STUB),
    }
}
