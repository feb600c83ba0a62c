use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::{debug, error, info, warn};

use crate::faststart_core::backend::{FetchError, SinkBackend, SourceBackend};
use crate::faststart_core::cache::MigrationCache;
use crate::faststart_core::item::FileItem;
use crate::faststart_core::probe::{self, CodecFlags};
use crate::faststart_core::tools::ExternalTools;
use crate::faststart_core::transcode;


/// Rolling daily upload budget, enforced before a job touches the scratch
/// dir. Advisory under concurrency: in-flight jobs may overshoot it.
pub const DAILY_UPLOAD_QUOTA: u64 = 500 * 1024 * 1024 * 1024;

/// Container-specific behavior of the per-item state machine. Only a true
/// MP4 container can be believed when the probe reports a streamable layout;
/// every other container needs a remux regardless, so its kind forces the
/// faststart flag off. NeverH264 marks inputs that are expected to always
/// need a video re-encode; it currently probes like MaybeH264.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    Mp4,
    Mkv,
    MaybeH264,
    NeverH264,
}

static PROCESSOR_TABLE: Lazy<HashMap<&'static str, ProcessorKind>> = Lazy::new(|| {
    HashMap::from([
        ("video/mp4", ProcessorKind::Mp4),
        ("video/x-matroska", ProcessorKind::Mkv),
        ("video/x-msvideo", ProcessorKind::MaybeH264),
        ("video/quicktime", ProcessorKind::MaybeH264),
        ("video/mpeg", ProcessorKind::MaybeH264),
        ("video/x-ms-wmv", ProcessorKind::NeverH264),
    ])
});

impl ProcessorKind {
    pub fn for_mime_type(mime_type: &str) -> Option<Self> {
        PROCESSOR_TABLE.get(mime_type).copied()
    }

    fn forces_remux(self) -> bool {
        !matches!(self, Self::Mp4)
    }

    fn output_name(self, item_name: &str) -> String {
        match self {
            Self::Mp4 => item_name.to_string(),
            Self::Mkv | Self::MaybeH264 | Self::NeverH264 => {
                let stem = Path::new(item_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| item_name.to_string());
                format!("{stem}.mp4")
            }
        }
    }
}

/// Which subset of the pipeline this run performs. At most one flag may be
/// set; the CLI enforces that.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeFlags {
    pub remux_only: bool,
    pub transcode_only: bool,
    pub cache_only: bool,
}

/// Per-job working directory `work_root/<item.id>`, removed on drop on every
/// exit path.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(work_root: &Path, item_id: &str) -> io::Result<Self> {
        let path = work_root.join(item_id);
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("deleted {}", self.path.display()),
            Err(err) => warn!("failed to delete {}: {err}", self.path.display()),
        }
    }
}

/// Per-item migration job: consult the cache and quota, fetch, probe, maybe
/// transcode, store, record the outcome. One instance per dispatched item.
pub struct VideoProcessor<'a> {
    work_root: &'a Path,
    cache: &'a MigrationCache,
    source: &'a dyn SourceBackend,
    sink: &'a dyn SinkBackend,
    tools: &'a ExternalTools,
    item: FileItem,
    kind: ProcessorKind,
}

impl<'a> VideoProcessor<'a> {
    /// None when the mime type has no processor; such items get no job.
    pub fn create(
        work_root: &'a Path,
        cache: &'a MigrationCache,
        source: &'a dyn SourceBackend,
        sink: &'a dyn SinkBackend,
        tools: &'a ExternalTools,
        item: FileItem,
    ) -> Option<Self> {
        let kind = ProcessorKind::for_mime_type(&item.mime_type)?;
        Some(Self {
            work_root,
            cache,
            source,
            sink,
            tools,
            item,
            kind,
        })
    }

    /// Returns whether the scratch directory was used. Item-level failures
    /// inside the scratch section are logged and absorbed; cache and store
    /// errors propagate to the job boundary.
    pub fn run(&self, modes: ModeFlags) -> Result<bool> {
        let item = &self.item;

        if self.cache.is_migrated(item)? {
            debug!("already migrated, skip");
            return Ok(false);
        }
        if modes.transcode_only
            && self.cache.has_cache(item)?
            && !self.cache.need_transcode(item)?
        {
            info!("no need to transcode, skip");
            return Ok(false);
        }
        if modes.remux_only && self.cache.has_cache(item)? && self.cache.need_transcode(item)? {
            info!("needs transcode, skip");
            return Ok(false);
        }
        if modes.cache_only && self.cache.has_cache(item)? {
            info!("already cached, skip");
            return Ok(false);
        }
        if !modes.cache_only
            && self.sink.quota_used().saturating_add(item.size) >= DAILY_UPLOAD_QUOTA
        {
            info!("not enough quota, skip");
            return Ok(false);
        }

        let scratch = ScratchDir::create(self.work_root, &item.id)?;
        self.run_in_scratch(&scratch, modes).map(|()| true)
    }

    fn run_in_scratch(&self, scratch: &ScratchDir, modes: ModeFlags) -> Result<()> {
        let item = &self.item;
        let raw_path = scratch.path().join(format!("__{}", item.name));

        if let Err(err) = self.fetch_input(scratch.path(), &raw_path) {
            error!("fetch failed for {}: {err}", item.name);
            return Ok(());
        }

        let flags = match probe::probe_codec_flags(&self.tools.mediainfo, &raw_path) {
            Ok(flags) => self.apply_probe_override(flags),
            Err(err) => {
                error!("probe failed for {}: {err}", item.name);
                return Ok(());
            }
        };

        if flags.is_faststart && flags.is_native_codec() {
            info!("nothing to do, skip");
            self.cache.set_cache(item, true, true)?;
            self.cache.set_migrated(item)?;
            return Ok(());
        }

        self.cache
            .set_cache(item, flags.is_faststart, flags.is_native_codec())?;

        if modes.remux_only && !flags.is_native_codec() {
            info!("needs transcode, skip");
            return Ok(());
        }
        if modes.transcode_only && flags.is_native_codec() {
            info!("no need to transcode, skip");
            return Ok(());
        }
        if modes.cache_only {
            info!("cached, skip");
            return Ok(());
        }

        info!("item id: {}", item.id);
        info!("item name: {}", item.name);
        info!("is faststart: {}", flags.is_faststart);
        info!("is h264: {}", flags.is_h264);
        info!("is aac: {}", flags.is_aac);

        let output_path = scratch.path().join(self.kind.output_name(&item.name));
        let args = transcode::build_transcode_args(&raw_path, &output_path, &flags);
        match transcode::run_transcode(&self.tools.ffmpeg, &args, scratch.path()) {
            Ok(status) if status.success() => {}
            Ok(status) => {
                error!("encoder failed for {}: {status}", item.name);
                return Ok(());
            }
            Err(err) => {
                error!("encoder failed for {}: {err}", item.name);
                return Ok(());
            }
        }

        let media_info = probe::probe_media_info(&self.tools.mediainfo, &output_path)?;
        debug!("stored media info: {media_info:?}");

        let result = self.sink.store(&output_path, item, &media_info)?;
        if result.id != item.id {
            self.cache.unset_cache(item)?;
        }
        self.cache.set_cache(&result, true, true)?;
        self.cache.set_migrated(&result)?;
        Ok(())
    }

    fn fetch_input(&self, scratch_dir: &Path, raw_path: &Path) -> Result<(), FetchError> {
        info!("fetching {}", self.item.name);
        let fetched = self.source.fetch(&self.item, scratch_dir)?;
        fs::rename(&fetched, raw_path)?;
        info!("fetched {}", self.item.name);
        Ok(())
    }

    fn apply_probe_override(&self, mut flags: CodecFlags) -> CodecFlags {
        if self.kind.forces_remux() {
            flags.is_faststart = false;
        }
        flags
    }
}
