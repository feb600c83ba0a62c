mod faststart_core;
mod sync_ext;

pub use faststart_core::args::{BackendKind, CliArgs};
pub use faststart_core::backend::{
    DriveSink, DriveSource, FetchError, LocalSink, LocalSource, SinkBackend, SourceBackend,
    StoreError, WalkError,
};
pub use faststart_core::cache::{CACHE_FILENAME, CacheError, MigrationCache};
pub use faststart_core::dispatcher::{MigrationConfig, run_migration};
pub use faststart_core::drive::{
    Change, DRIVE_ROOT_ENV, Drive, DriveError, FsDrive, MoveRequest, Node, open_default_drive,
};
pub use faststart_core::item::FileItem;
pub use faststart_core::probe::{CodecFlags, MediaInfo, ProbeError};
pub use faststart_core::processor::{
    DAILY_UPLOAD_QUOTA, ModeFlags, ProcessorKind, VideoProcessor,
};
pub use faststart_core::tools::{ExternalTools, FFMPEG_ENV, MEDIAINFO_ENV};
pub use faststart_core::transcode::{SHELL_LOG_FILENAME, TranscodeError};
