use std::collections::VecDeque;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::faststart_core::args::BackendKind;
use crate::faststart_core::backend::{
    DriveSink, DriveSource, LocalSink, LocalSource, SinkBackend, SourceBackend,
};
use crate::faststart_core::cache::{CACHE_FILENAME, MigrationCache};
use crate::faststart_core::drive::{self, Drive};
use crate::faststart_core::item::FileItem;
use crate::faststart_core::processor::{ModeFlags, VideoProcessor};
use crate::faststart_core::tools::ExternalTools;
use crate::sync_ext::{CondvarExt, MutexExt};

/// Everything one migration run needs, assembled from the CLI.
pub struct MigrationConfig {
    pub data_path: PathBuf,
    pub roots: Vec<PathBuf>,
    pub jobs: usize,
    pub source: BackendKind,
    pub sink: BackendKind,
    pub output_path: Option<PathBuf>,
    pub tmp_path: Option<PathBuf>,
    pub modes: ModeFlags,
    pub tools: ExternalTools,
}

struct JobContext {
    cache: MigrationCache,
    source: Box<dyn SourceBackend>,
    sink: Box<dyn SinkBackend>,
    tools: ExternalTools,
    work_root: PathBuf,
    modes: ModeFlags,
}

/// Walk the configured sources and run one job per candidate item, at most
/// `jobs` in flight. Item failures are contained at the job boundary; only
/// walk and setup failures make the run itself fail.
pub fn run_migration(config: &MigrationConfig) -> Result<()> {
    fs::create_dir_all(&config.data_path)
        .with_context(|| format!("failed to create {}", config.data_path.display()))?;
    let cache = MigrationCache::open(&config.data_path.join(CACHE_FILENAME))
        .context("failed to open migration cache")?;

    let drive = if config.source == BackendKind::Drive || config.sink == BackendKind::Drive {
        let drive = drive::open_default_drive()?;
        for change in drive.sync()? {
            debug!("sync change: {change:?}");
        }
        Some(drive)
    } else {
        None
    };

    let scratch_root = match &config.tmp_path {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            TempDir::new_in(parent)?
        }
        None => TempDir::new()?,
    };

    let (source, sink) = create_backends(config, &drive)?;
    let ctx = Arc::new(JobContext {
        cache,
        source,
        sink,
        tools: config.tools.clone(),
        work_root: scratch_root.path().to_path_buf(),
        modes: config.modes,
    });
    let queue = Arc::new(JobQueue::default());

    let jobs = config.jobs.max(1);
    let mut workers = Vec::with_capacity(jobs);
    for index in 0..jobs {
        let ctx = ctx.clone();
        let queue = queue.clone();
        let handle = thread::Builder::new()
            .name(format!("faststart-worker-{index}"))
            .spawn(move || worker_loop(&ctx, &queue))
            .with_context(|| format!("failed to spawn worker thread {index}"))?;
        workers.push(handle);
    }

    let mut walk_result = Ok(());
    for entry in ctx.source.walk(&config.roots) {
        match entry {
            Ok(item) => queue.push(item),
            Err(err) => {
                walk_result = Err(anyhow::Error::from(err).context("source walk failed"));
                break;
            }
        }
    }

    queue.close();
    for handle in workers {
        let _ = handle.join();
    }
    walk_result
}

fn create_backends(
    config: &MigrationConfig,
    drive: &Option<Arc<dyn Drive>>,
) -> Result<(Box<dyn SourceBackend>, Box<dyn SinkBackend>)> {
    let drive_handle = || {
        drive
            .clone()
            .context("drive backend requested without a drive handle")
    };
    let source: Box<dyn SourceBackend> = match config.source {
        BackendKind::Drive => Box::new(DriveSource::new(drive_handle()?)),
        BackendKind::Local => Box::new(LocalSource::new()),
    };
    let same_location = config.source == BackendKind::Drive && config.sink == BackendKind::Drive;
    let sink: Box<dyn SinkBackend> = match config.sink {
        BackendKind::Drive => Box::new(DriveSink::new(drive_handle()?, same_location)),
        BackendKind::Local => {
            let output = config
                .output_path
                .clone()
                .context("--output is required when --sink=local")?;
            Box::new(LocalSink::new(output))
        }
    };
    Ok((source, sink))
}

#[derive(Default)]
struct JobQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<FileItem>,
    closed: bool,
}

impl JobQueue {
    fn push(&self, item: FileItem) {
        let mut state = self.state.lock_unpoisoned();
        state.items.push_back(item);
        self.cv.notify_one();
    }

    fn close(&self) {
        let mut state = self.state.lock_unpoisoned();
        state.closed = true;
        self.cv.notify_all();
    }

    fn pop(&self) -> Option<FileItem> {
        let mut state = self.state.lock_unpoisoned();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.cv.wait_unpoisoned(state);
        }
    }
}

fn worker_loop(ctx: &JobContext, queue: &JobQueue) {
    while let Some(item) = queue.pop() {
        run_job(ctx, item);
    }
}

fn run_job(ctx: &JobContext, item: FileItem) {
    let name = item.name.clone();
    let Some(processor) = VideoProcessor::create(
        &ctx.work_root,
        &ctx.cache,
        ctx.source.as_ref(),
        ctx.sink.as_ref(),
        &ctx.tools,
        item,
    ) else {
        return;
    };

    info!("begin {name}");
    match guarded_run(&processor, ctx.modes) {
        Ok(did_work) => info!("did_work={did_work}, end {name}"),
        Err(reason) => error!("{reason}, end {name}"),
    }
}

/// Keep the worker thread alive across per-job failures and panics.
fn guarded_run(processor: &VideoProcessor<'_>, modes: ModeFlags) -> Result<bool, String> {
    match catch_unwind(AssertUnwindSafe(|| processor.run(modes))) {
        Ok(Ok(did_work)) => Ok(did_work),
        Ok(Err(err)) => Err(format!("job failed: {err:#}")),
        Err(payload) => Err(format!(
            "job panicked: {}",
            panic_payload_to_string(&*payload)
        )),
    }
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
