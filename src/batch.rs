//! Batch protection of many files with bounded concurrency.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::fs::{File, OpenOptions};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};

use crate::config::ProtectOptions;
use crate::error::{Error, Result};
use crate::protect::{DocumentProtector, ProtectReport};

const MAX_NAME_ATTEMPTS: usize = 100;

/// Outcome of a batch run. Per-file failures do not stop the batch; the
/// first one is kept for reporting.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub outputs: Vec<ProtectReport>,
    pub first_error: Option<(PathBuf, Error)>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }
}

/// Protects every file in `options.files` into `options.output_dir`,
/// running at most `max_concurrent` files at once (default: CPU count).
#[instrument(skip(options), fields(files = options.files.len()))]
pub async fn run_batch(options: ProtectOptions, max_concurrent: Option<usize>) -> Result<BatchReport> {
    options.validate_batch()?;
    let output_dir = options
        .output_dir
        .clone()
        .ok_or_else(|| Error::InvalidConfiguration("batch run requires an output directory".into()))?;
    tokio::fs::create_dir_all(&output_dir).await?;

    let started = Instant::now();
    let files = options.files.clone();
    let protector = Arc::new(DocumentProtector::new(options)?);
    let limiter = Arc::new(Semaphore::new(max_concurrent.unwrap_or_else(num_cpus::get).max(1)));
    info!("Protecting {} files into {}", files.len(), output_dir.display());

    let handles: Vec<_> = files
        .iter()
        .cloned()
        .map(|input| {
            let protector = Arc::clone(&protector);
            let limiter = Arc::clone(&limiter);
            let target = batch_target(&output_dir, &input);
            tokio::spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::ConcurrencyError(e.to_string()))?;
                protector.protect_file(&input, &target).await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;

    let mut report = BatchReport {
        total: files.len(),
        ..Default::default()
    };
    for (input, joined) in files.into_iter().zip(results) {
        match joined.map_err(Error::from).and_then(|result| result) {
            Ok(output) => {
                report.succeeded += 1;
                report.outputs.push(output);
            }
            Err(e) => {
                error!("Failed to protect {}: {}", input.display(), e);
                if report.first_error.is_none() {
                    report.first_error = Some((input, e));
                }
            }
        }
    }
    report.elapsed = started.elapsed();

    info!(
        "Batch finished: {}/{} succeeded in {:.2?}",
        report.succeeded, report.total, report.elapsed
    );
    Ok(report)
}

/// `output_dir/<file name of input>`.
pub fn batch_target(output_dir: &Path, input: &Path) -> PathBuf {
    match input.file_name() {
        Some(name) => output_dir.join(name),
        None => output_dir.join("output.pdf"),
    }
}

/// Atomically creates a fresh output file: `target` itself if nothing exists
/// there, otherwise a sibling named `<stem>_copyNNNN.<ext>` with a random
/// four-digit suffix. Creation uses `create_new`, so concurrent writers
/// aiming at the same name each end up with their own file.
pub async fn create_unique_output(target: &Path) -> Result<(File, PathBuf)> {
    match create_new(target).await? {
        Some(file) => return Ok((file, target.to_path_buf())),
        None => debug!("{} exists, choosing a copy name", target.display()),
    }

    for _ in 0..MAX_NAME_ATTEMPTS {
        let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
        let candidate = copy_name(target, suffix);
        if let Some(file) = create_new(&candidate).await? {
            return Ok((file, candidate));
        }
    }
    Err(Error::IoError(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free output name next to {}", target.display()),
    )))
}

/// `Ok(None)` when something already exists at `path`.
async fn create_new(path: &Path) -> Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `<stem>_copyNNNN.<ext>` next to `target`.
pub fn copy_name(target: &Path, suffix: u16) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match target.extension() {
        Some(ext) => format!("{}_copy{:04}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_copy{:04}", stem, suffix),
    };
    target.with_file_name(name)
}
