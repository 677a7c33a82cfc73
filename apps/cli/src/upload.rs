//! `chunkflow upload`: uploads one file, resuming from the ledger.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use chunkflow_transfer::{SpeedCalculator, format_file_size};
use chunkflow_uploader::{
    ChunkUploader, HttpUploadService, ProgressCallback, ProgressSnapshot, SourceFile,
    UploadError, UploadObserver, UploadOutcome,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::ledger::{LedgerEntry, ResumeLedger};

#[derive(Debug, clap::Args)]
pub struct UploadArgs {
    /// File to upload
    pub file: PathBuf,

    /// Owner id the upload is recorded under
    #[arg(long)]
    pub owner: Option<i64>,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Chunks in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries per chunk after the first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Skip MD5 digests
    #[arg(long)]
    pub no_verify: bool,
}

impl UploadArgs {
    /// Applies the command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(retries) = self.retries {
            config.retry_count = retries;
        }
        if self.no_verify {
            config.verify_integrity = false;
        }
    }
}

/// Records the upload id and chunk size in the ledger as soon as the server
/// assigns the id.
struct LedgerObserver<'a> {
    ledger: Mutex<ResumeLedger>,
    source: &'a SourceFile,
}

impl<'a> LedgerObserver<'a> {
    fn new(ledger: ResumeLedger, source: &'a SourceFile) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            source,
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, ResumeLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recorded(&self) -> Option<LedgerEntry> {
        self.ledger().lookup(self.source).cloned()
    }

    fn forget(&self) {
        if let Err(e) = self.ledger().forget(self.source) {
            warn!(error = %e, "failed to update resume ledger");
        }
    }

    fn into_ledger(self) -> ResumeLedger {
        self.ledger.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UploadObserver for LedgerObserver<'_> {
    fn on_started(&self, upload_id: &str, chunk_size: u64) {
        let mut ledger = self.ledger();
        if ledger
            .lookup(self.source)
            .is_some_and(|e| e.upload_id == upload_id && e.chunk_size == Some(chunk_size))
        {
            return;
        }
        if let Err(e) = ledger.record(self.source, upload_id, chunk_size) {
            warn!(error = %e, "failed to record upload in resume ledger");
        }
    }
}

pub async fn run(mut config: Config, ledger_path: PathBuf, args: UploadArgs) -> anyhow::Result<()> {
    let owner_id = args
        .owner
        .or(config.owner_id)
        .context("no owner id: pass --owner or set owner_id in the config file")?;
    args.apply(&mut config);

    let source = SourceFile::open(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let service = Arc::new(HttpUploadService::new(&config.service_config())?);
    let mut uploader = ChunkUploader::new(service, config.uploader_config())?;
    uploader.on_progress(progress_printer());

    let cancel = uploader.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling upload...");
            cancel.cancel();
        }
    });

    let observer = LedgerObserver::new(ResumeLedger::load(ledger_path)?, &source);
    let mut outcome = match observer.recorded() {
        Some(entry) => {
            info!(
                upload_id = %entry.upload_id,
                chunk_size = ?entry.chunk_size,
                file = source.file_name(),
                "resuming previous upload"
            );
            uploader
                .resume_with_observer(&source, &entry.upload_id, entry.chunk_size, &observer)
                .await
        }
        None => {
            uploader
                .upload_with_observer(&source, owner_id, &observer)
                .await
        }
    };

    if let UploadOutcome::Failed(UploadError::NotResumable { upload_id, reason }) = &outcome {
        warn!(upload_id = %upload_id, reason = %reason, "previous upload unusable, starting over");
        observer.forget();
        outcome = uploader
            .upload_with_observer(&source, owner_id, &observer)
            .await;
    }
    ctrl_c.abort();

    let mut ledger = observer.into_ledger();
    match outcome {
        UploadOutcome::Completed(receipt) => {
            ledger.forget(&source)?;
            match receipt.final_path {
                Some(path) => println!(
                    "uploaded {} ({}) to {path}",
                    receipt.file_name,
                    format_file_size(receipt.file_size)
                ),
                None => println!("{} is empty, nothing to upload", receipt.file_name),
            }
            if receipt.reused_chunks > 0 {
                println!(
                    "{} of {} chunks were already on the server",
                    receipt.reused_chunks, receipt.total_chunks
                );
            }
            Ok(())
        }
        UploadOutcome::Cancelled => {
            ledger.forget(&source)?;
            println!("upload cancelled");
            Ok(())
        }
        UploadOutcome::Failed(e) => {
            Err(anyhow::Error::new(e).context(format!("upload of {} failed", source.file_name())))
        }
    }
}

/// Prints one line per progress snapshot, with throughput.
fn progress_printer() -> ProgressCallback {
    let speed = SpeedCalculator::new(None, None);
    let last_bytes = AtomicU64::new(0);
    Box::new(move |p: &ProgressSnapshot| {
        let previous = last_bytes.swap(p.confirmed_bytes, Ordering::Relaxed);
        speed.add_sample(p.confirmed_bytes.saturating_sub(previous));
        let rate = speed.bytes_per_second();
        println!("{}", format_progress(p, rate, speed.eta(p.remaining_bytes())));
    })
}

fn format_progress(p: &ProgressSnapshot, bytes_per_second: f64, eta: Option<Duration>) -> String {
    let eta = eta.map_or_else(|| "--".to_string(), |d| format!("{}s", d.as_secs()));
    format!(
        "{:>3}%  {}/{} chunks  {} / {}  {}/s  eta {eta}",
        p.percentage,
        p.confirmed_count,
        p.total_count,
        format_file_size(p.confirmed_bytes),
        format_file_size(p.total_bytes),
        format_file_size(bytes_per_second as u64),
    )
}
