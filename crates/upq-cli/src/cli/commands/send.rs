//! `upq send` – validate and upload files, printing progress as batches move.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use upq_core::config::UploadConfig;
use upq_core::scheduler::{UploadHooks, UploadScheduler, UploadStatus};
use upq_core::session::{SessionCommand, UploadSession};
use upq_core::transport::{event_channel, json_metadata, raw_body, HttpTransport};
use upq_core::{FileState, UploadFile};

use crate::cli::BodyFormat;

const PROGRESS_INTERVAL_MS: u64 = 500;

pub async fn run_send(cfg: &UploadConfig, files: &[PathBuf], format: BodyFormat) -> Result<()> {
    let url = cfg.validate()?.to_string();
    let uploads = files
        .iter()
        .map(|p| UploadFile::from_path(p).with_context(|| format!("cannot read {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let (events_tx, events_rx) = event_channel(256);
    let builder = HttpTransport::builder(events_tx)
        .url(url)
        .content_type(cfg.content_type.as_str())
        .method(cfg.method.as_str())
        .timeouts(cfg.timeouts());
    let transport = match format {
        BodyFormat::Raw => builder.form_request(raw_body),
        BodyFormat::JsonMetadata => builder.form_request(json_metadata),
    }
    .build()?;
    tracing::info!(url = transport.url(), method = transport.method(), files = uploads.len(), "starting uploads");

    let hooks = UploadHooks::builder()
        .on_success(|response, record| {
            tracing::debug!(file = record.name(), body = %response.body_text(), "upload accepted");
            println!("\r  uploaded {} (HTTP {})", record.name(), response.status);
        })
        .on_failure(|err, record| {
            println!("\r  failed   {}: {}", record.name(), err);
        })
        .build()?;
    let scheduler = UploadScheduler::new(transport, hooks, cfg.scheduler_options())?;
    tracing::debug!(
        max_concurrent = scheduler.options().max_concurrent,
        auto_upload = scheduler.options().auto_upload,
        "scheduler ready"
    );

    let (status_tx, mut status_rx) = mpsc::channel::<UploadStatus>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last_print = Instant::now();
        while let Some(status) = status_rx.recv().await {
            let now = Instant::now();
            if now.duration_since(last_print).as_millis() as u64 >= PROGRESS_INTERVAL_MS
                || status.done
            {
                println!(
                    "\r  batch {}: {:>3}%  {} uploading  {} failed  ",
                    status.current_batch,
                    status.progress,
                    status.uploading_count,
                    status.errored.len()
                );
                last_print = now;
            }
        }
    });

    let mut session = UploadSession::new(scheduler, events_rx).with_status_channel(status_tx);
    session.apply(SessionCommand::Add(uploads))?;
    if !cfg.auto_upload {
        session.apply(SessionCommand::UploadAll)?;
    }

    tokio::select! {
        res = session.run_until_idle() => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; stopping all uploads");
            session.apply(SessionCommand::StopAll)?;
        }
    }

    let scheduler = session.into_scheduler();
    let _ = progress_handle.await;

    println!();
    println!("{:<10} {:<12} {}", "STATE", "SIZE", "FILE");
    let mut errored = 0usize;
    for record in scheduler.records() {
        let detail = match record.error_message() {
            Some(msg) => {
                errored += 1;
                format!("{}  ({})", record.name(), msg)
            }
            None => record.name().to_string(),
        };
        println!("{:<10} {:<12} {}", record.state().as_str(), record.size(), detail);
    }

    let stopped = scheduler
        .records()
        .iter()
        .filter(|r| r.state() == FileState::Stopped)
        .count();
    if errored > 0 {
        anyhow::bail!("{} of {} file(s) failed", errored, scheduler.records().len());
    }
    if stopped > 0 {
        anyhow::bail!("{} file(s) stopped before finishing", stopped);
    }
    Ok(())
}
