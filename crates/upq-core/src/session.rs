//! Async driver around [`UploadScheduler`].
//!
//! The session owns the scheduler and the receiving end of the transport
//! event channel. Commands and events are applied one at a time on the
//! session's task, so the scheduler never needs locking. After every change a
//! fresh [`UploadStatus`] is offered to the optional status channel.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::file::{FileId, UploadFile};
use crate::scheduler::{SchedulerError, UploadScheduler, UploadStatus};
use crate::transport::{EventReceiver, Transport};

/// Imperative operations, as sent from a UI or CLI task.
#[derive(Debug)]
pub enum SessionCommand {
    Add(Vec<UploadFile>),
    UploadAll,
    Upload { id: FileId, keep_going: bool },
    Stop(FileId),
    StopAll,
    Remove(FileId),
    RemoveAll,
}

impl SessionCommand {
    fn kind(&self) -> &'static str {
        match self {
            SessionCommand::Add(_) => "add",
            SessionCommand::UploadAll => "upload_all",
            SessionCommand::Upload { .. } => "upload",
            SessionCommand::Stop(_) => "stop",
            SessionCommand::StopAll => "stop_all",
            SessionCommand::Remove(_) => "remove",
            SessionCommand::RemoveAll => "remove_all",
        }
    }
}

pub struct UploadSession<T: Transport> {
    scheduler: UploadScheduler<T>,
    events: EventReceiver,
    status_tx: Option<mpsc::Sender<UploadStatus>>,
}

impl<T: Transport> UploadSession<T> {
    pub fn new(scheduler: UploadScheduler<T>, events: EventReceiver) -> Self {
        Self {
            scheduler,
            events,
            status_tx: None,
        }
    }

    /// Publish status snapshots to `tx`. Snapshots are dropped when the
    /// channel is full; the next change sends a newer one.
    pub fn with_status_channel(mut self, tx: mpsc::Sender<UploadStatus>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn scheduler(&self) -> &UploadScheduler<T> {
        &self.scheduler
    }

    pub fn status(&self) -> UploadStatus {
        self.scheduler.status()
    }

    pub fn into_scheduler(self) -> UploadScheduler<T> {
        self.scheduler
    }

    pub fn apply(&mut self, command: SessionCommand) -> Result<(), SchedulerError> {
        tracing::debug!(command = command.kind(), "session command");
        let result = match command {
            SessionCommand::Add(files) => {
                self.scheduler.add_files(files);
                Ok(())
            }
            SessionCommand::UploadAll => {
                self.scheduler.upload_all();
                Ok(())
            }
            SessionCommand::Upload { id, keep_going } => self.scheduler.upload(id, keep_going),
            SessionCommand::Stop(id) => self.scheduler.stop(id),
            SessionCommand::StopAll => {
                self.scheduler.stop_all();
                Ok(())
            }
            SessionCommand::Remove(id) => self.scheduler.remove(id).map(|_| ()),
            SessionCommand::RemoveAll => {
                self.scheduler.remove_all();
                Ok(())
            }
        };
        self.publish();
        result
    }

    /// Apply transport events until nothing is in flight.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        while self.scheduler.in_flight_count() > 0 {
            let Some(event) = self.events.recv().await else {
                anyhow::bail!(
                    "transport event channel closed with {} upload(s) in flight",
                    self.scheduler.in_flight_count()
                );
            };
            if self.scheduler.handle(event) {
                self.publish();
            }
        }
        Ok(())
    }

    /// Serve commands and transport events until the command channel closes,
    /// then drain whatever is still in flight.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) -> Result<()> {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(err) = self.apply(command) {
                            tracing::warn!("session command rejected: {}", err);
                        }
                    }
                    None => break,
                },
                Some(event) = self.events.recv() => {
                    if self.scheduler.handle(event) {
                        self.publish();
                    }
                }
            }
        }
        self.run_until_idle().await
    }

    fn publish(&self) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.try_send(self.scheduler.status());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::file::FileState;
    use crate::scheduler::{SchedulerOptions, UploadHooks};
    use crate::transport::testing::RecordingTransport;
    use crate::transport::{event_channel, TransportEvent, UploadResponse};

    fn session(
        max_concurrent: usize,
    ) -> (
        UploadSession<RecordingTransport>,
        crate::transport::EventSender,
        Arc<crate::transport::testing::Recorded>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let (transport, recorded) = RecordingTransport::new();
        let done = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&done);
        let hooks = UploadHooks::new(
            move |_, record| seen.lock().unwrap().push(record.name().to_string()),
            |_, _| {},
        );
        let options = SchedulerOptions {
            max_concurrent,
            ..SchedulerOptions::default()
        };
        let scheduler = UploadScheduler::new(transport, hooks, options).unwrap();
        let (tx, rx) = event_channel(16);
        (UploadSession::new(scheduler, rx), tx, recorded, done)
    }

    fn outcome(ticket: crate::transport::Ticket) -> TransportEvent {
        TransportEvent::Outcome {
            ticket,
            result: Ok(UploadResponse {
                status: 200,
                body: Vec::new(),
            }),
        }
    }

    #[tokio::test]
    async fn run_until_idle_drains_events() {
        let (mut session, tx, recorded, done) = session(1);
        let (status_tx, mut status_rx) = mpsc::channel(64);
        session = session.with_status_channel(status_tx);
        session
            .apply(SessionCommand::Add(vec![
                UploadFile::from_bytes("a.bin", vec![1u8; 10]),
                UploadFile::from_bytes("b.bin", vec![1u8; 10]),
            ]))
            .unwrap();
        assert_eq!(status_rx.recv().await.unwrap().uploading_count, 1);

        let feeder = {
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                let a = recorded.ticket_for("a.bin");
                tx.send(TransportEvent::Progress {
                    ticket: a,
                    loaded: 5,
                    total: 10,
                })
                .await
                .unwrap();
                tx.send(outcome(a)).await.unwrap();
                // b is dispatched once a resolves.
                loop {
                    let b = recorded.tickets().into_iter().find(|t| t.file != a.file);
                    if let Some(b) = b {
                        tx.send(outcome(b)).await.unwrap();
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        session.run_until_idle().await.unwrap();
        feeder.await.unwrap();

        assert_eq!(*done.lock().unwrap(), vec!["a.bin", "b.bin"]);
        let status = session.status();
        assert!(status.done);
        assert_eq!(status.progress, 100);
        assert!(session
            .scheduler()
            .records()
            .iter()
            .all(|r| r.state() == FileState::Uploaded));

        let mut last = None;
        while let Ok(s) = status_rx.try_recv() {
            last = Some(s);
        }
        assert!(last.unwrap().done);
    }

    #[tokio::test]
    async fn run_serves_commands_then_drains() {
        let (mut session, tx, recorded, done) = session(2);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        cmd_tx
            .send(SessionCommand::Add(vec![UploadFile::from_bytes("a.bin", vec![0u8; 4])]))
            .await
            .unwrap();
        drop(cmd_tx);

        let feeder = tokio::spawn(async move {
            loop {
                if let Some(t) = recorded.tickets().first().copied() {
                    tx.send(outcome(t)).await.unwrap();
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        session.run(cmd_rx).await.unwrap();
        feeder.await.unwrap();
        assert_eq!(*done.lock().unwrap(), vec!["a.bin"]);
        assert_eq!(session.scheduler().in_flight_count(), 0);
    }

    #[tokio::test]
    async fn closed_event_channel_with_work_in_flight_is_an_error() {
        let (mut session, tx, _recorded, _done) = session(1);
        session
            .apply(SessionCommand::Add(vec![UploadFile::from_bytes("a.bin", vec![0u8; 4])]))
            .unwrap();
        drop(tx);
        assert!(session.run_until_idle().await.is_err());
    }

    #[test]
    fn rejected_commands_report_errors() {
        let (mut session, _tx, _recorded, _done) = session(1);
        let err = session
            .apply(SessionCommand::Stop(FileId(42)))
            .unwrap_err();
        assert_eq!(err, SchedulerError::UnknownFile(FileId(42)));
        session.apply(SessionCommand::RemoveAll).unwrap();
    }
}
