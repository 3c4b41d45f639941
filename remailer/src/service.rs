//! The spool supervisor.
//!
//! A single interval drives the service. Each tick is published on a `watch`
//! channel; the refresher re-lists the spool and then wakes the workers,
//! which drain the scanner until it is exhausted. A shutdown signal drops
//! whatever is in flight and every task is joined before `serve` returns.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use remailer_common::{FileStatus, Signal, lifecycle};
use remailer_delivery::{Dialer, DnsResolver, OutputChain, Sender};
use remailer_pipeline::{ProcessorChain, TransformerChain};
use remailer_spool::{FileUnit, Scanner, SpoolError, Tracker};
use tokio::{
    sync::{broadcast, watch},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Everything needed to take one spool unit from claim to DONE.
#[derive(Debug)]
pub struct Worker {
    scanner: Arc<Scanner>,
    transformers: TransformerChain,
    processors: ProcessorChain,
    sender: Sender,
    outputs: OutputChain,
}

impl Worker {
    pub const fn new(
        scanner: Arc<Scanner>,
        transformers: TransformerChain,
        processors: ProcessorChain,
        sender: Sender,
        outputs: OutputChain,
    ) -> Self {
        Self {
            scanner,
            transformers,
            processors,
            sender,
            outputs,
        }
    }

    pub const fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    /// Hand out units until the current listing is exhausted.
    pub async fn drain(&self, worker: usize) {
        loop {
            match self.scanner.read_next_file().await {
                Ok(unit) => self.handle(unit).await,
                Err(SpoolError::Exhausted) => break,
                Err(err) if err.is_skip() => debug!(worker, "{err}"),
                Err(err) => {
                    error!(worker, error = %err, "Failed to read the next spool unit");
                    break;
                }
            }
        }
    }

    /// Run one claimed unit through the pipeline and delivery, marking it
    /// ERROR when any step fails.
    pub async fn handle(&self, mut unit: FileUnit) {
        let id = unit.id.clone();
        if let Err(err) = self.deliver(&mut unit).await {
            error!(unit = %id, error = %format!("{err:#}"), "Failed to process spool unit");
            if let Err(err) = unit.set_status(FileStatus::Error).await {
                warn!(unit = %id, error = %err, "Failed to record ERROR status");
            }
        }
    }

    async fn deliver(&self, unit: &mut FileUnit) -> anyhow::Result<()> {
        let mut mail = self
            .transformers
            .run(unit)
            .await
            .context("transformer chain failed")?;

        self.processors
            .run(&mut mail)
            .context("processor chain failed")?;
        unit.set_status(FileStatus::MailProcess).await?;

        let (responses, errors) = self.sender.send_mail(&mail).await;
        unit.set_status(FileStatus::Delivered).await?;

        let failures = self.outputs.write(&mail, &responses, &errors).await;
        if !self.outputs.sets_done() || !failures.is_empty() {
            unit.set_status(FileStatus::Done).await?;
        }

        info!(
            unit = %unit.id,
            recipients = responses.len().max(errors.len()),
            failed = errors.len(),
            "Spool unit done"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct Service {
    worker: Arc<Worker>,
    concurrency: usize,
    poll_interval: Duration,
}

impl Service {
    pub fn new(worker: Worker, concurrency: usize, poll_interval: Duration) -> Self {
        Self {
            worker: Arc::new(worker),
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Build the service from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the spool directory is invalid, the tracker store cannot
    /// be reached, a chain or output is misconfigured, or the system DNS
    /// configuration cannot be loaded.
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let Some(in_path) = &config.read_file.in_path else {
            anyhow::bail!("read-file.in-path is not configured");
        };

        let tracker = Arc::new(
            Tracker::connect(config.read_file.redis_addr.as_deref())
                .await
                .context("failed to connect to the read tracker")?,
        );
        let scanner = Arc::new(
            Scanner::new(in_path, Arc::clone(&tracker))
                .with_context(|| format!("invalid spool directory {}", in_path.display()))?,
        );

        let transformers = TransformerChain::from_config(&config.transformer_configs())?;
        let processors = ProcessorChain::from_config(&config.processor_configs())?;
        let outputs = OutputChain::from_config(&config.outputs, &tracker)?;

        let resolver = Arc::new(DnsResolver::system().context("failed to load DNS configuration")?);
        let sender = Sender::new(
            resolver,
            Dialer::from_config(&config.dialer),
            config.smtp.clone(),
        );

        lifecycle!(
            level = INFO,
            spool = %scanner.in_path().display(),
            transformers = ?transformers.names(),
            processors = ?processors.names(),
            outputs = ?outputs.names(),
            "Service initialised"
        );

        Ok(Self::new(
            Worker::new(scanner, transformers, processors, sender, outputs),
            config.read_file.concurrency,
            config.read_file.poll_interval,
        ))
    }

    /// Run until `shutdown` delivers a signal or closes.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        lifecycle!(
            level = INFO,
            concurrency = self.concurrency,
            interval = ?self.poll_interval,
            "Service starting"
        );

        let (tick_tx, tick_rx) = watch::channel(0u64);
        let (refreshed_tx, refreshed_rx) = watch::channel(0u64);
        let mut tasks = JoinSet::new();

        tasks.spawn(refresher(
            Arc::clone(self.worker.scanner()),
            tick_rx,
            refreshed_tx,
            shutdown.resubscribe(),
        ));

        for id in 0..self.concurrency {
            tasks.spawn(run_worker(
                Arc::clone(&self.worker),
                id,
                refreshed_rx.clone(),
                shutdown.resubscribe(),
            ));
        }
        drop(refreshed_rx);

        let mut interval = tokio::time::interval(self.poll_interval);
        let mut tick = 0u64;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tick += 1;
                    tick_tx.send_replace(tick);
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(sig) => {
                            lifecycle!(level = INFO, "Service received {sig:?}");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        drop(tick_tx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Service task failed");
            }
        }

        lifecycle!(level = INFO, "Service stopped");
        Ok(())
    }
}

async fn refresher(
    scanner: Arc<Scanner>,
    mut ticks: watch::Receiver<u64>,
    refreshed: watch::Sender<u64>,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            changed = ticks.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let tick = *ticks.borrow_and_update();
        match scanner.refresh_list().await {
            Ok(count) => debug!(tick, count, "Spool refreshed"),
            Err(SpoolError::NoFilesFound) => {
                debug!(tick, "no files found");
                continue;
            }
            Err(err) => {
                error!(tick, error = %err, "Failed to refresh the spool listing");
                continue;
            }
        }

        refreshed.send_replace(tick);
    }
}

async fn run_worker(
    worker: Arc<Worker>,
    id: usize,
    mut refreshed: watch::Receiver<u64>,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            changed = refreshed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            () = worker.drain(id) => {}
        }
    }

    debug!(worker = id, "Worker stopped");
}
