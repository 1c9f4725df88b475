//! The monitoring loop: cycles over source channels until cancelled.

use std::{sync::Arc, time::Duration};

use {
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use courier_store::RelayStore;

use crate::{
    Result,
    config::RelayConfig,
    pipeline::{RelayOutcome, RelayPipeline},
    scanner::ChannelScanner,
    transport::Transport,
    types::ChannelRef,
};

/// Drives the relay: one cycle scans every source channel in order, runs
/// each candidate through the pipeline, then waits out the poll interval.
///
/// Cancellation is checked at every suspension point. An in-flight
/// single-file relay is allowed to finish; the wait phases abort within a
/// second of a stop request.
pub struct Monitor {
    transport: Arc<dyn Transport>,
    store: Arc<dyn RelayStore>,
    scanner: ChannelScanner,
    pipeline: RelayPipeline,
    config: RelayConfig,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn RelayStore>,
        config: RelayConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let scanner = ChannelScanner::new(Arc::clone(&transport));
        let pipeline = RelayPipeline::new(Arc::clone(&transport), Arc::clone(&store), &config);
        Ok(Self {
            transport,
            store,
            scanner,
            pipeline,
            config,
            cancel,
        })
    }

    /// Run until cancelled. Fails fast when the destination channel is not
    /// accessible; everything after that is per-cycle and non-fatal.
    pub async fn run(&self) -> Result<()> {
        let destination = self
            .transport
            .resolve_channel(&self.config.destination)
            .await?;
        info!(
            destination = destination.display_name(),
            sources = self.config.source_channels.len(),
            interval_secs = self.config.check_interval_secs,
            "monitor started"
        );
        if let Err(e) = self
            .store
            .log_activity("MONITOR_STARTED", &self.config.destination)
            .await
        {
            warn!(error = %e, "failed to append activity record");
        }
        self.report_statistics().await;

        let mut cycle: u64 = 0;
        while !self.cancel.is_cancelled() {
            cycle += 1;
            info!(cycle, "starting monitoring cycle");
            let sent = self.run_cycle(&destination).await;
            info!(cycle, sent, "cycle complete");

            if sent > 0 || cycle % self.config.stats_every_cycles.max(1) == 0 {
                self.report_statistics().await;
            }

            if !self.idle(self.config.check_interval()).await {
                break;
            }
        }

        info!("monitor stopped");
        Ok(())
    }

    /// One full pass over all source channels. Per-channel and per-file
    /// errors are contained here; a cycle never takes the process down.
    pub async fn run_cycle(&self, destination: &ChannelRef) -> u64 {
        let mut total = 0u64;
        let channels = &self.config.source_channels;

        for (index, identifier) in channels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            total += self.check_channel(identifier, destination).await;

            let last = index + 1 == channels.len();
            if !last && !self.idle(self.config.inter_channel_delay()).await {
                break;
            }
        }

        if let Err(e) = self
            .store
            .log_activity("CYCLE_COMPLETE", &format!("sent: {total}"))
            .await
        {
            warn!(error = %e, "failed to append activity record");
        }
        total
    }

    async fn check_channel(&self, identifier: &str, destination: &ChannelRef) -> u64 {
        let scan = self
            .scanner
            .scan(identifier, self.config.messages_to_check)
            .await;
        let (channel, messages) = match scan {
            Ok(result) => result,
            Err(err) if err.is_channel_skip() => {
                warn!(channel = identifier, error = %err, "skipping channel");
                return 0;
            },
            Err(err) => {
                error!(channel = identifier, error = %err, "channel scan failed");
                return 0;
            },
        };

        info!(
            channel = channel.display_name(),
            count = messages.len(),
            "checking channel"
        );

        let mut sent = 0u64;
        for message in &messages {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.pipeline.process(message, &channel, destination).await {
                Ok(RelayOutcome::Relayed { .. }) => sent += 1,
                Ok(RelayOutcome::Duplicate | RelayOutcome::FilteredOut) => {},
                Err(err) => {
                    warn!(
                        channel = channel.display_name(),
                        error = %err,
                        "failed to relay candidate"
                    );
                    if let Err(e) = self.store.log_activity("PROCESS_ERROR", &err.to_string()).await
                    {
                        warn!(error = %e, "failed to append activity record");
                    }
                },
            }
            // Fixed delay after every candidate, to stay under the remote
            // service's request-rate tolerance.
            if !self.idle(self.config.inter_message_delay()).await {
                break;
            }
        }
        sent
    }

    /// Interruptible wait. Returns false when a stop was requested; the
    /// wait aborts immediately, never blocking for the full duration.
    async fn idle(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    async fn report_statistics(&self) {
        match self.store.file_statistics().await {
            Ok(stats) => {
                info!(
                    total_files = stats.total_files,
                    current_sequence = stats.current_sequence,
                    "ledger statistics"
                );
                for channel in &stats.by_channel {
                    info!(channel = %channel.channel, count = channel.count, "relayed per channel");
                }
                for file in stats.recent.iter().take(3) {
                    info!(sequence = file.sequence, file = %file.new_filename, "recent relay");
                }
            },
            Err(e) => warn!(error = %e, "failed to read statistics"),
        }
    }
}
