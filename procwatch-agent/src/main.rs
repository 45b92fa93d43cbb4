//! procwatch Agent - per-host process telemetry
//!
//! Each cycle:
//! - Samples the process table in two passes (CPU delta)
//! - Wraps the samples with the local hostname into one snapshot
//! - Delivers it to the collector with bounded retries
//!
//! `interval_seconds = 0` runs a single cycle and exits; any other value
//! repeats cycles on a fixed grid until the process is stopped.

mod clock;
mod config;
mod delivery;
mod sampler;
mod scheduler;
mod snapshot;
#[cfg(test)]
mod testing;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clock::{Clock, TokioClock};
use config::AgentConfig;
use delivery::{DeliveryClient, HttpTransport, Transport};
use sampler::{ProcessTable, Sampler, SysinfoTable};
use scheduler::{Job, Scheduler};
use snapshot::Snapshot;

/// Sample → build → deliver pipeline
struct Agent<P, T, C> {
    hostname: String,
    sampler: Sampler<P, C>,
    delivery: DeliveryClient<T, C>,
}

impl<P: ProcessTable, T: Transport, C: Clock> Agent<P, T, C> {
    fn new(hostname: String, sampler: Sampler<P, C>, delivery: DeliveryClient<T, C>) -> Self {
        Self {
            hostname,
            sampler,
            delivery,
        }
    }
}

impl<P: ProcessTable, T: Transport, C: Clock> Job for Agent<P, T, C> {
    fn run_cycle(&mut self) -> impl Future<Output = ()> {
        async move {
            let processes = self.sampler.sample().await;
            let snapshot = Snapshot::new(self.hostname.clone(), processes);
            info!(
                hostname = %snapshot.hostname,
                processes = snapshot.processes.len(),
                "snapshot built"
            );

            let outcome = self.delivery.deliver(&snapshot).await;
            if !outcome.is_delivered() {
                warn!(?outcome, "cycle finished without delivery");
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("procwatch_agent=info")),
        )
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AgentConfig::load(config_path).context("Failed to load agent configuration")?;

    let transport = HttpTransport::new(&config.backend_url, &config.api_key, config.timeout())
        .context("Failed to build HTTP client")?;

    let hostname = snapshot::local_hostname();
    info!(
        %hostname,
        backend = %config.backend_url,
        interval_seconds = config.interval_seconds,
        "procwatch agent starting"
    );

    let mut agent = Agent::new(
        hostname,
        Sampler::new(SysinfoTable::new(), TokioClock, config.settle()),
        DeliveryClient::new(transport, TokioClock, config.max_retries, config.retry_backoff()),
    );

    let scheduler = Scheduler::new(config.interval(), TokioClock);
    scheduler.run(&mut agent).await;

    info!("one-shot cycle complete");
    Ok(())
}
