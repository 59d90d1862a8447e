//! Monitor command: periodic CPU and memory logging.

use anyhow::Result;
use shardfetch_core::config::Settings;
use shardfetch_core::monitor;

/// Log resource usage every `settings.monitor_interval`. Sampling failures are logged, not fatal.
pub fn run_monitor(settings: &Settings, samples: Option<u64>) -> Result<()> {
    tracing::info!(
        "monitoring resources every {:.1}s",
        settings.monitor_interval.as_secs_f64()
    );
    let ok = monitor::run(settings.monitor_interval, samples);
    tracing::info!("resource monitor stopped after {} sample(s)", ok);
    Ok(())
}
