//! Wall-clock tick worker: one timer drives the production sweep across
//! every tenant, with per-tenant failures logged and swallowed so the
//! global schedule never stalls.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::server::SharedCartel;
use crate::unix_now;

pub fn spawn_tick_worker(cartel: SharedCartel, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = unix_now();
            let outcome = {
                let mut cartel = cartel.lock().await;
                cartel.run_production_tick(None, now)
            };
            match outcome {
                Ok(report) => {
                    for failure in &report.failures {
                        tracing::warn!(
                            tenant = %failure.tenant_id,
                            error = %failure.error,
                            "tenant production tick failed"
                        );
                    }
                    tracing::debug!(
                        tenants = report.reports.len(),
                        failures = report.failures.len(),
                        "production sweep complete"
                    );
                }
                Err(err) => {
                    tracing::error!(error = %err, "production sweep aborted");
                }
            }
        }
    })
}
