//! Periodic maintenance: scheduled cleanup followed by consolidation

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::config::{MemoryConfiguration, SchedulerConfig};
use crate::coordinator::MemoryCoordinator;
use crate::error::Result;
use crate::memory::cleanup_log::CleanupReason;
use crate::memory::types::TenantId;

/// Outcome of one maintenance pass over every configured tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub tenants_checked: usize,
    pub tenants_processed: usize,
    pub tenants_failed: usize,
    pub entries_removed: usize,
    pub entries_consolidated: usize,
}

pub struct MemoryScheduler {
    coordinator: Arc<MemoryCoordinator>,
    config: SchedulerConfig,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryScheduler {
    pub fn new(coordinator: Arc<MemoryCoordinator>, config: SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            coordinator,
            config,
            shutdown,
            task: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Spawn the maintenance loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!("Memory scheduler already running");
            return false;
        }

        self.shutdown.send_replace(false);
        let coordinator = Arc::clone(&self.coordinator);
        let interval = Duration::from_secs(self.config.interval_secs);
        let backoff = Duration::from_secs(self.config.error_backoff_secs);
        let mut shutdown = self.shutdown.subscribe();

        *task = Some(tokio::spawn(async move {
            tracing::info!(
                "Memory scheduler started (interval {}s, backoff {}s)",
                interval.as_secs(),
                backoff.as_secs()
            );
            loop {
                let wait = match run_pass(&coordinator).await {
                    Ok(report) => {
                        tracing::info!(
                            "Maintenance pass: {} tenants checked, {} processed, {} failed, {} removed, {} consolidated",
                            report.tenants_checked,
                            report.tenants_processed,
                            report.tenants_failed,
                            report.entries_removed,
                            report.entries_consolidated
                        );
                        interval
                    }
                    Err(e) => {
                        tracing::error!("Maintenance pass failed: {e}");
                        backoff
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("Memory scheduler stopped");
        }));
        true
    }

    /// Signal the loop to exit and wait for it. A pass in progress finishes first.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return;
        };

        self.shutdown.send_replace(true);
        if let Err(e) = task.await {
            tracing::error!("Memory scheduler task ended abnormally: {e}");
        }
    }

    /// Run a single maintenance pass in the caller's task
    pub async fn run_once(&self) -> Result<MaintenanceReport> {
        run_pass(&self.coordinator).await
    }
}

/// A tenant is due when cleanup is enabled and its last scheduled cleanup
/// is older than its interval, or it has never had one
pub async fn is_due(coordinator: &MemoryCoordinator, config: &MemoryConfiguration) -> Result<bool> {
    if !config.policy.cleanup_enabled {
        return Ok(false);
    }

    let last = coordinator
        .cleanup_logs(&config.tenant_id, Some(CleanupReason::Scheduled), 1)
        .await?;
    let Some(last) = last.first() else {
        return Ok(true);
    };

    let interval = chrono::Duration::hours(i64::from(config.policy.cleanup_interval_hours));
    Ok(Utc::now() - last.created_at >= interval)
}

async fn run_pass(coordinator: &MemoryCoordinator) -> Result<MaintenanceReport> {
    let tenants = coordinator.tenants().await?;
    let mut report = MaintenanceReport {
        tenants_checked: tenants.len(),
        ..Default::default()
    };

    for config in &tenants {
        match maintain_tenant(coordinator, config).await {
            Ok(Some((removed, consolidated))) => {
                report.tenants_processed += 1;
                report.entries_removed += removed;
                report.entries_consolidated += consolidated;
            }
            Ok(None) => {}
            Err(e) => {
                report.tenants_failed += 1;
                tracing::error!("Maintenance failed for tenant {}: {e}", config.tenant_id);
            }
        }
    }

    Ok(report)
}

async fn maintain_tenant(
    coordinator: &MemoryCoordinator,
    config: &MemoryConfiguration,
) -> Result<Option<(usize, usize)>> {
    let tenant: &TenantId = &config.tenant_id;
    if !is_due(coordinator, config).await? {
        tracing::debug!("Tenant {} not due for maintenance", tenant);
        return Ok(None);
    }

    let cleanup = coordinator.cleanup(tenant, CleanupReason::Scheduled).await?;
    let consolidation = coordinator.consolidate(tenant).await?;
    Ok(Some((cleanup.total, consolidation.consolidated)))
}
