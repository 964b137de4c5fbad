use chrono::{DateTime, Utc};
use tracing::{debug, info};
use warden_core::{AppError, AppResult, OrganizationId};
use warden_domain::RoleAssignment;

use crate::RoleAssignmentService;

/// Outcome of one sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Assignments moved to `Expired`.
    pub expired: usize,
    /// Batches processed.
    pub batches: usize,
    /// Run start time.
    pub started_at: DateTime<Utc>,
    /// Run finish time.
    pub finished_at: DateTime<Utc>,
}

/// Background maintenance that materializes lapsed assignments as expired.
///
/// Evaluation never depends on it: lapsed assignments are already ignored at
/// read time.
#[derive(Clone)]
pub struct ExpirationSweeper {
    ledger: RoleAssignmentService,
}

impl ExpirationSweeper {
    /// Creates a sweeper over the assignment ledger.
    #[must_use]
    pub fn new(ledger: RoleAssignmentService) -> Self {
        Self { ledger }
    }

    /// Lists active assignments expiring in the next `days_ahead` days.
    pub async fn expiring_within(
        &self,
        organization_id: OrganizationId,
        days_ahead: u32,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.ledger
            .expiring_within(organization_id, days_ahead)
            .await
    }

    /// Expires at most one batch of lapsed assignments.
    pub async fn sweep(&self, batch_size: u32) -> AppResult<SweepReport> {
        validate_batch_size(batch_size)?;

        let started_at = Utc::now();
        let expired = self.ledger.expire_lapsed(batch_size).await?;
        let report = SweepReport {
            expired: expired.len(),
            batches: 1,
            started_at,
            finished_at: Utc::now(),
        };

        debug!(expired = report.expired, "expiration sweep batch finished");
        Ok(report)
    }

    /// Expires lapsed assignments batch by batch until a batch comes back short.
    pub async fn sweep_all(&self, batch_size: u32) -> AppResult<SweepReport> {
        validate_batch_size(batch_size)?;

        let started_at = Utc::now();
        let full_batch = usize::try_from(batch_size).unwrap_or(usize::MAX);
        let mut expired = 0;
        let mut batches = 0;

        loop {
            let batch = self.ledger.expire_lapsed(batch_size).await?;
            batches += 1;
            expired += batch.len();

            if batch.len() < full_batch {
                break;
            }
        }

        let report = SweepReport {
            expired,
            batches,
            started_at,
            finished_at: Utc::now(),
        };

        if report.expired > 0 {
            info!(
                expired = report.expired,
                batches = report.batches,
                "expired lapsed role assignments"
            );
        }

        Ok(report)
    }
}

fn validate_batch_size(batch_size: u32) -> AppResult<()> {
    if batch_size == 0 {
        return Err(AppError::Validation(
            "batch_size must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}
