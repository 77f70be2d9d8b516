use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use libris_core::{Library, LibraryError, MaintenanceReport};

/// Periodic housekeeping: reservation expiry, queue promotion and loan
/// reminders.
pub struct Maintainer {
    library: Arc<Library>,
}

impl Maintainer {
    pub fn new(library: Arc<Library>) -> Self {
        Self { library }
    }

    pub fn run_once(&self) -> Result<MaintenanceReport, LibraryError> {
        self.library.run_maintenance()
    }

    /// Run continuous maintenance loop.
    pub async fn run(&self, interval: Duration) {
        loop {
            match self.run_once() {
                Ok(report) => {
                    if report != MaintenanceReport::default() {
                        tracing::info!(
                            "Maintenance: {} reservations expired, {} ready, {} reminders, {} overdue notices",
                            report.expired_reservations,
                            report.reservations_ready,
                            report.due_reminders,
                            report.overdue_notices
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("Maintenance error: {:?}", e);
                }
            }

            sleep(interval).await;
        }
    }
}
