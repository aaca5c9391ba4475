//! Alert delivery seam.
//!
//! The orchestrator emits alert-worthy terminal events (final failure with
//! `alert_on_final_failure` set) through this trait, fire-and-forget: a
//! notifier that fails must never fail the execution.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<Uuid>,
    pub action_id: Uuid,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Default notifier: surfaces alerts on the log stream only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, alert: Alert) {
        tracing::warn!(
            run_id = %alert.run_id,
            action_id = %alert.action_id,
            "alert: {}",
            alert.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) struct CountingNotifier(pub Arc<AtomicUsize>);

    impl Notifier for CountingNotifier {
        fn alert(&self, _alert: Alert) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_notifier_counts() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier = CountingNotifier(count.clone());
        notifier.alert(Alert {
            run_id: Uuid::new_v4(),
            automation_id: None,
            action_id: Uuid::new_v4(),
            message: "send_email failed after 4 attempts".into(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
