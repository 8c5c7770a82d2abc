use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::store::{FlagStore, FlagValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip { last: FlagValue },
}

/// Caller-side at-most-once check: reads the completion flag once and
/// decides whether a run may start.
pub struct CompletionGate {
    store: Arc<dyn FlagStore>,
    key: String,
    rerun_after: Option<Duration>,
}

impl CompletionGate {
    pub fn new(store: Arc<dyn FlagStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            rerun_after: None,
        }
    }

    /// Allow a new run once this much time has passed since a timestamp flag.
    pub fn with_rerun_after(mut self, window: Option<Duration>) -> Self {
        self.rerun_after = window;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn check(&self, now_ms: i64) -> Result<GateDecision, StoreError> {
        let Some(flag) = self.store.get(&self.key)?.filter(FlagValue::is_set) else {
            return Ok(GateDecision::Run);
        };

        let decision = match (flag, self.rerun_after) {
            (FlagValue::Timestamp(at), Some(window))
                if now_ms.saturating_sub(at) >= window_ms(window) =>
            {
                GateDecision::Run
            }
            (last, _) => GateDecision::Skip { last },
        };
        Ok(decision)
    }

    /// Run `f` only if the gate is open. Returns `None` when skipped.
    pub async fn run_once<F, Fut, T>(&self, now_ms: i64, f: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.check(now_ms)? {
            GateDecision::Run => Ok(Some(f().await)),
            GateDecision::Skip { last } => {
                tracing::info!(key = %self.key, ?last, "Completion flag already set, skipping run");
                Ok(None)
            }
        }
    }
}

/// Windows longer than `i64::MAX` ms never elapse.
fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const KEY: &str = "composer.last_sent";
    const HOUR_MS: i64 = 3_600_000;

    fn gate(flag: Option<FlagValue>, window: Option<Duration>) -> CompletionGate {
        let store = match flag {
            Some(v) => MemoryStore::with_flag(KEY, v),
            None => MemoryStore::new(),
        };
        CompletionGate::new(Arc::new(store), KEY).with_rerun_after(window)
    }

    #[test]
    fn absent_or_false_flag_runs() {
        assert_eq!(gate(None, None).check(0).unwrap(), GateDecision::Run);
        assert_eq!(
            gate(Some(FlagValue::Bool(false)), None).check(0).unwrap(),
            GateDecision::Run
        );
    }

    #[test]
    fn set_flag_skips_without_window() {
        assert_eq!(
            gate(Some(FlagValue::Bool(true)), None).check(0).unwrap(),
            GateDecision::Skip {
                last: FlagValue::Bool(true)
            }
        );
        assert!(matches!(
            gate(Some(FlagValue::Timestamp(5)), None).check(i64::MAX).unwrap(),
            GateDecision::Skip { .. }
        ));
    }

    #[test]
    fn timestamp_reopens_after_window() {
        let g = gate(
            Some(FlagValue::Timestamp(10 * HOUR_MS)),
            Some(Duration::from_secs(24 * 3600)),
        );
        assert!(matches!(g.check(20 * HOUR_MS).unwrap(), GateDecision::Skip { .. }));
        assert_eq!(g.check(34 * HOUR_MS).unwrap(), GateDecision::Run);
    }

    #[test]
    fn huge_window_never_reopens() {
        let g = gate(
            Some(FlagValue::Timestamp(1_000)),
            Some(Duration::from_secs(10_000_000_000_000_000)),
        );
        assert!(matches!(g.check(2_000).unwrap(), GateDecision::Skip { .. }));

        let g = gate(
            Some(FlagValue::Timestamp(0)),
            Some(Duration::from_secs(u64::MAX)),
        );
        assert!(matches!(g.check(i64::MAX - 1).unwrap(), GateDecision::Skip { .. }));
    }

    #[test]
    fn boolean_flag_ignores_window() {
        let g = gate(Some(FlagValue::Bool(true)), Some(Duration::from_secs(1)));
        assert!(matches!(g.check(i64::MAX).unwrap(), GateDecision::Skip { .. }));
    }
}
