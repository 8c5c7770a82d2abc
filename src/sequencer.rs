use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};

use crate::config::{PilotConfig, Selectors, Timing, UnmatchedPolicy};
use crate::dom::{Dom, wait_for_element};
use crate::error::SequenceError;
use crate::events::SequenceEvent;
use crate::store::{FlagStore, FlagValue};
use crate::types::{Candidate, ComposeRequest, RunReport, SequenceState, now_ms};

/// First candidate, in element order, whose name equals `target` exactly
/// (surrounding whitespace ignored).
pub fn first_exact_match<'a, E>(
    candidates: &'a [Candidate<E>],
    target: &str,
) -> Option<&'a Candidate<E>> {
    let target = target.trim();
    candidates.iter().find(|c| c.display_name.trim() == target)
}

fn driver(state: SequenceState) -> impl FnOnce(anyhow::Error) -> SequenceError {
    move |source| SequenceError::Driver { state, source }
}

#[derive(Default)]
struct Progress {
    selected: Option<String>,
    seen: Vec<String>,
    completed_at_ms: Option<i64>,
}

/// Drives the composer from the message list to a submitted message and a
/// written completion flag.
pub struct Sequencer<D: Dom> {
    dom: Arc<D>,
    store: Arc<dyn FlagStore>,
    selectors: Selectors,
    timing: Timing,
    policy: UnmatchedPolicy,
    flag_key: String,
    events: Option<broadcast::Sender<SequenceEvent>>,
}

impl<D: Dom> Sequencer<D> {
    pub fn new(dom: Arc<D>, store: Arc<dyn FlagStore>) -> Self {
        Self {
            dom,
            store,
            selectors: Selectors::default(),
            timing: Timing::default(),
            policy: UnmatchedPolicy::default(),
            flag_key: crate::config::DEFAULT_FLAG_KEY.to_string(),
            events: None,
        }
    }

    pub fn from_config(dom: Arc<D>, store: Arc<dyn FlagStore>, config: &PilotConfig) -> Self {
        Self::new(dom, store)
            .with_selectors(config.selectors.clone())
            .with_timing(config.timing.clone())
            .with_policy(config.unmatched)
            .with_flag_key(config.flag_key.clone())
    }

    pub fn with_selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_flag_key(mut self, key: impl Into<String>) -> Self {
        self.flag_key = key.into();
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<SequenceEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: SequenceEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run every state once, in order. The first failure aborts the rest,
    /// so the completion flag is written only by a run that got through
    /// submission.
    pub async fn run(&self, request: &ComposeRequest) -> Result<RunReport, SequenceError> {
        tracing::info!(
            recipient = %request.recipient_display_name,
            policy = ?self.policy,
            "Sequence started"
        );

        let mut progress = Progress::default();
        let mut state = Some(SequenceState::first());

        while let Some(current) = state {
            tracing::info!(state = %current, "Entering step");
            self.emit(SequenceEvent::StepStarted { state: current });

            if let Err(err) = self.enter(current, request, &mut progress).await {
                tracing::warn!(state = %current, error = %err, "Step failed, sequence aborted");
                self.emit(SequenceEvent::StepFailed {
                    state: current,
                    message: err.to_string(),
                });
                return Err(err);
            }

            let delay = self.timing.delay_after(current);
            if !delay.is_zero() {
                tracing::debug!(state = %current, ?delay, "Settling");
                sleep(delay).await;
            }
            state = current.next();
        }

        self.emit(SequenceEvent::Completed {
            selected: progress.selected.clone(),
        });
        tracing::info!(selected = ?progress.selected, "Sequence complete");

        Ok(RunReport {
            selected: progress.selected,
            candidates_seen: progress.seen,
            completed_at_ms: progress.completed_at_ms.unwrap_or_default(),
        })
    }

    async fn enter(
        &self,
        state: SequenceState,
        request: &ComposeRequest,
        progress: &mut Progress,
    ) -> Result<(), SequenceError> {
        let sel = &self.selectors;
        match state {
            SequenceState::OpenMessageList => self.click(state, &sel.unread_messages).await,
            SequenceState::OpenComposer => self.click(state, &sel.new_message).await,
            SequenceState::PopulateFields => {
                let subject = self.require(state, &sel.subject).await?;
                self.dom
                    .set_value(&subject, &request.subject)
                    .await
                    .map_err(driver(state))?;

                let body = self.require(state, &sel.body).await?;
                self.dom
                    .set_value(&body, &request.body)
                    .await
                    .map_err(driver(state))?;

                let recipient = self.require(state, &sel.recipient).await?;
                self.dom
                    .set_value(&recipient, request.search_token())
                    .await
                    .map_err(driver(state))?;
                self.dom.click(&recipient).await.map_err(driver(state))
            }
            SequenceState::SelectCandidate => self.select_candidate(request, progress).await,
            SequenceState::Submit => self.click(state, &sel.submit).await,
            SequenceState::RecordCompletion => {
                let at = now_ms();
                self.store.set(&self.flag_key, FlagValue::Timestamp(at))?;
                progress.completed_at_ms = Some(at);
                Ok(())
            }
        }
    }

    /// Bounded wait for `selector`; a timeout becomes `ElementNotFound`.
    async fn require(
        &self,
        state: SequenceState,
        selector: &str,
    ) -> Result<D::Element, SequenceError> {
        let timeout = self.timing.element_timeout();
        wait_for_element(
            self.dom.as_ref(),
            selector,
            self.timing.poll_interval(),
            timeout,
        )
        .await
        .map_err(driver(state))?
        .ok_or_else(|| SequenceError::ElementNotFound {
            state,
            selector: selector.to_string(),
            waited: timeout,
        })
    }

    async fn click(&self, state: SequenceState, selector: &str) -> Result<(), SequenceError> {
        let element = self.require(state, selector).await?;
        tracing::debug!(state = %state, selector, "Clicking");
        self.dom.click(&element).await.map_err(driver(state))
    }

    async fn select_candidate(
        &self,
        request: &ComposeRequest,
        progress: &mut Progress,
    ) -> Result<(), SequenceError> {
        let state = SequenceState::SelectCandidate;
        let target = &request.recipient_display_name;
        let (matched, seen) = self.scan_candidates(target).await;

        self.emit(SequenceEvent::CandidatesScanned {
            seen: seen.clone(),
            matched: matched.as_ref().map(|c| c.display_name.clone()),
        });
        progress.seen = seen;

        match matched {
            Some(candidate) => {
                tracing::info!(name = %candidate.display_name, "Selecting candidate");
                self.dom.click(&candidate.row).await.map_err(driver(state))?;
                progress.selected = Some(candidate.display_name);
                Ok(())
            }
            None => match self.policy {
                UnmatchedPolicy::SubmitAnyway => {
                    tracing::warn!(
                        recipient = %target,
                        seen = ?progress.seen,
                        "No exact candidate match, submitting anyway"
                    );
                    Ok(())
                }
                UnmatchedPolicy::AbortIfUnmatched => Err(SequenceError::RecipientUnmatched {
                    recipient: target.clone(),
                    seen: progress.seen.clone(),
                }),
            },
        }
    }

    /// Re-read the type-ahead list until it contains `target` or the
    /// candidate timeout passes. Returns the match (if any) and the names
    /// seen on the last read.
    async fn scan_candidates(
        &self,
        target: &str,
    ) -> (Option<Candidate<D::Element>>, Vec<String>) {
        let deadline = Instant::now() + self.timing.candidate_timeout();
        loop {
            // A row detached mid-read is a re-rendering list, not a failure.
            let candidates = match self.read_candidates().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::debug!(error = %e, "Type-ahead read failed, polling again");
                    Vec::new()
                }
            };
            let seen: Vec<String> = candidates.iter().map(|c| c.display_name.clone()).collect();
            if let Some(hit) = first_exact_match(&candidates, target) {
                return (Some(hit.clone()), seen);
            }

            let now = Instant::now();
            if now >= deadline {
                return (None, seen);
            }
            tracing::debug!(rows = seen.len(), "No match yet, polling type-ahead");
            sleep(self.timing.poll_interval().min(deadline - now)).await;
        }
    }

    async fn read_candidates(&self) -> anyhow::Result<Vec<Candidate<D::Element>>> {
        let Some(list) = self.dom.query(&self.selectors.results).await? else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        for row in self.dom.children(&list).await? {
            let name = match self
                .dom
                .query_within(&row, &self.selectors.candidate_name)
                .await?
            {
                Some(name_el) => self.dom.text_content(&name_el).await?,
                None => self.dom.text_content(&row).await?,
            };
            candidates.push(Candidate {
                display_name: name.trim().to_string(),
                row,
            });
        }
        Ok(candidates)
    }
}
