use crate::approval::{MAX_APPROVAL_DELAY_SECS, MIN_APPROVAL_DELAY_SECS};
use crate::catalog::{QuestionKind, TaskCatalog};
use crate::instance::{Answer, InstanceStatus, TaskInstance};
use crate::store::InstanceStore;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use taskpay_ledger::WalletManager;
use taskpay_types::{Result, TaskPayError, UserId};
use tracing::{info, warn};

/// Result of a start attempt. Quota exhaustion is an ordinary outcome — the
/// caller surfaces the VIP upgrade offer instead of an error page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started(TaskInstance),
    Resumed(TaskInstance),
    QuotaExhausted { used_today: u32, quota: u32 },
}

/// Drives a user through a task attempt: start, answer capture, submission.
pub struct TaskTracker {
    catalog: Arc<TaskCatalog>,
    store: Arc<dyn InstanceStore>,
    wallet: Arc<WalletManager>,
}

impl TaskTracker {
    pub fn new(
        catalog: Arc<TaskCatalog>,
        store: Arc<dyn InstanceStore>,
        wallet: Arc<WalletManager>,
    ) -> Self {
        Self {
            catalog,
            store,
            wallet,
        }
    }

    pub async fn start_task(
        &self,
        user: &UserId,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome> {
        let task = self
            .catalog
            .get(task_id)
            .ok_or_else(|| TaskPayError::NotFound(format!("task {}", task_id)))?;

        let today = now.date_naive();
        let profile = self.wallet.ensure_daily_reset(user, today).await?;

        // Onboarding gate: nothing but the first catalog entry until the
        // flag flips.
        if !profile.has_done_onboarding_task
            && self.catalog.onboarding_task_id() != Some(task_id)
        {
            return Err(TaskPayError::Validation(
                "Complete the onboarding task to unlock the catalog".to_string(),
            ));
        }

        // Resuming an open attempt does not consume a quota slot
        if let Some(existing) = self.store.in_progress_for_task(user, task_id).await? {
            return Ok(StartOutcome::Resumed(existing));
        }

        let quota = self.wallet.tiers().quota(profile.tier);
        let used_today = self
            .store
            .for_user(user)
            .await?
            .iter()
            .filter(|i| i.started_at.date_naive() == today)
            .count() as u32;
        if used_today >= quota {
            return Ok(StartOutcome::QuotaExhausted { used_today, quota });
        }

        match self.wallet.consume_daily_slot(user).await {
            Ok(_) => {}
            Err(TaskPayError::QuotaExhausted) => {
                return Ok(StartOutcome::QuotaExhausted { used_today, quota });
            }
            Err(e) => return Err(e),
        }

        let instance = TaskInstance::start(user.clone(), task, now);
        self.store.put(&instance).await?;

        info!(
            user = %user,
            task_id,
            instance_id = %instance.instance_id,
            remaining_today = quota.saturating_sub(used_today + 1),
            "▶️ Task started"
        );
        Ok(StartOutcome::Started(instance))
    }

    /// Record one answer. Every write persists immediately — navigating
    /// away is a checkpoint, never an abort.
    pub async fn record_answer(
        &self,
        instance_id: &str,
        question_id: &str,
        answer: Answer,
    ) -> Result<TaskInstance> {
        let mut instance = self.load(instance_id).await?;
        if instance.status != InstanceStatus::InProgress {
            return Err(TaskPayError::InvalidTransition(format!(
                "{}: answers are frozen after submission",
                instance_id
            )));
        }

        let task = self
            .catalog
            .get(&instance.task_id)
            .ok_or_else(|| TaskPayError::NotFound(format!("task {}", instance.task_id)))?;
        let question = task
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| TaskPayError::NotFound(format!("question {}", question_id)))?;

        match (&question.kind, &answer) {
            (QuestionKind::Text, Answer::Text(_)) => {}
            (QuestionKind::SingleChoice { options }, Answer::Choice(choice)) => {
                if !options.contains(choice) {
                    return Err(TaskPayError::Validation(format!(
                        "\"{}\" is not one of the offered options",
                        choice
                    )));
                }
            }
            (QuestionKind::FileUpload { .. }, Answer::File { name }) => {
                if name.trim().is_empty() {
                    return Err(TaskPayError::Validation(
                        "Attached file has no name".to_string(),
                    ));
                }
            }
            _ => {
                return Err(TaskPayError::Validation(format!(
                    "Answer type does not match question {}",
                    question_id
                )));
            }
        }

        instance.answers.insert(question_id.to_string(), answer);
        self.store.put(&instance).await?;
        Ok(instance)
    }

    /// Whether forward navigation past a question is allowed: required
    /// questions block until answered.
    pub async fn can_advance(&self, instance_id: &str, question_id: &str) -> Result<bool> {
        let instance = self.load(instance_id).await?;
        let task = self
            .catalog
            .get(&instance.task_id)
            .ok_or_else(|| TaskPayError::NotFound(format!("task {}", instance.task_id)))?;
        let question = task
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| TaskPayError::NotFound(format!("question {}", question_id)))?;
        Ok(instance.is_answered(question))
    }

    /// Submit a finished attempt. Rejected with the missing count while any
    /// required question is unanswered; on success the instance moves to
    /// `Completed` with a randomized review window.
    pub async fn submit(&self, instance_id: &str, now: DateTime<Utc>) -> Result<TaskInstance> {
        let mut instance = self.load(instance_id).await?;
        let task = self
            .catalog
            .get(&instance.task_id)
            .ok_or_else(|| TaskPayError::NotFound(format!("task {}", instance.task_id)))?;

        let missing = instance.missing_required(task);
        if missing > 0 {
            warn!(
                instance_id,
                missing, "Submission rejected, required answers missing"
            );
            return Err(TaskPayError::MissingAnswers { count: missing });
        }

        let delay = rand::thread_rng().gen_range(MIN_APPROVAL_DELAY_SECS..=MAX_APPROVAL_DELAY_SECS);
        instance.complete(now, now + Duration::seconds(delay))?;
        self.store.put(&instance).await?;

        info!(
            instance_id,
            user = %instance.user,
            payment = instance.payment.to_usd(),
            review_delay_secs = delay,
            "⏳ Task submitted, pending review"
        );
        Ok(instance)
    }

    pub async fn history(&self, user: &UserId) -> Result<Vec<TaskInstance>> {
        self.store.for_user(user).await
    }

    async fn load(&self, instance_id: &str) -> Result<TaskInstance> {
        self.store
            .get(instance_id)
            .await?
            .ok_or_else(|| TaskPayError::NotFound(format!("instance {}", instance_id)))
    }
}
