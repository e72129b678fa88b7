use crate::catalog::{Question, QuestionKind, TaskDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskpay_types::{Result, TaskPayError, UsdAmount, UserId};

/// Lifecycle of one attempt. Instances only ever move forward:
/// `InProgress -> Completed -> Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    InProgress,
    Completed,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    Text(String),
    Choice(String),
    File { name: String },
}

/// One user's attempt at a catalog task. Kept forever as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub instance_id: String,
    pub user: UserId,
    pub task_id: String,
    pub title: String,
    pub category: String,
    pub payment: UsdAmount,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub approval_scheduled: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub answers: HashMap<String, Answer>,
}

impl TaskInstance {
    pub fn start(user: UserId, task: &TaskDefinition, now: DateTime<Utc>) -> Self {
        Self {
            instance_id: format!("{}_{}", task.id, now.timestamp_millis()),
            user,
            task_id: task.id.clone(),
            title: task.title.clone(),
            category: task.category.clone(),
            payment: task.payment,
            status: InstanceStatus::InProgress,
            started_at: now,
            completed_at: None,
            approval_scheduled: None,
            approved_at: None,
            answers: HashMap::new(),
        }
    }

    /// A question counts as answered iff it is optional, or a file question
    /// has a file attached, or any other kind has non-blank content.
    pub fn is_answered(&self, question: &Question) -> bool {
        if !question.required {
            return true;
        }
        match self.answers.get(&question.id) {
            Some(Answer::File { name }) => {
                matches!(question.kind, QuestionKind::FileUpload { .. }) && !name.is_empty()
            }
            Some(Answer::Text(text)) | Some(Answer::Choice(text)) => !text.trim().is_empty(),
            None => false,
        }
    }

    pub fn missing_required(&self, task: &TaskDefinition) -> usize {
        task.questions
            .iter()
            .filter(|q| q.required && !self.is_answered(q))
            .count()
    }

    pub fn answered_count(&self, task: &TaskDefinition) -> usize {
        task.questions.iter().filter(|q| self.is_answered(q)).count()
    }

    /// Transition to `Completed` with a scheduled review window.
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        approval_scheduled: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != InstanceStatus::InProgress {
            return Err(TaskPayError::InvalidTransition(format!(
                "{}: cannot submit from {:?}",
                self.instance_id, self.status
            )));
        }
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(now);
        self.approval_scheduled = Some(approval_scheduled);
        Ok(())
    }

    /// Transition to `Approved`. Only valid from `Completed` — approval
    /// never skips the review state.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != InstanceStatus::Completed {
            return Err(TaskPayError::InvalidTransition(format!(
                "{}: cannot approve from {:?}",
                self.instance_id, self.status
            )));
        }
        self.status = InstanceStatus::Approved;
        self.approved_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskCatalog;

    fn fresh_instance() -> (TaskInstance, TaskDefinition) {
        let catalog = TaskCatalog::builtin();
        let task = catalog.get("task2").unwrap().clone();
        let instance = TaskInstance::start(UserId::new("u1"), &task, Utc::now());
        (instance, task)
    }

    #[test]
    fn test_answer_predicate() {
        let (mut instance, task) = fresh_instance();
        assert_eq!(instance.missing_required(&task), task.questions.len());

        instance
            .answers
            .insert("q1".to_string(), Answer::Choice("Neutral".to_string()));
        instance
            .answers
            .insert("q2".to_string(), Answer::Text("   ".to_string()));
        // Blank text does not count as answered
        assert_eq!(instance.missing_required(&task), 3);

        instance
            .answers
            .insert("q2".to_string(), Answer::Text("Labels add tone context.".to_string()));
        instance
            .answers
            .insert("q3".to_string(), Answer::Choice("Unsure".to_string()));
        instance.answers.insert(
            "q4".to_string(),
            Answer::File {
                name: "notes.pdf".to_string(),
            },
        );
        assert_eq!(instance.missing_required(&task), 0);
        assert_eq!(instance.answered_count(&task), 4);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let (mut instance, _) = fresh_instance();
        let now = Utc::now();

        // Cannot approve straight from in-progress
        assert!(instance.approve(now).is_err());
        assert_eq!(instance.status, InstanceStatus::InProgress);

        instance.complete(now, now + chrono::Duration::seconds(90)).unwrap();
        assert_eq!(instance.status, InstanceStatus::Completed);
        assert!(instance.approval_scheduled.is_some());

        // Double submit is rejected
        assert!(instance.complete(now, now).is_err());

        instance.approve(now).unwrap();
        assert_eq!(instance.status, InstanceStatus::Approved);
        assert!(instance.approved_at.is_some());

        // Terminal: no further transitions
        assert!(instance.approve(now).is_err());
        assert!(instance.complete(now, now).is_err());
    }
}
