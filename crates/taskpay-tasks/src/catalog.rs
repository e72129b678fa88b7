//! The immutable task catalog.
//!
//! Definitions are reference data: built once at startup, never mutated.
//! The first entry is the designated onboarding task; until a user
//! completes it, it is the only task they can see.

use serde::{Deserialize, Serialize};
use taskpay_ledger::UserProfile;
use taskpay_types::UsdAmount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Text,
    SingleChoice { options: Vec<String> },
    FileUpload { accepted_formats: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub title: String,
    pub category: String,
    pub payment: UsdAmount,
    pub duration: String,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
}

pub struct TaskCatalog {
    tasks: Vec<TaskDefinition>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<TaskDefinition>) -> Self {
        Self { tasks }
    }

    pub fn all(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// The designated onboarding task is always the first catalog entry.
    pub fn onboarding_task_id(&self) -> Option<&str> {
        self.tasks.first().map(|t| t.id.as_str())
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for task in &self.tasks {
            if !categories.contains(&task.category) {
                categories.push(task.category.clone());
            }
        }
        categories
    }

    /// The catalog slice a user may see. Before the onboarding flag flips
    /// this is exactly the first entry regardless of quota or category;
    /// afterwards the full list, optionally filtered by category.
    pub fn visible_for(
        &self,
        profile: &UserProfile,
        category: Option<&str>,
    ) -> Vec<&TaskDefinition> {
        if !profile.has_done_onboarding_task {
            return self.tasks.first().into_iter().collect();
        }

        self.tasks
            .iter()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .collect()
    }

    /// The production task set.
    pub fn builtin() -> Self {
        fn text(id: &str, prompt: &str) -> Question {
            Question {
                id: id.to_string(),
                prompt: prompt.to_string(),
                kind: QuestionKind::Text,
                required: true,
            }
        }
        fn choice(id: &str, prompt: &str, options: &[&str]) -> Question {
            Question {
                id: id.to_string(),
                prompt: prompt.to_string(),
                kind: QuestionKind::SingleChoice {
                    options: options.iter().map(|s| s.to_string()).collect(),
                },
                required: true,
            }
        }
        fn file(id: &str, prompt: &str) -> Question {
            Question {
                id: id.to_string(),
                prompt: prompt.to_string(),
                kind: QuestionKind::FileUpload {
                    accepted_formats: ".pdf,.docx".to_string(),
                },
                required: true,
            }
        }
        fn task(
            id: &str,
            title: &str,
            category: &str,
            payment: f64,
            duration: &str,
            difficulty: Difficulty,
            questions: Vec<Question>,
        ) -> TaskDefinition {
            TaskDefinition {
                id: id.to_string(),
                title: title.to_string(),
                category: category.to_string(),
                payment: UsdAmount::from_usd(payment),
                duration: duration.to_string(),
                difficulty,
                questions,
            }
        }

        Self::new(vec![
            // Onboarding: must stay first
            task(
                "task1",
                "Rate Short Replies From Two AI Assistants",
                "AI Evaluation",
                15.0,
                "30 mins",
                Difficulty::Beginner,
                vec![
                    choice(
                        "q1",
                        "Which reply reads more naturally?",
                        &["Reply A", "Reply B", "Both equal"],
                    ),
                    text(
                        "q2",
                        "Name one thing that makes an assistant reply feel human.",
                    ),
                    choice(
                        "q3",
                        "Which reply better matches the user's tone?",
                        &["A", "B", "Neither"],
                    ),
                ],
            ),
            task(
                "task2",
                "Label Emotions in Described Voice Clips",
                "Audio Labeling",
                25.0,
                "1h",
                Difficulty::Advanced,
                vec![
                    choice(
                        "q1",
                        "Pick the emotion for: calm tone, steady pace.",
                        &["Happy", "Sad", "Neutral", "Angry"],
                    ),
                    text("q2", "Explain how emotion labels improve voice assistants."),
                    choice(
                        "q3",
                        "How confident are you in your labels?",
                        &["Very confident", "Somewhat confident", "Unsure"],
                    ),
                    file("q4", "Upload your annotation notes (PDF/DOCX)"),
                ],
            ),
            task(
                "task3",
                "Sort News Headlines by Topic and Sentiment",
                "Content Categorization",
                18.0,
                "40 mins",
                Difficulty::Beginner,
                vec![
                    choice(
                        "q1",
                        "Classify: \"Markets rally after chip-maker earnings\".",
                        &["Technology", "Finance", "Politics", "Other"],
                    ),
                    choice(
                        "q2",
                        "What is the headline's sentiment?",
                        &["Positive", "Negative", "Neutral"],
                    ),
                    text("q3", "In one sentence, explain how you decided the sentiment."),
                    file("q4", "Upload your labeled summary (PDF/DOCX)"),
                ],
            ),
            task(
                "task4",
                "Tag Clinical Equipment in Ward Photos",
                "Data Labeling",
                30.0,
                "1h 15m",
                Difficulty::Expert,
                vec![
                    choice(
                        "q1",
                        "Which of these is a medical device?",
                        &["Stethoscope", "Laptop", "Desk fan"],
                    ),
                    text("q2", "List three common items of hospital equipment."),
                    choice(
                        "q3",
                        "How important is label accuracy for clinical models?",
                        &["Critical", "Somewhat important", "Not important"],
                    ),
                    file("q4", "Upload your tagging notes (PDF/DOCX)"),
                ],
            ),
            task(
                "task5",
                "Score AI-Written Email Subject Lines",
                "Marketing Evaluation",
                22.0,
                "50 mins",
                Difficulty::Intermediate,
                vec![
                    choice(
                        "q1",
                        "Which subject line is more engaging?",
                        &["Subject A", "Subject B", "Both"],
                    ),
                    text("q2", "Rewrite \"Big Sale - Last Chance!\" to feel less pushy."),
                    choice(
                        "q3",
                        "What does \"Your assistant is ready\" evoke?",
                        &["Excitement", "Curiosity", "Confusion"],
                    ),
                    file("q4", "Upload your evaluation summary (PDF/DOCX)"),
                ],
            ),
            task(
                "task6",
                "Transcribe Short Spoken Lines",
                "Transcription",
                15.0,
                "30 mins",
                Difficulty::Beginner,
                vec![
                    text(
                        "q1",
                        "Describe the difference between verbatim and clean transcription.",
                    ),
                    choice(
                        "q2",
                        "Which approach is fastest for short clips?",
                        &["Auto-generated", "Manual typing", "Mixed"],
                    ),
                    text("q3", "Transcribe: \"Models improve with better data.\""),
                    file("q4", "Upload your transcription file (PDF/DOCX)"),
                ],
            ),
            task(
                "task7",
                "Translate Support Messages Into French",
                "Translation",
                24.0,
                "1h",
                Difficulty::Intermediate,
                vec![
                    text("q1", "Translate: \"Good morning! How can I help you today?\""),
                    text("q2", "Translate: \"Your payment was processed successfully.\""),
                    choice(
                        "q3",
                        "Which register fits a support chat better?",
                        &["Formal", "Casual", "Either"],
                    ),
                    file("q4", "Upload your translated text (PDF/DOCX)"),
                ],
            ),
            task(
                "task8",
                "Write Prompts That Stress Image Generators",
                "Prompt Writing",
                35.0,
                "1h 30m",
                Difficulty::Advanced,
                vec![
                    text(
                        "q1",
                        "Write a detailed prompt for \"sunset over a futuristic harbor skyline\".",
                    ),
                    text("q2", "Write a prompt describing \"a robot teacher in a classroom\"."),
                    choice(
                        "q3",
                        "Which of your prompts should render more realistically?",
                        &["Prompt 1", "Prompt 2", "Both"],
                    ),
                    file("q4", "Upload your final prompt set (PDF/DOCX)"),
                ],
            ),
            task(
                "task9",
                "Flag Unsafe Content in Post Screenshots",
                "Content Moderation",
                26.0,
                "1h",
                Difficulty::Intermediate,
                vec![
                    choice(
                        "q1",
                        "Best category for \"offensive language in a post\"?",
                        &["Hate speech", "Spam", "Harassment"],
                    ),
                    text("q2", "Define \"harmful content\" in your own words."),
                    choice(
                        "q3",
                        "Correct action for mild spam?",
                        &["Delete", "Ignore", "Report"],
                    ),
                    file("q4", "Upload your labeling summary (PDF/DOCX)"),
                ],
            ),
            task(
                "task10",
                "Rate Synthetic Voice Clarity",
                "Audio Evaluation",
                20.0,
                "40 mins",
                Difficulty::Beginner,
                vec![
                    choice(
                        "q1",
                        "How natural does the described voice sound?",
                        &["Very natural", "Somewhat natural", "Robotic"],
                    ),
                    text("q2", "List two factors that affect clarity in synthetic speech."),
                    choice(
                        "q3",
                        "Which accent reads as most neutral to a global audience?",
                        &["US", "British", "East African"],
                    ),
                    file("q4", "Upload your evaluation notes (PDF/DOCX)"),
                ],
            ),
        ])
    }
}
