use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Our question IDs are integers.
pub type QuestionId = u32;
/// Our choice IDs are integers, unique across all questions.
pub type ChoiceId = u32;

/// A poll topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

/// One selectable answer to a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub choice_text: String,
    /// Only ever incremented, one vote at a time.
    pub votes: u32,
}

/// A question together with all of its choices, ordered by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionWithChoices {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

impl QuestionWithChoices {
    pub fn new(question: Question, mut choices: Vec<Choice>) -> Self {
        choices.sort_by_key(|choice| choice.id);
        Self { question, choices }
    }
}

impl Deref for QuestionWithChoices {
    type Target = Question;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

/// A question that has not yet been stored.
///
/// IDs may be given explicitly; any that are missing are allocated on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionId>,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    #[serde(default)]
    pub choices: Vec<NewChoice>,
}

/// A choice that has not yet been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ChoiceId>,
    pub choice_text: String,
    #[serde(default)]
    pub votes: u32,
}

impl NewQuestion {
    pub fn new(question_text: impl Into<String>, pub_date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            question_text: question_text.into(),
            pub_date,
            choices: Vec::new(),
        }
    }

    /// Fix the ID this question will be stored under.
    pub fn with_id(mut self, id: QuestionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Add a choice with no votes.
    pub fn choice(mut self, choice_text: impl Into<String>) -> Self {
        self.choices.push(NewChoice::new(choice_text));
        self
    }
}

impl NewChoice {
    pub fn new(choice_text: impl Into<String>) -> Self {
        Self {
            id: None,
            choice_text: choice_text.into(),
            votes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn choices_are_ordered_and_flattened() {
        let question = Question {
            id: 7,
            question_text: "Tabs or spaces?".to_string(),
            pub_date: Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap(),
        };
        let choice = |id, votes| Choice {
            id,
            question_id: 7,
            choice_text: format!("Choice {id}"),
            votes,
        };
        let full = QuestionWithChoices::new(question.clone(), vec![choice(9, 2), choice(4, 3)]);

        assert_eq!(full.id, 7);
        assert_eq!(
            full.choices.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![4, 9]
        );

        let json = serde_json::to_value(&full).unwrap();
        assert_eq!(json["question_text"], "Tabs or spaces?");
        assert_eq!(json["choices"][0]["choice_text"], "Choice 4");
    }

    #[test]
    fn new_question_defaults() {
        let parsed: NewQuestion = serde_json::from_str(
            r#"{
                "question_text": "Best editor?",
                "pub_date": "2023-01-02T03:04:05Z",
                "choices": [{"choice_text": "vim"}, {"id": 12, "choice_text": "emacs", "votes": 4}]
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.id, None);
        assert_eq!(parsed.choices[0], NewChoice::new("vim"));
        assert_eq!(parsed.choices[1].id, Some(12));
        assert_eq!(parsed.choices[1].votes, 4);
    }
}
