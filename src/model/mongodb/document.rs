use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::poll::{Choice, ChoiceId, Question, QuestionId};

/// A question as stored in the database.
///
/// The publish date is a native BSON date so the server can sort on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDocument {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime,
}

/// A choice as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDocument {
    #[serde(rename = "_id")]
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub choice_text: String,
    pub votes: u32,
}

impl From<QuestionDocument> for Question {
    fn from(doc: QuestionDocument) -> Self {
        Self {
            id: doc.id,
            question_text: doc.question_text,
            pub_date: doc.pub_date.to_chrono(),
        }
    }
}

impl From<&Question> for QuestionDocument {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            question_text: question.question_text.clone(),
            pub_date: question.pub_date.into(),
        }
    }
}

impl From<ChoiceDocument> for Choice {
    fn from(doc: ChoiceDocument) -> Self {
        Self {
            id: doc.id,
            question_id: doc.question_id,
            choice_text: doc.choice_text,
            votes: doc.votes,
        }
    }
}

impl From<&Choice> for ChoiceDocument {
    fn from(choice: &Choice) -> Self {
        Self {
            id: choice.id,
            question_id: choice.question_id,
            choice_text: choice.choice_text.clone(),
            votes: choice.votes,
        }
    }
}
