use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::model::poll::{Choice, ChoiceId, NewQuestion, Question, QuestionId};

use super::PollStore;

/// A process-local store.
///
/// All mutation happens under a single write lock, so a vote's
/// read-increment-write is indivisible.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug)]
struct Tables {
    questions: BTreeMap<QuestionId, Question>,
    choices: BTreeMap<ChoiceId, Choice>,
    next_question_id: QuestionId,
    next_choice_id: ChoiceId,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            questions: BTreeMap::new(),
            choices: BTreeMap::new(),
            next_question_id: 1,
            next_choice_id: 1,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the tables half-updated,
    // since every write below validates before it mutates.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Take `explicit` if given, otherwise the next free value of `next`.
/// Either way, `next` ends up past the returned ID.
fn allocate(next: &mut u32, explicit: Option<u32>) -> u32 {
    let id = explicit.unwrap_or(*next);
    *next = (*next).max(id.saturating_add(1));
    id
}

#[rocket::async_trait]
impl PollStore for MemoryStore {
    async fn latest_questions(&self, limit: usize) -> Result<Vec<Question>> {
        let tables = self.read();
        let mut questions = tables.questions.values().cloned().collect::<Vec<_>>();
        questions.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        questions.truncate(limit);
        Ok(questions)
    }

    async fn question(&self, id: QuestionId) -> Result<Option<Question>> {
        Ok(self.read().questions.get(&id).cloned())
    }

    async fn choices(&self, question_id: QuestionId) -> Result<Vec<Choice>> {
        Ok(self
            .read()
            .choices
            .values()
            .filter(|choice| choice.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn choice(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<Option<Choice>> {
        Ok(self
            .read()
            .choices
            .get(&choice_id)
            .filter(|choice| choice.question_id == question_id)
            .cloned())
    }

    async fn record_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<Option<Choice>> {
        let mut tables = self.write();
        Ok(tables
            .choices
            .get_mut(&choice_id)
            .filter(|choice| choice.question_id == question_id)
            .map(|choice| {
                choice.votes = choice.votes.saturating_add(1);
                choice.clone()
            }))
    }

    async fn insert_question(&self, new: NewQuestion) -> Result<Question> {
        let mut tables = self.write();

        // Check every explicit ID before touching anything.
        if let Some(id) = new.id {
            if tables.questions.contains_key(&id) {
                return Err(Error::Duplicate(format!("Question with ID '{id}'")));
            }
        }
        let mut explicit_choices = Vec::new();
        for id in new.choices.iter().filter_map(|c| c.id) {
            if tables.choices.contains_key(&id) || explicit_choices.contains(&id) {
                return Err(Error::Duplicate(format!("Choice with ID '{id}'")));
            }
            explicit_choices.push(id);
        }

        let question = Question {
            id: allocate(&mut tables.next_question_id, new.id),
            question_text: new.question_text,
            pub_date: new.pub_date,
        };
        // Explicit choice IDs must be reserved before allocating the implicit ones.
        for &id in &explicit_choices {
            allocate(&mut tables.next_choice_id, Some(id));
        }
        for choice in new.choices {
            let id = match choice.id {
                Some(id) => id,
                None => allocate(&mut tables.next_choice_id, None),
            };
            let choice = Choice {
                id,
                question_id: question.id,
                choice_text: choice.choice_text,
                votes: choice.votes,
            };
            tables.choices.insert(id, choice);
        }
        tables.questions.insert(question.id, question.clone());

        Ok(question)
    }
}
