use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::Result;
use crate::model::{
    poll::{Choice, ChoiceId, NewQuestion, Question, QuestionId},
    store::PollStore,
};

use super::{
    collection::{ensure_indexes_exist, Coll},
    counter::{ensure_id_counters_exist, Counter, CHOICE_ID_COUNTER_ID, QUESTION_ID_COUNTER_ID},
    document::{ChoiceDocument, QuestionDocument},
    errors::duplicate_as,
};

/// Polls persisted in MongoDB.
///
/// Votes are recorded with a single server-side `$inc`, so concurrent votes
/// on one choice can never overwrite each other.
#[derive(Clone)]
pub struct MongoStore {
    questions: Coll<QuestionDocument>,
    choices: Coll<ChoiceDocument>,
    counters: Coll<Counter>,
}

impl MongoStore {
    /// Wrap the given database without touching it.
    pub fn new(db: &Database) -> Self {
        Self {
            questions: Coll::from_db(db),
            choices: Coll::from_db(db),
            counters: Coll::from_db(db),
        }
    }

    /// Wrap the given database, first creating any missing indexes and ID counters.
    pub async fn prepare(db: &Database) -> std::result::Result<Self, DbError> {
        let store = Self::new(db);
        ensure_indexes_exist(db).await?;
        ensure_id_counters_exist(&store.counters).await?;
        Ok(store)
    }

    /// Use the explicit ID if given, otherwise allocate one from the named counter.
    async fn allocate(&self, counter: &str, explicit: Option<u32>) -> Result<u32> {
        match explicit {
            Some(id) => {
                Counter::reserve(&self.counters, counter, id).await?;
                Ok(id)
            }
            None => Counter::next(&self.counters, counter).await,
        }
    }
}

#[rocket::async_trait]
impl PollStore for MongoStore {
    async fn latest_questions(&self, limit: usize) -> Result<Vec<Question>> {
        // A zero limit means "no limit" to MongoDB.
        if limit == 0 {
            return Ok(Vec::new());
        }
        let options = FindOptions::builder()
            .sort(doc! {"pub_date": -1, "_id": -1})
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        let questions = self
            .questions
            .find(None, options)
            .await?
            .map_ok(Question::from)
            .try_collect()
            .await?;
        Ok(questions)
    }

    async fn question(&self, id: QuestionId) -> Result<Option<Question>> {
        let question = self.questions.find_one(doc! {"_id": id}, None).await?;
        Ok(question.map(Into::into))
    }

    async fn choices(&self, question_id: QuestionId) -> Result<Vec<Choice>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        let choices = self
            .choices
            .find(doc! {"question_id": question_id}, options)
            .await?
            .map_ok(Choice::from)
            .try_collect()
            .await?;
        Ok(choices)
    }

    async fn choice(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<Option<Choice>> {
        let filter = doc! {
            "_id": choice_id,
            "question_id": question_id,
        };
        let choice = self.choices.find_one(filter, None).await?;
        Ok(choice.map(Into::into))
    }

    async fn record_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<Option<Choice>> {
        let filter = doc! {
            "_id": choice_id,
            "question_id": question_id,
        };
        let update = doc! {
            "$inc": { "votes": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let choice = self
            .choices
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(choice.map(Into::into))
    }

    async fn insert_question(&self, new: NewQuestion) -> Result<Question> {
        let question = Question {
            id: self.allocate(QUESTION_ID_COUNTER_ID, new.id).await?,
            question_text: new.question_text,
            pub_date: new.pub_date,
        };

        let mut choices = Vec::with_capacity(new.choices.len());
        for choice in new.choices {
            choices.push(Choice {
                id: self.allocate(CHOICE_ID_COUNTER_ID, choice.id).await?,
                question_id: question.id,
                choice_text: choice.choice_text,
                votes: choice.votes,
            });
        }

        let question_id = question.id;
        self.questions
            .insert_one(QuestionDocument::from(&question), None)
            .await
            .map_err(duplicate_as(|| format!("Question with ID '{question_id}'")))?;

        if !choices.is_empty() {
            let documents = choices.iter().map(ChoiceDocument::from);
            if let Err(err) = self.choices.insert_many(documents, None).await {
                // Don't leave a question behind without its choices.
                self.questions
                    .delete_one(doc! {"_id": question_id}, None)
                    .await?;
                self.choices
                    .delete_many(doc! {"question_id": question_id}, None)
                    .await?;
                return Err(duplicate_as(|| {
                    format!("Choice for question with ID '{question_id}'")
                })(err));
            }
        }

        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    use rocket::futures::future::join_all;

    use super::*;
    use crate::error::Error;
    use crate::model::poll::NewChoice;

    #[polls_test(mongodb)]
    async fn latest_questions_sorted_by_server(db: Database) {
        let store = MongoStore::prepare(&db).await.unwrap();
        let now = Utc::now();
        for days in [2, 0, 7, 1, 3, 6] {
            store
                .insert_question(NewQuestion::new(
                    format!("{days} days old"),
                    now - Duration::days(days),
                ))
                .await
                .unwrap();
        }

        let latest = store.latest_questions(5).await.unwrap();
        let texts = latest
            .iter()
            .map(|q| q.question_text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                "0 days old",
                "1 days old",
                "2 days old",
                "3 days old",
                "6 days old"
            ]
        );
        assert!(store.latest_questions(0).await.unwrap().is_empty());
    }

    #[polls_test(mongodb)]
    async fn explicit_ids_and_duplicates(db: Database) {
        let store = MongoStore::prepare(&db).await.unwrap();
        let mut new = NewQuestion::new("Explicit", Utc::now()).with_id(4);
        new.choices.push(NewChoice {
            id: Some(9),
            ..NewChoice::new("nine")
        });
        store.insert_question(new.clone()).await.unwrap();

        let next = store
            .insert_question(NewQuestion::new("Implicit", Utc::now()).choice("auto"))
            .await
            .unwrap();
        assert_eq!(next.id, 5);
        assert_eq!(store.choices(5).await.unwrap()[0].id, 10);

        let err = store.insert_question(new).await.unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
    }

    #[polls_test(mongodb)]
    async fn concurrent_votes_are_all_counted(db: Database) {
        const VOTES: usize = 50;

        let store = Arc::new(MongoStore::prepare(&db).await.unwrap());
        let question = store
            .insert_question(NewQuestion::new("Race", Utc::now()).choice("only").choice("other"))
            .await
            .unwrap();
        let choices = store.choices(question.id).await.unwrap();
        let (question_id, choice_id) = (question.id, choices[0].id);

        let votes = (0..VOTES).map(|_| {
            let store = store.clone();
            rocket::tokio::spawn(async move { store.record_vote(question_id, choice_id).await })
        });
        for vote in join_all(votes).await {
            assert!(vote.unwrap().unwrap().is_some());
        }

        let choices = store.choices(question_id).await.unwrap();
        assert_eq!(choices[0].votes as usize, VOTES);
        assert_eq!(choices[1].votes, 0);
        assert_eq!(store.record_vote(question_id + 1, choice_id).await.unwrap(), None);
    }
}
