use std::ops::Deref;
use std::sync::Arc;

use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};

use crate::error::Result;
use crate::model::poll::{Choice, ChoiceId, NewQuestion, Question, QuestionId};

mod memory;

pub use memory::MemoryStore;

/// Persistence for questions and their choices.
///
/// Every method is a single logical operation against the backing store;
/// in particular [`PollStore::record_vote`] must never lose an increment when
/// called concurrently for the same choice.
#[rocket::async_trait]
pub trait PollStore: Send + Sync {
    /// Up to `limit` questions, most recently published first.
    async fn latest_questions(&self, limit: usize) -> Result<Vec<Question>>;

    /// The question with the given ID, if it exists.
    async fn question(&self, id: QuestionId) -> Result<Option<Question>>;

    /// All choices belonging to the given question, ordered by ID.
    async fn choices(&self, question_id: QuestionId) -> Result<Vec<Choice>>;

    /// The choice with the given ID, but only if it belongs to the given question.
    async fn choice(&self, question_id: QuestionId, choice_id: ChoiceId)
        -> Result<Option<Choice>>;

    /// Atomically add one vote to the given choice of the given question,
    /// returning the updated choice. Returns `None` without modifying anything
    /// if no such choice exists under that question.
    async fn record_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<Option<Choice>>;

    /// Store a new question and its choices, allocating any missing IDs.
    ///
    /// Fails with [`crate::error::Error::Duplicate`] if any given ID is taken.
    async fn insert_question(&self, question: NewQuestion) -> Result<Question>;
}

/// The store shared by all requests, held in managed state.
pub type Store = Arc<dyn PollStore>;

/// Request guard giving a handler access to the managed [`Store`].
#[derive(Clone)]
pub struct Polls(Store);

impl Deref for Polls {
    type Target = dyn PollStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Polls {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.rocket().state::<Store>() {
            Some(store) => request::Outcome::Success(Polls(store.clone())),
            None => {
                error!("No poll store in managed state");
                request::Outcome::Failure((Status::InternalServerError, ()))
            }
        }
    }
}
