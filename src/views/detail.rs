use crate::error::{Error, Result};
use crate::model::{
    poll::{QuestionId, QuestionWithChoices},
    store::PollStore,
};

use crate::api::polls::{detail_uri, vote_uri};

use super::{Page, View};

/// Look up a question and its choices, failing with [`Error::NotFound`] if
/// there is no such question.
pub async fn question_or_404(store: &dyn PollStore, id: QuestionId) -> Result<QuestionWithChoices> {
    let question = store
        .question(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question with ID '{}'", id)))?;
    let choices = store.choices(id).await?;
    Ok(QuestionWithChoices::new(question, choices))
}

/// The voting form for a question.
pub async fn detail(store: &dyn PollStore, id: QuestionId) -> Result<View> {
    let question = question_or_404(store, id).await?;
    Ok(View::Render(Page::Detail {
        vote_url: vote_uri(question.id).to_string(),
        question,
        error_message: None,
    }))
}

/// The current tally for a question.
pub async fn results(store: &dyn PollStore, id: QuestionId) -> Result<View> {
    let question = question_or_404(store, id).await?;
    Ok(View::Render(Page::Results {
        detail_url: detail_uri(question.id).to_string(),
        question,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fixtures, store::MemoryStore};

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        fixtures::seed(&store, fixtures::example()).await.unwrap();
        store
    }

    #[rocket::async_test]
    async fn detail_shows_question_and_choices() {
        let store = seeded().await;
        let View::Render(Page::Detail { question, error_message, vote_url }) = detail(&store, 1).await.unwrap() else {
            panic!("detail should render the detail page");
        };
        assert_eq!(question.question_text, "What is new?");
        assert_eq!(question.choices.len(), 2);
        assert_eq!(error_message, None);
        assert_eq!(vote_url, "/polls/1/vote/");
    }

    #[rocket::async_test]
    async fn results_show_tally() {
        let store = seeded().await;
        let View::Render(Page::Results { question, detail_url }) = results(&store, 1).await.unwrap() else {
            panic!("results should render the results page");
        };
        let tally = question
            .choices
            .iter()
            .map(|c| (c.choice_text.as_str(), c.votes))
            .collect::<Vec<_>>();
        assert_eq!(tally, vec![("Not much", 0), ("The sky", 3)]);
        assert_eq!(detail_url, "/polls/1/");
    }

    #[rocket::async_test]
    async fn unknown_question_is_not_found() {
        let store = seeded().await;
        assert!(matches!(detail(&store, 99).await, Err(Error::NotFound(_))));
        assert!(matches!(results(&store, 99).await, Err(Error::NotFound(_))));
    }
}
