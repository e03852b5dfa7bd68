use crate::error::Result;
use crate::model::store::PollStore;

use super::{ListedQuestion, Page, View};

/// How many questions the index lists.
pub const LATEST_QUESTIONS: usize = 5;

/// The most recently published questions, newest first.
///
/// Questions with a publish date in the future are listed like any other.
pub async fn index(store: &dyn PollStore) -> Result<View> {
    let latest_question_list = store
        .latest_questions(LATEST_QUESTIONS)
        .await?
        .into_iter()
        .map(ListedQuestion::from)
        .collect();
    Ok(View::Render(Page::Index {
        latest_question_list,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fixtures, store::MemoryStore};

    #[rocket::async_test]
    async fn lists_five_newest() {
        let store = MemoryStore::new();
        fixtures::seed(&store, fixtures::example()).await.unwrap();

        let View::Render(Page::Index { latest_question_list }) = index(&store).await.unwrap() else {
            panic!("index should render the index page");
        };
        let ids = latest_question_list
            .iter()
            .map(|listed| listed.question.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![7, 1, 2, 3, 4]);
        assert_eq!(latest_question_list[1].url, "/polls/1/");
    }

    #[rocket::async_test]
    async fn empty_store_lists_nothing() {
        let store = MemoryStore::new();
        let View::Render(Page::Index { latest_question_list }) = index(&store).await.unwrap() else {
            panic!("index should render the index page");
        };
        assert!(latest_question_list.is_empty());
    }
}
