use crate::error::Result;
use crate::model::{
    poll::{Choice, ChoiceId, QuestionId},
    store::PollStore,
};

use crate::api::polls::{results_uri, vote_uri};

use super::{detail::question_or_404, Page, View};

/// Shown alongside the voting form when a vote could not be matched to a choice.
pub const NO_CHOICE_SELECTED: &str = "You didn't select a choice.";

/// The outcome of matching a submitted `choice` value against a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceSelection {
    /// The value named one of the question's choices.
    Selected(Choice),
    /// No value (or only whitespace) was submitted.
    MissingField,
    /// The value was not the ID of any of the question's choices.
    InvalidChoice,
}

/// Resolve a submitted `choice` value to one of the given question's choices.
pub async fn select_choice(
    store: &dyn PollStore,
    question_id: QuestionId,
    submitted: Option<&str>,
) -> Result<ChoiceSelection> {
    let submitted = match submitted.map(str::trim) {
        None | Some("") => return Ok(ChoiceSelection::MissingField),
        Some(value) => value,
    };
    let Ok(choice_id) = submitted.parse::<ChoiceId>() else {
        return Ok(ChoiceSelection::InvalidChoice);
    };
    Ok(store
        .choice(question_id, choice_id)
        .await?
        .map_or(ChoiceSelection::InvalidChoice, ChoiceSelection::Selected))
}

/// Record a vote for one of a question's choices.
///
/// On success the client is redirected to the question's results, so that
/// reloading the page afterwards cannot vote a second time. A missing or
/// unrecognised choice re-renders the voting form with an error instead.
pub async fn vote(
    store: &dyn PollStore,
    question_id: QuestionId,
    submitted: Option<&str>,
) -> Result<View> {
    let question = question_or_404(store, question_id).await?;

    let selected = match select_choice(store, question.id, submitted).await? {
        ChoiceSelection::Selected(choice) => store.record_vote(question.id, choice.id).await?,
        ChoiceSelection::MissingField | ChoiceSelection::InvalidChoice => None,
    };

    match selected {
        Some(choice) => {
            debug!(
                "Choice {} of question {} now has {} votes",
                choice.id, question.id, choice.votes
            );
            Ok(View::Redirect(results_uri(question.id)))
        }
        None => Ok(View::Render(Page::Detail {
            vote_url: vote_uri(question.id).to_string(),
            question,
            error_message: Some(NO_CHOICE_SELECTED.to_string()),
        })),
    }
}
