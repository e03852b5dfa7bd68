//! The site's request handlers, free of any HTTP plumbing.
//!
//! Each handler takes the store plus whatever it needs from the request and
//! returns a [`View`]: either a page to render or a place to redirect to.

use rocket::{
    http::uri::Origin,
    response::{self, Redirect, Responder},
    Request,
};
use rocket_dyn_templates::Template;
use serde::Serialize;

use crate::api::polls::detail_uri;
use crate::model::poll::{Question, QuestionWithChoices};

mod detail;
mod listing;
mod voting;

pub use detail::{detail, question_or_404, results};
pub use listing::{index, LATEST_QUESTIONS};
pub use voting::{select_choice, vote, ChoiceSelection, NO_CHOICE_SELECTED};

/// What a handler wants sent back to the client.
#[derive(Debug)]
pub enum View {
    /// Render a page with `200 OK`.
    Render(Page),
    /// Send the client elsewhere with `302 Found`.
    Redirect(Origin<'static>),
}

/// A page of the site, together with everything its template displays.
///
/// Links are reverse-routed here rather than spelled out in templates.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Page {
    Index {
        latest_question_list: Vec<ListedQuestion>,
    },
    Detail {
        question: QuestionWithChoices,
        error_message: Option<String>,
        vote_url: String,
    },
    Results {
        question: QuestionWithChoices,
        detail_url: String,
    },
}

/// A question on the index, with a link to its voting form.
#[derive(Debug, Serialize)]
pub struct ListedQuestion {
    #[serde(flatten)]
    pub question: Question,
    pub url: String,
}

impl From<Question> for ListedQuestion {
    fn from(question: Question) -> Self {
        Self {
            url: detail_uri(question.id).to_string(),
            question,
        }
    }
}

impl Page {
    /// The template this page is rendered with.
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::Index { .. } => "polls/index",
            Self::Detail { .. } => "polls/detail",
            Self::Results { .. } => "polls/results",
        }
    }
}

impl<'r> Responder<'r, 'static> for View {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Self::Render(page) => Template::render(page.template_name(), page).respond_to(req),
            Self::Redirect(location) => Redirect::found(location).respond_to(req),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn page_context_is_flat() {
        let question = Question {
            id: 1,
            question_text: "Why?".to_string(),
            pub_date: Utc::now(),
        };
        let page = Page::Detail {
            question: QuestionWithChoices::new(question.clone(), vec![]),
            error_message: None,
            vote_url: "/polls/1/vote/".to_string(),
        };
        assert_eq!(page.template_name(), "polls/detail");

        let context = serde_json::to_value(&page).unwrap();
        assert_eq!(context["question"]["question_text"], "Why?");
        assert!(context["error_message"].is_null());
        assert_eq!(context["vote_url"], "/polls/1/vote/");

        let page = Page::Index {
            latest_question_list: vec![question.into()],
        };
        let context = serde_json::to_value(&page).unwrap();
        assert_eq!(context["latest_question_list"][0]["id"], 1);
        assert_eq!(context["latest_question_list"][0]["url"], "/polls/1/");
    }
}
