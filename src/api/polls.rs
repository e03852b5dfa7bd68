use rocket::{form::Form, http::uri::Origin, Route};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{poll::QuestionId, store::Polls};
use crate::views::{self, View};

pub fn routes() -> Vec<Route> {
    routes![index, detail, results, vote]
}

#[get("/polls")]
pub async fn index(polls: Polls) -> Result<View> {
    views::index(&*polls).await
}

#[get("/polls/<question_id>")]
pub async fn detail(question_id: QuestionId, polls: Polls) -> Result<View> {
    views::detail(&*polls, question_id).await
}

#[get("/polls/<question_id>/results")]
pub async fn results(question_id: QuestionId, polls: Polls) -> Result<View> {
    views::results(&*polls, question_id).await
}

/// Form data submitted by the voting form. Any other fields are ignored.
#[derive(Debug, FromForm)]
pub struct VoteForm {
    choice: Option<String>,
}

/// A body that is missing, of the wrong type, or unparsable is treated the
/// same as one without a `choice` field.
#[post("/polls/<question_id>/vote", data = "<form>")]
pub async fn vote(
    request_id: &RequestId,
    question_id: QuestionId,
    form: Option<Form<VoteForm>>,
    polls: Polls,
) -> Result<View> {
    let choice = form.as_ref().and_then(|form| form.choice.as_deref());
    let view = views::vote(&*polls, question_id, choice).await?;
    match view {
        View::Redirect(_) => info!("req{request_id} counted a vote on question {question_id}"),
        View::Render(_) => info!("req{request_id} rejected a vote on question {question_id}: {choice:?} is not a choice"),
    }
    Ok(view)
}

/// Route URIs cannot end in a slash, but they still match requests that do,
/// and every link and redirect uses the slash-terminated form.
fn slashed(uri: Origin<'static>) -> Origin<'static> {
    Origin::parse_owned(format!("{uri}/")).unwrap_or(uri)
}

pub fn index_uri() -> Origin<'static> {
    slashed(uri!(index))
}

pub fn detail_uri(question_id: QuestionId) -> Origin<'static> {
    slashed(uri!(detail(question_id)))
}

pub fn results_uri(question_id: QuestionId) -> Origin<'static> {
    slashed(uri!(results(question_id)))
}

pub fn vote_uri(question_id: QuestionId) -> Origin<'static> {
    slashed(uri!(vote(question_id)))
}

#[cfg(test)]
mod tests {
    use rocket::{
        futures::future::join_all,
        http::{ContentType, Status},
        local::asynchronous::Client,
    };

    use super::*;
    use crate::model::store::Store;

    async fn body(client: &Client, uri: impl std::fmt::Display) -> (Status, String) {
        let response = client.get(uri.to_string()).dispatch().await;
        let status = response.status();
        (status, response.into_string().await.unwrap_or_default())
    }

    async fn votes(store: &Store, question_id: QuestionId) -> Vec<u32> {
        store
            .choices(question_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.votes)
            .collect()
    }

    #[polls_test]
    async fn index_lists_latest_five(client: Client) {
        let response = client.get(uri!(index)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::HTML));

        let body = response.into_string().await.unwrap();
        let listed = |text: &str| body.find(text);
        // Newest first, including a question published in the future.
        let order = [
            "Will this be listed?",
            "What is new?",
            "Favourite colour?",
            "Tabs or spaces?",
            "Best season?",
        ]
        .map(|text| listed(text).unwrap_or_else(|| panic!("{text} not listed")));
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(listed("Coffee or tea?"), None);
        assert_eq!(listed("Cats or dogs?"), None);
        assert!(body.contains(r#"href="/polls/1/""#));
    }

    #[polls_test(empty)]
    async fn index_without_questions(client: Client) {
        let (status, body) = body(&client, uri!(index)).await;
        assert_eq!(status, Status::Ok);
        assert!(body.contains("No polls are available."));
    }

    #[polls_test]
    async fn detail_shows_voting_form(client: Client) {
        let (status, body) = body(&client, uri!(detail(1))).await;
        assert_eq!(status, Status::Ok);
        assert!(body.contains("What is new?"));
        assert!(body.contains("Not much"));
        assert!(body.contains("The sky"));
        assert!(body.contains(r#"action="/polls/1/vote/""#));
        assert!(!body.contains("select a choice"));
    }

    #[polls_test]
    async fn results_show_tally(client: Client) {
        let (status, body) = body(&client, uri!(results(1))).await;
        assert_eq!(status, Status::Ok);
        assert!(body.contains("Not much -- 0 votes"));
        assert!(body.contains("The sky -- 3 votes"));
        assert!(body.contains(r#"href="/polls/1/""#));
    }

    #[polls_test]
    async fn unknown_question_is_404(client: Client) {
        assert_eq!(body(&client, uri!(detail(99))).await.0, Status::NotFound);
        assert_eq!(body(&client, uri!(results(99))).await.0, Status::NotFound);
        assert_eq!(body(&client, "/polls/not-a-number/").await.0, Status::NotFound);

        let response = client
            .post(uri!(vote(99)))
            .header(ContentType::Form)
            .body("choice=1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[polls_test]
    async fn vote_redirects_to_results(client: Client, store: Store) {
        let response = client
            .post(uri!(vote(1)))
            .header(ContentType::Form)
            .body("choice=1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Found);
        let location = response.headers().get_one("Location").unwrap().to_string();
        assert_eq!(location, "/polls/1/results/");
        assert_eq!(votes(&store, 1).await, vec![1, 3]);

        // Following the redirect shows the new tally without voting again.
        let (status, body) = body(&client, &location).await;
        assert_eq!(status, Status::Ok);
        assert!(body.contains("Not much -- 1 vote<"));
        let _ = self::body(&client, &location).await;
        assert_eq!(votes(&store, 1).await, vec![1, 3]);
    }

    #[polls_test]
    async fn slash_terminated_paths(client: Client, store: Store) {
        assert_eq!(index_uri().to_string(), "/polls/");
        assert_eq!(detail_uri(1).to_string(), "/polls/1/");
        assert_eq!(results_uri(1).to_string(), "/polls/1/results/");
        assert_eq!(vote_uri(1).to_string(), "/polls/1/vote/");

        for path in ["/polls/", "/polls/1/", "/polls/1/results/"] {
            assert_eq!(body(&client, path).await.0, Status::Ok, "GET {path}");
        }

        let response = client
            .post("/polls/1/vote/")
            .header(ContentType::Form)
            .body("choice=2")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Found);
        assert_eq!(response.headers().get_one("Location"), Some("/polls/1/results/"));
        assert_eq!(votes(&store, 1).await, vec![0, 4]);
    }

    #[polls_test]
    async fn missing_choice_rerenders_form(client: Client, store: Store) {
        for request in [
            client.post(uri!(vote(1))).header(ContentType::Form).body(""),
            client.post(uri!(vote(1))).header(ContentType::Form).body("choice="),
            client.post(uri!(vote(1))),
        ] {
            let response = request.dispatch().await;
            assert_eq!(response.status(), Status::Ok);
            let body = response.into_string().await.unwrap();
            assert!(body.contains("select a choice"));
            assert!(body.contains("What is new?"));
        }
        assert_eq!(votes(&store, 1).await, vec![0, 3]);
    }

    #[polls_test]
    async fn invalid_choice_rerenders_form(client: Client, store: Store) {
        // Choice 3 exists, but belongs to question 2.
        for submitted in ["choice=3", "choice=999", "choice=sky"] {
            let response = client
                .post(uri!(vote(1)))
                .header(ContentType::Form)
                .body(submitted)
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
            assert!(response
                .into_string()
                .await
                .unwrap()
                .contains("select a choice"));
        }
        assert_eq!(votes(&store, 1).await, vec![0, 3]);
        assert_eq!(votes(&store, 2).await, vec![1, 4]);
    }

    #[polls_test]
    async fn extra_form_fields_are_ignored(client: Client, store: Store) {
        let response = client
            .post(uri!(vote(2)))
            .header(ContentType::Form)
            .body("csrfmiddlewaretoken=abc&choice=4")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Found);
        assert_eq!(votes(&store, 2).await, vec![1, 5]);
    }

    #[polls_test]
    async fn concurrent_votes_are_all_counted(client: Client, store: Store) {
        const VOTES: u32 = 64;

        let requests = (0..VOTES).map(|_| {
            client
                .post(uri!(vote(5)))
                .header(ContentType::Form)
                .body("choice=11")
                .dispatch()
        });
        for response in join_all(requests).await {
            assert_eq!(response.status(), Status::Found);
        }

        assert_eq!(votes(&store, 5).await, vec![5, 5 + VOTES]);
    }
}
