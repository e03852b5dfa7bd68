//! Seed data for the poll store.
//!
//! Questions are created outside the site itself, so a deployment points the
//! `fixtures` config key at a JSON array of [`NewQuestion`]s which is loaded
//! on launch.

use std::path::Path;

use chrono::{Duration, Utc};
use rocket::serde::json::serde_json;

use crate::error::{Error, Result};
use crate::model::{
    poll::{NewChoice, NewQuestion},
    store::PollStore,
};

/// Read a fixtures file.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<NewQuestion>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Insert every question into the store, skipping any whose IDs are already taken.
///
/// Returns how many questions were inserted.
pub async fn seed(store: &dyn PollStore, questions: Vec<NewQuestion>) -> Result<usize> {
    let mut inserted = 0;
    for question in questions {
        let text = question.question_text.clone();
        match store.insert_question(question).await {
            Ok(question) => {
                debug!("Seeded question {} ({text:?})", question.id);
                inserted += 1;
            }
            Err(Error::Duplicate(what)) => warn!("Skipping fixture {text:?}: {what} already exists"),
            Err(e) => return Err(e),
        }
    }
    Ok(inserted)
}

/// A fixed set of seven questions with IDs 1 to 7 and choices 1 to 15.
///
/// Question 1 is the newest published in the past; question `n` is `n` days old.
/// Question 7 is published a day in the future. Question 1 has choices
/// 1 ("Not much", no votes) and 2 ("The sky", 3 votes).
pub fn example() -> Vec<NewQuestion> {
    let now = Utc::now();
    let mut next_choice = 0;
    let mut question = |id: u32, text: &str, age_days: i64, choices: &[(&str, u32)]| {
        let mut question = NewQuestion::new(text, now - Duration::days(age_days)).with_id(id);
        for &(choice_text, votes) in choices {
            next_choice += 1;
            question.choices.push(NewChoice {
                id: Some(next_choice),
                choice_text: choice_text.to_string(),
                votes,
            });
        }
        question
    };

    vec![
        question(1, "What is new?", 1, &[("Not much", 0), ("The sky", 3)]),
        question(2, "Favourite colour?", 2, &[("Red", 1), ("Blue", 4)]),
        question(3, "Tabs or spaces?", 3, &[("Tabs", 2), ("Spaces", 2)]),
        question(4, "Best season?", 4, &[("Spring", 0), ("Summer", 0), ("Autumn", 0)]),
        question(5, "Coffee or tea?", 5, &[("Coffee", 5), ("Tea", 5)]),
        question(6, "Cats or dogs?", 6, &[("Cats", 0), ("Dogs", 0)]),
        question(7, "Will this be listed?", -1, &[("Yes", 0), ("No", 0)]),
    ]
}
