use anyhow::anyhow;
use clap::Parser;
use const_format::concatcp;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::ops::AddAssign;
use std::process::{self, Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const LOCAL_PORT: u32 = 8374;
const LOCAL_URL: &str = concatcp!("http://127.0.0.1:", LOCAL_PORT);

/// The question seeded into a local server for the test to vote on.
const LOCAL_QUESTION_ID: u32 = 900;

#[rustfmt::skip]
const LOCAL_CHOICES: &[&str] = &[
    "Alice",
    "Bob",
    "Carol",
    "Dave",
];

#[derive(Parser)]
struct Args {
    /// Silence local server logging.
    #[arg(short, long)]
    quiet: bool,

    /// Send local server logging to this file; takes precedence over --quiet.
    #[arg(long)]
    logfile: Option<String>,

    /// Connect to a remote server at this URL instead of running a local one.
    #[arg(long)]
    remote: Option<String>,

    /// The question to vote on. Defaults to the one seeded into the local server.
    #[arg(long, default_value_t = LOCAL_QUESTION_ID)]
    question: u32,

    /// The choice to vote for. Defaults to the question's first choice.
    #[arg(long)]
    choice: Option<u32>,

    /// How many threads to use. Defaults to the number of logical CPUs.
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// How many votes each thread casts.
    #[arg(long, default_value_t = 100)]
    votes_per_thread: usize,

    /// Skip checking that every vote was counted.
    #[arg(long)]
    no_verify: bool,
}

/// Construct a URL from segments.
macro_rules! url {
    ($base:expr $(, $segment:expr)*) => {{
        let mut url = String::from($base);
        $(
            url.push('/');
            url.push_str(&$segment.to_string());
        )*
        url.push('/');
        url
    }}
}

/// Write a fixtures file containing the question to vote on.
fn write_fixtures() -> anyhow::Result<NamedTempFile> {
    let choices = LOCAL_CHOICES
        .iter()
        .map(|name| json!({ "choice_text": name }))
        .collect::<Vec<_>>();
    let fixtures = json!([{
        "id": LOCAL_QUESTION_ID,
        "question_text": "Load Test Question",
        "pub_date": "2000-01-01T00:00:00Z",
        "choices": choices,
    }]);

    let mut f = NamedTempFile::new()?;
    f.write_all(fixtures.to_string().as_bytes())?;
    f.flush()?;
    Ok(f)
}

/// Terminate the given child process. This is a SIGTERM on unix and a hard-kill on other
/// platforms.
fn terminate_child(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM)?;
    }
    #[cfg(not(unix))]
    {
        child.kill()?;
    }
    Ok(())
}

/// Build and launch a local server seeded with the given fixtures, and wait
/// until it is serving.
///
/// If `ROCKET_DB_URI` is set in the environment the server uses that
/// database; otherwise it keeps polls in memory.
fn launch_server(fixtures: &NamedTempFile, logfile: Stdio) -> anyhow::Result<Child> {
    Command::new("cargo")
        .args(["build", "--release", "--bin", "polls"])
        .status()?
        .success()
        .then_some(())
        .ok_or_else(|| anyhow!("server build exited nonzero"))?;

    let mut proc = Command::new("./target/release/polls")
        .env("ROCKET_PORT", LOCAL_PORT.to_string())
        .env("ROCKET_FIXTURES", fixtures.path())
        .stdout(logfile)
        .spawn()?;

    // Wait for the server to be reachable.
    let client = Client::new();
    loop {
        let resp = client
            .get(url!(LOCAL_URL, "polls"))
            .send()
            .and_then(Response::error_for_status);
        if resp.is_ok() {
            break;
        }

        // Check the server didn't exit.
        if let Some(retcode) = proc.try_wait()? {
            return Err(anyhow!("Server exited prematurely with code {}", retcode));
        }
        thread::sleep(Duration::from_millis(100));
    }

    Ok(proc)
}

/// Map each choice's text to its ID, as offered by the question's voting form.
fn choice_ids(url: &str, question: u32) -> anyhow::Result<HashMap<String, u32>> {
    let page = Client::new()
        .get(url!(url, "polls", question))
        .send()
        .and_then(Response::error_for_status)?
        .text()?;
    let pattern = Regex::new(r#"value="(\d+)">\s*<label[^>]*>([^<]*)</label>"#)?;
    pattern
        .captures_iter(&page)
        .map(|caps| Ok((caps[2].to_string(), caps[1].parse()?)))
        .collect()
}

/// Read the current tally for each choice, keyed by choice text.
fn tally(url: &str, question: u32) -> anyhow::Result<HashMap<String, u64>> {
    let page = Client::new()
        .get(url!(url, "polls", question, "results"))
        .send()
        .and_then(Response::error_for_status)?
        .text()?;
    let pattern = Regex::new(r"<li>([^<]*) -- (\d+) votes?</li>")?;
    pattern
        .captures_iter(&page)
        .map(|caps| Ok((caps[1].to_string(), caps[2].parse()?)))
        .collect()
}

/// Latency figures for one thread's votes.
#[derive(Debug, Default)]
struct VoteTimings {
    total: Duration,
    worst: Duration,
}

impl AddAssign for VoteTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.worst = self.worst.max(rhs.worst);
    }
}

/// Cast a single vote, requiring the redirect to the results page.
fn cast_vote(client: &Client, url: &str, question: u32, choice: u32) -> anyhow::Result<Duration> {
    let start = Instant::now();
    let resp = client
        .post(url!(url, "polls", question, "vote"))
        .form(&[("choice", choice.to_string())])
        .send()?;
    let elapsed = start.elapsed();

    if resp.status() != StatusCode::FOUND {
        return Err(anyhow!("vote was not accepted: {}", resp.status()));
    }
    Ok(elapsed)
}

/// Run the load test, returning how many votes were cast.
fn load(url: &str, question: u32, choice: u32, args: &Args) -> anyhow::Result<usize> {
    let per_thread = args.votes_per_thread;
    let total_votes = args.threads * per_thread;

    let start = Instant::now();
    let timings = thread::scope(|s| {
        let threads = (0..args.threads)
            .map(|_| {
                s.spawn(move || {
                    // Don't follow the redirect; the results page is not part of the vote.
                    let client = Client::builder().redirect(Policy::none()).build()?;
                    let mut timings = VoteTimings::default();
                    for _ in 0..per_thread {
                        let elapsed = cast_vote(&client, url, question, choice)?;
                        timings.total += elapsed;
                        timings.worst = timings.worst.max(elapsed);
                    }
                    Ok::<_, anyhow::Error>(timings)
                })
            })
            .collect::<Vec<_>>();

        let mut timings = VoteTimings::default();
        for t in threads {
            timings += t.join().expect("thread panicked")?;
        }
        Ok::<_, anyhow::Error>(timings)
    })?;
    let total_duration = start.elapsed();

    let avg = timings.total / total_votes.max(1) as u32;
    let actual_votes_per_sec = total_votes as f64 / total_duration.as_secs_f64();

    println!("vote: {:?} avg, {:?} worst", avg, timings.worst);
    println!(
        "actual duration: {} votes in {:?} ({:.2}/s)",
        total_votes, total_duration, actual_votes_per_sec
    );

    Ok(total_votes)
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let url = args.remote.as_deref().unwrap_or(LOCAL_URL);

    // If we're not connecting remotely, bring up a local server.
    let mut proc: Option<Child> = None;
    let fixtures = write_fixtures()?;
    if args.remote.is_none() {
        let logfile = match args.logfile {
            Some(ref path) => Stdio::from(File::create(path)?),
            None => {
                if args.quiet {
                    Stdio::null()
                } else {
                    Stdio::inherit()
                }
            }
        };
        proc = Some(launch_server(&fixtures, logfile)?);
    }

    // Use a closure to ensure the cleanup below runs.
    let result = (|| {
        let choices = choice_ids(url, args.question)?;
        let (text, choice) = match args.choice {
            Some(id) => choices
                .iter()
                .find(|(_, &choice)| choice == id)
                .map(|(text, &choice)| (text.clone(), choice))
                .ok_or_else(|| anyhow!("question {} has no choice {}", args.question, id))?,
            None => choices
                .iter()
                .min_by_key(|(_, &choice)| choice)
                .map(|(text, &choice)| (text.clone(), choice))
                .ok_or_else(|| anyhow!("question {} has no choices", args.question))?,
        };
        println!("voting for {text:?} (choice {choice}) on question {}", args.question);

        let before = tally(url, args.question)?;
        let cast = load(url, args.question, choice, &args)?;

        if !args.no_verify {
            let after = tally(url, args.question)?;
            let counted = after.get(&text).copied().unwrap_or(0) - before.get(&text).copied().unwrap_or(0);
            if counted != cast as u64 {
                return Err(anyhow!("cast {cast} votes but {counted} were counted"));
            }
            for (other, votes) in &after {
                if other != &text && before.get(other) != Some(votes) {
                    return Err(anyhow!("votes for {other:?} changed"));
                }
            }
            println!("verified: all {cast} votes counted");
        }

        Ok(())
    })();

    // Kill the server.
    if let Some(p) = proc.as_mut() {
        terminate_child(p)?;
        p.wait()?;
    }

    result
}

fn main() {
    if let Err(e) = run() {
        eprintln!("FATAL: {}", e);
        process::exit(1);
    }
}
