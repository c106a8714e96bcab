mod args;
mod audio;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use exam_core::model::{
    AudioTrack, AudioUri, Question, QuestionId, TestId, TestMetadata, User, WorkBook, WorkbookId,
};
use services::{
    AppServices, Clock, PlayOutcome, SaveStatus, SessionConfig, SessionController,
    SessionNotice, SessionSnapshot, StaticAuthProvider, SubmitProgress,
};
use storage::sqlite::SqliteRepository;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::args::{Args, Command, Parsed, prepare_sqlite_file, print_usage};
use crate::audio::SimulatedAudioProvider;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

const DEMO_TEST: TestId = TestId::new(1);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> AppResult<()> {
    let parsed = Args::parse(std::env::args().skip(1), |key| std::env::var(key).ok())
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;
    let args = match parsed {
        Parsed::Run(args) => args,
        Parsed::Help => {
            print_usage();
            return Ok(());
        }
    };

    // Open + migrate SQLite in the binary glue so core/services stay storage-agnostic.
    prepare_sqlite_file(&args.db_url)?;

    if args.command == Command::Seed {
        return seed(&args).await;
    }

    let clock = Clock::default_clock();
    let user = User::new(args.user_id, format!("user {}", args.user_id));
    let services = AppServices::new_sqlite(
        &args.db_url,
        clock,
        Arc::new(StaticAuthProvider::signed_in(user)),
        Arc::new(SimulatedAudioProvider::new(Duration::from_secs(args.audio_secs))),
        SessionConfig::from_env(),
    )
    .await?;

    match (args.command, args.test_id) {
        (Command::List, _) => list(&services).await,
        (Command::Take, Some(test)) => take(&services, test).await,
        (Command::Results, Some(test)) => results(&services, test).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

//
// ─── SEED ──────────────────────────────────────────────────────────────────────
//

async fn seed(args: &Args) -> AppResult<()> {
    let repo = SqliteRepository::open(&args.db_url).await?;

    let now = Clock::default_clock().now();
    let test = TestMetadata::new(
        DEMO_TEST,
        "Listening Practice A",
        now - ChronoDuration::hours(1),
        now + ChronoDuration::days(30),
        15 * 60,
    )?;
    let workbooks = demo_workbooks()?;
    repo.seed_test(&test, &workbooks).await?;
    repo.assign_test(args.user_id, DEMO_TEST).await?;

    info!(test = %DEMO_TEST, user = %args.user_id, "seeded demo test");
    println!(
        "seeded test {} with {} workbooks for user {}",
        DEMO_TEST,
        workbooks.len(),
        args.user_id
    );
    Ok(())
}

fn demo_workbooks() -> AppResult<Vec<WorkBook>> {
    let options = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

    let first = WorkBook::new(
        WorkbookId::new(1),
        AudioTrack::new(
            AudioUri::from_url("https://media.example.com/listening/a/part1.mp3")?,
            2,
        ),
        vec![
            Question::new(
                QuestionId::new(1),
                "Where does the speaker want to meet?",
                options(&["At the library", "At the station", "At the cafe"]),
                2,
                5,
            )?,
            Question::new(
                QuestionId::new(2),
                "What time is the meeting?",
                options(&["9:00", "10:30", "11:15"]),
                1,
                5,
            )?,
        ],
    )?;

    let second = WorkBook::new(
        WorkbookId::new(2),
        AudioTrack::new(
            AudioUri::from_url("https://media.example.com/listening/a/part2.mp3")?,
            1,
        ),
        vec![Question::new(
            QuestionId::new(1),
            "Why was the lecture postponed?",
            options(&["The room was booked", "The lecturer was ill", "A fire drill"]),
            1,
            5,
        )?],
    )?;

    Ok(vec![first, second])
}

//
// ─── LIST / RESULTS ────────────────────────────────────────────────────────────
//

async fn list(services: &AppServices) -> AppResult<()> {
    let items = services.test_list().list_for_current_user().await?;
    if items.is_empty() {
        println!("no tests assigned");
        return Ok(());
    }
    for item in items {
        println!(
            "{:>4}  {:<10} {}  ({} - {}, {} min)",
            item.test.id(),
            format!("{:?}", item.status),
            item.test.title(),
            item.test.opens_at().format("%Y-%m-%d %H:%M"),
            item.test.closes_at().format("%Y-%m-%d %H:%M"),
            item.test.duration_seconds() / 60,
        );
    }
    Ok(())
}

async fn results(services: &AppServices, test: TestId) -> AppResult<()> {
    let result = services.results().results_for(test).await?;
    println!(
        "test {}: {} / {} marks over {} workbook(s)",
        result.test_id,
        result.marks_obtained,
        result.maximum_marks,
        result.workbooks_submitted()
    );
    match result.completed_at {
        Some(at) => println!("completed at {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("not completed"),
    }
    for record in &result.records {
        println!(
            "  workbook {}: {} / {}",
            record.workbook_id(),
            record.marks_obtained(),
            record.maximum_marks()
        );
    }
    Ok(())
}

//
// ─── TAKE ──────────────────────────────────────────────────────────────────────
//

async fn take(services: &AppServices, test: TestId) -> AppResult<()> {
    let session = services.launcher().start(test).await?;
    let workbooks = services.storage().tests.fetch_workbooks(test).await?;

    print_take_help();
    print_workbook(&workbooks, &session.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            biased;
            snapshot = session.wait_until_terminal() => {
                println!("session {}", snapshot.state);
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.exit().await?;
                    continue;
                };
                handle_line(&session, &workbooks, line.trim()).await;
            }
        }
    }

    results(services, test).await
}

async fn handle_line(session: &SessionController, workbooks: &[WorkBook], line: &str) {
    let mut words = line.split_whitespace();
    let outcome = match words.next() {
        None => return,
        Some("play" | "p") => session.play_audio().await.map(|outcome| match outcome {
            PlayOutcome::Started => println!("audio started"),
            PlayOutcome::Ignored => println!("audio is playing or no repeats are left"),
        }),
        Some("questions" | "q") => session.open_questions().await.map(|()| {
            print_workbook(workbooks, &session.snapshot());
        }),
        Some("answer" | "a") => {
            let parsed = words
                .next()
                .and_then(|q| q.parse::<u64>().ok())
                .zip(words.next().and_then(|o| o.parse::<usize>().ok()));
            match parsed {
                Some((question, option)) if option > 0 => session
                    .select_option(QuestionId::new(question), option - 1)
                    .await
                    .map(|()| println!("answered question {question}")),
                _ => {
                    println!("usage: answer <question> <option>");
                    return;
                }
            }
        }
        Some("submit" | "s") => session.submit().await.map(|outcome| {
            if let SaveStatus::Failed(message) = &outcome.save {
                println!("saving failed: {message}");
            }
            match outcome.progress {
                SubmitProgress::Advanced { .. } => print_workbook(workbooks, &session.snapshot()),
                SubmitProgress::Retained => println!("answers kept, submit again to retry"),
                SubmitProgress::Completed | SubmitProgress::TimedOut => {}
            }
        }),
        Some("status") => {
            print_status(&session.snapshot());
            Ok(())
        }
        Some("exit") => session.exit().await.map(|_| ()),
        Some(_) => {
            print_take_help();
            return;
        }
    };
    if let Err(err) = outcome {
        println!("{err}");
    }
}

fn print_take_help() {
    println!("commands: play | questions | answer <question> <option> | submit | status | exit");
}

fn print_status(snapshot: &SessionSnapshot) {
    let playback = snapshot.playback.map_or_else(String::new, |p| {
        format!(
            ", audio {}/{} left{}",
            p.repeats_remaining,
            p.max_repeats,
            if p.is_playing {
                format!(" ({:.0}%)", p.progress * 100.0)
            } else {
                String::new()
            }
        )
    });
    println!(
        "[{}] {}s left, {} answered{}",
        snapshot.position_label(),
        snapshot.remaining_seconds,
        snapshot.answered,
        playback
    );
    if let Some(notice) = &snapshot.notice {
        match notice {
            SessionNotice::SaveFailed { workbook_id, message } => {
                println!("  workbook {workbook_id} was not saved: {message}");
            }
            SessionNotice::CompletionFailed { message } => {
                println!("  completion was not recorded: {message}");
            }
            SessionNotice::PlaybackUnavailable { message } => {
                println!("  audio unavailable: {message}");
            }
        }
    }
}

fn print_workbook(workbooks: &[WorkBook], snapshot: &SessionSnapshot) {
    print_status(snapshot);
    let Some(workbook) = workbooks.iter().find(|w| w.id() == snapshot.workbook_id) else {
        return;
    };
    for question in workbook.questions() {
        println!("  {}. {}", question.id(), question.prompt());
        for (i, option) in question.options().iter().enumerate() {
            println!("       {}) {option}", i + 1);
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
