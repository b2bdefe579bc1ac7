use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AutoConfirm, ConfirmationGate, HttpRosterGateway, LoadOutcome, RemoveOutcome,
    RosterController, RosterEvent, RosterState, RosterView,
};
use shared::domain::{StudentId, SubjectId};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod prompt;
mod render;

#[derive(Parser, Debug)]
#[command(about = "View and edit subject rosters")]
struct Args {
    #[arg(long, env = "ROSTER_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every subject.
    Subjects,
    /// Show a subject and its enrolled students.
    Show { subject_id: i64 },
    /// Pick a student to enroll from those not yet in the subject.
    Add {
        subject_id: i64,
        /// Skip the search prompt and filter with this text.
        #[arg(long)]
        search: Option<String>,
    },
    /// Remove a student from the subject after confirmation.
    Remove {
        subject_id: i64,
        student_id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let gateway = Arc::new(HttpRosterGateway::with_timeout(
        &args.server_url,
        Duration::from_secs(args.timeout_secs),
    )?);

    let controller = RosterController::new(gateway.clone());
    let mut events = controller.subscribe_events();

    match args.command {
        Command::Subjects => {
            print!("{}", render::subjects(&gateway.list_subjects().await?));
        }
        Command::Show { subject_id } => {
            let view = open_roster(&controller, SubjectId(subject_id)).await?;
            print!("{}", render::roster(&view));
        }
        Command::Add { subject_id, search } => {
            open_roster(&controller, SubjectId(subject_id)).await?;
            let result = add(&controller, search).await;
            print_notices(&mut events);
            result?;
        }
        Command::Remove {
            subject_id,
            student_id,
            yes,
        } => {
            open_roster(&controller, SubjectId(subject_id)).await?;
            let gate: &dyn ConfirmationGate = if yes {
                &AutoConfirm
            } else {
                &prompt::TerminalConfirm
            };
            let result = controller
                .remove_student(StudentId(student_id), gate)
                .await;
            print_notices(&mut events);
            match result? {
                RemoveOutcome::Removed => print_current(&controller).await,
                RemoveOutcome::Declined => println!("Nothing removed."),
            }
        }
    }
    Ok(())
}

async fn open_roster(controller: &RosterController, subject_id: SubjectId) -> Result<RosterView> {
    match controller.load(subject_id).await {
        LoadOutcome::Applied(RosterState::Loaded(view)) => Ok(view),
        LoadOutcome::Applied(RosterState::NotFound) => bail!("subject {subject_id} not found"),
        LoadOutcome::Applied(RosterState::Loading) | LoadOutcome::Superseded => {
            bail!("roster for subject {subject_id} did not finish loading")
        }
    }
}

async fn add(controller: &RosterController, search: Option<String>) -> Result<()> {
    let mut editor = controller.open_editor().await?;
    let search = match search {
        Some(text) => text,
        None if editor.snapshot().is_empty() => String::new(),
        None => prompt::search_text()?,
    };
    editor.set_search(search);

    if let Some(reason) = editor.empty_reason() {
        println!("{}", render::empty_reason(reason));
        return Ok(());
    }
    let Some(student_id) = prompt::pick_student(&editor.candidates())? else {
        editor.close();
        println!("Nothing added.");
        return Ok(());
    };
    controller.add_student(&mut editor, student_id).await?;
    print_current(controller).await;
    Ok(())
}

async fn print_current(controller: &RosterController) {
    if let RosterState::Loaded(view) = controller.state().await {
        print!("{}", render::roster(&view));
    }
}

fn print_notices(events: &mut broadcast::Receiver<RosterEvent>) {
    while let Ok(event) = events.try_recv() {
        if let RosterEvent::Notice { message, .. } = event {
            eprintln!("{message}");
        }
    }
}
