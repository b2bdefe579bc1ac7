use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{StudentId, SubjectId};
use storage::{seed, Storage};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/roster.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop every table, recreate the schema and load seed records.
    SetupDb,
    CreateSubject {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    CreateStudent {
        name: String,
        email: String,
        /// Class names, in display order.
        #[arg(long = "class")]
        classes: Vec<String>,
    },
    Enroll {
        subject_id: i64,
        student_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        error!("command failed: {error:#}");
        return Err(error);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    info!(database_url = %cli.database_url, "connecting");
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open database {}", cli.database_url))?;

    match cli.command {
        Command::SetupDb => {
            info!("recreating schema");
            storage.reset_schema().await?;
            info!("seeding");
            let summary = seed::seed(&storage).await?;
            info!(
                classes = summary.classes,
                subjects = summary.subjects,
                students = summary.students,
                enrollments = summary.enrollments,
                "database ready"
            );
        }
        Command::CreateSubject { name, description } => {
            let subject_id = storage.create_subject(&name, &description).await?;
            println!("created subject_id={subject_id}");
        }
        Command::CreateStudent {
            name,
            email,
            classes,
        } => {
            let student_id = storage.create_student(&name, &email).await?;
            for class in &classes {
                let class_id = storage.create_class(class).await?;
                storage.assign_class(student_id, class_id).await?;
            }
            println!("created student_id={student_id}");
        }
        Command::Enroll {
            subject_id,
            student_id,
        } => {
            let added = storage
                .add_enrollment(SubjectId(subject_id), StudentId(student_id))
                .await?;
            if added {
                println!("enrolled student {student_id} in subject {subject_id}");
            } else {
                println!("student {student_id} was already enrolled in subject {subject_id}");
            }
        }
    }
    Ok(())
}
