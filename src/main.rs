use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;

use motiva::calendar;
use motiva::credentials::{CredentialStore, FileCredentialStore};
use motiva::logging;
use motiva::{
    Aggregator, CaptureState, CaptureWorkflow, Config, ErrorKind, ExistingPhoto, Frequency,
    Habit, HabitStore, NewHabit, VerificationGateway,
};

enum Command {
    List,
    Add(NewHabit),
    Delete(i64),
    Done(i64, Option<NaiveDate>),
    Undo(i64, Option<NaiveDate>),
    Toggle(i64),
    Week(i64, Option<NaiveDate>),
    Verify(i64, PathBuf),
    KeySet(String),
    KeyRemove,
    KeyStatus,
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("motiva {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    fail("--config requires a path argument");
                }
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let command = match parse_command(&positional) {
        Ok(command) => command,
        Err(e) => fail(&format!("{:#}", e)),
    };

    Args {
        config_path,
        command,
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("Run 'motiva --help' for usage.");
    std::process::exit(1);
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::List);
    };

    let command = match name.as_str() {
        "list" => Command::List,
        "add" => Command::Add(parse_new_habit(rest)?),
        "delete" => Command::Delete(habit_id(rest)?),
        "done" => Command::Done(habit_id(rest)?, optional_date(rest)?),
        "undo" => Command::Undo(habit_id(rest)?, optional_date(rest)?),
        "toggle" => Command::Toggle(habit_id(rest)?),
        "week" => Command::Week(habit_id(rest)?, optional_date(rest)?),
        "verify" => {
            let photo = rest.get(1).context("verify requires a photo path")?;
            Command::Verify(habit_id(rest)?, PathBuf::from(photo))
        }
        "key" => match rest.first().map(String::as_str) {
            Some("set") => Command::KeySet(rest.get(1).context("key set requires a key")?.clone()),
            Some("remove") => Command::KeyRemove,
            Some("status") | None => Command::KeyStatus,
            Some(other) => bail!("unknown key action: {}", other),
        },
        other => bail!("unknown command: {}", other),
    };
    Ok(command)
}

fn habit_id(rest: &[String]) -> Result<i64> {
    let raw = rest.first().context("missing habit id")?;
    raw.parse()
        .with_context(|| format!("invalid habit id: {}", raw))
}

fn optional_date(rest: &[String]) -> Result<Option<NaiveDate>> {
    rest.get(1)
        .map(|raw| {
            calendar::parse_date(raw)
                .with_context(|| format!("invalid date (want YYYY-MM-DD): {}", raw))
        })
        .transpose()
}

fn parse_new_habit(rest: &[String]) -> Result<NewHabit> {
    let mut name = None;
    let mut frequency = Frequency::Daily;
    let mut icon = None;
    let mut color = None;
    let mut scan = None;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--freq" => {
                let raw = flag_value(rest, &mut i)?;
                frequency = Frequency::from_str(&raw)
                    .with_context(|| format!("frequency must be daily or weekly, got {}", raw))?;
            }
            "--icon" => icon = Some(flag_value(rest, &mut i)?),
            "--color" => color = Some(flag_value(rest, &mut i)?),
            "--scan" => scan = Some(flag_value(rest, &mut i)?),
            _ if name.is_none() => name = Some(rest[i].clone()),
            other => bail!("unexpected argument: {}", other),
        }
        i += 1;
    }

    let mut habit = NewHabit::new(name.context("add requires a habit name")?, frequency);
    if let Some(icon) = icon {
        habit = habit.with_icon(icon);
    }
    if let Some(color) = color {
        habit = habit.with_color(color);
    }
    if let Some(scan) = scan {
        habit = habit.with_scan_method(scan);
    }
    Ok(habit)
}

/// Value following the flag at `rest[*i]`; advances `i` past it.
fn flag_value(rest: &[String], i: &mut usize) -> Result<String> {
    let flag = &rest[*i];
    *i += 1;
    rest.get(*i)
        .cloned()
        .with_context(|| format!("{} requires a value", flag))
}

fn print_help() {
    println!(
        r#"motiva - photo-verified habit tracker

USAGE:
    motiva [OPTIONS] [COMMAND]

COMMANDS:
    list                        Show today's dashboard (default)
    add NAME [--freq daily|weekly] [--icon ICON] [--color HEX] [--scan TEXT]
                                Create a habit (at most 6)
    delete ID                   Delete a habit and its completions
    done ID [YYYY-MM-DD]        Record a completion (default today)
    undo ID [YYYY-MM-DD]        Remove completions for a day (default today)
    toggle ID                   Flip today's status
    week ID [YYYY-MM-DD]        Weekly counts for the week containing the date
    verify ID PHOTO             Verify a photo and record a completion if accepted
    key set KEY | remove | status
                                Manage the vision judge API key

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MOTIVA_CONFIG       Path to config file (overrides default location)
    MOTIVA_LOG          Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/motiva/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Journald on Linux, rolling file otherwise
    let _ = logging::init(None);

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let credentials = FileCredentialStore::new(&config.credentials_path);

    match &args.command {
        Command::KeySet(key) => {
            credentials.save(key)?;
            println!("API key saved to {}", credentials.path().display());
            return Ok(());
        }
        Command::KeyRemove => {
            credentials.remove()?;
            println!("API key removed");
            return Ok(());
        }
        Command::KeyStatus => {
            let source = if config.judge.api_key.is_some() {
                "config file"
            } else if credentials.has()? {
                "credential store"
            } else {
                "not configured"
            };
            println!("Judge: {:?} ({})", config.judge.provider, config.judge.model);
            println!("API key: {}", source);
            return Ok(());
        }
        _ => {}
    }

    let store = HabitStore::open(&config.db_path)?;
    store.initialize()?;

    match args.command {
        Command::List => print_dashboard(&store)?,
        Command::Add(habit) => {
            let id = store.create_habit(&habit)?;
            println!("Created habit {} ({})", id, habit.name.trim());
        }
        Command::Delete(id) => {
            store.delete_habit(id)?;
            println!("Deleted habit {}", id);
        }
        Command::Done(id, date) => {
            let habit = find_habit(&store, id)?;
            let date = date.unwrap_or_else(calendar::today);
            store.record_completion(habit.id, date, None, None)?;
            println!("{} marked done on {}", habit.name, date);
        }
        Command::Undo(id, date) => {
            let habit = find_habit(&store, id)?;
            let date = date.unwrap_or_else(calendar::today);
            let removed = store.clear_completion(habit.id, date)?;
            println!("Removed {} completion(s) of {} on {}", removed, habit.name, date);
        }
        Command::Toggle(id) => {
            let habit = find_habit(&store, id)?;
            let status = Aggregator::new(&store).toggle_today(&habit)?;
            println!("{}: {}", habit.name, status.label());
        }
        Command::Week(id, date) => {
            let habit = find_habit(&store, id)?;
            print_week(&store, &habit, date.unwrap_or_else(calendar::today))?;
        }
        Command::Verify(id, photo) => {
            let habit = find_habit(&store, id)?;
            let api_key = match config.judge.api_key.clone() {
                Some(key) => Some(key),
                None => credentials.get()?,
            };
            let gateway = VerificationGateway::from_config(&config.judge);
            gateway.reconfigure(api_key);
            verify(&store, Arc::new(gateway), habit, photo).await?;
        }
        Command::KeySet(_) | Command::KeyRemove | Command::KeyStatus => {}
    }

    Ok(())
}

fn find_habit(store: &HabitStore, id: i64) -> Result<Habit> {
    store
        .get_habit(id)?
        .with_context(|| format!("habit {} not found", id))
}

fn print_dashboard(store: &HabitStore) -> Result<()> {
    let today = calendar::today();
    println!("Today, {}", today.format("%A %-d %B %Y"));
    for slot in Aggregator::new(store).dashboard_on(today)? {
        match slot.habit {
            Some(habit) => println!(
                "  [{}] {:<24} {:<8} {}",
                habit.id,
                habit.name,
                habit.frequency.display_name(),
                slot.status.label()
            ),
            None => println!("  [-] {}", slot.status.label()),
        }
    }
    Ok(())
}

fn print_week(store: &HabitStore, habit: &Habit, date: NaiveDate) -> Result<()> {
    let week = Aggregator::new(store).weekly_vector_for(habit.id, date)?;
    println!("{} - week of {}", habit.name, week.monday);
    for (i, (day, count)) in calendar::week_days(date).iter().zip(week.counts).enumerate() {
        println!(
            "  {:<9} {}  {}",
            calendar::weekday_name(i).unwrap_or(""),
            day,
            count
        );
    }
    let summary = week.summary();
    println!("  Total: {}", summary.total);
    println!("  Daily average: {:.1}", summary.daily_average);
    println!("  Best day: {}", summary.best_day.unwrap_or("-"));
    Ok(())
}

async fn verify(
    store: &HabitStore,
    gateway: Arc<VerificationGateway>,
    habit: Habit,
    photo: PathBuf,
) -> Result<()> {
    let mut workflow = CaptureWorkflow::new(habit);
    workflow.capture(&mut ExistingPhoto::new(photo))?;
    println!(
        "Checking photo for \"{}\" with {}...",
        workflow.activity_description(),
        gateway.provider_name()
    );
    workflow.submit(gateway, store).await?;

    match workflow.acknowledge()? {
        CaptureState::Accepted { verdict, .. } => {
            println!("Verified ({}% confident)", verdict.confidence);
            println!("{}", verdict.explanation);
        }
        CaptureState::Rejected { verdict, .. } => {
            println!("Not verified ({}% confident)", verdict.confidence);
            println!("{}", verdict.explanation);
        }
        CaptureState::Errored {
            kind: ErrorKind::CredentialMissing,
            ..
        } => {
            bail!("no API key configured; run 'motiva key set <KEY>' first");
        }
        CaptureState::Errored { message, .. } => bail!("verification failed: {}", message),
        _ => {}
    }
    Ok(())
}
