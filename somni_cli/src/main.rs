use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use somni_core::*;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "somni")]
#[command(about = "Adaptive wake-window sleep tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sleep session
    Start {
        /// Baby id (defaults to the active profile)
        #[arg(long)]
        subject: Option<String>,

        /// UTC offset in minutes at the current location
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        tz_offset: i32,

        /// Device id recorded on the session (defaults to config)
        #[arg(long)]
        device: Option<String>,
    },

    /// End a sleep session (the subject's open one if no id is given)
    End {
        session_id: Option<String>,

        #[arg(long)]
        subject: Option<String>,
    },

    /// Correct the start and/or end time of a session
    Edit {
        session_id: String,

        /// New start time (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        start: Option<DateTime<Utc>>,

        /// New end time (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        end: Option<DateTime<Utc>>,
    },

    /// Show the open session, if any
    Active {
        #[arg(long)]
        subject: Option<String>,
    },

    /// List recent sessions
    History {
        #[arg(long)]
        subject: Option<String>,

        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Recommend the next wake window
    Window {
        #[arg(long)]
        subject: Option<String>,

        /// Age in weeks (defaults to the profile's age)
        #[arg(long)]
        age_weeks: Option<i32>,
    },

    /// Check for a timezone change and print an adjustment plan
    Tz {
        #[arg(long)]
        subject: Option<String>,

        /// Current UTC offset in minutes
        #[arg(long, allow_negative_numbers = true)]
        offset: i32,

        /// Name of the current timezone (e.g. Europe/Paris)
        #[arg(long, default_value = "")]
        label: String,
    },

    /// Manage baby profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// List sessions waiting to be synced
    Pending,

    /// Mark a session as synced
    MarkSynced { session_id: String },

    /// Delete a session
    Delete { session_id: String },

    /// Export all data as JSON, or sessions as CSV
    Export {
        /// Write sessions to this CSV file instead of printing JSON
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Add a profile
    Add {
        #[arg(long)]
        name: String,

        /// Birthdate (YYYY-MM-DD)
        #[arg(long)]
        birthdate: NaiveDate,

        /// Profile id (random if omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List profiles
    List,

    /// Make a profile the default subject
    Use { id: String },
}

fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// Everything a command needs, wired to the data directory
struct App {
    data_dir: PathBuf,
    config: Config,
    clock: Arc<dyn TimeProvider>,
    repository: Arc<JsonlRepository>,
}

impl App {
    fn open(data_dir: PathBuf, config: Config) -> Self {
        tracing::debug!(data_dir = %data_dir.display(), "opening data directory");
        let clock: Arc<dyn TimeProvider> = Arc::new(SystemClock);
        let repository = Arc::new(JsonlRepository::new(
            Config::sessions_path(&data_dir),
            clock.clone(),
        ));
        Self {
            data_dir,
            config,
            clock,
            repository,
        }
    }

    fn manager(&self) -> SessionLifecycleManager {
        SessionLifecycleManager::new(self.repository.clone(), self.clock.clone())
    }

    fn profiles(&self) -> Result<ProfileBook> {
        ProfileBook::load(&Config::profiles_path(&self.data_dir))
    }

    /// Explicit subject, else the active profile
    fn subject(&self, explicit: Option<String>) -> Result<String> {
        if let Some(subject) = explicit {
            return Ok(subject);
        }
        self.profiles()?
            .active()
            .map(|p| p.id.clone())
            .ok_or_else(|| {
                Error::InvalidArgument(
                    "no --subject given and no active profile; add one with `somni profile add`"
                        .into(),
                )
            })
    }
}

fn main() -> Result<()> {
    somni_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.data.data_dir.clone());
    let app = App::open(data_dir, config);

    match cli.command {
        Commands::Start {
            subject,
            tz_offset,
            device,
        } => cmd_start(&app, subject, tz_offset, device),
        Commands::End {
            session_id,
            subject,
        } => cmd_end(&app, session_id, subject),
        Commands::Edit {
            session_id,
            start,
            end,
        } => cmd_edit(&app, &session_id, start, end),
        Commands::Active { subject } => cmd_active(&app, subject),
        Commands::History { subject, days } => cmd_history(&app, subject, days),
        Commands::Window { subject, age_weeks } => cmd_window(&app, subject, age_weeks),
        Commands::Tz {
            subject,
            offset,
            label,
        } => cmd_tz(&app, subject, offset, &label),
        Commands::Profile { action } => cmd_profile(&app, action),
        Commands::Pending => cmd_pending(&app),
        Commands::MarkSynced { session_id } => {
            app.repository.mark_synced(&session_id, app.clock.now())?;
            println!("✓ Marked {} as synced", session_id);
            Ok(())
        }
        Commands::Delete { session_id } => {
            app.repository.delete_session(&session_id)?;
            println!("✓ Deleted {}", session_id);
            Ok(())
        }
        Commands::Export { csv } => cmd_export(&app, csv),
    }
}

fn cmd_start(
    app: &App,
    subject: Option<String>,
    tz_offset: i32,
    device: Option<String>,
) -> Result<()> {
    let subject = app.subject(subject)?;
    let device = device.unwrap_or_else(|| app.config.device.id.clone());

    let session = app.manager().start_session(&subject, &device, tz_offset)?;

    println!("✓ Started session {}", session.id);
    println!("  Subject: {}", session.subject_id);
    println!("  Started: {}", session.start_time.to_rfc3339());
    Ok(())
}

fn cmd_end(app: &App, session_id: Option<String>, subject: Option<String>) -> Result<()> {
    let manager = app.manager();

    let session_id = match session_id {
        Some(id) => id,
        None => {
            let subject = app.subject(subject)?;
            manager
                .get_active_session(&subject)?
                .map(|s| s.id)
                .ok_or_else(|| {
                    Error::InvalidState(format!("{} has no active session to end", subject))
                })?
        }
    };

    let session = manager.end_session(&session_id)?;

    println!("✓ Ended session {}", session.id);
    println!(
        "  Slept {} min",
        session.duration_minutes.unwrap_or_default()
    );
    Ok(())
}

fn cmd_edit(
    app: &App,
    session_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    let session = app.manager().update_session(session_id, start, end)?;

    println!("✓ Updated session {}", session.id);
    display_session(&session);
    Ok(())
}

fn cmd_active(app: &App, subject: Option<String>) -> Result<()> {
    let subject = app.subject(subject)?;
    match app.manager().get_active_session(&subject)? {
        Some(session) => {
            let elapsed = whole_minutes_between(session.start_time, app.clock.now());
            println!("Active session {} ({} min so far)", session.id, elapsed);
        }
        None => println!("No active session for {}", subject),
    }
    Ok(())
}

fn cmd_history(app: &App, subject: Option<String>, days: i64) -> Result<()> {
    let subject = app.subject(subject)?;
    let sessions = app.manager().get_sleep_history(&subject, days)?;

    if sessions.is_empty() {
        println!("No sessions for {} in the last {} days", subject, days);
        return Ok(());
    }

    println!("{} sessions in the last {} days:", sessions.len(), days);
    for session in &sessions {
        display_session(session);
    }
    Ok(())
}

fn cmd_window(app: &App, subject: Option<String>, age_weeks: Option<i32>) -> Result<()> {
    let subject = app.subject(subject)?;

    let age_in_weeks = match age_weeks {
        Some(age) => age,
        None => {
            let book = app.profiles()?;
            let profile = book.get(&subject).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "no profile for {}; pass --age-weeks or add a profile",
                    subject
                ))
            })?;
            profile.age_in_weeks(app.clock.now().date_naive())
        }
    };

    let notifier: Arc<dyn NotificationScheduler> = if app.config.notifications.enabled {
        Arc::new(OutboxNotifier::new(Config::outbox_path(&app.data_dir)))
    } else {
        Arc::new(TracingNotifier)
    };
    let engine = WakeWindowEngine::new(app.repository.clone(), notifier, app.clock.clone());

    let rec = engine.recommend_and_notify(&subject, age_in_weeks)?;

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  WAKE WINDOW");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  Window:     {} min (baseline {} min, x{:.2})",
        rec.duration.num_minutes(),
        rec.baseline_window.num_minutes(),
        rec.adjustment_multiplier
    );
    println!("  Next sleep: {}", rec.next_sleep_time.to_rfc3339());
    println!("  Confidence: {:.0}%", rec.confidence * 100.0);
    if let Some(ref reason) = rec.adjustment_reason {
        println!("  ℹ {}", reason);
    }
    println!();
    Ok(())
}

fn cmd_tz(app: &App, subject: Option<String>, offset: i32, label: &str) -> Result<()> {
    let subject = app.subject(subject)?;
    let detector = TimezoneShiftDetector::new(app.repository.clone());

    match detector.detect_timezone_change(&subject, offset, label)? {
        None => println!("No timezone change detected"),
        Some(adjustment) => {
            println!(
                "Timezone change: {} → {} ({:+} h)",
                adjustment.old_timezone, adjustment.new_timezone, adjustment.hours_difference
            );
            println!("Adjust over {} days:", adjustment.estimated_days);
            for (day, shift) in adjustment.adjustment_schedule.iter().enumerate() {
                println!("  Day {}: shift {} min", day + 1, shift.num_minutes());
            }
        }
    }
    Ok(())
}

fn cmd_profile(app: &App, action: ProfileAction) -> Result<()> {
    let path = Config::profiles_path(&app.data_dir);

    match action {
        ProfileAction::Add {
            name,
            birthdate,
            id,
        } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let now = app.clock.now();
            ProfileBook::update(&path, |book| {
                book.add(id.clone(), name.clone(), birthdate, now)?;
                Ok(())
            })?;
            println!("✓ Added profile {} ({})", name, id);
        }
        ProfileAction::List => {
            let book = ProfileBook::load(&path)?;
            if book.profiles.is_empty() {
                println!("No profiles");
            }
            let today = app.clock.now().date_naive();
            for profile in &book.profiles {
                let marker = if book.active_profile_id.as_deref() == Some(profile.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {}  {}  born {} ({} weeks, {} months)",
                    marker,
                    profile.id,
                    profile.name,
                    profile.birthdate,
                    profile.age_in_weeks(today),
                    profile.age_in_months(today)
                );
            }
        }
        ProfileAction::Use { id } => {
            ProfileBook::update(&path, |book| book.set_active(&id))?;
            println!("✓ Active profile is now {}", id);
        }
    }
    Ok(())
}

fn cmd_pending(app: &App) -> Result<()> {
    let pending = app.repository.get_pending_sync_sessions()?;
    if pending.is_empty() {
        println!("Nothing to sync");
        return Ok(());
    }
    println!("{} sessions pending sync:", pending.len());
    for session in &pending {
        display_session(session);
    }
    Ok(())
}

fn cmd_export(app: &App, csv: Option<PathBuf>) -> Result<()> {
    let sessions = app.repository.all_sessions()?;

    match csv {
        Some(csv_path) => {
            let count = somni_core::export::write_sessions_csv(&sessions, &csv_path)?;
            println!("✓ Exported {} sessions", count);
            println!("  CSV: {}", csv_path.display());
        }
        None => {
            let book = app.profiles()?;
            let json = somni_core::export::export_json(&sessions, &book.profiles, app.clock.now())?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn display_session(session: &SleepSession) {
    let end = session
        .end_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "ongoing".into());
    let duration = session
        .duration_minutes
        .map(|m| format!("{} min", m))
        .unwrap_or_else(|| "-".into());
    println!(
        "  {}  {} → {}  {}  [{:?}]",
        session.id,
        session.start_time.to_rfc3339(),
        end,
        duration,
        session.sync_status
    );
}
