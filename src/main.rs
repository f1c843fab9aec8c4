use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{Mutex, mpsc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use habit_streaks::config::Config;
use habit_streaks::db::SqliteStore;
use habit_streaks::engine::{CompletionOutcome, HabitEngine, RestDayOutcome};
use habit_streaks::models::{HabitId, HabitUpdate, HabitView, NewHabit, RestDayPolicy};
use habit_streaks::notifications::DesktopNotifier;
use habit_streaks::observer::{EngineObserver, NullObserver};
use habit_streaks::rollover::{LifecycleEvent, spawn_rollover_loop};
use habit_streaks::xp::level_progress;
use habit_streaks::SystemClock;

#[derive(Debug, Parser)]
#[command(name = "habit-streaks", version, about = "Track habits, streaks and rest days")]
struct Cli {
    /// config file (default: <config dir>/habit-streaks/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a habit
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// rest days allowed per week, 0 to disable
        #[arg(long, default_value_t = 0)]
        rest_days: u8,
    },
    /// Change a habit's name, description or rest-day policy
    Edit {
        id: HabitId,
        #[arg(long)]
        name: Option<String>,
        /// empty string clears it
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        rest_days: Option<u8>,
    },
    /// Show active habits with their stats
    List {
        #[arg(long)]
        json: bool,
    },
    /// Mark a habit done for today
    Complete {
        id: HabitId,
        #[arg(long)]
        note: Option<String>,
    },
    /// Take a rest day for a habit today
    Rest {
        id: HabitId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Stop tracking a habit (history is kept)
    Deactivate { id: HabitId },
    /// Stay running, recompute at day rollover and send notifications
    Watch,
}

fn rest_policy(days: u8) -> Result<RestDayPolicy, habit_streaks::error::ValidationError> {
    if days == 0 {
        Ok(RestDayPolicy::Disallowed)
    } else {
        RestDayPolicy::per_week(days)
    }
}

fn print_view(view: &HabitView) {
    let stats = &view.stats;
    let mut flags = String::new();
    if stats.is_completed_today {
        flags.push_str(" ✅");
    }
    if stats.has_rest_day_today {
        flags.push_str(" 😌");
    }
    println!(
        "#{:<4} {:<24} 🔥 {:>3} (best {:>3})  lvl {:>2} {:>3.0}%  {:>5} XP{}",
        view.habit.id,
        view.habit.name,
        stats.current_streak,
        stats.best_streak,
        stats.level,
        level_progress(stats.experience) * 100.0,
        stats.experience,
        flags,
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let watching = matches!(cli.command, Command::Watch);
    let observer: Arc<dyn EngineObserver> = if watching && config.notifications {
        Arc::new(DesktopNotifier::new())
    } else {
        Arc::new(NullObserver)
    };

    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    let mut engine = HabitEngine::new(store, Arc::new(SystemClock), observer, config.user_id.clone());
    engine.load_habits().await?;

    match cli.command {
        Command::Add {
            name,
            description,
            rest_days,
        } => {
            let mut habit = NewHabit::new(name).with_rest_policy(rest_policy(rest_days)?);
            if let Some(description) = description {
                habit = habit.with_description(description);
            }
            let view = engine.add_habit(habit).await?;
            println!("Added habit #{} {}", view.habit.id, view.habit.name);
        }
        Command::Edit {
            id,
            name,
            description,
            rest_days,
        } => {
            let update = HabitUpdate {
                name,
                description: description.map(Some),
                rest_policy: rest_days.map(rest_policy).transpose()?,
            };
            let view = engine.update_habit(id, &update).await?;
            print_view(&view);
        }
        Command::List { json } => {
            if json {
                let views: Vec<&HabitView> = engine.views().collect();
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                for view in engine.views() {
                    print_view(view);
                }
            }
        }
        Command::Complete { id, note } => {
            match engine.complete_habit(id, note.as_deref()).await? {
                CompletionOutcome::Completed {
                    view,
                    experience_gained,
                    message,
                    ..
                } => {
                    println!("{message}  +{experience_gained} XP");
                    print_view(&view);
                }
                CompletionOutcome::AlreadyCompleted => println!("Already completed today."),
            }
        }
        Command::Rest { id, reason } => match engine.mark_rest_day(id, reason.as_deref()).await? {
            RestDayOutcome::Marked { view, message } => {
                println!("{message}");
                print_view(&view);
            }
            RestDayOutcome::AlreadyMarked => println!("Already a rest day today."),
        },
        Command::Deactivate { id } => {
            engine.deactivate_habit(id).await?;
            println!("Deactivated habit #{id}");
        }
        Command::Watch => watch(engine, &config).await?,
    }

    Ok(())
}

async fn watch(engine: HabitEngine, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(Mutex::new(engine));
    let (lifecycle_tx, lifecycle_rx) = mpsc::channel(8);
    let handle = spawn_rollover_loop(engine.clone(), config.rollover_interval(), lifecycle_rx);
    info!(interval_secs = config.rollover_interval().as_secs(), "watching for day rollover");

    // SIGUSR1 forces a check, the way an app coming to the foreground would
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut usr1 = signal(SignalKind::user_defined1())?;
        let tx = lifecycle_tx.clone();
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                if tx.send(LifecycleEvent::Foreground).await.is_err() {
                    break;
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await;
    drop(lifecycle_tx);
    Ok(())
}
