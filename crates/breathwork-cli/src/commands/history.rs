use breathwork_core::session::results::format_time;
use breathwork_core::storage::Database;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List recent sessions
    List {
        /// Maximum number of sessions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Totals and records across all sessions
    Stats,
    /// Delete all recorded sessions
    Clear,
}

pub fn run(action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        HistoryAction::List { limit, json } => {
            let sessions = db.recent_sessions(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("no sessions recorded");
                return Ok(());
            }
            for s in &sessions {
                let holds: Vec<String> = s
                    .results
                    .iter()
                    .map(|r| format_time(r.retention_secs))
                    .collect();
                println!(
                    "{}  {:<8} {:>2} breaths  {}",
                    s.completed_at.format("%Y-%m-%d %H:%M"),
                    s.speed,
                    s.breaths,
                    holds.join(" ")
                );
            }
        }
        HistoryAction::Stats => {
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        HistoryAction::Clear => {
            let removed = db.clear_history()?;
            println!("removed {removed} sessions");
        }
    }
    Ok(())
}
