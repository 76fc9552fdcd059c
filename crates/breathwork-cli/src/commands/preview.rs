use std::time::Duration;

use breathwork_core::{Config, SessionMachine, SessionSettings, SilentCues, Speed, SystemClock};
use clap::Args;

use crate::terminal::TerminalRenderer;

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Number of breathing cycles to show
    #[arg(long, default_value_t = 3)]
    pub cycles: u32,
    /// Pace to preview instead of the saved one
    #[arg(long)]
    pub speed: Option<Speed>,
}

pub fn run(args: PreviewArgs) -> Result<(), Box<dyn std::error::Error>> {
    let saved = Config::load()?.session;
    let settings = SessionSettings {
        speed: args.speed.unwrap_or(saved.speed),
        ..saved
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(async {
        let mut machine =
            SessionMachine::new(SystemClock, settings, SilentCues, TerminalRenderer::new());
        machine.start_preview();
        // The counter moves past `cycles` when the next inhale begins.
        while machine.preview_active() && machine.preview_count() <= args.cycles {
            let Some(due) = machine.next_deadline() else {
                break;
            };
            let wait = due.saturating_sub(machine.now_ms());
            tokio::time::sleep(Duration::from_millis(wait)).await;
            machine.run_due();
        }
        machine.stop_preview();
    });
    Ok(())
}
