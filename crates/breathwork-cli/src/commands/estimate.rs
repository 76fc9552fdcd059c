use breathwork_core::session::results::format_estimate;
use breathwork_core::Config;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Config::load()?.session;
    println!(
        "{} ({} pace, {} rounds of {} breaths)",
        format_estimate(&settings),
        settings.speed,
        settings.rounds,
        settings.breaths
    );
    Ok(())
}
