mod clock;
mod scheduler;
mod speed;

pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{Fired, Scheduler, ScopeId, TimerId};
pub use speed::{Speed, SpeedProfile};
