pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod poll;
pub mod retry;
pub mod schedule;
pub mod service;
pub mod worker;

pub use bus::{EnvelopeHandler, EventBus, MemoryEventBus, Topic};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TimerServiceConfig;
pub use error::{HandlerError, PollError, PublishError, SubscribeError};
pub use poll::{PollOutcome, poll_due_timers};
pub use retry::RetryPolicy;
pub use schedule::{ScheduleTimerHandler, run_schedule_timer};
pub use service::TimerService;
pub use worker::PollingWorker;
