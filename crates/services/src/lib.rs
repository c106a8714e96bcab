#![forbid(unsafe_code)]

pub mod app_services;
pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod results_service;
pub mod sessions;
pub mod test_list_service;
pub mod ticks;

pub use exam_core::Clock;
pub use sessions as session;

pub use app_services::AppServices;
pub use audio::{AudioHandle, AudioProvider};
pub use auth::{AuthProvider, StaticAuthProvider};
pub use config::{SavePolicy, SessionConfig};
pub use error::{
    AnswerError, AppServicesError, PlaybackError, SequencerError, SessionError, TimerError,
};
pub use results_service::ResultsService;
pub use test_list_service::{TestListItem, TestListService};
pub use ticks::{IntervalTickSource, ManualClock, TickSource, Ticker};

pub use sessions::{
    PlayOutcome, SaveStatus, SessionController, SessionLauncher, SessionNotice, SessionSnapshot,
    SubmitOutcome, SubmitProgress,
};
