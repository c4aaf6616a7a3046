// SAKAN - Residence Management Core Library
// Exposes all modules for use in the CLI, the API server, and tests

#[macro_use]
mod macros;

pub mod config;
pub mod error;
pub mod db;
pub mod entities;       // Typed rows + text enums
pub mod mailer;         // Transactional e-mail seam + outbox
pub mod auth;           // OTP login, sessions, role checks
pub mod onboarding;     // Invitation codes
pub mod registration;   // Self-service join requests
pub mod residences;     // Syndic sign-up + admin back-office
pub mod residents;
pub mod deletion;       // Transactional cascading deletes
pub mod fees;           // One-off fees + recurring contributions
pub mod payments;
pub mod receipts;
pub mod expenses;
pub mod balances;       // Balances, summaries, reminders
pub mod access;         // QR access codes

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use db::{
    Event, open_database, setup_database,
    insert_event, record_event, get_events_for_entity, get_recent_events,
};
pub use entities::{
    Residence,
    Profile, ProfileStatus, Role,
    Fee, FeeStatus,
    Contribution, Frequency,
    Payment, PaymentMethod,
    Expense,
    RegistrationRequest, RequestStatus,
    OnboardingCode, OnboardingPurpose,
};
pub use auth::{Client, Identity};
pub use mailer::{Email, LogMailer, Mailer, MemoryMailer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
