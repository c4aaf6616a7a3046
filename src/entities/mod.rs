// Entity Models
// Each entity is one table row: stable UUID identity, typed status enums,
// and `from_row` mapping shared by every query that selects `COLUMNS`.

pub mod residence;
pub mod profile;
pub mod fee;
pub mod contribution;
pub mod payment;
pub mod expense;
pub mod registration;
pub mod onboarding;

pub use residence::Residence;
pub use profile::{Profile, ProfileStatus, Role};
pub use fee::{Fee, FeeStatus};
pub use contribution::{Contribution, Frequency};
pub use payment::{Payment, PaymentMethod};
pub use expense::Expense;
pub use registration::{RegistrationRequest, RequestStatus};
pub use onboarding::{OnboardingCode, OnboardingPurpose};
