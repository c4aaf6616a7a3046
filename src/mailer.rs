// ✉️ Transactional e-mail
//
// The provider is a black box behind `Mailer`. `deliver` is the only entry
// point the rest of the crate uses: it records every attempt in email_outbox
// and never fails the caller.

use crate::db::new_id;
use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Template name, e.g. "otp", "receipt"
    pub kind: &'static str,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<()>;
}

/// Writes e-mails to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<()> {
        info!(to = %email.to, kind = email.kind, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Keeps e-mails in memory; optionally fails every send
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        MemoryMailer {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Most recent e-mail sent to `to`
    pub fn last_to(&self, to: &str) -> Option<Email> {
        self.sent().into_iter().rev().find(|email| email.to == to)
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: &Email) -> Result<()> {
        if self.fail {
            return Err(anyhow!("mail provider unavailable"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailbox lock poisoned"))?
            .push(email.clone());
        Ok(())
    }
}

/// Send and record; returns whether the provider accepted the message
pub fn deliver(conn: &Connection, mailer: &dyn Mailer, email: Email) -> bool {
    let outcome = mailer.send(&email);

    let (status, error) = match &outcome {
        Ok(()) => ("sent", None),
        Err(e) => {
            warn!(to = %email.to, kind = email.kind, error = %e, "email delivery failed");
            ("failed", Some(e.to_string()))
        }
    };

    let recorded = conn.execute(
        "INSERT INTO email_outbox (id, recipient, subject, body, kind, status, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new_id(),
            email.to,
            email.subject,
            email.body,
            email.kind,
            status,
            error,
            Utc::now()
        ],
    );
    if let Err(e) = recorded {
        warn!(error = %e, "failed to record email in outbox");
    }

    outcome.is_ok()
}

// ============================================================================
// TEMPLATES
// ============================================================================

pub fn otp_email(to: &str, code: &str, ttl_minutes: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "Your SAKAN login code".to_string(),
        body: format!(
            "Your login code is {code}.\n\nIt expires in {ttl_minutes} minutes. \
             If you did not try to sign in, ignore this message."
        ),
        kind: "otp",
    }
}

pub fn onboarding_email(
    to: &str,
    full_name: &str,
    residence_name: &str,
    code: &str,
    link: &str,
    ttl_hours: i64,
) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Your invitation to {residence_name}"),
        body: format!(
            "Hello {full_name},\n\nYou have been invited to join {residence_name} on SAKAN.\n\n\
             Your onboarding code: {code}\nOr open: {link}\n\n\
             The code is valid for {ttl_hours} hours."
        ),
        kind: "onboarding",
    }
}

pub fn application_received_email(to: &str, full_name: &str, residence_name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "We received your application".to_string(),
        body: format!(
            "Hello {full_name},\n\nYour application to manage {residence_name} on SAKAN \
             is under review. We will e-mail you once it has been processed."
        ),
        kind: "application_received",
    }
}

pub fn syndic_decision_email(to: &str, full_name: &str, approved: bool, reason: Option<&str>) -> Email {
    let body = if approved {
        format!("Hello {full_name},\n\nYour syndic account has been approved. You can now sign in.")
    } else {
        format!(
            "Hello {full_name},\n\nYour syndic application was not approved.{}",
            reason.map(|r| format!("\n\nReason: {r}")).unwrap_or_default()
        )
    };

    Email {
        to: to.to_string(),
        subject: if approved {
            "Your syndic account is approved".to_string()
        } else {
            "Your syndic application".to_string()
        },
        body,
        kind: "syndic_decision",
    }
}

pub fn registration_decision_email(
    to: &str,
    full_name: &str,
    residence_name: &str,
    approved: bool,
    reason: Option<&str>,
) -> Email {
    let body = if approved {
        format!(
            "Hello {full_name},\n\nYour request to join {residence_name} was approved. \
             Sign in with this e-mail address to access your account."
        )
    } else {
        format!(
            "Hello {full_name},\n\nYour request to join {residence_name} was declined.{}",
            reason.map(|r| format!("\n\nReason: {r}")).unwrap_or_default()
        )
    };

    Email {
        to: to.to_string(),
        subject: format!("Your request to join {residence_name}"),
        body,
        kind: "registration_decision",
    }
}

pub fn receipt_email(to: &str, receipt_number: &str, receipt: String) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Payment receipt {receipt_number}"),
        body: receipt,
        kind: "receipt",
    }
}

pub fn reminder_email(to: &str, full_name: &str, lines: &[String], total: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Payment reminder".to_string(),
        body: format!(
            "Hello {full_name},\n\nThe following fees are overdue:\n\n{}\n\nTotal due: {total}",
            lines.join("\n")
        ),
        kind: "reminder",
    }
}
