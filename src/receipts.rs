// 🧾 Payment receipts
//
// Plain-text rendering. The same text is e-mailed after a payment and served
// by the receipt endpoint.

use crate::entities::{Fee, Payment, PaymentMethod, Profile, Residence};
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

/// Format minor units as "1 234.50 MAD"
pub fn format_money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }

    format!("{sign}{grouped}.{:02} {currency}", cents % 100)
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub receipt_number: String,
    pub residence_name: String,
    pub residence_address: String,
    pub resident_name: String,
    pub apartment_number: Option<String>,
    pub fee_title: String,
    pub amount_cents: i64,
    pub remaining_cents: i64,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub note: Option<String>,
    pub currency: String,
}

impl Receipt {
    pub fn new(residence: &Residence, resident: &Profile, fee: &Fee, payment: &Payment, currency: &str) -> Self {
        Receipt {
            receipt_number: payment.receipt_number.clone(),
            residence_name: residence.name.clone(),
            residence_address: format!("{}, {}", residence.address, residence.city),
            resident_name: resident.full_name.clone(),
            apartment_number: resident.apartment_number.clone(),
            fee_title: fee.title.clone(),
            amount_cents: payment.amount_cents,
            remaining_cents: payment.remaining_after_cents,
            method: payment.method,
            paid_at: payment.paid_at,
            note: payment.note.clone(),
            currency: currency.to_string(),
        }
    }

    /// Load everything a receipt needs for a stored payment
    pub fn load(conn: &Connection, payment: &Payment, currency: &str) -> AppResult<Self> {
        let residence = Residence::get(conn, &payment.residence_id)?;
        let resident = Profile::get(conn, &payment.profile_id)?;
        let fee = Fee::get(conn, &payment.fee_id)?;
        Ok(Receipt::new(&residence, &resident, &fee, payment, currency))
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("PAYMENT RECEIPT {}", self.receipt_number),
            String::new(),
            self.residence_name.clone(),
            self.residence_address.clone(),
            String::new(),
            format!("Received from: {}", self.resident_name),
        ];
        if let Some(apartment) = &self.apartment_number {
            lines.push(format!("Apartment:     {apartment}"));
        }
        lines.extend([
            format!("For:           {}", self.fee_title),
            format!("Amount:        {}", format_money(self.amount_cents, &self.currency)),
            format!("Method:        {}", self.method.label()),
            format!("Date:          {}", self.paid_at.format("%Y-%m-%d")),
        ]);
        if let Some(note) = &self.note {
            lines.push(format!("Note:          {note}"));
        }
        lines.push(format!(
            "Remaining:     {}",
            format_money(self.remaining_cents, &self.currency)
        ));

        lines.join("\n")
    }
}
