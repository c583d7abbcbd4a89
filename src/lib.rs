//! # Rust Fares Library
//!
//! Flight fare search proxy and booking confirmation pipeline.
//! A browser UI looks up cities and fares through the proxy, which forwards
//! requests to the third-party pricing provider with server-held credentials.
//! A chosen offer plus the passenger form becomes a booking record that is
//! rendered into a confirmation document.

pub mod booking;
pub mod client;
pub mod config;
pub mod logging;
pub mod server;
pub mod ui;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// Re-export main types for convenience
pub use booking::{
    assemble_booking, assemble_booking_draft, render_confirmation, BookingError, BookingRecord,
    DocumentRenderer, PassengerDraft, PlainTextRenderer, RenderError,
};
pub use client::{filter_cities, FareProvider, PricingClient, ProviderConfig};
pub use server::{app, ApiError, AppState};

/// Date format used on the wire by the UI, the proxy and the provider
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Error types for calls to the pricing provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider returned HTTP status {0}")]
    Status(u16),

    #[error("Malformed provider payload: {0}")]
    Malformed(String),

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Unavailable(err)
        }
    }
}

impl ProviderError {
    /// Network-level failures, as opposed to a bad answer from the provider
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_) | ProviderError::Timeout)
    }
}

/// A search request that failed validation before reaching the provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidRequest(pub String);

/// City reference entry from the provider's city list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub code: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub country_code: String,
}

/// The provider's city list carries `null` for some names.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Validated fare search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub depart_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    pub adults: u32,
}

/// Search body as it arrives over the wire, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub depart_date: Option<String>,
    pub return_date: Option<String>,
    pub adults: Option<i64>,
}

impl SearchQuery {
    /// Check required fields and parse dates.
    ///
    /// Origin, destination and departure date are required; `adults`
    /// defaults to one and the return date is optional but may not precede
    /// the departure.
    pub fn validate(self) -> Result<SearchRequest, InvalidRequest> {
        let origin = required_text("origin", self.origin)?;
        let destination = required_text("destination", self.destination)?;

        let depart_date = match self.depart_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => parse_date("departDate", raw)?,
            _ => return Err(InvalidRequest("Missing required field: departDate".to_string())),
        };

        let return_date = match self.return_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_date("returnDate", raw)?),
            _ => None,
        };

        if let Some(return_date) = return_date {
            if return_date < depart_date {
                return Err(InvalidRequest(
                    "returnDate must not be earlier than departDate".to_string(),
                ));
            }
        }

        let adults = match self.adults {
            None => 1,
            Some(n) if n >= 1 => u32::try_from(n)
                .map_err(|_| InvalidRequest(format!("adults out of range: {}", n)))?,
            Some(n) => return Err(InvalidRequest(format!("adults must be at least 1, got {}", n))),
        };

        Ok(SearchRequest {
            origin,
            destination,
            depart_date,
            return_date,
            adults,
        })
    }
}

fn required_text(field: &str, value: Option<String>) -> Result<String, InvalidRequest> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(InvalidRequest(format!("Missing required field: {}", field))),
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, InvalidRequest> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        InvalidRequest(format!("{} must be in YYYY-MM-DD format, got {}", field, raw))
    })
}

/// A priced itinerary exactly as the provider returned it.
///
/// The proxy never reinterprets the offer schema; the accessors here are
/// lenient lookups used only when presenting an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightOffer(serde_json::Value);

impl FlightOffer {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// True for a non-empty JSON object
    pub fn is_present(&self) -> bool {
        self.0.as_object().map_or(false, |obj| !obj.is_empty())
    }

    /// First of `keys` holding a string or number, rendered as text
    pub fn field(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.0.get(*key)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Provider fare payload, relayed verbatim by the proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FareResults(serde_json::Value);

impl FareResults {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Flatten the payload into individual offers for display.
    ///
    /// The cheap-prices payload nests offers as
    /// `data.<destination>.<index> = {price, airline, departure_at, ...}`;
    /// each offer gets `origin` and `destination` filled in when missing.
    /// Within a destination, offers keep the provider's index order (its
    /// price sort), so `"10"` follows `"9"`. A plain array (under `data` or
    /// at the top level) is taken as-is.
    pub fn offers(&self, origin: &str) -> Vec<FlightOffer> {
        let data = self.0.get("data").unwrap_or(&self.0);

        match data {
            serde_json::Value::Array(items) => {
                items.iter().cloned().map(FlightOffer::new).collect()
            }
            serde_json::Value::Object(by_destination) => {
                let mut offers = Vec::new();
                for (destination, by_index) in by_destination {
                    let Some(entries) = by_index.as_object() else {
                        continue;
                    };
                    let mut indexed: Vec<(&String, &serde_json::Value)> = entries.iter().collect();
                    indexed.sort_by_key(|(index, _)| index.parse::<usize>().unwrap_or(usize::MAX));
                    for (_, entry) in indexed {
                        let Some(fields) = entry.as_object() else {
                            continue;
                        };
                        let mut fields = fields.clone();
                        fields
                            .entry("origin")
                            .or_insert_with(|| origin.into());
                        fields
                            .entry("destination")
                            .or_insert_with(|| destination.as_str().into());
                        if let Some(currency) = self.0.get("currency") {
                            fields
                                .entry("currency")
                                .or_insert_with(|| currency.clone());
                        }
                        offers.push(FlightOffer::new(serde_json::Value::Object(fields)));
                    }
                }
                offers
            }
            _ => Vec::new(),
        }
    }
}

/// Passenger gender as offered by the booking form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Passenger identity captured by the booking form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerDetails {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub citizenship: String,
    pub passport_number: String,
    pub passport_expiry: NaiveDate,
}
