//! Booking assembly and confirmation rendering

use crate::{FlightOffer, Gender, PassengerDetails, DATE_FORMAT};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("Incomplete booking: missing {field}")]
    Incomplete { field: &'static str },

    #[error("Invalid booking: {field} is not valid")]
    Invalid { field: &'static str },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Document rendering failed: {0}")]
    Failed(String),
}

/// A chosen offer merged with the passenger who will fly it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRecord {
    pub flight: FlightOffer,
    pub passenger: PassengerDetails,
}

/// Passenger form fields exactly as a browser submits them.
///
/// Every field may be absent or blank; [`PassengerDraft::into_details`]
/// reports the first one that is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerDraft {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub citizenship: Option<String>,
    pub passport_number: Option<String>,
    pub passport_expiry: Option<String>,
}

fn filled(field: &'static str, value: Option<String>) -> Result<String, BookingError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(BookingError::Incomplete { field }),
    }
}

fn filled_date(field: &'static str, value: Option<String>) -> Result<NaiveDate, BookingError> {
    let value = filled(field, value)?;
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|_| BookingError::Invalid { field })
}

impl PassengerDraft {
    /// Checks fields in form order
    pub fn into_details(self) -> Result<PassengerDetails, BookingError> {
        let first_name = filled("firstName", self.first_name)?;
        let last_name = filled("lastName", self.last_name)?;
        let date_of_birth = filled_date("dateOfBirth", self.date_of_birth)?;
        let gender = match filled("gender", self.gender)?.to_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => return Err(BookingError::Invalid { field: "gender" }),
        };

        Ok(PassengerDetails {
            first_name,
            last_name,
            date_of_birth,
            gender,
            citizenship: filled("citizenship", self.citizenship)?,
            passport_number: filled("passportNumber", self.passport_number)?,
            passport_expiry: filled_date("passportExpiry", self.passport_expiry)?,
        })
    }
}

fn require_flight(flight: Option<FlightOffer>) -> Result<FlightOffer, BookingError> {
    match flight {
        Some(flight) if flight.is_present() => Ok(flight),
        _ => Err(BookingError::Incomplete { field: "flightDetails" }),
    }
}

/// [`assemble_booking`] for unchecked form input
pub fn assemble_booking_draft(
    flight: Option<FlightOffer>,
    passenger: Option<PassengerDraft>,
) -> Result<BookingRecord, BookingError> {
    let flight = require_flight(flight)?;
    let passenger = passenger
        .ok_or(BookingError::Incomplete { field: "passengerDetails" })?
        .into_details()?;
    assemble_booking(Some(flight), Some(passenger))
}

/// Merge a selected offer and passenger details into a booking record.
///
/// No I/O. Fails when either side is missing, the offer is not a non-empty
/// object, or a required passenger text field is blank.
pub fn assemble_booking(
    flight: Option<FlightOffer>,
    passenger: Option<PassengerDetails>,
) -> Result<BookingRecord, BookingError> {
    let flight = require_flight(flight)?;
    let passenger = passenger.ok_or(BookingError::Incomplete {
        field: "passengerDetails",
    })?;

    let required = [
        ("firstName", &passenger.first_name),
        ("lastName", &passenger.last_name),
        ("citizenship", &passenger.citizenship),
        ("passportNumber", &passenger.passport_number),
    ];
    if let Some((field, _)) = required.into_iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(BookingError::Incomplete { field });
    }

    Ok(BookingRecord { flight, passenger })
}

/// Turns a booking record into a deliverable document.
///
/// Implementations must be deterministic: the same record always renders to
/// the same bytes.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, record: &BookingRecord) -> Result<Vec<u8>, RenderError>;

    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;
}

/// Render the confirmation for a booking record
pub fn render_confirmation(
    record: &BookingRecord,
    renderer: &dyn DocumentRenderer,
) -> Result<Vec<u8>, RenderError> {
    let document = renderer.render(record)?;
    debug!(bytes = document.len(), content_type = renderer.content_type(), "Rendered confirmation");
    Ok(document)
}

/// Plain-text confirmation laid out like the printed booking slip
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

const NOT_AVAILABLE: &str = "n/a";

impl PlainTextRenderer {
    fn write_document(&self, record: &BookingRecord, out: &mut String) -> std::fmt::Result {
        let flight = &record.flight;
        let passenger = &record.passenger;
        let lookup = |keys: &[&str]| flight.field(keys).unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let price = match (flight.field(&["price", "value"]), flight.field(&["currency"])) {
            (Some(price), Some(currency)) => format!("{} {}", price, currency.to_uppercase()),
            (Some(price), None) => price,
            (None, _) => NOT_AVAILABLE.to_string(),
        };

        writeln!(out, "Flight Booking Confirmation")?;
        writeln!(out, "===========================")?;
        writeln!(out)?;
        writeln!(out, "Flight Details:")?;
        writeln!(out, "  From: {}", lookup(&["origin"]))?;
        writeln!(out, "  To: {}", lookup(&["destination"]))?;
        writeln!(out, "  Date: {}", lookup(&["depart_date", "departDate", "departure_at"]))?;
        writeln!(out, "  Price: {}", price)?;
        if let Some(airline) = flight.field(&["airline"]) {
            match flight.field(&["flight_number"]) {
                Some(number) => writeln!(out, "  Flight: {} {}", airline, number)?,
                None => writeln!(out, "  Airline: {}", airline)?,
            }
        }
        writeln!(out)?;
        writeln!(out, "Passenger Details:")?;
        writeln!(out, "  Name: {} {}", passenger.first_name.trim(), passenger.last_name.trim())?;
        writeln!(out, "  Date of Birth: {}", passenger.date_of_birth.format(DATE_FORMAT))?;
        writeln!(
            out,
            "  Gender: {}",
            match passenger.gender {
                Gender::Male => "Male",
                Gender::Female => "Female",
            }
        )?;
        writeln!(out, "  Passport: {}", passenger.passport_number.trim())?;
        writeln!(out, "  Passport Expiry: {}", passenger.passport_expiry.format(DATE_FORMAT))?;
        writeln!(out, "  Citizenship: {}", passenger.citizenship.trim())?;
        Ok(())
    }
}

impl DocumentRenderer for PlainTextRenderer {
    fn render(&self, record: &BookingRecord) -> Result<Vec<u8>, RenderError> {
        let mut out = String::new();
        self.write_document(record, &mut out)
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(out.into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}
