//! Headless state for the search and booking screens, plus the HTTP client
//! the screens use to reach the proxy.
//!
//! Form state is immutable per update: every change goes through a reducer
//! that consumes the old state and returns the new one.

use crate::booking::BookingError;
use crate::{City, FareResults, FlightOffer, Gender, InvalidRequest, PassengerDetails, SearchQuery, SearchRequest, DATE_FORMAT};
use chrono::{Duration, Months, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Days between the default departure and return dates
const DEFAULT_TRIP_DAYS: i64 = 7;

/// Months of passport validity pre-filled on the booking form
const DEFAULT_PASSPORT_VALIDITY_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    pub origin: String,
    pub destination: String,
    pub depart_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub adults: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAction {
    SetOrigin(String),
    SetDestination(String),
    /// Pick a city from the autocomplete list
    ChooseOrigin(City),
    ChooseDestination(City),
    SetDepartDate(NaiveDate),
    SetReturnDate(Option<NaiveDate>),
    SetAdults(u32),
    SwapCities,
}

impl SearchForm {
    /// Empty form departing `today` and returning a week later
    pub fn new(today: NaiveDate) -> Self {
        Self {
            origin: String::new(),
            destination: String::new(),
            depart_date: today,
            return_date: Some(today + Duration::days(DEFAULT_TRIP_DAYS)),
            adults: 1,
        }
    }

    pub fn reduce(self, action: SearchAction) -> Self {
        match action {
            SearchAction::SetOrigin(origin) => Self { origin, ..self },
            SearchAction::SetDestination(destination) => Self { destination, ..self },
            SearchAction::ChooseOrigin(city) => Self {
                origin: city.code,
                ..self
            },
            SearchAction::ChooseDestination(city) => Self {
                destination: city.code,
                ..self
            },
            SearchAction::SetDepartDate(depart_date) => {
                // keep the trip length non-negative
                let return_date = self.return_date.map(|r| r.max(depart_date));
                Self {
                    depart_date,
                    return_date,
                    ..self
                }
            }
            SearchAction::SetReturnDate(return_date) => Self { return_date, ..self },
            SearchAction::SetAdults(adults) => Self {
                adults: adults.max(1),
                ..self
            },
            SearchAction::SwapCities => Self {
                origin: self.destination,
                destination: self.origin,
                ..self
            },
        }
    }

    /// Validate the form with the same rules the proxy applies
    pub fn to_request(&self) -> Result<SearchRequest, InvalidRequest> {
        SearchQuery {
            origin: Some(self.origin.clone()),
            destination: Some(self.destination.clone()),
            depart_date: Some(self.depart_date.format(DATE_FORMAT).to_string()),
            return_date: self.return_date.map(|d| d.format(DATE_FORMAT).to_string()),
            adults: Some(i64::from(self.adults)),
        }
        .validate()
    }
}

/// Identifies one autocomplete lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub generation: u64,
    pub term: String,
}

/// City suggestions driven by incremental lookups.
///
/// Every lookup takes a ticket with a strictly increasing generation. Only
/// the newest ticket may update the suggestions, so a slow response to an
/// earlier term can never overwrite the answer to a later one.
#[derive(Debug, Clone, Default)]
pub struct CityAutocomplete {
    generation: u64,
    term: String,
    suggestions: Vec<City>,
}

impl CityAutocomplete {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a lookup for `term`; returns `None` when no request is needed
    pub fn begin(&mut self, term: &str) -> Option<LookupTicket> {
        self.generation += 1;
        self.term = term.to_string();

        if term.trim().is_empty() {
            self.suggestions.clear();
            return None;
        }

        Some(LookupTicket {
            generation: self.generation,
            term: self.term.clone(),
        })
    }

    /// Apply a lookup result. Returns false when the ticket is stale.
    ///
    /// A failed lookup is shown as "no suggestions".
    pub fn complete<E>(&mut self, ticket: &LookupTicket, result: Result<Vec<City>, E>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                stale = ticket.generation,
                current = self.generation,
                "Discarding superseded city lookup"
            );
            return false;
        }

        self.suggestions = result.unwrap_or_default();
        true
    }

    pub fn suggestions(&self) -> &[City] {
        &self.suggestions
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Booking form state. Gender starts unset, as on the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassengerForm {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Option<Gender>,
    pub citizenship: String,
    pub passport_number: String,
    pub passport_expiry: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassengerAction {
    SetFirstName(String),
    SetLastName(String),
    SetDateOfBirth(NaiveDate),
    SetGender(Gender),
    SetCitizenship(String),
    SetPassportNumber(String),
    SetPassportExpiry(NaiveDate),
}

impl PassengerForm {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            date_of_birth: today,
            gender: None,
            citizenship: String::new(),
            passport_number: String::new(),
            passport_expiry: today
                .checked_add_months(Months::new(DEFAULT_PASSPORT_VALIDITY_MONTHS))
                .unwrap_or(today),
        }
    }

    pub fn reduce(self, action: PassengerAction) -> Self {
        match action {
            PassengerAction::SetFirstName(first_name) => Self { first_name, ..self },
            PassengerAction::SetLastName(last_name) => Self { last_name, ..self },
            PassengerAction::SetDateOfBirth(date_of_birth) => Self {
                date_of_birth,
                ..self
            },
            PassengerAction::SetGender(gender) => Self {
                gender: Some(gender),
                ..self
            },
            PassengerAction::SetCitizenship(citizenship) => Self { citizenship, ..self },
            PassengerAction::SetPassportNumber(passport_number) => Self {
                passport_number,
                ..self
            },
            PassengerAction::SetPassportExpiry(passport_expiry) => Self {
                passport_expiry,
                ..self
            },
        }
    }

    /// Finalize the form into passenger details
    pub fn submit(&self) -> Result<PassengerDetails, BookingError> {
        let text = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(BookingError::Incomplete { field })
            } else {
                Ok(value.trim().to_string())
            }
        };

        Ok(PassengerDetails {
            first_name: text("firstName", &self.first_name)?,
            last_name: text("lastName", &self.last_name)?,
            date_of_birth: self.date_of_birth,
            gender: self.gender.ok_or(BookingError::Incomplete { field: "gender" })?,
            citizenship: text("citizenship", &self.citizenship)?,
            passport_number: text("passportNumber", &self.passport_number)?,
            passport_expiry: self.passport_expiry,
        })
    }
}

#[derive(Error, Debug)]
pub enum ProxyClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Proxy returned {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// A rendered confirmation as delivered by the proxy
#[derive(Debug, Clone)]
pub struct ConfirmationDocument {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Client the screens use to call the proxy
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http_client: Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn cities(&self, term: &str) -> Result<Vec<City>, ProxyClientError> {
        let response = self
            .http_client
            .get(format!("{}/api/cities", self.base_url))
            .query(&[("term", term)])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<FareResults, ProxyClientError> {
        let response = self
            .http_client
            .post(format!("{}/api/search", self.base_url))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn generate_booking(
        &self,
        flight: &FlightOffer,
        passenger: &PassengerDetails,
    ) -> Result<ConfirmationDocument, ProxyClientError> {
        let response = self
            .http_client
            .post(format!("{}/api/generate-booking", self.base_url))
            .json(&json!({
                "flightDetails": flight,
                "passengerDetails": passenger,
            }))
            .send()
            .await?;
        let response = Self::check(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await?.to_vec();

        Ok(ConfirmationDocument { content_type, bytes })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProxyClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(ProxyClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
