//! Integration tests for rust-fares
//!
//! The pricing provider is replaced by a stub: either an axum server on an
//! ephemeral port (for the real HTTP client) or an in-process `FareProvider`
//! (for the proxy router).

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    routing::get,
    Json, Router,
};
use rust_fares::{
    app,
    server::cors_layer,
    ui::{CityAutocomplete, PassengerAction, PassengerForm, ProxyClient, ProxyClientError, SearchAction, SearchForm},
    AppState, City, FareProvider, FareResults, Gender, PricingClient, ProviderConfig,
    ProviderError, SearchRequest,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Stub upstream provider served over HTTP
// ---------------------------------------------------------------------------

struct Upstream {
    cities: Value,
    fares: Value,
    fares_status: StatusCode,
    delay: Duration,
    city_hits: AtomicUsize,
    fare_hits: AtomicUsize,
    last_fare_query: Mutex<Option<HashMap<String, String>>>,
}

impl Upstream {
    fn new() -> Self {
        Self {
            cities: json!([
                {"code": "LON", "name": "London", "country_code": "GB", "time_zone": "Europe/London"},
                {"code": "PAR", "name": "Paris", "country_code": "FR"},
                {"code": "LAX", "name": "Los Angeles", "country_code": "US"},
                {"code": "XLO", "name": null, "country_code": null},
                {"code": "ELN", "name": "Ellensburg", "country_code": "US"},
                {"code": "LOD", "name": "Longana", "country_code": "VU"},
                {"code": "LDN", "name": "Lamidanda", "country_code": "NP"},
                {"code": "YXU", "name": "London (Ontario)", "country_code": "CA"},
                {"code": "SLO", "name": "Salem", "country_code": "US"}
            ]),
            fares: cheap_prices_payload(),
            fares_status: StatusCode::OK,
            delay: Duration::ZERO,
            city_hits: AtomicUsize::new(0),
            fare_hits: AtomicUsize::new(0),
            last_fare_query: Mutex::new(None),
        }
    }
}

fn cheap_prices_payload() -> Value {
    json!({
        "success": true,
        "currency": "USD",
        "data": {
            "PAR": {
                "0": {"price": 99, "airline": "AF", "flight_number": 1081, "departure_at": "2025-08-15T06:00:00Z", "return_at": "2025-08-22T18:00:00Z"},
                "1": {"price": 140, "airline": "BA", "flight_number": 304, "departure_at": "2025-08-15T09:00:00Z", "return_at": "2025-08-22T20:00:00Z"}
            }
        }
    })
}

async fn upstream_cities(State(upstream): State<Arc<Upstream>>) -> Json<Value> {
    upstream.city_hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(upstream.delay).await;
    Json(upstream.cities.clone())
}

async fn upstream_cheap(
    State(upstream): State<Arc<Upstream>>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    upstream.fare_hits.fetch_add(1, Ordering::SeqCst);
    *upstream.last_fare_query.lock().unwrap() = Some(query);
    tokio::time::sleep(upstream.delay).await;
    (upstream.fares_status, Json(upstream.fares.clone()))
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_upstream(upstream: Upstream) -> (String, Arc<Upstream>) {
    let upstream = Arc::new(upstream);
    let router = Router::new()
        .route("/data/en/cities.json", get(upstream_cities))
        .route("/v1/prices/cheap", get(upstream_cheap))
        .with_state(upstream.clone());
    (spawn(router).await, upstream)
}

fn pricing_client(base_url: &str, timeout: Duration) -> PricingClient {
    let mut config = ProviderConfig::new("test-token", "4242")
        .with_base_url(base_url)
        .with_timeout(timeout);
    config.host = Some("https://fares.example".to_string());
    PricingClient::new(config).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn search_request() -> SearchRequest {
    SearchRequest {
        origin: "LON".to_string(),
        destination: "PAR".to_string(),
        depart_date: date(2025, 8, 15),
        return_date: Some(date(2025, 8, 22)),
        adults: 1,
    }
}

// ---------------------------------------------------------------------------
// Pricing client against the HTTP stub
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lookup_cities_scenario() {
    let mut upstream = Upstream::new();
    upstream.cities = json!([
        {"code": "LON", "name": "London"},
        {"code": "PAR", "name": "Paris"}
    ]);
    let (base_url, _) = spawn_upstream(upstream).await;
    let client = pricing_client(&base_url, Duration::from_secs(5));

    let cities = client.lookup_cities("Lon").await.unwrap();
    assert_eq!(
        cities,
        vec![City {
            code: "LON".to_string(),
            name: "London".to_string(),
            country_code: String::new(),
        }]
    );
}

#[tokio::test]
async fn test_lookup_cities_bounded_and_matching() {
    let (base_url, upstream) = spawn_upstream(Upstream::new()).await;
    let client = pricing_client(&base_url, Duration::from_secs(5));

    for term in ["lo", "LON", "an", "x", "Paris", "zzz"] {
        let cities = client.lookup_cities(term).await.unwrap();
        assert!(cities.len() <= 5, "too many results for {}", term);
        let needle = term.to_lowercase();
        for city in &cities {
            assert!(
                city.name.to_lowercase().contains(&needle) || city.code.to_lowercase().contains(&needle),
                "{:?} does not match {}",
                city,
                term
            );
        }
    }

    // "lo" matches six entries; the first five in provider order come back
    let codes: Vec<String> = client
        .lookup_cities("lo")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.code)
        .collect();
    assert_eq!(codes, vec!["LON", "LAX", "XLO", "LOD", "YXU"]);

    let hits_before = upstream.city_hits.load(Ordering::SeqCst);
    assert_eq!(client.lookup_cities("").await.unwrap(), Vec::<City>::new());
    assert_eq!(upstream.city_hits.load(Ordering::SeqCst), hits_before);
}

#[tokio::test]
async fn test_search_fares_forwards_contract_and_is_idempotent() {
    let (base_url, upstream) = spawn_upstream(Upstream::new()).await;
    let client = pricing_client(&base_url, Duration::from_secs(5));

    let first = client.search_fares(&search_request()).await.unwrap();
    let second = client.search_fares(&search_request()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_value(), &cheap_prices_payload());
    assert_eq!(upstream.fare_hits.load(Ordering::SeqCst), 2);

    let query = upstream.last_fare_query.lock().unwrap().clone().unwrap();
    assert_eq!(query["origin"], "LON");
    assert_eq!(query["destination"], "PAR");
    assert_eq!(query["depart_date"], "2025-08-15");
    assert_eq!(query["return_date"], "2025-08-22");
    assert_eq!(query["token"], "test-token");
    assert_eq!(query["marker"], "4242");
    assert_eq!(query["limit"], "30");
    assert_eq!(query["sorting"], "price");
    assert_eq!(query["host"], "https://fares.example");
}

#[tokio::test]
async fn test_search_fares_upstream_status() {
    let mut upstream = Upstream::new();
    upstream.fares_status = StatusCode::BAD_GATEWAY;
    let (base_url, _) = spawn_upstream(upstream).await;
    let client = pricing_client(&base_url, Duration::from_secs(5));

    let err = client.search_fares(&search_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Status(502)), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_search_fares_reported_failure() {
    let mut upstream = Upstream::new();
    upstream.fares = json!({"success": false, "error": "Unauthorized", "data": {}});
    let (base_url, _) = spawn_upstream(upstream).await;
    let client = pricing_client(&base_url, Duration::from_secs(5));

    let err = client.search_fares(&search_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_provider_timeout() {
    let mut upstream = Upstream::new();
    upstream.delay = Duration::from_secs(2);
    let (base_url, _) = spawn_upstream(upstream).await;
    let client = pricing_client(&base_url, Duration::from_millis(200));

    let err = client.lookup_cities("Lon").await.unwrap_err();
    assert!(matches!(err, ProviderError::Timeout), "unexpected error: {}", err);

    let err = client.search_fares(&search_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Timeout), "unexpected error: {}", err);
}

// ---------------------------------------------------------------------------
// Proxy router against an in-process provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StubProvider {
    fail: bool,
    city_calls: AtomicUsize,
    fare_calls: AtomicUsize,
}

#[async_trait]
impl FareProvider for StubProvider {
    async fn lookup_cities(&self, term: &str) -> Result<Vec<City>, ProviderError> {
        self.city_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Timeout);
        }
        Ok(vec![City {
            code: "LON".to_string(),
            name: format!("London ({})", term),
            country_code: "GB".to_string(),
        }])
    }

    async fn search_fares(&self, _request: &SearchRequest) -> Result<FareResults, ProviderError> {
        self.fare_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Malformed("secret upstream detail".to_string()));
        }
        Ok(FareResults::new(cheap_prices_payload()))
    }
}

fn router(provider: Arc<StubProvider>) -> Router {
    app(AppState::new(provider), cors_layer(None).unwrap())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_uri(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn booking_body() -> Value {
    json!({
        "flightDetails": {
            "origin": "LON",
            "destination": "PAR",
            "departure_at": "2025-08-15T06:00:00Z",
            "price": 99,
            "currency": "USD"
        },
        "passengerDetails": {
            "firstName": "Ada",
            "lastName": "Lovelace",
            "dateOfBirth": "1990-12-10",
            "gender": "female",
            "citizenship": "GB",
            "passportNumber": "123456789",
            "passportExpiry": "2030-01-01"
        }
    })
}

#[tokio::test]
async fn test_cities_endpoint() {
    let provider = Arc::new(StubProvider::default());

    let response = router(provider.clone()).oneshot(get_uri("/api/cities?term=Lon")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["code"], "LON");
    assert_eq!(body[0]["name"], "London (Lon)");

    // absent and empty terms never reach the provider
    for uri in ["/api/cities", "/api/cities?term="] {
        let response = router(provider.clone()).oneshot(get_uri(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }
    assert_eq!(provider.city_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cities_endpoint_provider_failure() {
    let provider = Arc::new(StubProvider {
        fail: true,
        ..Default::default()
    });

    let response = router(provider).oneshot(get_uri("/api/cities?term=Lon")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({"error": "Failed to fetch cities"}));
}

#[tokio::test]
async fn test_search_endpoint_relays_payload() {
    let provider = Arc::new(StubProvider::default());
    let body = json!({
        "origin": "LON",
        "destination": "PAR",
        "departDate": "2025-08-15",
        "returnDate": "2025-08-22",
        "adults": 1
    });

    let response = router(provider.clone())
        .oneshot(post_json("/api/search", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, cheap_prices_payload());
    assert_eq!(provider.fare_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_search_endpoint_missing_origin() {
    let provider = Arc::new(StubProvider::default());
    let body = json!({"destination": "PAR", "departDate": "2025-08-15", "adults": 1});

    let response = router(provider.clone())
        .oneshot(post_json("/api/search", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Missing required field: origin"})
    );
    assert_eq!(provider.fare_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_endpoint_malformed_body() {
    let provider = Arc::new(StubProvider::default());

    let response = router(provider.clone())
        .oneshot(post_json("/api/search", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "Invalid request body"}));
    assert_eq!(provider.fare_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_endpoint_provider_failure_then_recovery() {
    let failing = Arc::new(StubProvider {
        fail: true,
        ..Default::default()
    });
    let body = json!({"origin": "LON", "destination": "PAR", "departDate": "2025-08-15"}).to_string();

    let router = router(failing);
    let response = router.clone().oneshot(post_json("/api/search", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error_body = body_json(response).await;
    assert_eq!(error_body, json!({"error": "Failed to search flights"}));
    assert!(!error_body.to_string().contains("secret upstream detail"));

    // the service keeps answering after a failure
    let response = router.oneshot(get_uri("/api/cities?term=")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_generate_booking_endpoint() {
    let provider = Arc::new(StubProvider::default());
    let body = booking_body().to_string();

    let first = router(provider.clone())
        .oneshot(post_json("/api/generate-booking", &body))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        first.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"booking-confirmation.txt\""
    );
    let first = body_bytes(first).await;

    let second = router(provider)
        .oneshot(post_json("/api/generate-booking", &body))
        .await
        .unwrap();
    assert_eq!(first, body_bytes(second).await);

    let text = String::from_utf8(first).unwrap();
    assert!(text.contains("From: LON"));
    assert!(text.contains("Price: 99 USD"));
    assert!(text.contains("Name: Ada Lovelace"));
    assert!(text.contains("Passport: 123456789"));
}

#[tokio::test]
async fn test_generate_booking_incomplete() {
    let provider = Arc::new(StubProvider::default());

    let mut body = booking_body();
    body["passengerDetails"]["lastName"] = json!("");
    let response = router(provider.clone())
        .oneshot(post_json("/api/generate-booking", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Incomplete booking: missing lastName"})
    );

    let mut body = booking_body();
    body["flightDetails"] = Value::Null;
    let response = router(provider)
        .oneshot(post_json("/api/generate-booking", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Incomplete booking: missing flightDetails"})
    );
}

#[tokio::test]
async fn test_generate_booking_unfilled_form_fields() {
    let provider = Arc::new(StubProvider::default());
    let cases = [
        ("gender", json!(""), "Incomplete booking: missing gender"),
        ("gender", Value::Null, "Incomplete booking: missing gender"),
        ("dateOfBirth", json!(""), "Incomplete booking: missing dateOfBirth"),
        ("passportExpiry", json!("  "), "Incomplete booking: missing passportExpiry"),
        ("gender", json!("unknown"), "Invalid booking: gender is not valid"),
    ];

    for (field, value, expected) in cases {
        let mut body = booking_body();
        body["passengerDetails"][field] = value;
        let response = router(provider.clone())
            .oneshot(post_json("/api/generate-booking", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", field);
        assert_eq!(body_json(response).await, json!({"error": expected}));
    }

    // a missing key reads the same as a blank one
    let mut body = booking_body();
    body["passengerDetails"].as_object_mut().unwrap().remove("gender");
    let response = router(provider)
        .oneshot(post_json("/api/generate-booking", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"error": "Incomplete booking: missing gender"})
    );
}

#[tokio::test]
async fn test_generate_booking_malformed_body() {
    let response = router(Arc::new(StubProvider::default()))
        .oneshot(post_json("/api/generate-booking", "{\"flightDetails\": "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "Invalid request body"}));
}

// ---------------------------------------------------------------------------
// Full pipeline: UI state -> proxy over HTTP -> pricing client -> stub provider
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_to_end_search_and_booking() {
    let (provider_url, upstream) = spawn_upstream(Upstream::new()).await;
    let client = pricing_client(&provider_url, Duration::from_secs(5));
    let proxy_url = spawn(app(AppState::new(Arc::new(client)), cors_layer(None).unwrap())).await;
    let proxy = ProxyClient::new(proxy_url);

    // autocomplete the origin
    let mut autocomplete = CityAutocomplete::new();
    let ticket = autocomplete.begin("Lon").unwrap();
    let result = proxy.cities(&ticket.term).await;
    assert!(autocomplete.complete(&ticket, result));
    let london = autocomplete.suggestions()[0].clone();
    assert_eq!(london.code, "LON");

    let form = SearchForm::new(date(2025, 8, 15))
        .reduce(SearchAction::ChooseOrigin(london))
        .reduce(SearchAction::SetDestination("PAR".to_string()));
    let request = assert_ok!(form.to_request());

    let results = assert_ok!(proxy.search(&request).await);
    assert_eq!(upstream.fare_hits.load(Ordering::SeqCst), 1);
    let offers = results.offers(&request.origin);
    assert_eq!(offers.len(), 2);

    let passenger = PassengerForm::new(date(2025, 8, 1))
        .reduce(PassengerAction::SetFirstName("Ada".to_string()))
        .reduce(PassengerAction::SetLastName("Lovelace".to_string()))
        .reduce(PassengerAction::SetGender(Gender::Female))
        .reduce(PassengerAction::SetCitizenship("GB".to_string()))
        .reduce(PassengerAction::SetPassportNumber("123456789".to_string()))
        .submit()
        .unwrap();

    let document = assert_ok!(proxy.generate_booking(&offers[0], &passenger).await);
    assert_eq!(document.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    let text = String::from_utf8(document.bytes).unwrap();
    assert!(text.contains("From: LON"));
    assert!(text.contains("To: PAR"));
    assert!(text.contains("Price: 99 USD"));
    assert!(text.contains("Flight: AF 1081"));

    // missing origin is rejected by the proxy before reaching the provider
    let mut bad = request.clone();
    bad.origin = String::new();
    let err = assert_err!(proxy.search(&bad).await);
    match err {
        ProxyClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Missing required field: origin");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(upstream.fare_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_end_to_end_provider_down() {
    // nothing listens on the provider address
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = pricing_client(&dead_url, Duration::from_secs(2));
    let proxy_url = spawn(app(AppState::new(Arc::new(client)), cors_layer(None).unwrap())).await;
    let proxy = ProxyClient::new(proxy_url);

    let mut autocomplete = CityAutocomplete::new();
    let ticket = autocomplete.begin("Lon").unwrap();
    let result = proxy.cities(&ticket.term).await;
    assert!(matches!(
        result,
        Err(ProxyClientError::Api { status: 500, ref message }) if message == "Failed to fetch cities"
    ));
    // the screen shows no suggestions rather than an error
    assert!(autocomplete.complete(&ticket, result));
    assert!(autocomplete.suggestions().is_empty());

    let err = proxy.search(&search_request()).await.unwrap_err();
    assert!(matches!(
        err,
        ProxyClientError::Api { status: 500, ref message } if message == "Failed to search flights"
    ));
}
