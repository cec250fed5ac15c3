//! `NotaryClient` against a mock notary service.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use notary_core::api::{
    ApiError, FailureClass, LogPointer, NewSubmissionRequest, NotaryApi, NotaryClient,
    SubmissionStatus,
};
use notary_core::auth::{AUDIENCE, ApiKey, Claims};
use notary_core::transport::TransportConfig;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const PRIVATE_PEM: &str = include_str!("fixtures/ec_private.pem");
const PUBLIC_PEM: &str = include_str!("fixtures/ec_public.pem");
const ISSUER: &str = "69a6de70-03db-47e3-e053-5b8c7c11a4d1";
const KEY_ID: &str = "2X9R4HXF34";

fn client(server: &MockServer) -> NotaryClient {
    let key = ApiKey::new(ISSUER, KEY_ID, SecretString::from(PRIVATE_PEM.to_string())).unwrap();
    NotaryClient::new(key)
        .unwrap()
        .with_transport(TransportConfig::no_retry())
        .unwrap()
        .with_base_url(server.uri())
}

fn bearer(request: &Request) -> String {
    request
        .headers
        .get("authorization")
        .expect("request carries a bearer token")
        .to_str()
        .unwrap()
        .strip_prefix("Bearer ")
        .expect("bearer scheme")
        .to_string()
}

fn verify(token: &str) -> jsonwebtoken::TokenData<Claims> {
    let key = DecodingKey::from_ec_pem(PUBLIC_PEM.as_bytes()).unwrap();
    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_audience(&[AUDIENCE]);
    validation.set_issuer(&[ISSUER]);
    jsonwebtoken::decode::<Claims>(token, &key, &validation).unwrap()
}

#[tokio::test]
async fn submit_posts_request_with_signed_token() {
    let server = MockServer::start().await;
    let sha256 = "ab".repeat(32);
    Mock::given(method("POST"))
        .and(path("/notary/v2/submissions"))
        .and(header_exists("authorization"))
        .and(body_json(json!({
            "sha256": &sha256,
            "submissionName": "App.zip",
            "notifications": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "2efe2717-52ef-43a5-96dc-0797e4ca1041",
                "type": "newSubmissions",
                "attributes": {
                    "awsAccessKeyId": "ASIAEXAMPLE",
                    "awsSecretAccessKey": "secret",
                    "awsSessionToken": "session",
                    "bucket": "notary-submissions-prod",
                    "object": "prod/AQAAAAEAAAAA/App.zip"
                }
            },
            "meta": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .submit(&NewSubmissionRequest::new(&sha256, "App.zip"))
        .await
        .unwrap();
    let handle = response.into_handle().unwrap();
    assert_eq!(handle.id, "2efe2717-52ef-43a5-96dc-0797e4ca1041");
    assert_eq!(handle.upload_credentials.bucket, "notary-submissions-prod");

    let requests = server.received_requests().await.unwrap();
    let token = verify(&bearer(&requests[0]));
    assert_eq!(token.header.kid.as_deref(), Some(KEY_ID));
    assert_eq!(token.claims.exp - token.claims.iat, 600);
}

#[tokio::test]
async fn every_call_signs_a_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notary/v2/submissions/sub-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "sub-1", "type": "submissions", "attributes": {"status": "In Progress"}}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    client.get_status("sub-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    client.get_status("sub-1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let first = verify(&bearer(&requests[0]));
    let second = verify(&bearer(&requests[1]));
    assert!(second.claims.iat > first.claims.iat);
}

#[tokio::test]
async fn status_is_decoded_from_octet_stream_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notary/v2/submissions/sub-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                r#"{"data": {"id": "sub-1", "type": "submissions", "attributes": {
                    "createdDate": "2022-06-08T01:38:09.498Z", "name": "App.zip", "status": "Accepted"}}}"#,
                "application/octet-stream",
            ),
        )
        .mount(&server)
        .await;

    let report = client(&server).get_status("sub-1").await.unwrap();
    assert_eq!(report.id, "sub-1");
    assert_eq!(report.status, SubmissionStatus::Accepted);
    assert_eq!(report.name.as_deref(), Some("App.zip"));
}

#[tokio::test]
async fn structured_error_body_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notary/v2/submissions/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "name": "NotFound",
            "description": "There is no resource of type 'submissions' with id 'missing'"
        })))
        .mount(&server)
        .await;

    let error = client(&server).get_status("missing").await.unwrap_err();
    match &error {
        ApiError::Status {
            status: 404,
            error: Some(body),
            ..
        } => assert_eq!(body.name.as_deref(), Some("NotFound")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.failure_class(), FailureClass::Fatal);
}

#[tokio::test]
async fn server_error_is_classified_for_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = client(&server).get_status("sub-1").await.unwrap_err();
    assert_eq!(error.failure_class(), FailureClass::ServerError);
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let transport = TransportConfig {
        request_timeout: Duration::from_millis(200),
        ..TransportConfig::no_retry()
    };
    let client = client(&server).with_transport(transport).unwrap();

    let error = client.get_status("sub-1").await.unwrap_err();
    assert!(matches!(error, ApiError::Timeout { .. }), "{error:?}");
    assert_eq!(error.failure_class(), FailureClass::Timeout);
}

#[tokio::test]
async fn log_is_fetched_without_authorization() {
    let server = MockServer::start().await;
    let log_url = format!("{}/logs/sub-1.json?X-Amz-Signature=abc", server.uri());
    Mock::given(method("GET"))
        .and(path("/notary/v2/submissions/sub-1/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "sub-1", "type": "submissionsLog", "attributes": {"developerLogUrl": log_url}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs/sub-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            include_str!("fixtures/v1_logs_with_issues.json"),
            "binary/octet-stream",
        ))
        .mount(&server)
        .await;

    let client = client(&server);
    let pointer = client.get_log_pointer("sub-1").await.unwrap();
    assert_eq!(pointer.developer_log_url, log_url);

    let log = client.get_log("sub-1").await.unwrap();
    assert_eq!(log.status(), Some(SubmissionStatus::Invalid));

    let requests = server.received_requests().await.unwrap();
    let log_request = requests
        .iter()
        .find(|request| request.url.path() == "/logs/sub-1.json")
        .unwrap();
    assert!(log_request.headers.get("authorization").is_none());
}

#[tokio::test]
async fn missing_log_url_is_a_contract_violation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notary/v2/submissions/sub-1/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "sub-1", "type": "submissionsLog", "attributes": {}}
        })))
        .mount(&server)
        .await;

    let error = client(&server).get_log("sub-1").await.unwrap_err();
    assert!(matches!(
        error,
        ApiError::MissingField(field) if field.field == "data.attributes.developerLogUrl"
    ));
}

#[tokio::test]
async fn unsupported_log_version_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs/v2.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(include_str!("fixtures/v2_logs.json"), "application/json"),
        )
        .mount(&server)
        .await;

    let pointer = LogPointer {
        developer_log_url: format!("{}/logs/v2.json", server.uri()),
    };
    let error = client(&server).fetch_log(&pointer).await.unwrap_err();
    assert!(matches!(
        error,
        ApiError::Decode {
            what: "log document",
            ..
        }
    ));
}

#[tokio::test]
async fn lists_previous_submissions_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notary/v2/submissions"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "b", "type": "submissions", "attributes": {"createdDate": "2022-06-08T01:38:09.498Z", "name": "b.zip", "status": "Rejected"}},
                {"id": "a", "type": "submissions", "attributes": {"createdDate": "2022-06-07T01:38:09.498Z", "name": "a.dmg"}}
            ],
            "meta": {}
        })))
        .mount(&server)
        .await;

    let summaries = client(&server).list_previous_submissions().await.unwrap();
    let ids: Vec<&str> = summaries.iter().map(|summary| summary.id.as_str()).collect();
    assert_eq!(ids, ["b", "a"]);
    assert_eq!(summaries[0].status, SubmissionStatus::Rejected);
    assert_eq!(summaries[1].status, SubmissionStatus::Unknown);
}

#[tokio::test]
async fn transport_retries_server_errors_before_surfacing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let transport = TransportConfig {
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        ..TransportConfig::default()
    };
    let client = client(&server).with_transport(transport).unwrap();

    let error = client.list_previous_submissions().await.unwrap_err();
    assert_eq!(error.status_code(), Some(502));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
