mod common;

use expense_settlement::application::payment::PaymentClient;
use expense_settlement::application::workflow;
use expense_settlement::domain::expense::{ExpenseId, ExpenseStatus};
use expense_settlement::domain::ports::{PaymentGateway, PaymentOutcome, PaymentRequest};
use expense_settlement::domain::rules::RuleConfig;
use expense_settlement::error::GatewayError;
use expense_settlement::infrastructure::http_gateway::{HttpPaymentGateway, PaymentConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpPaymentGateway {
    gateway_with(server, PaymentConfig::default())
}

fn gateway_with(server: &MockServer, config: PaymentConfig) -> HttpPaymentGateway {
    HttpPaymentGateway::new(PaymentConfig {
        base_url: Some(server.uri()),
        ..config
    })
    .unwrap()
}

fn request(external_id: &str) -> PaymentRequest {
    PaymentRequest {
        amount: 20_000,
        external_id: external_id.to_string(),
    }
}

fn duplicate() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "data": null,
        "message": "external id already exists"
    }))
}

#[tokio::test]
async fn test_accepted_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"amount": 20000, "external_id": "ext-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": "pay_1", "external_id": "ext-1", "status": "COMPLETED"},
            "message": "payment created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = gateway(&server).create_payment(&request("ext-1")).await.unwrap();

    assert_eq!(
        outcome,
        PaymentOutcome::Paid {
            reference: Some("pay_1".to_string()),
            status: Some("COMPLETED".to_string()),
        }
    );
}

#[tokio::test]
async fn test_duplicate_external_id_is_already_paid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(duplicate())
        .mount(&server)
        .await;

    let outcome = gateway(&server).create_payment(&request("ext-1")).await.unwrap();

    assert_eq!(outcome, PaymentOutcome::AlreadyPaid);
}

#[tokio::test]
async fn test_same_expense_paid_twice_completes_both_times() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "pay_1", "status": "COMPLETED"},
            "message": "ok"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(duplicate())
        .mount(&server)
        .await;

    let expense = workflow::submit(&RuleConfig::default(), common::expense_input(20_000))
        .unwrap()
        .into_expense(ExpenseId(1));
    let client = PaymentClient::new(Arc::new(gateway(&server)));

    let first = client.settle(&expense).await.unwrap();
    let second = client.settle(&expense).await.unwrap();

    assert_eq!(first.status, ExpenseStatus::Completed);
    assert_eq!(second.status, ExpenseStatus::Completed);
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].body, received[1].body);
}

#[tokio::test]
async fn test_other_client_errors_are_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "amount must be positive"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .create_payment(&request("ext-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Rejected { status: 400, ref message } if message == "amount must be positive"
    ));
}

#[tokio::test]
async fn test_server_error_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "external id already exists"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .create_payment(&request("ext-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Rejected { status: 500, .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .create_payment(&request("ext-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn test_slow_processor_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"id": "pay_1"}, "message": "ok"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let gateway = gateway_with(
        &server,
        PaymentConfig {
            timeout: Duration::from_millis(50),
            ..PaymentConfig::default()
        },
    );
    let err = gateway.create_payment(&request("ext-1")).await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport(ref source) if source.is_timeout()));
}

#[tokio::test]
async fn test_duplicate_contract_is_configurable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate payment"
        })))
        .mount(&server)
        .await;

    let default_contract = gateway(&server).create_payment(&request("ext-1")).await;
    assert!(matches!(
        default_contract,
        Err(GatewayError::Rejected { status: 409, .. })
    ));

    let custom = gateway_with(
        &server,
        PaymentConfig {
            duplicate_status: 409,
            duplicate_message: "duplicate payment".to_string(),
            ..PaymentConfig::default()
        },
    );
    let outcome = custom.create_payment(&request("ext-1")).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::AlreadyPaid);
}

#[tokio::test]
async fn test_missing_base_url() {
    let gateway = HttpPaymentGateway::new(PaymentConfig::default()).unwrap();

    let err = gateway.create_payment(&request("ext-1")).await.unwrap_err();

    assert!(matches!(err, GatewayError::NotConfigured));
}
