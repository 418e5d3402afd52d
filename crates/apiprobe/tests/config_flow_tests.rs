//! YAML configuration to page object, end to end.

use apiprobe::{
    ClientFactory, ConfigResolver, DEFAULT_ENV, Environment, ErrorKind, HttpPage, PageObject,
    Protocol, ProtocolClient, RawConfig, ResultKind, SessionState, normalize, run_scoped,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_yaml(base_url: &str) -> String {
    format!(
        r#"
http:
  default:
    base_url: http://localhost:1
    timeout: 5
    headers:
      X-Team: qa
  test:
    base_url: {base_url}
    headers:
      X-Env: test
zmq:
  default:
    host: localhost
    port: 5555
tcp:
  default:
    host: localhost
    port: 9000
    framing: delimited
"#
    )
}

#[tokio::test]
async fn test_yaml_to_page_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/7"))
        .and(header("x-team", "qa"))
        .and(header("x-env", "test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let raw = assert_ok!(RawConfig::from_yaml_str(&config_yaml(&server.uri())));
    let environment = Environment::new("test");
    let descriptor = assert_ok!(ConfigResolver::new(raw).resolve("http", environment.as_str()));
    assert_eq!(descriptor.timeout().as_secs(), 5);

    let client = assert_ok!(ClientFactory::new().create("http", descriptor));
    let mut page = assert_ok!(HttpPage::new(client));

    let user = run_scoped(&mut page, |page| {
        Box::pin(async move { page.get_user_info("7").await })
    })
    .await;
    let user = assert_ok!(user);
    assert_eq!(user.field("id"), Some(&json!(7)));
    assert_eq!(page.client().state(), SessionState::Closed);
}

#[tokio::test]
async fn test_resolve_all_builds_every_client() {
    let raw = assert_ok!(RawConfig::from_yaml_str(&config_yaml("http://localhost:8080")));
    let descriptors = assert_ok!(ConfigResolver::new(raw).resolve_all(DEFAULT_ENV));
    assert_eq!(descriptors.len(), 3);

    let factory = ClientFactory::new();
    for descriptor in descriptors {
        let protocol = descriptor.protocol();
        let client = assert_ok!(factory.create_for(descriptor));
        assert_eq!(client.protocol(), protocol);
        assert!(!client.is_healthy());
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_normalizes_to_transport_error() {
    let raw = assert_ok!(RawConfig::from_yaml_str(&config_yaml("http://localhost:8080")));
    let descriptor = assert_ok!(ConfigResolver::new(raw).resolve("http", DEFAULT_ENV));
    let mut page = assert_ok!(HttpPage::new(assert_ok!(
        ClientFactory::new().create_for(descriptor)
    )));

    let result = run_scoped(&mut page, |page| {
        Box::pin(async move { page.get_user_info("1").await })
    })
    .await;
    let err = assert_err!(result.clone());
    assert_eq!(err.kind, ErrorKind::Connect);

    let response = normalize(Protocol::Http, result);
    assert_eq!(response.kind(), ResultKind::TransportError);
    assert!(response.error().is_some());
}

#[test]
fn test_unknown_environment_is_config_error() {
    let raw = assert_ok!(RawConfig::from_yaml_str(&config_yaml("http://localhost:8080")));
    let err = assert_err!(ConfigResolver::new(raw).resolve("tcp", "production"));
    assert_eq!(err.kind, ErrorKind::Config);
}
