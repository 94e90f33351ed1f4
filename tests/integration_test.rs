//! Integration tests for the zentinel-soap-dispatch crate.
//!
//! These tests drive the axum router end-to-end: HTTP request in, SOAP
//! envelope out, with routing, decoding and fault reporting in between.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;
use zentinel_soap_dispatch::config::{SettingsConfig, SoapServerConfig, SoapVersion};
use zentinel_soap_dispatch::{
    Context, EmptyHeader, Envelope, EnvelopeView, Fault, FaultCode, HandlerError, RouteRegistry,
    SoapServer,
};

const SOAP_11_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

// ============================================================================
// Fixtures: the fooRequest service
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct FooHeaderRequest {
    #[serde(rename = "Security", default)]
    security: Security,
}

#[derive(Debug, Default, Deserialize)]
struct Security {
    #[serde(rename = "UsernameToken", default)]
    username_token: UsernameToken,
}

#[derive(Debug, Default, Deserialize)]
struct UsernameToken {
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Password", default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct FooRequest {
    #[serde(rename = "Foo")]
    foo: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "fooResponse")]
struct FooResponse {
    #[serde(rename = "Bar")]
    bar: String,
}

fn foo_registry(calls: Arc<AtomicUsize>) -> RouteRegistry {
    let mut registry = RouteRegistry::new();
    registry
        .register(
            "/pathTo",
            "testPostAction",
            "fooRequest",
            move |_ctx: Context, header: FooHeaderRequest, request: FooRequest| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(FooResponse {
                        bar: format!(
                            "Hello {} \"{}\"",
                            header.security.username_token.username, request.foo
                        ),
                    })
                }
            },
        )
        .unwrap();
    registry
}

fn router_with(registry: RouteRegistry, config: SoapServerConfig) -> Router {
    SoapServer::new(config, registry).router()
}

fn foo_router(calls: Arc<AtomicUsize>) -> Router {
    router_with(foo_registry(calls), SoapServerConfig::default())
}

async fn post(app: Router, content_type: &str, action: Option<&str>, body: &str) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/pathTo")
        .header("content-type", content_type);
    if let Some(action) = action {
        builder = builder.header("SOAPAction", action);
    }
    let response = app
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn fault_of(body: &[u8]) -> Fault {
    EnvelopeView::parse(body)
        .unwrap()
        .fault()
        .unwrap()
        .expect("response should carry a fault")
}

const FOO_REQUEST: &str = r#"<soapenv:Envelope
	xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
	xmlns:ser="http://service.recaudosdavivienda.com/">
	<Header xmlns="http://schemas.xmlsoap.org/soap/envelope/">
		<Security>
			<UsernameToken>
				<Username>juliocesar</Username>
				<Password>PASSWORD</Password>
			</UsernameToken>
		</Security>
	</Header>
	<soapenv:Body>
        <ser:fooRequest>
            <Foo>i am foo</Foo>
        </ser:fooRequest>
    </soapenv:Body>
</soapenv:Envelope>"#;

fn unmatched_request(element: &str) -> String {
    format!(
        r#"<SOAP:Envelope xmlns:SOAP="http://schemas.xmlsoap.org/soap/envelope/">
    <Header xmlns="http://schemas.xmlsoap.org/soap/envelope/"></Header>
    <Body xmlns="http://schemas.xmlsoap.org/soap/envelope/">
        <{0}>
            <Foo>i am foo</Foo>
        </{0}>
    </Body>
</SOAP:Envelope>"#,
        element
    )
}

// ============================================================================
// End-to-end: routed requests
// ============================================================================

#[tokio::test]
async fn test_request_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (status, body) = post(
        foo_router(Arc::clone(&calls)),
        SOAP_11_CONTENT_TYPE,
        Some("testPostAction"),
        FOO_REQUEST,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let envelope: Envelope<EmptyHeader, FooResponse> = Envelope::decode(&body).unwrap();
    assert_eq!(
        envelope.body.into_result().unwrap().bar,
        "Hello juliocesar \"i am foo\""
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_quoted_soap_action() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_, body) = post(
        foo_router(Arc::clone(&calls)),
        SOAP_11_CONTENT_TYPE,
        Some("\"testPostAction\""),
        FOO_REQUEST,
    )
    .await;

    let envelope: Envelope<EmptyHeader, FooResponse> = Envelope::decode(&body).unwrap();
    assert!(envelope.body.content().is_some());
}

#[tokio::test]
async fn test_path_is_not_used_for_routing() {
    let app = foo_router(Arc::new(AtomicUsize::new(0)));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/somewhere/else")
                .header("content-type", SOAP_11_CONTENT_TYPE)
                .header("SOAPAction", "testPostAction")
                .body(Body::from(FOO_REQUEST))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let envelope: Envelope<EmptyHeader, FooResponse> = Envelope::decode(&bytes).unwrap();
    assert_eq!(
        envelope.body.into_result().unwrap().bar,
        "Hello juliocesar \"i am foo\""
    );
}

#[tokio::test]
async fn test_missing_header_reaches_handler_as_default() {
    let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body><fooRequest><Foo>anonymous</Foo></fooRequest></s:Body>
</s:Envelope>"#;
    let (_, body) = post(
        foo_router(Arc::new(AtomicUsize::new(0))),
        SOAP_11_CONTENT_TYPE,
        Some("testPostAction"),
        xml,
    )
    .await;

    let envelope: Envelope<EmptyHeader, FooResponse> = Envelope::decode(&body).unwrap();
    assert_eq!(envelope.body.into_result().unwrap().bar, "Hello  \"anonymous\"");
}

#[tokio::test]
async fn test_soap_12_round_trip() {
    let mut registry = RouteRegistry::new();
    registry
        .register(
            "/users",
            "urn:GetUser",
            "GetUser",
            |ctx: Context, _header: EmptyHeader, body: GetUser| async move {
                Ok::<_, HandlerError>(GetUserResponse {
                    id: body.id,
                    action: ctx.action().to_string(),
                })
            },
        )
        .unwrap();

    let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body><u:GetUser xmlns:u="urn:users"><u:Id>7</u:Id></u:GetUser></env:Body>
</env:Envelope>"#;
    let (status, body) = post(
        router_with(registry, SoapServerConfig::default()),
        "application/soap+xml; charset=utf-8; action=\"urn:GetUser\"",
        None,
        xml,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let view = EnvelopeView::parse(&body).unwrap();
    assert_eq!(view.version(), SoapVersion::Soap12);
    let response: GetUserResponse = view.decode_body().unwrap();
    assert_eq!(
        response,
        GetUserResponse {
            id: 7,
            action: "urn:GetUser".to_string()
        }
    );
}

#[derive(Debug, Deserialize)]
struct GetUser {
    #[serde(rename = "Id")]
    id: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "GetUserResponse")]
struct GetUserResponse {
    #[serde(rename = "Id")]
    id: u32,
    #[serde(rename = "Action")]
    action: String,
}

// ============================================================================
// End-to-end: faults
// ============================================================================

#[tokio::test]
async fn test_request_failed_no_handler() {
    for element in ["barRequest", "bazRequest"] {
        let calls = Arc::new(AtomicUsize::new(0));
        let (status, body) = post(
            foo_router(Arc::clone(&calls)),
            SOAP_11_CONTENT_TYPE,
            Some("testPostAction"),
            &unmatched_request(element),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let fault = fault_of(&body);
        assert_eq!(
            fault.string,
            format!("no action handler for content type: \"{}\"", element)
        );
        assert_eq!(fault.code, FaultCode::Client);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_unknown_action_faults() {
    let (_, body) = post(
        foo_router(Arc::new(AtomicUsize::new(0))),
        SOAP_11_CONTENT_TYPE,
        Some("otherAction"),
        FOO_REQUEST,
    )
    .await;

    assert_eq!(
        fault_of(&body).string,
        "no action handler for content type: \"fooRequest\""
    );
}

#[tokio::test]
async fn test_malformed_xml_yields_fault_envelope() {
    let payloads = [
        "",
        "not xml at all",
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body><fooRequest>",
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body></soap:Envelope>",
        "<Envelope><Body><fooRequest/></Body></Envelope>",
    ];

    for payload in payloads {
        let (status, body) = post(
            foo_router(Arc::new(AtomicUsize::new(0))),
            SOAP_11_CONTENT_TYPE,
            Some("testPostAction"),
            payload,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let fault = fault_of(&body);
        assert!(
            fault.string.starts_with("malformed envelope: "),
            "payload {:?} gave {:?}",
            payload,
            fault.string
        );
    }
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let (status, body) = post(
        foo_router(Arc::new(AtomicUsize::new(0))),
        "application/json",
        Some("testPostAction"),
        FOO_REQUEST,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let fault = fault_of(&body);
    assert_eq!(fault.string, "unsupported content type: \"application/json\"");
}

#[tokio::test]
async fn test_invalid_payload() {
    let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body><fooRequest><Bar>no foo here</Bar></fooRequest></s:Body>
</s:Envelope>"#;
    let calls = Arc::new(AtomicUsize::new(0));
    let (_, body) = post(
        foo_router(Arc::clone(&calls)),
        SOAP_11_CONTENT_TYPE,
        Some("testPostAction"),
        xml,
    )
    .await;

    let fault = fault_of(&body);
    assert!(fault.string.starts_with("invalid request payload: "));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handler_error_and_panic() {
    let mut registry = RouteRegistry::new();
    registry
        .register(
            "/",
            "fail",
            "Fail",
            |_ctx: Context, _header: EmptyHeader, _body: EmptyHeader| async move {
                Err::<FooResponse, HandlerError>("backend unavailable".into())
            },
        )
        .unwrap()
        .register(
            "/",
            "fail",
            "Explode",
            |_ctx: Context, _header: EmptyHeader, _body: EmptyHeader| async move {
                let values: Vec<u32> = Vec::new();
                Ok::<_, HandlerError>(FooResponse {
                    bar: values[3].to_string(),
                })
            },
        )
        .unwrap();
    let app = router_with(registry, SoapServerConfig::default());
    let envelope = |element: &str| {
        format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><{}/></s:Body></s:Envelope>"#,
            element
        )
    };

    let (_, body) = post(app.clone(), SOAP_11_CONTENT_TYPE, Some("fail"), &envelope("Fail")).await;
    let fault = fault_of(&body);
    assert_eq!(fault.string, "backend unavailable");
    assert_eq!(fault.code, FaultCode::Server);

    let (status, body) = post(app.clone(), SOAP_11_CONTENT_TYPE, Some("fail"), &envelope("Explode")).await;
    assert_eq!(status, StatusCode::OK);
    let fault = fault_of(&body);
    assert!(fault.string.starts_with("handler panicked: "));

    // The router keeps serving after a panic.
    let (_, body) = post(app, SOAP_11_CONTENT_TYPE, Some("fail"), &envelope("Fail")).await;
    assert_eq!(fault_of(&body).string, "backend unavailable");
}

#[tokio::test]
async fn test_oversized_body_faults() {
    let config = SoapServerConfig {
        settings: SettingsConfig {
            max_body_size: 64,
            ..SettingsConfig::default()
        },
        ..SoapServerConfig::default()
    };
    let (status, body) = post(
        router_with(foo_registry(Arc::new(AtomicUsize::new(0))), config),
        SOAP_11_CONTENT_TYPE,
        Some("testPostAction"),
        FOO_REQUEST,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let fault = fault_of(&body);
    assert_eq!(fault.code, FaultCode::Client);
    assert!(fault.string.starts_with("request body too large"));
}

#[tokio::test]
async fn test_soap_12_only_server_faults_in_soap_12() {
    let config = SoapServerConfig::from_yaml_str("settings:\n  allowed_versions: [\"1.2\"]\n")
        .unwrap();
    let (status, body) = post(
        router_with(foo_registry(Arc::new(AtomicUsize::new(0))), config),
        "application/json",
        None,
        FOO_REQUEST,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let view = EnvelopeView::parse(&body).unwrap();
    assert_eq!(view.version(), SoapVersion::Soap12);
    assert_eq!(
        view.fault().unwrap().unwrap().string,
        "unsupported content type: \"application/json\""
    );
}

#[tokio::test]
async fn test_soap_11_only_server_rejects_soap_12() {
    let config = SoapServerConfig {
        settings: SettingsConfig {
            allowed_versions: vec![SoapVersion::Soap11],
            ..SettingsConfig::default()
        },
        ..SoapServerConfig::default()
    };
    let (_, body) = post(
        router_with(foo_registry(Arc::new(AtomicUsize::new(0))), config),
        "application/soap+xml; action=testPostAction",
        None,
        FOO_REQUEST,
    )
    .await;

    let view = EnvelopeView::parse(&body).unwrap();
    assert_eq!(view.version(), SoapVersion::Soap11);
    assert!(view
        .fault()
        .unwrap()
        .unwrap()
        .string
        .starts_with("unsupported content type"));
}

#[tokio::test]
async fn test_non_post_rejected() {
    let response = foo_router(Arc::new(AtomicUsize::new(0)))
        .oneshot(Request::builder().uri("/pathTo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers().get("allow").unwrap(), "POST");
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = foo_router(Arc::clone(&calls));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let element = if i % 2 == 0 { "fooRequest" } else { "barRequest" };
                let xml = FOO_REQUEST.replace("fooRequest", element);
                post(app, SOAP_11_CONTENT_TYPE, Some("testPostAction"), &xml).await
            })
        })
        .collect();

    let mut faults = 0;
    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        if EnvelopeView::parse(&body).unwrap().is_fault() {
            faults += 1;
        }
    }

    assert_eq!(faults, 16);
    assert_eq!(calls.load(Ordering::SeqCst), 16);
}
