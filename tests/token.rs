mod common;

use common::{ManualClock, TOKEN_PATH, TestServer, header};
use fieldid::{Client, Error};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[test]
fn token_is_reused_inside_the_buffered_window_and_refreshed_after() {
    let srv = TestServer::start();
    srv.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok1", "expires_in": 3600})),
            )
            .up_to_n_times(1),
    );
    srv.mount_token(json!({"access_token": "tok2", "expires_in": 3600}));

    let clock = ManualClock::new();
    let client = Client::new(srv.config()).unwrap().with_clock(clock.clone());

    assert_eq!(client.access_token().unwrap(), "tok1");
    assert_eq!(srv.token_requests(), 1);

    clock.set(3580);
    assert_eq!(client.access_token().unwrap(), "tok1");
    assert_eq!(srv.token_requests(), 1);

    clock.set(3595);
    assert_eq!(client.access_token().unwrap(), "tok2");
    assert_eq!(srv.token_requests(), 2);

    clock.set(3600);
    assert_eq!(client.access_token().unwrap(), "tok2");
    assert_eq!(srv.token_requests(), 2);
}

#[test]
fn token_request_is_a_client_credentials_form_post() {
    let srv = TestServer::start();
    let client = srv.client();
    client.access_token().unwrap();

    let reqs = srv.requests();
    assert_eq!(reqs.len(), 1);
    let req = &reqs[0];
    assert_eq!(req.method.as_str(), "POST");
    assert_eq!(
        header(req, "content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(
        String::from_utf8_lossy(&req.body),
        "grant_type=client_credentials&client_id=client-abc&client_secret=secret-xyz\
         &audience=https%3A%2F%2Fapi.varda.ag%2Ffid%2F"
    );
}

#[test]
fn malformed_token_bodies_are_401() {
    let bodies = [
        json!({"expires_in": 3600}),
        json!({"access_token": "tok1"}),
        json!({"access_token": "tok1", "expires_in": "an hour"}),
        json!({}),
    ];

    for body in bodies {
        let srv = TestServer::start();
        srv.mount_token(body.clone());
        let client = Client::new(srv.config()).unwrap();

        match client.access_token() {
            Err(Error::Api(e)) => {
                assert_eq!(e.status, Some(401), "body {body}");
                assert_eq!(e.reason, "Malformed token response");
            }
            other => panic!("expected malformed token error for {body}, got {other:?}"),
        }
    }
}

#[test]
fn non_json_token_body_is_malformed() {
    let srv = TestServer::start();
    srv.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>")),
    );
    let client = Client::new(srv.config()).unwrap();
    assert_eq!(client.access_token().unwrap_err().status(), Some(401));
}

#[test]
fn string_expiry_is_accepted() {
    let srv = TestServer::start();
    srv.mount_token(json!({"access_token": "tok1", "expires_in": "3600"}));
    let client = Client::new(srv.config()).unwrap();
    assert_eq!(client.access_token().unwrap(), "tok1");
}

#[test]
fn oversized_expiry_is_clamped() {
    for expires_in in [json!(1e30), json!("9223372036854775807"), json!(i64::MAX)] {
        let srv = TestServer::start();
        srv.mount_token(json!({"access_token": "tok1", "expires_in": expires_in}));
        let clock = ManualClock::new();
        let client = Client::new(srv.config()).unwrap().with_clock(clock.clone());

        assert_eq!(client.access_token().unwrap(), "tok1");
        clock.set(365 * 24 * 60 * 60);
        assert_eq!(client.access_token().unwrap(), "tok1");
        assert_eq!(srv.token_requests(), 1, "expires_in {expires_in}");
    }
}

#[test]
fn token_endpoint_error_status_propagates() {
    let srv = TestServer::start();
    srv.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "access_denied"}))),
    );
    let client = Client::new(srv.config()).unwrap();

    let err = client.access_token().unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert_eq!(err.status(), Some(403));
}

#[test]
fn failed_refresh_is_retried_on_next_call() {
    let srv = TestServer::start();
    srv.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1),
    );
    srv.mount_token(json!({"access_token": "tok1", "expires_in": 3600}));
    let client = Client::new(srv.config()).unwrap();

    assert!(client.access_token().is_err());
    assert_eq!(client.access_token().unwrap(), "tok1");
    assert_eq!(srv.token_requests(), 2);
}

#[test]
fn lifetime_shorter_than_buffer_expires_immediately() {
    let srv = TestServer::start();
    srv.mount_token(json!({"access_token": "tok1", "expires_in": 5}));
    let clock = ManualClock::new();
    let client = Client::new(srv.config()).unwrap().with_clock(clock);

    client.access_token().unwrap();
    client.access_token().unwrap();
    assert_eq!(srv.token_requests(), 2);
}

#[test]
fn concurrent_callers_share_one_refresh() {
    let srv = TestServer::start();
    srv.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok1", "expires_in": 3600}))
                    .set_delay(Duration::from_millis(300)),
            ),
    );
    let client = Arc::new(Client::new(srv.config()).unwrap());

    let tokens: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                s.spawn(move || client.access_token().unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(tokens.len(), 8);
    assert!(tokens.iter().all(|t| t == "tok1"));
    assert_eq!(srv.token_requests(), 1);
}

#[test]
fn clear_token_forces_refresh() {
    let srv = TestServer::start();
    let client = srv.client();

    client.access_token().unwrap();
    client.access_token().unwrap();
    assert_eq!(srv.token_requests(), 1);

    client.clear_token();
    client.access_token().unwrap();
    assert_eq!(srv.token_requests(), 2);
}
