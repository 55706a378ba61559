//! Session flow tests against a local mock portal.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Local, TimeZone};
use dorma_core::api::ntlm;
use dorma_core::{DormaClient, DormaError, EntryType};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `jdoe:hunter2`
const BASIC_AUTH: &str = "Basic amRvZTpodW50ZXIy";

const SESSION_COOKIE: &str = "ASP.NET_SessionId=test-session-id";

const BOOKINGS_PAGE: &str = r#"<html><body><table>
<tr>
  <td class="td-tabelle"> 01.03.2023 </td>
  <td class="td-tabelle"> 08:15 </td>
  <td class="td-tabelle"> Kommen </td>
</tr>
<tr>
  <td class="td-tabelle"> &nbsp; </td>
  <td class="td-tabelle"> 17:00 </td>
  <td class="td-tabelle"> Gehen </td>
</tr>
</table></body></html>"#;

fn host_of(server: &MockServer) -> String {
    server
        .uri()
        .trim_start_matches("http://")
        .to_string()
}

fn client() -> DormaClient {
    DormaClient::with_scheme("http").expect("client")
}

fn login_ok() -> Mock {
    Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .and(query_param_is_missing("sessiontimedout"))
        .and(header("Authorization", BASIC_AUTH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "ASP.NET_SessionId=test-session-id; path=/"),
        )
}

fn entries_ok(body: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path("/scripts/buchungen/buchungsdata2.aspx"))
        .and(query_param("mode", "0"))
        .and(header("Cookie", SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
}

fn logout(status: u16) -> Mock {
    Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .and(query_param("sessiontimedout", "2"))
        .and(header("Cookie", SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(status))
}

#[tokio::test]
async fn fetches_and_parses_todays_entries() {
    let server = MockServer::start().await;
    login_ok().expect(1).mount(&server).await;
    entries_ok(BOOKINGS_PAGE).expect(1).mount(&server).await;
    logout(200).expect(1).mount(&server).await;

    let entries = client()
        .fetch_entries(&host_of(&server), "jdoe", "hunter2")
        .await
        .expect("fetch should succeed");

    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].time,
        Local.with_ymd_and_hms(2023, 3, 1, 8, 15, 0).unwrap()
    );
    assert_eq!(entries[0].entry_type, EntryType::Come);
    assert_eq!(
        entries[1].time,
        Local.with_ymd_and_hms(2023, 3, 1, 17, 0, 0).unwrap()
    );
    assert_eq!(entries[1].entry_type, EntryType::Leave);
}

#[tokio::test]
async fn login_failure_aborts_without_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    entries_ok(BOOKINGS_PAGE).expect(0).mount(&server).await;

    let err = client()
        .fetch_entries(&host_of(&server), "jdoe", "wrong")
        .await
        .unwrap_err();

    match err.downcast_ref::<DormaError>() {
        Some(DormaError::Authentication(msg)) => {
            assert!(msg.contains("401"), "{msg}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn login_without_session_cookie_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client()
        .fetch_entries(&host_of(&server), "jdoe", "hunter2")
        .await
        .unwrap_err();

    match err.downcast_ref::<DormaError>() {
        Some(DormaError::Authentication(msg)) => {
            assert!(msg.contains("ASP.NET_SessionId"), "{msg}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn failed_logout_does_not_affect_the_result() {
    let server = MockServer::start().await;
    login_ok().mount(&server).await;
    entries_ok(BOOKINGS_PAGE).mount(&server).await;
    logout(500).expect(1).mount(&server).await;

    let entries = client()
        .fetch_entries(&host_of(&server), "jdoe", "hunter2")
        .await
        .expect("logout failure must not surface");

    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn fetch_failure_still_logs_out() {
    let server = MockServer::start().await;
    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/scripts/buchungen/buchungsdata2.aspx"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    logout(200).expect(1).mount(&server).await;

    let err = client()
        .fetch_entries(&host_of(&server), "jdoe", "hunter2")
        .await
        .unwrap_err();

    match err.downcast_ref::<DormaError>() {
        Some(DormaError::Fetch(msg)) => {
            assert!(msg.contains("500"), "{msg}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_bookings_page_yields_no_entries() {
    let server = MockServer::start().await;
    login_ok().mount(&server).await;
    entries_ok("<html><body>keine Buchungen</body></html>")
        .mount(&server)
        .await;
    logout(200).mount(&server).await;

    let entries = client()
        .fetch_entries(&host_of(&server), "jdoe", "hunter2")
        .await
        .expect("empty page is a valid result");

    assert!(entries.is_empty());
}

/// Type 2 challenge with an empty target name and target info.
fn challenge_message() -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.extend_from_slice(&2u32.to_le_bytes());
    msg.extend_from_slice(&[0, 0, 0, 0]); // target name len/maxlen
    msg.extend_from_slice(&48u32.to_le_bytes());
    msg.extend_from_slice(&0x0008_8205u32.to_le_bytes()); // flags
    msg.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]); // server challenge
    msg.extend_from_slice(&[0u8; 8]); // reserved
    msg.extend_from_slice(&[0, 0, 0, 0]); // target info len/maxlen
    msg.extend_from_slice(&48u32.to_le_bytes());
    msg
}

#[tokio::test]
async fn login_runs_the_ntlm_handshake_when_demanded() {
    let server = MockServer::start().await;

    // Basic credentials get a 401 offering NTLM
    let basic_rejected = Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .and(query_param_is_missing("sessiontimedout"))
        .and(header("Authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", "NTLM"))
        .with_priority(1)
        .expect(1);

    // The Type 1 message gets the server challenge back
    let type1_b64 = BASE64.encode(ntlm::negotiate_message());
    let challenged = Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .and(query_param_is_missing("sessiontimedout"))
        .and(header("Authorization", format!("NTLM {}", type1_b64).as_str()))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            format!("NTLM {}", BASE64.encode(challenge_message())).as_str(),
        ))
        .with_priority(1)
        .expect(1);

    // The Type 3 message (nondeterministic, matched by fallback
    // priority) completes the login
    let authenticated = Mock::given(method("GET"))
        .and(path("/scripts/login.aspx"))
        .and(query_param_is_missing("sessiontimedout"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "ASP.NET_SessionId=test-session-id; path=/"),
        )
        .with_priority(4)
        .expect(1);

    basic_rejected.mount(&server).await;
    challenged.mount(&server).await;
    authenticated.mount(&server).await;
    entries_ok(BOOKINGS_PAGE).mount(&server).await;
    logout(200).mount(&server).await;

    let entries = client()
        .fetch_entries(&host_of(&server), "jdoe", "hunter2")
        .await
        .expect("NTLM login should succeed");

    assert_eq!(entries.len(), 2);
}
