//! Signed session cookies over real connections.

use http_kit::cookies;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_session_round_trip() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let first = client.get(server.url("/session")).send().await.unwrap();
    assert_eq!(first.status(), 200);
    let pair = common::cookie_pair(&first).expect("session cookie issued");
    let issued: Value = first.json().await.unwrap();
    assert_eq!(issued["issued"], true);

    let value = pair.strip_prefix("session=").unwrap();
    assert!(cookies::is_signed(value));
    assert_eq!(
        cookies::unsign(Some(value), common::SECRET).unwrap(),
        issued["session"].as_str().unwrap()
    );

    let second = client
        .get(server.url("/session"))
        .header("cookie", &pair)
        .send()
        .await
        .unwrap();
    assert!(common::cookie_pair(&second).is_none());
    let reused: Value = second.json().await.unwrap();
    assert_eq!(reused["issued"], false);
    assert_eq!(reused["session"], issued["session"]);
}

#[tokio::test]
async fn test_tampered_cookie_is_replaced() {
    let server = common::start_server(|_| {}).await;
    let signed = cookies::sign("victim", common::SECRET).unwrap();
    let tampered = signed.replacen("victim", "attacker", 1);

    let res = common::client()
        .get(server.url("/session"))
        .header("cookie", format!("session={tampered}"))
        .send()
        .await
        .unwrap();

    assert!(common::cookie_pair(&res).is_some());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["issued"], true);
    assert_ne!(body["session"], "attacker");
}

#[tokio::test]
async fn test_trusted_https_proxy_marks_cookie_secure() {
    let server = common::start_server(|config| {
        config.trust.trusted_ips = http_kit::security::IpSet::from_entries(["127.0.0.1", "::1"]);
        config.cookies.max_age_secs = Some(3600);
    })
    .await;

    let res = common::client()
        .get(server.url("/session"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap();

    let set_cookie = res.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.contains("; Max-Age=3600"));
    assert!(set_cookie.contains("; Secure"));
    assert!(set_cookie.contains("; SameSite=Lax"));
}

#[tokio::test]
async fn test_logout_expires_cookie() {
    let server = common::start_server(|_| {}).await;

    let res = common::client().delete(server.url("/session")).send().await.unwrap();

    assert_eq!(res.status(), 204);
    let set_cookie = res.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.starts_with("session=; Max-Age=0"));
    assert!(set_cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
}
