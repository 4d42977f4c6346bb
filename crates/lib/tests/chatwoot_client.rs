//! ChatwootClient against a mockito server: request shape, auth header, payload parsing, error mapping.

use mockito::Matcher;
use relay::config::InboxSettings;
use relay::inbox::{ChatwootClient, InboxApi, InboxError, MessageDirection};
use relay::phone::normalize;
use serde_json::json;

const TOKEN: &str = "test-token";
const ACCOUNT: u64 = 9;

fn client_for(server: &mockito::ServerGuard) -> ChatwootClient {
    ChatwootClient::new(&InboxSettings {
        base_url: Some(format!("{}/", server.url())),
        access_token: Some(TOKEN.to_string()),
        inbox_id: Some(3),
        account_id: Some(ACCOUNT),
    })
}

#[tokio::test]
async fn create_contact_sends_phone_as_identifier() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/accounts/9/contacts")
        .match_header("api_access_token", TOKEN)
        .match_body(Matcher::Json(json!({
            "inbox_id": 3,
            "name": "Ana",
            "phone_number": "+5215511122233",
            "identifier": "+5215511122233",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"payload": {
                "contact": {"id": 41, "name": "Ana", "phone_number": "+5215511122233"},
                "contact_inbox": {"source_id": "abc-123", "inbox": {"id": 3}}
            }}"#,
        )
        .create_async()
        .await;

    let created = client_for(&server)
        .create_contact(3, "Ana", &normalize("5511122233"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(created.contact.id, 41);
    assert_eq!(created.source_id.as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn create_contact_duplicate_is_conflict() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v1/accounts/9/contacts")
        .with_status(422)
        .with_body(r#"{"message": "Phone number has already been taken"}"#)
        .create_async()
        .await;

    let err = client_for(&server)
        .create_contact(3, "Ana", &normalize("5511122233"))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.status(), Some(422));
}

#[tokio::test]
async fn search_contacts_encodes_query_and_reads_payload() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/accounts/9/contacts/search")
        .match_query(Matcher::UrlEncoded("q".into(), "+5215511122233".into()))
        .match_header("api_access_token", TOKEN)
        .with_status(200)
        .with_body(
            r#"{"meta": {"count": 1}, "payload": [
                {"id": 41, "phone_number": "+5215511122233", "identifier": null,
                 "contact_inboxes": [{"source_id": "abc-123", "inbox": {"id": 3}}]}
            ]}"#,
        )
        .create_async()
        .await;

    let contacts = client_for(&server)
        .search_contacts("+5215511122233")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].source_id_for(3), Some("abc-123"));
}

#[tokio::test]
async fn list_open_conversations_filters_by_inbox_and_status() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/accounts/9/conversations")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("inbox_id".into(), "3".into()),
            Matcher::UrlEncoded("status".into(), "open".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"data": {"meta": {"all_count": 2}, "payload": [
                {"id": 7, "status": "open", "inbox_id": 3, "meta": {"sender": {"id": 41, "phone_number": "+5215511122233"}}},
                {"id": 8, "status": "open", "inbox_id": 3, "meta": {"sender": {"id": 42, "phone_number": null}}}
            ]}}"#,
        )
        .create_async()
        .await;

    let conversations = client_for(&server)
        .list_open_conversations(3)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].sender_phone(), Some("+5215511122233"));
    assert_eq!(conversations[1].sender_phone(), None);
}

fn conversations_page(ids: std::ops::RangeInclusive<u64>, all_count: usize) -> String {
    let payload: Vec<serde_json::Value> = ids
        .map(|id| {
            json!({
                "id": id,
                "status": "open",
                "inbox_id": 3,
                "meta": {"sender": {"phone_number": format!("+52155{:08}", id)}}
            })
        })
        .collect();
    json!({ "data": { "meta": { "all_count": all_count }, "payload": payload } }).to_string()
}

#[tokio::test]
async fn list_open_conversations_follows_pages_until_all_count() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/api/v1/accounts/9/conversations")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("inbox_id".into(), "3".into()),
            Matcher::UrlEncoded("page".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body(conversations_page(1..=25, 26))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/api/v1/accounts/9/conversations")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("inbox_id".into(), "3".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(conversations_page(26..=26, 26))
        .expect(1)
        .create_async()
        .await;

    let conversations = client_for(&server)
        .list_open_conversations(3)
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(conversations.len(), 26);
    assert_eq!(conversations.last().map(|c| c.id), Some(26));
}

#[tokio::test]
async fn list_open_conversations_stops_on_empty_page() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/api/v1/accounts/9/conversations")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_body(r#"{"data": {"meta": {}, "payload": [{"id": 1, "status": "open"}]}}"#)
        .expect(1)
        .create_async()
        .await;
    let empty = server
        .mock("GET", "/api/v1/accounts/9/conversations")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(r#"{"data": {"meta": {}, "payload": []}}"#)
        .expect(1)
        .create_async()
        .await;

    let conversations = client_for(&server)
        .list_open_conversations(3)
        .await
        .unwrap();

    first.assert_async().await;
    empty.assert_async().await;
    assert_eq!(conversations.len(), 1);
}

#[tokio::test]
async fn create_conversation_opens_with_source_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/accounts/9/conversations")
        .match_body(Matcher::Json(json!({
            "source_id": "abc-123",
            "inbox_id": 3,
            "contact_id": 41,
            "status": "open",
        })))
        .with_status(200)
        .with_body(r#"{"id": 77, "status": "open", "inbox_id": 3}"#)
        .create_async()
        .await;

    let conversation = client_for(&server)
        .create_conversation(3, 41, "abc-123")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(conversation.id, 77);
    assert!(conversation.is_open());
}

#[tokio::test]
async fn post_message_sets_direction() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/accounts/9/conversations/77/messages")
        .match_body(Matcher::Json(json!({
            "content": "hola",
            "message_type": "outgoing",
            "private": false,
        })))
        .with_status(200)
        .with_body(r#"{"id": 501, "content": "hola", "message_type": 1}"#)
        .create_async()
        .await;

    let message = client_for(&server)
        .post_message(77, "hola", MessageDirection::Outgoing)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(message.id, 501);
}

#[tokio::test]
async fn profile_is_not_account_scoped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/profile")
        .match_header("api_access_token", TOKEN)
        .with_status(200)
        .with_body(r#"{"id": 1, "name": "relay bot", "email": "bot@example.com"}"#)
        .create_async()
        .await;

    let profile = client_for(&server).get_account_profile().await.unwrap();

    mock.assert_async().await;
    assert_eq!(profile.name.as_deref(), Some("relay bot"));
}

#[tokio::test]
async fn unauthorized_and_malformed_responses_are_errors() {
    let mut server = mockito::Server::new_async().await;
    let _unauthorized = server
        .mock("GET", "/api/v1/profile")
        .with_status(401)
        .with_body(r#"{"error": "Invalid Access Token"}"#)
        .create_async()
        .await;
    let _garbled = server
        .mock("POST", "/api/v1/accounts/9/conversations/1/messages")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let client = client_for(&server);
    match client.get_account_profile().await.unwrap_err() {
        InboxError::Api { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid Access Token"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(matches!(
        client
            .post_message(1, "x", MessageDirection::Incoming)
            .await
            .unwrap_err(),
        InboxError::Decode(_)
    ));
}

#[tokio::test]
async fn missing_settings_fail_without_network() {
    let client = ChatwootClient::new(&InboxSettings {
        base_url: Some("http://127.0.0.1:9".to_string()),
        access_token: None,
        inbox_id: Some(3),
        account_id: None,
    });

    assert!(matches!(
        client.search_contacts("x").await.unwrap_err(),
        InboxError::NotConfigured("accountId")
    ));
    assert!(matches!(
        client.get_account_profile().await.unwrap_err(),
        InboxError::NotConfigured("accessToken")
    ));
}
