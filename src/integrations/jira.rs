//! Jira Cloud webhook payload normalization.
//!
//! A webhook is either acted on ([`JiraParseOutcome::Accepted`]), ignored
//! because it is not addressed to us ([`JiraParseOutcome::Skipped`]), or
//! rejected because it is addressed to us but malformed
//! ([`JiraParseOutcome::Failed`]).

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const LABEL_EVENT: &str = "jira:issue_updated";
const COMMENT_EVENT: &str = "comment_created";

/// Header carrying the webhook signature, as `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JiraEventType {
    LabeledTicket,
    CommentMention,
}

/// Validated webhook data needed to start a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JiraWebhookPayload {
    pub event_type: JiraEventType,
    /// The `webhookEvent` value as sent by Jira.
    pub raw_event: String,
    pub issue_id: String,
    pub issue_key: String,
    pub user_email: String,
    pub display_name: String,
    pub account_id: String,
    /// Hostname of the Jira site.
    pub workspace_name: String,
    pub base_api_url: String,
    /// Empty for label events.
    pub comment_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JiraParseOutcome {
    Accepted(JiraWebhookPayload),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct JiraPayloadParser {
    label: String,
    mention: String,
}

impl JiraPayloadParser {
    pub fn new(label: impl Into<String>, mention: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            mention: mention.into(),
        }
    }

    pub fn parse(&self, payload: &Value) -> JiraParseOutcome {
        let event = payload
            .get("webhookEvent")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::debug!(webhook_event = event, "Parsing Jira webhook payload");

        match event {
            LABEL_EVENT => self.parse_label_event(payload, event),
            COMMENT_EVENT => self.parse_comment_event(payload, event),
            other => JiraParseOutcome::Skipped(format!("Unhandled webhook event type: {}", other)),
        }
    }

    fn parse_label_event(&self, payload: &Value, event: &str) -> JiraParseOutcome {
        let labeled = payload
            .pointer("/changelog/items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|item| item.get("field").and_then(Value::as_str) == Some("labels"))
            .filter_map(|item| item.get("toString").and_then(Value::as_str))
            .any(|added| added == self.label);

        if !labeled {
            return JiraParseOutcome::Skipped(format!(
                "Label event does not contain '{}' label",
                self.label
            ));
        }

        let user = payload.get("user").unwrap_or(&Value::Null);
        self.extract(payload, user, JiraEventType::LabeledTicket, event, String::new())
    }

    fn parse_comment_event(&self, payload: &Value, event: &str) -> JiraParseOutcome {
        let comment = payload.get("comment").unwrap_or(&Value::Null);
        let body = comment
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if !has_exact_mention(body, &self.mention) {
            return JiraParseOutcome::Skipped(format!(
                "Comment does not mention '{}'",
                self.mention
            ));
        }

        let author = comment.get("author").unwrap_or(&Value::Null);
        self.extract(
            payload,
            author,
            JiraEventType::CommentMention,
            event,
            body.to_string(),
        )
    }

    fn extract(
        &self,
        payload: &Value,
        user: &Value,
        event_type: JiraEventType,
        raw_event: &str,
        comment_body: String,
    ) -> JiraParseOutcome {
        let issue = payload.get("issue").unwrap_or(&Value::Null);
        let issue_id = text_field(issue, "id");
        let issue_key = text_field(issue, "key");
        let user_email = text_field(user, "emailAddress");
        let display_name = text_field(user, "displayName");
        let account_id = text_field(user, "accountId");
        let (base_api_url, workspace_name) =
            workspace_from_self_url(issue.get("self").and_then(Value::as_str).unwrap_or_default());

        let mut missing = Vec::new();
        for (value, name) in [
            (&issue_id, "issue.id"),
            (&issue_key, "issue.key"),
            (&user_email, "user.emailAddress"),
            (&display_name, "user.displayName"),
            (&account_id, "user.accountId"),
            (&workspace_name, "workspace_name (derived from issue.self)"),
            (&base_api_url, "base_api_url (derived from issue.self)"),
        ] {
            if value.is_empty() {
                missing.push(name);
            }
        }

        if !missing.is_empty() {
            return JiraParseOutcome::Failed(format!(
                "Missing required fields: {}",
                missing.join(", ")
            ));
        }

        JiraParseOutcome::Accepted(JiraWebhookPayload {
            event_type,
            raw_event: raw_event.to_string(),
            issue_id,
            issue_key,
            user_email,
            display_name,
            account_id,
            workspace_name,
            base_api_url,
            comment_body,
        })
    }
}

/// Read a string field; Jira occasionally sends ids as numbers.
fn text_field(object: &Value, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Split an issue `self` URL into `(base_api_url, workspace_name)`.
fn workspace_from_self_url(self_url: &str) -> (String, String) {
    if self_url.is_empty() {
        return (String::new(), String::new());
    }

    let base = match self_url.split_once("/rest/") {
        Some((base, _)) => base.to_string(),
        None => match url::Url::parse(self_url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => match parsed.port() {
                    Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
                    None => format!("{}://{}", parsed.scheme(), host),
                },
                None => String::new(),
            },
            Err(_) => String::new(),
        },
    };

    let workspace = url::Url::parse(&base)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    (base, workspace)
}

/// Case-insensitive mention match that does not accept `@openhandsbot` for
/// `@openhands`.
pub fn has_exact_mention(text: &str, mention: &str) -> bool {
    if mention.is_empty() {
        return false;
    }
    let Ok(re) = regex::RegexBuilder::new(&regex::escape(mention))
        .case_insensitive(true)
        .build()
    else {
        return false;
    };

    re.find_iter(text).any(|m| {
        text[m.end()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Check a `sha256=<hex>` signature over the raw request body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(provided) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected
        .as_bytes()
        .ct_eq(provided.to_ascii_lowercase().as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn parser() -> JiraPayloadParser {
        JiraPayloadParser::new("openhands", "@openhands")
    }

    fn issue() -> Value {
        json!({
            "id": "10001",
            "key": "PROJ-1",
            "self": "https://acme.atlassian.net/rest/api/2/issue/10001"
        })
    }

    fn user() -> Value {
        json!({
            "emailAddress": "dev@acme.com",
            "displayName": "Dev",
            "accountId": "acc-1"
        })
    }

    fn label_event(label: &str) -> Value {
        json!({
            "webhookEvent": "jira:issue_updated",
            "issue": issue(),
            "user": user(),
            "changelog": {"items": [
                {"field": "status", "toString": "Done"},
                {"field": "labels", "toString": label}
            ]}
        })
    }

    fn comment_event(body: &str) -> Value {
        let mut author = user();
        author["displayName"] = json!("Commenter");
        json!({
            "webhookEvent": "comment_created",
            "issue": issue(),
            "comment": {"body": body, "author": author}
        })
    }

    #[test]
    fn test_label_event_accepted() {
        let JiraParseOutcome::Accepted(payload) = parser().parse(&label_event("openhands")) else {
            panic!("expected accepted");
        };
        assert_eq!(payload.event_type, JiraEventType::LabeledTicket);
        assert_eq!(payload.raw_event, "jira:issue_updated");
        assert_eq!(payload.issue_id, "10001");
        assert_eq!(payload.issue_key, "PROJ-1");
        assert_eq!(payload.user_email, "dev@acme.com");
        assert_eq!(payload.workspace_name, "acme.atlassian.net");
        assert_eq!(payload.base_api_url, "https://acme.atlassian.net");
        assert_eq!(payload.comment_body, "");
    }

    #[test]
    fn test_label_event_without_label_skipped() {
        assert_eq!(
            parser().parse(&label_event("bug")),
            JiraParseOutcome::Skipped("Label event does not contain 'openhands' label".into())
        );
    }

    #[test]
    fn test_comment_mention_accepted_with_author() {
        let JiraParseOutcome::Accepted(payload) =
            parser().parse(&comment_event("Hey @OpenHands please fix this"))
        else {
            panic!("expected accepted");
        };
        assert_eq!(payload.event_type, JiraEventType::CommentMention);
        assert_eq!(payload.display_name, "Commenter");
        assert_eq!(payload.comment_body, "Hey @OpenHands please fix this");
    }

    #[test]
    fn test_comment_without_mention_skipped() {
        assert_eq!(
            parser().parse(&comment_event("ping @openhandsbot")),
            JiraParseOutcome::Skipped("Comment does not mention '@openhands'".into())
        );
    }

    #[test]
    fn test_unhandled_event_skipped() {
        assert_eq!(
            parser().parse(&json!({"webhookEvent": "issue_deleted"})),
            JiraParseOutcome::Skipped("Unhandled webhook event type: issue_deleted".into())
        );
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let mut payload = label_event("openhands");
        payload["issue"] = json!({"key": "PROJ-1"});
        payload["user"] = json!({"emailAddress": "dev@acme.com", "displayName": "Dev"});

        assert_eq!(
            parser().parse(&payload),
            JiraParseOutcome::Failed(
                "Missing required fields: issue.id, user.accountId, \
                 workspace_name (derived from issue.self), base_api_url (derived from issue.self)"
                    .into()
            )
        );
    }

    #[rstest]
    #[case("https://acme.atlassian.net/rest/api/2/issue/1", "https://acme.atlassian.net", "acme.atlassian.net")]
    #[case("https://jira.corp.com:8443/jira/rest/api/2/issue/1", "https://jira.corp.com:8443/jira", "jira.corp.com")]
    #[case("https://acme.atlassian.net/browse/PROJ-1", "https://acme.atlassian.net", "acme.atlassian.net")]
    #[case("", "", "")]
    fn test_workspace_from_self_url(#[case] url: &str, #[case] base: &str, #[case] workspace: &str) {
        assert_eq!(
            workspace_from_self_url(url),
            (base.to_string(), workspace.to_string())
        );
    }

    #[rstest]
    #[case("@openhands fix it", true)]
    #[case("please @OPENHANDS.", true)]
    #[case("@openhands_bot", false)]
    #[case("@openhandsx", false)]
    #[case("no mention", false)]
    #[case("@openhandsx and @openhands", true)]
    fn test_exact_mention(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(has_exact_mention(text, "@openhands"), expected);
    }

    #[test]
    fn test_signature_verification() {
        let body = br#"{"webhookEvent":"comment_created"}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
        mac.update(body);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(verify_signature("s3cret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("s3cret", b"tampered", &signature));
        assert!(!verify_signature("s3cret", body, "md5=abc"));
    }
}
