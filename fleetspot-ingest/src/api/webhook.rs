//! Inbound SMS/MMS webhook
//!
//! The messaging provider posts each inbound message as a form and expects
//! exactly one reply, wrapped in a TwiML envelope.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::models::InboundMessage;
use crate::AppState;

/// Escape the five XML special characters
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Single-message TwiML response
pub fn twiml(reply: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n    <Message>{}</Message>\n</Response>",
        escape_xml(reply)
    )
}

/// Build an [`InboundMessage`] from provider form fields
///
/// `NumMedia` bounds which `MediaUrl{i}` fields are read; a missing or
/// malformed count means no media.
pub fn inbound_from_form(form: &HashMap<String, String>) -> ApiResult<InboundMessage> {
    let sender = form
        .get("From")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing From".to_string()))?;

    let mut msg = InboundMessage::new(sender, form.get("Body").cloned().unwrap_or_default());

    let media_count: usize = form
        .get("NumMedia")
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0);
    for index in 0..media_count {
        if let Some(url) = form.get(&format!("MediaUrl{}", index)) {
            msg = msg.with_media(url.as_str());
        }
    }
    Ok(msg)
}

/// POST /sms
pub async fn receive_sms(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> ApiResult<Response> {
    let msg = inbound_from_form(&form)?;
    let reply = state.engine.handle(&msg).await;

    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        twiml(&reply.to_string()),
    )
        .into_response())
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/sms", post(receive_sms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_escape_xml_all_specials() {
        assert_eq!(
            escape_xml(r#"Tom & Jerry's <"van">"#),
            "Tom &amp; Jerry&apos;s &lt;&quot;van&quot;&gt;"
        );
        assert_eq!(escape_xml("&amp;"), "&amp;amp;");
    }

    #[test]
    fn test_twiml_envelope() {
        assert_eq!(
            twiml("Hi <you>"),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n    <Message>Hi &lt;you&gt;</Message>\n</Response>"
        );
    }

    #[test]
    fn test_inbound_from_form_reads_counted_media() {
        let msg = inbound_from_form(&form(&[
            ("From", "+15550001111"),
            ("Body", "T123456C"),
            ("NumMedia", "2"),
            ("MediaUrl0", "https://media.example/a"),
            ("MediaUrl1", "https://media.example/b"),
            ("MediaUrl2", "https://media.example/ignored"),
        ]))
        .unwrap();

        assert_eq!(msg.sender, "+15550001111");
        assert_eq!(msg.body, "T123456C");
        assert_eq!(msg.media_urls, vec!["https://media.example/a", "https://media.example/b"]);
    }

    #[test]
    fn test_inbound_from_form_defaults() {
        let msg = inbound_from_form(&form(&[("From", "+15550001111"), ("NumMedia", "x")])).unwrap();
        assert_eq!(msg.body, "");
        assert!(msg.media_urls.is_empty());

        assert!(matches!(
            inbound_from_form(&form(&[("Body", "hi")])),
            Err(ApiError::BadRequest(_))
        ));
    }
}
