//! Message composition.
//!
//! Renders a contact submission into an escaped HTML document and a
//! fully-formed RFC 5322 message. Rendering is pure: absent optional
//! fields simply omit their section, and there is no failure path.

use crate::config::MailerConfig;
use crate::types::ContactSubmission;

/// A rendered contact message, ready for the wire.
///
/// Derived deterministically from one submission; immutable and not shared
/// across sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Subject line.
    pub subject: String,
    /// Message headers in wire order.
    pub headers: Vec<(String, String)>,
    /// HTML document body.
    pub html_body: String,
}

impl RenderedMessage {
    /// Serializes the message: headers in fixed order, CRLF-terminated,
    /// blank line, body.
    pub fn to_wire(&self) -> String {
        let mut wire = String::new();
        for (name, value) in &self.headers {
            wire.push_str(name);
            wire.push_str(": ");
            wire.push_str(value);
            wire.push_str("\r\n");
        }
        wire.push_str("\r\n");
        wire.push_str(&self.html_body);
        wire
    }
}

/// Renders a submission into a complete message addressed per the
/// configuration.
pub fn render(
    config: &MailerConfig,
    recipient: &str,
    submission: &ContactSubmission,
) -> RenderedMessage {
    let subject = format!("Nuevo contacto desde web: {}", submission.name);

    // Header order is fixed for relay compatibility.
    let headers = vec![
        ("From".to_string(), config.from_header()),
        ("To".to_string(), recipient.to_string()),
        ("Reply-To".to_string(), submission.email.clone()),
        ("Subject".to_string(), subject.clone()),
        ("MIME-Version".to_string(), "1.0".to_string()),
        (
            "Content-Type".to_string(),
            "text/html; charset=\"UTF-8\"".to_string(),
        ),
    ];

    RenderedMessage {
        subject,
        headers,
        html_body: build_body(submission),
    }
}

/// Escapes text for interpolation into the HTML template.
///
/// Applied exactly once per field; already-safe text passes through
/// unchanged.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const BODY_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .header { background: #000; color: #fff; padding: 20px; text-align: center; }
        .content { padding: 20px; background: #f9f9f9; }
        .field { margin-bottom: 15px; }
        .label { font-weight: bold; color: #3FAD4D; }
        .value { margin-top: 5px; }
        .footer { text-align: center; padding: 20px; font-size: 12px; color: #666; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Nuevo Contacto</h1>
        </div>
        <div class="content">
"#;

const BODY_FOOT: &str = r#"        </div>
        <div class="footer">
            Este mensaje fue enviado desde el formulario de contacto de la web.
        </div>
    </div>
</body>
</html>"#;

fn build_body(submission: &ContactSubmission) -> String {
    let mut body = String::from(BODY_HEAD);

    push_field(&mut body, "Nombre:", &escape_html(&submission.name));

    if let Some(phone) = non_empty(submission.phone.as_deref()) {
        push_field(&mut body, "Tel\u{e9}fono:", &escape_html(phone));
    }

    let email = escape_html(&submission.email);
    push_field(
        &mut body,
        "Email:",
        &format!("<a href=\"mailto:{}\">{}</a>", email, email),
    );

    if let Some(location) = non_empty(submission.location.as_deref()) {
        push_field(&mut body, "Ubicaci\u{f3}n:", &escape_html(location));
    }

    push_field(&mut body, "Mensaje:", &escape_html(&submission.message));

    body.push_str(BODY_FOOT);
    body
}

fn push_field(body: &mut String, label: &str, value: &str) {
    body.push_str("            <div class=\"field\">\n");
    body.push_str("                <div class=\"label\">");
    body.push_str(label);
    body.push_str("</div>\n");
    body.push_str("                <div class=\"value\">");
    body.push_str(value);
    body.push_str("</div>\n");
    body.push_str("            </div>\n");
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.filter(|value| !value.is_empty())
}

/// Prepares message bytes for the DATA phase: doubles dots at line starts,
/// normalizes the trailing line ending to CRLF, and appends the
/// `<CRLF>.<CRLF>` terminator.
pub fn frame_for_data(message: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(message.len() + 8);
    let mut at_line_start = true;

    for &byte in message {
        if at_line_start && byte == b'.' {
            output.push(b'.');
        }
        output.push(byte);
        at_line_start = byte == b'\n';
    }

    if !output.ends_with(b"\r\n") {
        if output.ends_with(b"\n") {
            output.pop();
        }
        output.extend_from_slice(b"\r\n");
    }

    output.extend_from_slice(b".\r\n");
    output
}
