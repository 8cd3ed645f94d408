//! Minimal XML helpers for the TwiML documents returned to the telephony platform.

/// Escape text for use in XML element content or a double-quoted attribute.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// XML prolog prepended to every TwiML response.
pub const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// An empty TwiML `<Response/>`, which lets the call continue or end normally.
pub fn empty_twiml_response() -> String {
    format!("{XML_PROLOG}<Response></Response>")
}
