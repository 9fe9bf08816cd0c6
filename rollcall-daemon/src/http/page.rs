//! Minimal HTML pages for the member-facing endpoints.

use axum::http::StatusCode;
use axum::response::Html;

/// Escape text for use in HTML bodies and quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n</head>\n<body>\n<main>\n<h1>{title}</h1>\n{body}\n</main>\n</body>\n</html>\n",
        title = escape(title),
        body = body,
    )
}

/// The form a member submits to start the LMS login.
pub fn verify_form(subject_id: &str, token: &str) -> Html<String> {
    let body = format!(
        "<p>Sign in to the LMS to confirm your enrollment.</p>\n\
         <form method=\"post\" action=\"verify\">\n\
         <input type=\"hidden\" name=\"user-discord-id\" value=\"{subject}\">\n\
         <input type=\"hidden\" name=\"token\" value=\"{token}\">\n\
         <button type=\"submit\">Continue to LMS login</button>\n\
         </form>",
        subject = escape(subject_id),
        token = escape(token),
    );
    Html(layout("Verify your enrollment", &body))
}

pub fn success(message: &str) -> (StatusCode, Html<String>) {
    let body = format!("<p>{}</p>\n<p>You can close this window.</p>", escape(message));
    (StatusCode::OK, Html(layout("Verification complete", &body)))
}

pub fn failure(status: StatusCode, message: &str) -> (StatusCode, Html<String>) {
    let body = format!("<p>{}</p>", escape(message));
    (status, Html(layout("Verification failed", &body)))
}
