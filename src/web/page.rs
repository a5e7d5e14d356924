use std::fmt::Write;

use pulldown_cmark::{html, Event, Options, Parser};

use super::chat::conversation_state::{Message, Role};

const PAGE_TITLE: &str = "Gemini Chatbot";

const PAGE_ICON: &str = "data:image/svg+xml,<svg xmlns=%22http://www.w3.org/2000/svg%22 viewBox=%220 0 100 100%22><text y=%22.9em%22 font-size=%2290%22>🤖</text></svg>";

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 0; padding: 2rem 3rem 8rem; }
hr { border: none; border-top: 1px solid #ddd; margin: 1.5rem 0; }
details { border: 1px solid #ddd; border-radius: 5px; padding: 0.5rem 1rem; margin-bottom: 1.5rem; }
summary { cursor: pointer; }
.bubble { padding: 10px; border-radius: 5px; margin: 5px 0; }
.bubble.user { background-color: #f0f2f6; }
.bubble.assistant { background-color: #e8f0fe; }
.info { background-color: #e8f4fd; padding: 10px; border-radius: 5px; }
.error { background-color: #fdecea; color: #8a1c1c; padding: 10px; border-radius: 5px; margin: 1rem 0; }
.chat-message { display: flex; gap: 0.75rem; margin: 1rem 0; }
.avatar { font-size: 1.5rem; }
.chat-input { position: fixed; bottom: 0; left: 0; right: 0; display: flex; gap: 0.5rem; background: #fff; padding: 1rem 3rem; border-top: 1px solid #ddd; }
.chat-input form { display: flex; gap: 0.5rem; }
.chat-input form:first-child { flex: 1; }
.chat-input input[type=text] { flex: 1; padding: 0.6rem; }
"#;

impl Role {
    fn css_class(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Role::User => "👤",
            Role::Assistant => "🤖",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Gemini",
        }
    }
}

/// Renders the whole chat page for one session.
pub fn render_page(model: &str, messages: &[Message], error: Option<&str>) -> String {
    let mut out = String::with_capacity(4096);

    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="icon" href="{icon}">
<style>{STYLE}</style>
</head>
<body>
<h1>🤖 {title}</h1>
<p>A basic chatbot built on the Gemini API (<code>{model}</code>).</p>
<hr>
"#,
        title = PAGE_TITLE,
        icon = PAGE_ICON,
        model = escape_html(model),
    );

    render_history_panel(&mut out, messages);

    out.push_str("<main id=\"transcript\">\n");
    for message in messages {
        let role = message.role();
        let _ = write!(
            out,
            "<div class=\"chat-message {}\"><span class=\"avatar\">{}</span><div class=\"content\">{}</div></div>\n",
            role.css_class(),
            role.icon(),
            render_markdown(message.content()),
        );
    }
    out.push_str("</main>\n");

    if let Some(error) = error {
        let _ = write!(
            out,
            "<div class=\"error\" role=\"alert\">An error occurred while generating a response: {}</div>\n",
            escape_html(error),
        );
    }

    out.push_str(
        r#"<div class="chat-input">
<form method="post" action="/chat">
<input type="text" name="prompt" placeholder="Type your message" autocomplete="off" autofocus required>
<button type="submit">Send</button>
</form>
<form method="post" action="/clear">
<button type="submit">Clear conversation</button>
</form>
</div>
</body>
</html>
"#,
    );

    out
}

fn render_history_panel(out: &mut String, messages: &[Message]) {
    out.push_str("<details>\n<summary>💬 View previous conversation</summary>\n");

    if messages.is_empty() {
        out.push_str("<div class=\"info\">No conversation yet.</div>\n");
    }

    for message in messages {
        let role = message.role();
        let _ = write!(
            out,
            "<div class=\"bubble {}\"><strong>{} {}:</strong><br>{}</div>\n",
            role.css_class(),
            role.icon(),
            role.label(),
            render_markdown(message.content()),
        );
    }

    out.push_str("</details>\n");
}

/// Markdown to HTML. Raw HTML in the source is shown as text, not injected.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
