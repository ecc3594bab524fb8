//! Server-rendered HTML pages.
//!
//! Every value that came from a user or the store goes through
//! [`escape_html`] before it is placed in markup.

use crate::store::Note;

/// Target languages offered on the translate form (code, label).
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh-CN", "Chinese (Simplified)"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
];

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

pub fn stylesheet() -> &'static str {
    r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    background: #f5f5f5; color: #333; min-height: 100vh;
}
nav { background: #1a1a2e; padding: 14px 24px; display: flex; gap: 18px; align-items: center; }
nav .brand { color: #fff; font-weight: 700; margin-right: auto; text-decoration: none; }
nav a { color: #cfd6ff; text-decoration: none; font-size: 14px; }
nav a:hover { color: #fff; }
main { display: flex; justify-content: center; padding: 32px 20px; }
.card {
    background: #fff; border-radius: 16px; padding: 32px;
    max-width: 560px; width: 100%; box-shadow: 0 4px 24px rgba(0,0,0,0.08);
}
.card h1 { font-size: 26px; color: #1a1a2e; margin-bottom: 8px; }
.card p.lead { font-size: 14px; color: #666; margin-bottom: 20px; }
.form-group { margin-bottom: 16px; }
.form-group label { display: block; font-size: 14px; font-weight: 500; margin-bottom: 6px; color: #444; }
.form-group input, .form-group textarea, .form-group select {
    width: 100%; padding: 12px 14px; border: 1.5px solid #ddd;
    border-radius: 10px; font-size: 16px; outline: none; font-family: inherit;
}
.form-group textarea { min-height: 120px; resize: vertical; }
.form-group input:focus, .form-group textarea:focus { border-color: #4a6cf7; }
.btn {
    width: 100%; padding: 14px; border: none; border-radius: 10px;
    font-size: 16px; font-weight: 600; cursor: pointer;
    background: #4a6cf7; color: #fff;
}
.btn:hover { background: #3b5de7; }
.link { text-align: center; margin-top: 16px; font-size: 14px; color: #666; }
.link a { color: #4a6cf7; text-decoration: none; }
.note { border-bottom: 1px solid #eee; padding: 14px 0; }
.note h2 { font-size: 18px; color: #1a1a2e; }
.note p { font-size: 14px; color: #555; margin-top: 4px; white-space: pre-wrap; }
.empty { color: #999; font-size: 14px; }
.result { margin-top: 20px; padding: 16px; background: #f0f4ff; border-radius: 12px; white-space: pre-wrap; }
"#
}

fn layout(title: &str, show_nav: bool, body: &str) -> String {
    let nav = if show_nav {
        r#"<nav>
  <a class="brand" href="/index">Lingobook</a>
  <a href="/notes">Notes</a>
  <a href="/add-note">Add Note</a>
  <a href="/translate">Translate</a>
  <a href="/about">About</a>
  <a href="/logout">Logout</a>
</nav>"#
    } else {
        r#"<nav>
  <a class="brand" href="/login">Lingobook</a>
  <a href="/login">Login</a>
  <a href="/signup">Sign Up</a>
  <a href="/about">About</a>
</nav>"#
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title} - Lingobook</title>
<link rel="stylesheet" href="/static/style.css">
</head><body>
{nav}
<main><div class="card">
{body}
</div></main>
</body></html>"#,
        title = escape_html(title),
    )
}

pub fn render_signup() -> String {
    layout(
        "Signup",
        false,
        r#"<h1>Sign Up</h1>
<p class="lead">Create an account to keep notes and translate text.</p>
<form method="POST" action="/signup">
  <div class="form-group"><label for="name">Name</label>
    <input id="name" type="text" name="name" required autocomplete="name"></div>
  <div class="form-group"><label for="phone">Phone</label>
    <input id="phone" type="tel" name="phone" required autocomplete="tel"></div>
  <div class="form-group"><label for="email">Email</label>
    <input id="email" type="email" name="email" required autocomplete="email"></div>
  <div class="form-group"><label for="password">Password</label>
    <input id="password" type="password" name="password" required autocomplete="new-password"></div>
  <button type="submit" class="btn">Create Account</button>
</form>
<div class="link">Already have an account? <a href="/login">Login</a></div>"#,
    )
}

pub fn render_login() -> String {
    layout(
        "Login",
        false,
        r#"<h1>Login</h1>
<form method="POST" action="/login">
  <div class="form-group"><label for="email">Email</label>
    <input id="email" type="email" name="email" required autocomplete="email"></div>
  <div class="form-group"><label for="password">Password</label>
    <input id="password" type="password" name="password" required autocomplete="current-password"></div>
  <button type="submit" class="btn">Login</button>
</form>
<div class="link">No account? <a href="/signup">Sign Up</a></div>"#,
    )
}

pub fn render_index() -> String {
    layout(
        "Home",
        true,
        r#"<h1>Welcome</h1>
<p class="lead">Write down what you are learning and translate as you go.</p>
<div class="link"><a href="/notes">Your notes</a> &middot; <a href="/translate">Translator</a></div>"#,
    )
}

pub fn render_notes(notes: &[Note]) -> String {
    let items = if notes.is_empty() {
        r#"<p class="empty">No notes yet.</p>"#.to_string()
    } else {
        notes
            .iter()
            .map(|note| {
                format!(
                    r#"<div class="note"><h2>{}</h2><p>{}</p></div>"#,
                    escape_html(&note.title),
                    escape_html(&note.content)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    layout(
        "Notes",
        true,
        &format!(
            r#"<h1>Notes</h1>
{items}
<div class="link"><a href="/add-note">Add a note</a></div>"#
        ),
    )
}

pub fn render_add_note() -> String {
    layout(
        "Add Note",
        true,
        r#"<h1>Add Note</h1>
<form method="POST" action="/add-note">
  <div class="form-group"><label for="title">Title</label>
    <input id="title" type="text" name="title"></div>
  <div class="form-group"><label for="content">Content</label>
    <textarea id="content" name="content"></textarea></div>
  <button type="submit" class="btn">Save Note</button>
</form>"#,
    )
}

/// Translate form, optionally showing the last result.
pub fn render_translate(text: &str, target: &str, translated: Option<&str>) -> String {
    let options = LANGUAGES
        .iter()
        .map(|(code, label)| {
            let selected = if *code == target { " selected" } else { "" };
            format!(r#"<option value="{code}"{selected}>{label}</option>"#)
        })
        .collect::<Vec<_>>()
        .join("");

    let result = translated
        .map(|t| format!(r#"<div class="result" id="translation">{}</div>"#, escape_html(t)))
        .unwrap_or_default();

    layout(
        "Translator",
        true,
        &format!(
            r#"<h1>Translator</h1>
<form method="POST" action="/translate">
  <div class="form-group"><label for="text">Text</label>
    <textarea id="text" name="text" required>{text}</textarea></div>
  <div class="form-group"><label for="targetLanguage">Target language</label>
    <select id="targetLanguage" name="targetLanguage">{options}</select></div>
  <button type="submit" class="btn">Translate</button>
</form>
{result}"#,
            text = escape_html(text),
        ),
    )
}

pub fn render_about(logged_in: bool) -> String {
    layout(
        "About",
        logged_in,
        r#"<h1>About</h1>
<p class="lead">Lingobook is a small language learning tool: keep shared study notes
and translate phrases into other languages.</p>
<p class="lead">Notes are visible to every signed-in user.</p>"#,
    )
}
