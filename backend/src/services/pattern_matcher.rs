//! Signature inspection of inbound request text.

use axum::http::Method;
use regex::{Regex, RegexBuilder};

const SQL_INJECTION_PATTERNS: &[&str] = &[
    r"(%27)|(')|(--)|(%23)|(#)",
    r"union.+select",
    r"select.+from",
    r"drop.+table",
    r"insert.+into",
];

const XSS_PATTERNS: &[&str] = &[
    r"<script[^>]*>",
    r"javascript:",
    r"on\w+\s*=",
    r"document\.cookie",
];

/// Characters of request text kept as evidence on a signature hit.
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatCategory {
    Sql,
    Xss,
    None,
}

/// Compiled signature families. Built once at start-up and shared.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    sql: Regex,
    xss: Regex,
}

impl PatternMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            sql: compile_family(SQL_INJECTION_PATTERNS)?,
            xss: compile_family(XSS_PATTERNS)?,
        })
    }

    /// SQL signatures are tested first; the first family that matches wins.
    pub fn inspect(&self, text: &str) -> ThreatCategory {
        if self.sql.is_match(text) {
            ThreatCategory::Sql
        } else if self.xss.is_match(text) {
            ThreatCategory::Xss
        } else {
            ThreatCategory::None
        }
    }
}

fn compile_family(patterns: &[&str]) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&patterns.join("|"))
        .case_insensitive(true)
        .build()
}

/// Text blob inspected for a request: path, raw query string and, for
/// state-changing methods, the body decoded as UTF-8 with invalid bytes dropped.
pub fn request_text(path: &str, query: Option<&str>, method: &Method, body: Option<&[u8]>) -> String {
    let mut parts = vec![path.to_string(), query.unwrap_or_default().to_string()];
    if carries_body(method) {
        if let Some(body) = body {
            parts.push(String::from_utf8_lossy(body).replace(char::REPLACEMENT_CHARACTER, ""));
        }
    }
    parts.join(" ")
}

pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
