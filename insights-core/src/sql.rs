//! Parameterized SQL text.
//!
//! Query text is assembled from engine-owned fragments only; every value
//! that originates from a request is appended to [`Params`] and referenced
//! through a positional `$n` placeholder.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl SqlParam {
    /// SQL literal form, for logs only.
    fn literal(&self) -> String {
        match self {
            SqlParam::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlParam::Int(i) => i.to_string(),
            SqlParam::Timestamp(ts) => {
                format!("'{}'", ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

/// Ordered parameter list; position `i` is placeholder `$i+1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<SqlParam>);

impl Params {
    /// Append a value and return the placeholder that refers to it.
    pub fn bind(&mut self, param: SqlParam) -> String {
        self.0.push(param);
        format!("${}", self.0.len())
    }

    pub fn bind_text(&mut self, value: impl Into<String>) -> String {
        self.bind(SqlParam::Text(value.into()))
    }

    pub fn bind_int(&mut self, value: i64) -> String {
        self.bind(SqlParam::Int(value))
    }

    pub fn bind_timestamp(&mut self, value: DateTime<Utc>) -> String {
        self.bind(SqlParam::Timestamp(value))
    }

    /// Bind each value and return the comma-separated placeholders.
    pub fn bind_list<'a>(&mut self, values: impl IntoIterator<Item = &'a String>) -> String {
        values
            .into_iter()
            .map(|v| self.bind_text(v.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[SqlParam] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<SqlParam> {
        self.0
    }
}

/// Final `(text, params)` pair handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub text: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn new(text: String, params: Params) -> Self {
        Self {
            text,
            params: params.into_vec(),
        }
    }

    /// Text with every placeholder replaced by its literal.
    ///
    /// Never send this to the database.
    pub fn interpolated(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        // Single pass over the original text; substituted literals are never rescanned.
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            let param = after[..digits]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| self.params.get(idx));
            match param {
                Some(param) => out.push_str(&param.literal()),
                None => out.push_str(&rest[pos..pos + 1 + digits]),
            }
            rest = &after[digits..];
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Escape `LIKE` wildcards so user text matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
