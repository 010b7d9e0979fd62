use std::net::Ipv4Addr;

use url::Url;

use crate::error::{Issue, PaygateError};
use crate::provider::Operation;

/// Collects field issues so a request reports every problem at once.
#[derive(Debug)]
pub struct Checker {
    operation: Operation,
    issues: Vec<Issue>,
}

impl Checker {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            issues: Vec::new(),
        }
    }

    pub fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(Issue {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.fail(field, message);
        }
    }

    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value {
            Some(v) if !v.trim().is_empty() => Some(v),
            _ => {
                self.fail(field, "is required");
                None
            }
        }
    }

    pub fn not_empty(&mut self, field: &str, value: &str) {
        self.check(!value.trim().is_empty(), field, "must not be empty");
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        let n = value.chars().count();
        self.check(n <= max, field, format!("must be at most {max} characters, got {n}"));
    }

    pub fn char_range(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let n = value.chars().count();
        self.check(
            (min..=max).contains(&n),
            field,
            format!("must be between {min} and {max} characters, got {n}"),
        );
    }

    pub fn range(&mut self, field: &str, value: i64, min: i64, max: i64) {
        self.check(
            (min..=max).contains(&value),
            field,
            format!("must be between {min} and {max}, got {value}"),
        );
    }

    pub fn at_least(&mut self, field: &str, value: i64, min: i64) {
        self.check(value >= min, field, format!("must be at least {min}, got {value}"));
    }

    pub fn url(&mut self, field: &str, value: &str) {
        let ok = Url::parse(value)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        self.check(ok, field, "must be an http(s) URL");
    }

    pub fn ipv4(&mut self, field: &str, value: &str) {
        self.check(
            value.parse::<Ipv4Addr>().is_ok(),
            field,
            "must be an IPv4 address",
        );
    }

    pub fn email(&mut self, field: &str, value: &str) {
        self.check(is_email(value), field, "must be a valid email address");
    }

    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) {
        self.check(
            allowed.contains(&value),
            field,
            format!("must be one of {}", allowed.join(", ")),
        );
    }

    pub fn finish(self) -> Result<(), PaygateError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(PaygateError::Validation {
                operation: self.operation,
                issues: self.issues,
            })
        }
    }
}

pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !value.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

/// `^[0-9a-zA-Z]([-_.]*[0-9a-zA-Z]+)*$`: alphanumeric runs joined by
/// separator runs, never starting or ending with a separator.
pub fn is_order_reference(value: &str) -> bool {
    let is_sep = |c: char| matches!(c, '-' | '_' | '.');
    let (Some(first), Some(last)) = (value.chars().next(), value.chars().last()) else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || is_sep(c))
}
