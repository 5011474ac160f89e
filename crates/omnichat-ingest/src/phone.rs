// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Russian mobile number extraction from free text.
//!
//! Matches `+7` or `8` followed by ten digits, optionally grouped as
//! `(XXX) XXX-XX-XX` with spaces or dashes, and normalises to
//! `+7XXXXXXXXXX`.

use std::sync::LazyLock;

use regex::Regex;

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^\d+])(?:\+7|8)[\s\-]*\(?(\d{3})\)?[\s\-]*(\d{3})[\s\-]*(\d{2})[\s\-]*(\d{2})(?:\D|$)",
    )
    .expect("phone pattern is a valid literal")
});

/// First phone number mentioned in `text`, normalised.
pub fn extract_phone(text: &str) -> Option<String> {
    let captures = PHONE_PATTERN.captures(text)?;
    let mut phone = String::from("+7");
    for group in 1..=4 {
        phone.push_str(captures.get(group)?.as_str());
    }
    Some(phone)
}

/// Normalise a phone number supplied by a platform or an operator.
///
/// Russian numbers become `+7XXXXXXXXXX`; other international numbers keep
/// their digits behind a `+`. Anything too short or too long is rejected.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        11 if digits.starts_with('7') || digits.starts_with('8') => {
            Some(format!("+7{}", &digits[1..]))
        }
        10 if digits.starts_with('9') => Some(format!("+7{digits}")),
        10..=15 => Some(format!("+{digits}")),
        _ => None,
    }
}
