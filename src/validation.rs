/// Identity format checks.
///
/// These run before any storage access; each rejection maps to its own wire
/// code so client SDKs can show precise messages.
use crate::account::types::{self as account_types};
use crate::codes;
use crate::error::{AtlasError, AtlasResult};

/// Loose RFC-style email shape: one '@', non-empty local part, a dot in the
/// domain, no whitespace.
pub fn is_valid_email(s: &str) -> bool {
    if s.len() > 254 || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}

/// Mainland mobile number: 11 digits starting with 1.
pub fn is_valid_mobile(s: &str) -> bool {
    s.len() == 11 && s.starts_with('1') && s.bytes().all(|b| b.is_ascii_digit())
}

/// Username: 6-20 chars, letters/digits/underscore, starts with a letter.
pub fn is_valid_username(s: &str) -> bool {
    if !(6..=20).contains(&s.len()) {
        return false;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Guest or third-party identity: 8-64 chars of [A-Za-z0-9._-].
pub fn is_valid_opaque_id(s: &str) -> bool {
    (8..=64).contains(&s.len())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Validate an identity string against its declared account type.
pub fn check_account_format(account_type: i32, account: &str) -> AtlasResult<()> {
    match account_type {
        account_types::ACCOUNT_EMAIL => {
            if !is_valid_email(account) {
                return Err(AtlasError::op(
                    codes::EMAIL_FORMAT_ERROR,
                    format!("bad email format: {}", account),
                ));
            }
        }
        account_types::ACCOUNT_MOBILE => {
            if !is_valid_mobile(account) {
                return Err(AtlasError::op(
                    codes::PHONE_NUM_FORMAT_ERROR,
                    format!("bad mobile format: {}", account),
                ));
            }
        }
        account_types::ACCOUNT_USERNAME => {
            if !(6..=20).contains(&account.len()) {
                return Err(AtlasError::op(
                    codes::USERNAME_LENGTH_ERROR,
                    format!("bad username length: {}", account.len()),
                ));
            }
            if !is_valid_username(account) {
                return Err(AtlasError::op(
                    codes::USERNAME_FORMAT_ERROR,
                    format!("bad username format: {}", account),
                ));
            }
        }
        account_types::ACCOUNT_GUEST | account_types::ACCOUNT_THIRD => {
            if !(8..=64).contains(&account.len()) {
                return Err(AtlasError::op(
                    codes::GUEST_OR_THIRD_LENGTH_ERROR,
                    format!("bad opaque id length: {}", account.len()),
                ));
            }
            if !is_valid_opaque_id(account) {
                return Err(AtlasError::op(
                    codes::GUEST_OR_THIRD_FORMAT_ERROR,
                    format!("bad opaque id format: {}", account),
                ));
            }
        }
        _ => {
            return Err(AtlasError::op(
                codes::REQUEST_DATA_INCORRECT,
                format!("unknown account type {}", account_type),
            ));
        }
    }
    Ok(())
}

/// National ID number shape: 18 chars, digits with an optional trailing X,
/// and a plausible embedded birth date.
pub fn is_valid_card_id(s: &str) -> bool {
    if s.len() != 18 {
        return false;
    }
    let (body, check) = s.split_at(17);
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if !(check.bytes().all(|b| b.is_ascii_digit()) || check == "X" || check == "x") {
        return false;
    }
    let year: i32 = body[6..10].parse().unwrap_or(0);
    let month: u32 = body[10..12].parse().unwrap_or(0);
    let day: u32 = body[12..14].parse().unwrap_or(0);
    (1900..=2100).contains(&year)
        && chrono::NaiveDate::from_ymd_opt(year, month, day).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b-c@sub.example.co"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user @example.com"));
    }

    #[test]
    fn mobile_shapes() {
        assert!(is_valid_mobile("13800138000"));
        assert!(!is_valid_mobile("23800138000"));
        assert!(!is_valid_mobile("1380013800"));
        assert!(!is_valid_mobile("1380013800a"));
    }

    #[test]
    fn username_shapes() {
        assert!(is_valid_username("player_one"));
        assert!(!is_valid_username("short"));
        assert!(!is_valid_username("1starts_with_digit"));
        assert!(!is_valid_username("has spaces here"));
    }

    #[test]
    fn account_format_maps_to_codes() {
        use crate::account::types::*;
        let err = check_account_format(ACCOUNT_EMAIL, "nope").unwrap_err();
        assert_eq!(err.wire_code(), codes::EMAIL_FORMAT_ERROR);
        let err = check_account_format(ACCOUNT_MOBILE, "nope").unwrap_err();
        assert_eq!(err.wire_code(), codes::PHONE_NUM_FORMAT_ERROR);
        let err = check_account_format(ACCOUNT_GUEST, "short").unwrap_err();
        assert_eq!(err.wire_code(), codes::GUEST_OR_THIRD_LENGTH_ERROR);
        assert!(check_account_format(ACCOUNT_EMAIL, "user@example.com").is_ok());
        assert!(check_account_format(ACCOUNT_THIRD, "1006_abcdef123456").is_ok());
    }

    #[test]
    fn card_id_shapes() {
        assert!(is_valid_card_id("110101201001011234"));
        assert!(is_valid_card_id("11010120100101123X"));
        assert!(!is_valid_card_id("110101209913011234")); // month 13
        assert!(!is_valid_card_id("11010120100101123"));
    }
}
