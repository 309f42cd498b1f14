use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A checksum-verified ISBN, always available in ISBN-13 form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Isbn {
    pub raw: String,
    pub isbn13: String,
    pub isbn10: Option<String>,
    pub formatted: String,
}

fn strip_isbn(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

fn check_isbn10(digits: &[u8]) -> bool {
    // digits[9] may be 10 (X)
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| (10 - i as u32) * d as u32)
        .sum();
    sum % 11 == 0
}

fn isbn13_sum(digits: &[u8]) -> u32 {
    digits
        .iter()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d as u32 } else { d as u32 * 3 })
        .sum()
}

fn isbn10_to_isbn13(digits10: &[u8]) -> String {
    let mut d13: Vec<u8> = vec![9, 7, 8];
    d13.extend_from_slice(&digits10[..9]);
    let check = (10 - (isbn13_sum(&d13) % 10)) % 10;
    d13.push(check as u8);
    d13.iter().map(|d| d.to_string()).collect()
}

fn isbn13_to_isbn10(digits13: &[u8]) -> String {
    let d9 = &digits13[3..12];
    let sum: u32 = d9
        .iter()
        .enumerate()
        .map(|(i, &d)| (10 - i as u32) * d as u32)
        .sum();
    let check = (11 - sum % 11) % 11;
    let mut s: String = d9.iter().map(|d| d.to_string()).collect();
    s.push(if check == 10 { 'X' } else { (b'0' + check as u8) as char });
    s
}

fn format_isbn13(s: &str) -> String {
    // Registrant ranges vary by group; 978-X-XXXX-XXXX-X is a readable approximation.
    if s.len() == 13 {
        format!("{}-{}-{}-{}-{}", &s[0..3], &s[3..4], &s[4..8], &s[8..12], &s[12..13])
    } else {
        s.to_string()
    }
}

impl Isbn {
    pub fn parse(input: &str) -> Result<Self> {
        let stripped = strip_isbn(input);
        let invalid = || CoreError::InvalidIsbn(input.to_string());

        match stripped.len() {
            13 => {
                if !stripped.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                let digits: Vec<u8> = stripped.bytes().map(|b| b - b'0').collect();
                if isbn13_sum(&digits) % 10 != 0 {
                    return Err(invalid());
                }
                // ISBN-10 only exists for the 978 prefix
                let isbn10 = stripped.starts_with("978").then(|| isbn13_to_isbn10(&digits));
                Ok(Self {
                    raw: input.to_string(),
                    formatted: format_isbn13(&stripped),
                    isbn13: stripped,
                    isbn10,
                })
            }
            10 => {
                let mut digits: Vec<u8> = Vec::with_capacity(10);
                for (i, c) in stripped.chars().enumerate() {
                    match c {
                        'X' if i == 9 => digits.push(10),
                        c if c.is_ascii_digit() => digits.push(c as u8 - b'0'),
                        _ => return Err(invalid()),
                    }
                }
                if !check_isbn10(&digits) {
                    return Err(invalid());
                }
                let isbn13 = isbn10_to_isbn13(&digits);
                Ok(Self {
                    raw: input.to_string(),
                    formatted: format_isbn13(&isbn13),
                    isbn13,
                    isbn10: Some(stripped),
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Shape-only check: ten characters (digits, optional trailing X) or
/// thirteen digits starting with 978/979. Checksums are not verified.
pub fn is_valid_isbn_shape(isbn: &str) -> bool {
    let cleaned: String = isbn
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .collect::<String>()
        .to_uppercase();

    match cleaned.len() {
        10 => cleaned[..9].chars().all(|c| c.is_ascii_digit()),
        13 => {
            cleaned.chars().all(|c| c.is_ascii_digit())
                && (cleaned.starts_with("978") || cleaned.starts_with("979"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_isbn13() {
        let isbn = Isbn::parse("9780306406157").unwrap();
        assert_eq!(isbn.isbn13, "9780306406157");
        assert_eq!(isbn.isbn10.as_deref(), Some("0306406152"));
    }

    #[test]
    fn isbn13_with_hyphens() {
        let isbn = Isbn::parse("978-0-306-40615-7").unwrap();
        assert_eq!(isbn.isbn13, "9780306406157");
        assert_eq!(isbn.formatted, "978-0-3064-0615-7");
    }

    #[test]
    fn valid_isbn10() {
        let isbn = Isbn::parse("0306406152").unwrap();
        assert_eq!(isbn.isbn10, Some("0306406152".to_string()));
        assert_eq!(isbn.isbn13, "9780306406157");
    }

    #[test]
    fn isbn10_with_x_check() {
        let isbn = Isbn::parse("007462542X").unwrap();
        assert_eq!(isbn.isbn10, Some("007462542X".to_string()));
    }

    #[test]
    fn invalid_check_digit() {
        assert!(Isbn::parse("9780306406158").is_err());
        assert!(Isbn::parse("0306406153").is_err());
    }

    #[test]
    fn isbn13_979_has_no_isbn10() {
        let isbn = Isbn::parse("9791032305690").unwrap();
        assert_eq!(isbn.isbn10, None);
    }

    #[test]
    fn shape_check() {
        assert!(is_valid_isbn_shape("978-0-13-235088-4"));
        assert!(is_valid_isbn_shape("979-10-323-0569-0"));
        assert!(is_valid_isbn_shape("013235088x"));
        assert!(!is_valid_isbn_shape("1234567890123"));
        assert!(!is_valid_isbn_shape("12345"));
        assert!(!is_valid_isbn_shape(""));
    }
}
