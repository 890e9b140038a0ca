//! GSTIN (Goods and Services Tax Identification Number) validation.
//!
//! Layout: 2-digit state code, 10-character PAN, entity number, a
//! default `Z`, and a base-36 check character.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

const CHARSET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

lazy_static! {
    static ref GSTIN_SHAPE: Regex =
        Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z][0-9A-Z][0-9A-Z]$").unwrap();
}

/// Why a GSTIN was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GstinIssue {
    #[error("expected 15 characters, found {0}")]
    Length(usize),

    #[error("does not match the GSTIN layout")]
    Format,

    #[error("unknown state code {0}")]
    StateCode(String),

    #[error("check character should be {expected}, found {found}")]
    Checksum { expected: char, found: char },
}

/// Uppercase and drop whitespace.
pub fn normalize_gstin(gstin: &str) -> String {
    gstin
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Validate layout, state code and check character.
pub fn validate_gstin(gstin: &str) -> Result<(), GstinIssue> {
    let gstin = normalize_gstin(gstin);
    let len = gstin.chars().count();
    if len != 15 {
        return Err(GstinIssue::Length(len));
    }
    if !GSTIN_SHAPE.is_match(&gstin) {
        return Err(GstinIssue::Format);
    }
    if state_code(&gstin).is_none() {
        return Err(GstinIssue::StateCode(gstin[..2].to_string()));
    }

    let expected = check_character(&gstin[..14]).ok_or(GstinIssue::Format)?;
    let found = gstin.as_bytes()[14] as char;
    if expected != found {
        return Err(GstinIssue::Checksum { expected, found });
    }
    Ok(())
}

/// Base-36 check character over the first 14 characters.
///
/// Odd positions carry weight 1, even positions weight 2; each product is
/// folded back into base 36 before summing.
pub fn check_character(first14: &str) -> Option<char> {
    if first14.len() != 14 {
        return None;
    }

    let mut sum = 0u32;
    for (i, byte) in first14.bytes().enumerate() {
        let value = CHARSET.iter().position(|c| *c == byte)? as u32;
        let product = value * if i % 2 == 0 { 1 } else { 2 };
        sum += product / 36 + product % 36;
    }

    let check = (36 - sum % 36) % 36;
    Some(CHARSET[check as usize] as char)
}

/// State code of a GSTIN, when it is a code in use.
pub fn state_code(gstin: &str) -> Option<u8> {
    let code: u8 = gstin.get(..2)?.parse().ok()?;
    matches!(code, 1..=38 | 97 | 99).then_some(code)
}
