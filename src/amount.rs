use crate::error::{MapperError, Result};
use crate::schema::NegativeStyle;
use num_format::{Locale, ToFormattedString as _};
use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::Decimal;

const NOTE_MARK: char = '※';
const NEGATIVE_MARKS: &[char] = &['-', '△', '▲'];
const DASHES: &[char] = &['-', '‐', '—', '―', 'ー'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAmount {
    pub value: Decimal,
    /// Note references such as `※6,※8` or `※6,8` found in the cell.
    pub note: Option<String>,
}

/// Parses a statement amount cell.
///
/// Accepts thousands separators, full-width digits, `△`/`▲`/`-` negatives and
/// parenthesised negatives. A blank or dash-only cell is zero.
pub fn parse_amount(raw: &str) -> Result<ParsedAmount> {
    let folded: String = raw.chars().map(fold_full_width).collect();
    let (text, note) = extract_notes(&folded);
    let text = text.trim();

    if text.is_empty() || text.chars().all(|c| DASHES.contains(&c)) {
        return Ok(ParsedAmount {
            value: Decimal::ZERO,
            note,
        });
    }

    let invalid = |reason: &str| MapperError::ValueParseError {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let (text, parenthesised) = match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (inner.trim(), true),
        None => (text, false),
    };

    let (text, signed) = match text.strip_prefix(NEGATIVE_MARKS) {
        Some(rest) => (rest.trim_start(), true),
        None => (text.strip_prefix('+').unwrap_or(text), false),
    };

    if parenthesised && signed {
        return Err(invalid("both parentheses and a sign mark negative"));
    }

    let digits: String = text.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return Err(invalid("no digits"));
    }
    if let Some(unexpected) = digits.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        return Err(invalid(&format!("unexpected character '{}'", unexpected)));
    }

    let magnitude = Decimal::from_str_exact(&digits).map_err(|e| invalid(&e.to_string()))?;
    let value = if parenthesised || signed {
        -magnitude
    } else {
        magnitude
    };

    Ok(ParsedAmount { value, note })
}

fn fold_full_width(c: char) -> char {
    match c {
        '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
        '，' => ',',
        '．' => '.',
        '（' => '(',
        '）' => ')',
        '－' | '−' => '-',
        '＋' => '+',
        '　' => ' ',
        _ => c,
    }
}

/// Splits `※` note references (`※6`, `※6,※8`, `※6,8`) out of the cell.
fn extract_notes(text: &str) -> (String, Option<String>) {
    if !text.contains(NOTE_MARK) {
        return (text.to_string(), None);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut rest = String::new();
    let mut notes = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != NOTE_MARK {
            rest.push(chars[i]);
            i += 1;
            continue;
        }
        notes.push(NOTE_MARK);
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            notes.push(chars[i]);
            i += 1;
        }
        while i + 1 < chars.len() && chars[i] == ',' && chars[i + 1].is_ascii_digit() {
            notes.push(',');
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                notes.push(chars[i]);
                i += 1;
            }
        }
        if i + 1 < chars.len() && chars[i] == ',' && chars[i + 1] == NOTE_MARK {
            notes.push(',');
            i += 1;
        }
    }

    (rest, Some(notes))
}

pub fn format_amount(amount: Decimal, style: NegativeStyle) -> String {
    let magnitude = amount.abs();
    let integer_part = magnitude.trunc();
    let mut text = match integer_part.to_u128() {
        Some(integer) => integer.to_formatted_string(&Locale::en),
        None => integer_part.to_string(),
    };

    let fraction = magnitude.fract().normalize();
    if !fraction.is_zero() {
        let fraction = fraction.to_string();
        text.push_str(fraction.trim_start_matches('0'));
    }

    if amount < Decimal::ZERO {
        match style {
            NegativeStyle::Minus => format!("-{}", text),
            NegativeStyle::Triangle => format!("△{}", text),
        }
    } else {
        text
    }
}
