//! Conversion between Western digits and the Arabic-script digit sets.
//!
//! OCR of Persian and Arabic documents renders numbers in Extended
//! Arabic-Indic (`۰`–`۹`, U+06F0..U+06F9) or Arabic-Indic (`٠`–`٩`,
//! U+0660..U+0669) glyphs while users usually type Western digits.

const EXTENDED_ARABIC_INDIC_ZERO: u32 = 0x06F0;
const ARABIC_INDIC_ZERO: u32 = 0x0660;

fn eastern_value(c: char) -> Option<u32> {
    let code = c as u32;
    if (EXTENDED_ARABIC_INDIC_ZERO..EXTENDED_ARABIC_INDIC_ZERO + 10).contains(&code) {
        Some(code - EXTENDED_ARABIC_INDIC_ZERO)
    } else if (ARABIC_INDIC_ZERO..ARABIC_INDIC_ZERO + 10).contains(&code) {
        Some(code - ARABIC_INDIC_ZERO)
    } else {
        None
    }
}

pub fn is_eastern_digit(c: char) -> bool {
    eastern_value(c).is_some()
}

/// True for ASCII digits and both Eastern digit sets.
pub fn is_any_digit(c: char) -> bool {
    c.is_ascii_digit() || is_eastern_digit(c)
}

pub fn has_eastern_digits(text: &str) -> bool {
    text.chars().any(is_eastern_digit)
}

/// Maps Western digits to Extended Arabic-Indic glyphs.
pub fn to_eastern(text: &str) -> String {
    text.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => {
                char::from_u32(EXTENDED_ARABIC_INDIC_ZERO + d).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}

/// Maps both Eastern digit sets to Western digits.
pub fn to_western(text: &str) -> String {
    text.chars()
        .map(|c| match eastern_value(c) {
            Some(d) => char::from_digit(d, 10).unwrap_or(c),
            None => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_eastern() {
        assert_eq!(to_eastern("3/6"), "۳/۶");
        assert_eq!(to_eastern("page 10"), "page ۱۰");
        assert_eq!(to_eastern("no digits"), "no digits");
    }

    #[test]
    fn test_to_western_handles_both_sets() {
        assert_eq!(to_western("۳/۶"), "3/6");
        assert_eq!(to_western("٤٥"), "45");
        assert_eq!(to_western("صفحه ۱۲"), "صفحه 12");
    }

    #[test]
    fn test_digit_classification() {
        assert!(is_any_digit('7'));
        assert!(is_any_digit('۷'));
        assert!(is_any_digit('٧'));
        assert!(!is_any_digit('x'));
        assert!(has_eastern_digits("B۱۲"));
        assert!(!has_eastern_digits("B12"));
    }
}
