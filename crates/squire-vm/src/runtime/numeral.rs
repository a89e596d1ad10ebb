//! Roman and arabic numeral rendering and parsing.

const ROMAN_TABLE: [(u64, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Characters that start a roman numeral.
pub const ROMAN_DIGITS: &str = "NIVXLCDM";

/// Largest magnitude rendered with roman digits; beyond it the `M` run
/// would be unbounded, so arabic digits are used instead.
pub const ROMAN_LIMIT: u64 = 1_000_000;

/// Renders a numeral in roman digits. Zero is `N`.
pub fn to_roman(numeral: i64) -> String {
    if numeral == 0 {
        return "N".to_string();
    }
    if numeral.unsigned_abs() > ROMAN_LIMIT {
        return to_arabic(numeral);
    }

    let mut out = String::new();
    if numeral < 0 {
        out.push('-');
    }

    let mut rest = numeral.unsigned_abs();
    for (weight, digits) in ROMAN_TABLE {
        while rest >= weight {
            out.push_str(digits);
            rest -= weight;
        }
    }
    out
}

/// Renders a numeral in arabic digits.
pub fn to_arabic(numeral: i64) -> String {
    numeral.to_string()
}

fn roman_value(c: char) -> Option<i64> {
    Some(match c {
        'I' => 1,
        'V' => 5,
        'X' => 10,
        'L' => 50,
        'C' => 100,
        'D' => 500,
        'M' => 1000,
        _ => return None,
    })
}

/// Parses a leading roman numeral, returning the value and the number of
/// bytes consumed. A lone `N` is zero.
pub fn parse_roman(input: &str) -> Option<(i64, usize)> {
    let mut chars = input.char_indices().peekable();

    if input.starts_with('N') {
        let next = input[1..].chars().next();
        if !next.is_some_and(|c| c.is_alphanumeric()) {
            return Some((0, 1));
        }
    }

    let mut total: i64 = 0;
    let mut consumed = 0;
    while let Some((index, c)) = chars.next() {
        let Some(value) = roman_value(c) else { break };
        let next = chars.peek().and_then(|&(_, n)| roman_value(n));
        match next {
            Some(bigger) if bigger > value => total = total.saturating_sub(value),
            _ => total = total.saturating_add(value),
        }
        consumed = index + c.len_utf8();
    }

    (consumed > 0).then_some((total, consumed))
}

/// Parses the numeral at the start of a text.
///
/// Leading whitespace is skipped. Roman digits win when the text starts
/// with one; otherwise an optionally signed decimal integer is read.
/// Anything unparseable is zero.
pub fn parse_numeral(text: &str) -> i64 {
    let text = text.trim_start();
    if text.starts_with(|c| ROMAN_DIGITS.contains(c)) {
        return parse_roman(text).map_or(0, |(value, _)| value);
    }

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    for byte in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value
            .saturating_mul(10)
            .saturating_add(i64::from(byte - b'0'));
    }

    if negative { -value } else { value }
}
