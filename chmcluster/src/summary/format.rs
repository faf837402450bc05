//! Number rendering for summaries: thousands separators and unit prefixes

pub const MEGA_PREFIX: &str = "mega";
pub const GIGA_PREFIX: &str = "giga";
pub const MEGA_VAL: u64 = 1_000_000;
pub const GIGA_VAL: u64 = 1_000_000_000;

// floats outside [EXPONENT_LOW, EXPONENT_HIGH) render with an exponent
const EXPONENT_LOW: f64 = 1e-4;
const EXPONENT_HIGH: f64 = 1e16;

/// insert `,` every three digits of an unsigned integer string
fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    grouped
}

/// group the integer part of an already formatted number
fn group_formatted(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (integer, fraction) = match unsigned.find('.') {
        Some(index) => unsigned.split_at(index),
        None => (unsigned, ""),
    };

    format!("{sign}{}{fraction}", group_digits(integer))
}

/// `1233` -> `1,233`
pub fn number_to_string(value: u64) -> String {
    group_digits(&value.to_string())
}

/// shortest representation with thousands separators, `2.0` stays `2.0`.
///
/// Magnitudes below `1e-4` or from `1e16` on switch to exponent notation
/// with a signed, two digit exponent, `0.00005` -> `5e-05`.
pub fn float_to_string(value: f64) -> String {
    let magnitude = value.abs();
    if value.is_finite()
        && value != 0.0
        && !(EXPONENT_LOW..EXPONENT_HIGH).contains(&magnitude)
    {
        return exponent_to_string(value);
    }

    let mut formatted = value.to_string();

    if value.is_finite() && !formatted.contains('.') {
        formatted.push_str(".0");
    }

    group_formatted(&formatted)
}

fn exponent_to_string(value: f64) -> String {
    let formatted = format!("{value:e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };

    format!("{mantissa}e{sign}{digits:0>2}")
}

/// one decimal place with thousands separators, `1233.26` -> `1,233.3`
pub fn float_to_string_1dp(value: f64) -> String {
    group_formatted(&format!("{value:.1}"))
}

/// one decimal place without separators, `23423.23423` -> `23423.2`
pub fn years_to_string(value: f64) -> String {
    format!("{value:.1}")
}

/// `<value> ` below a million, `<value/1e6> mega` below a billion,
/// `<value/1e9> giga` otherwise
pub fn float_to_string_with_unitprefix(value: u64) -> String {
    if value < MEGA_VAL {
        return number_to_string(value) + " ";
    }

    if value < GIGA_VAL {
        return float_to_string_1dp(value as f64 / MEGA_VAL as f64) + " " + MEGA_PREFIX;
    }

    float_to_string_1dp(value as f64 / GIGA_VAL as f64) + " " + GIGA_PREFIX
}

/// `completed/total` as whole percent, never `100%` while tasks remain
pub fn percent_complete(completed: usize, total: usize) -> String {
    let percent = format!("{:.0}%", completed as f64 / total as f64 * 100.0);

    if percent == "100%" && completed < total {
        "99%".to_owned()
    } else {
        percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(0), "0");
        assert_eq!(number_to_string(999), "999");
        assert_eq!(number_to_string(1233), "1,233");
        assert_eq!(number_to_string(1234567), "1,234,567");
    }

    #[test]
    fn test_float_to_string() {
        assert_eq!(float_to_string(0.5), "0.5");
        assert_eq!(float_to_string(2.0), "2.0");
        assert_eq!(float_to_string(1234.5), "1,234.5");
        assert_eq!(float_to_string(-1234.5), "-1,234.5");
        assert_eq!(float_to_string(0.0), "0.0");
        assert_eq!(float_to_string(0.0001), "0.0001");
    }

    #[test]
    fn test_float_to_string_exponent() {
        assert_eq!(float_to_string(0.00005), "5e-05");
        assert_eq!(float_to_string(0.000012), "1.2e-05");
        assert_eq!(float_to_string(-0.00005), "-5e-05");
        assert_eq!(float_to_string(1e16), "1e+16");
        assert_eq!(float_to_string(2.5e-123), "2.5e-123");
    }

    #[test]
    fn test_float_to_string_1dp() {
        assert_eq!(float_to_string_1dp(0.0), "0.0");
        assert_eq!(float_to_string_1dp(1233.26), "1,233.3");
        assert_eq!(float_to_string_1dp(1234567.0), "1,234,567.0");
        assert_eq!(years_to_string(23423.23423), "23423.2");
    }

    #[test]
    fn test_unit_prefix() {
        assert_eq!(float_to_string_with_unitprefix(0), "0 ");
        assert_eq!(float_to_string_with_unitprefix(999_999), "999,999 ");
        assert_eq!(float_to_string_with_unitprefix(1_500_000), "1.5 mega");
        assert_eq!(float_to_string_with_unitprefix(2_000_000_000), "2.0 giga");
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(10, 10), "100%");
        assert_eq!(percent_complete(9, 10), "90%");
        assert_eq!(percent_complete(999, 1000), "99%");
        assert_eq!(percent_complete(1, 3), "33%");
        assert_eq!(percent_complete(0, 5), "0%");
    }
}
