//! Display strings for the `ru-RU` locale.

const GROUP_SEPARATOR: char = '\u{a0}';

/// Whole-ruble amount with locale digit grouping, e.g. `1 000 000 ₽`.
pub fn format_rubles(value: f64) -> String {
    format!("{}{GROUP_SEPARATOR}₽", group_digits(value.round()))
}

/// Fixed two-decimal rendering used by the analytics payload.
pub fn fixed2(value: f64) -> String {
    format!("{value:.2}")
}

pub fn format_years(years: u32) -> String {
    format!("{years} {}", plural_ru(years, ["год", "года", "лет"]))
}

pub fn format_months(months: u32) -> String {
    format!("{months} {}", plural_ru(months, ["месяц", "месяца", "месяцев"]))
}

/// Picks the Russian noun form for `count`: one, few, many.
pub fn plural_ru(count: u32, forms: [&'static str; 3]) -> &'static str {
    let tens = count % 100;
    let units = count % 10;
    if (11..=14).contains(&tens) {
        return forms[2];
    }
    match units {
        1 => forms[0],
        2..=4 => forms[1],
        _ => forms[2],
    }
}

fn group_digits(value: f64) -> String {
    let negative = value < 0.0;
    let digits = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(ch);
    }
    if negative {
        grouped.insert(0, '-');
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_rubles_groups_thousands_with_no_break_space() {
        assert_eq!(format_rubles(1_000_000.0), "1\u{a0}000\u{a0}000\u{a0}₽");
        assert_eq!(format_rubles(30_000.0), "30\u{a0}000\u{a0}₽");
        assert_eq!(format_rubles(999.0), "999\u{a0}₽");
        assert_eq!(format_rubles(0.0), "0\u{a0}₽");
    }

    #[test]
    fn format_rubles_rounds_to_whole_units() {
        assert_eq!(format_rubles(34_789.14), "34\u{a0}789\u{a0}₽");
        assert_eq!(format_rubles(23_761.79), "23\u{a0}762\u{a0}₽");
    }

    #[test]
    fn fixed2_keeps_two_decimals() {
        assert_eq!(fixed2(1_000_000.0), "1000000.00");
        assert_eq!(fixed2(34_789.139_380_386_8), "34789.14");
    }

    #[test]
    fn years_and_months_take_russian_plural_forms() {
        assert_eq!(format_years(1), "1 год");
        assert_eq!(format_years(3), "3 года");
        assert_eq!(format_years(5), "5 лет");
        assert_eq!(format_years(11), "11 лет");
        assert_eq!(format_years(15), "15 лет");
        assert_eq!(format_years(21), "21 год");
        assert_eq!(format_months(60), "60 месяцев");
        assert_eq!(format_months(22), "22 месяца");
    }
}
