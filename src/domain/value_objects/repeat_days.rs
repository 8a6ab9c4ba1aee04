use chrono::Weekday;

use crate::domain::errors::TaskError;

/// Index of a weekday in the stored pattern encoding (Sunday = 0 .. Saturday = 6).
pub fn to_sunday_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

pub fn from_sunday_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parse a comma-separated list of day names ("mon,wed,fri" or full names)
/// into a de-duplicated pattern ordered Monday first.
pub fn parse_days(input: &str) -> Result<Vec<Weekday>, TaskError> {
    let day_map = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
        ("mon", Weekday::Mon),
        ("tue", Weekday::Tue),
        ("wed", Weekday::Wed),
        ("thu", Weekday::Thu),
        ("fri", Weekday::Fri),
        ("sat", Weekday::Sat),
        ("sun", Weekday::Sun),
    ];

    let mut days: Vec<Weekday> = Vec::new();
    for part in input.split(',') {
        let part_clean = part.trim().to_lowercase();
        if part_clean.is_empty() {
            continue;
        }
        let day = day_map
            .iter()
            .find(|(name, _)| part_clean == *name)
            .map(|(_, d)| *d)
            .ok_or_else(|| TaskError::validation(format!("invalid weekday: {}", part.trim())))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }

    days.sort_by_key(|d| d.num_days_from_monday());
    Ok(days)
}

/// Short display form, Monday-first order ("Mon, Wed, Fri").
pub fn format_days(days: &[Weekday]) -> String {
    let mut sorted: Vec<Weekday> = days.to_vec();
    sorted.sort_by_key(|d| d.num_days_from_monday());
    sorted.dedup();
    sorted
        .iter()
        .map(|d| match d {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_names_and_sorts_monday_first() {
        let days = parse_days("fri, Monday,wed").unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
    }

    #[test]
    fn rejects_unknown_day() {
        assert!(parse_days("mon,funday").is_err());
    }

    #[test]
    fn dedupes_repeated_days() {
        let days = parse_days("mon,monday,mon").unwrap();
        assert_eq!(days, vec![Weekday::Mon]);
    }

    #[test]
    fn sunday_index_round_trips() {
        for i in 0..7u8 {
            assert_eq!(to_sunday_index(from_sunday_index(i).unwrap()), i);
        }
        assert!(from_sunday_index(7).is_none());
    }
}
