use time::{Date, OffsetDateTime, macros::format_description};

/// Parses the leading `YYYY-MM-DD` of a stored birthdate.
pub fn parse_birthdate(raw: &str) -> Option<Date> {
	let raw = raw.trim();
	let head = raw.get(..10)?;

	Date::parse(head, format_description!("[year]-[month]-[day]")).ok()
}

/// Whole years between `birthdate` and `today`. `None` for future birthdates.
pub fn age_on(birthdate: Date, today: Date) -> Option<u32> {
	let mut years = today.year() - birthdate.year();

	if (u8::from(today.month()), today.day()) < (u8::from(birthdate.month()), birthdate.day()) {
		years -= 1;
	}

	u32::try_from(years).ok()
}

pub fn age_from_birthdate(raw: &str, today: Date) -> Option<u32> {
	age_on(parse_birthdate(raw)?, today)
}

/// Stored age when present, otherwise derived from the birthdate against today's UTC date.
pub fn resolve_age(stored: Option<i32>, birthdate: Option<&str>) -> Option<u32> {
	if let Some(age) = stored.and_then(|age| u32::try_from(age).ok()) {
		return Some(age);
	}

	age_from_birthdate(birthdate?, OffsetDateTime::now_utc().date())
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	#[test]
	fn birthday_not_yet_reached_subtracts_one() {
		let birth = date!(2000 - 06 - 15);

		assert_eq!(age_on(birth, date!(2026 - 06 - 14)), Some(25));
		assert_eq!(age_on(birth, date!(2026 - 06 - 15)), Some(26));
	}

	#[test]
	fn future_birthdates_have_no_age() {
		assert_eq!(age_on(date!(2030 - 01 - 01), date!(2026 - 01 - 01)), None);
	}

	#[test]
	fn birthdate_parsing_reads_the_date_prefix() {
		assert_eq!(parse_birthdate("1995-03-09T10:30:00"), Some(date!(1995 - 03 - 09)));
		assert_eq!(parse_birthdate("09/03/1995"), None);
		assert_eq!(parse_birthdate("1995"), None);
	}

	#[test]
	fn stored_age_wins_over_birthdate() {
		assert_eq!(resolve_age(Some(31), Some("2001-01-01")), Some(31));
		assert_eq!(resolve_age(None, None), None);
		assert_eq!(resolve_age(None, Some("garbage")), None);
	}
}
