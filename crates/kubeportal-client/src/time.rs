// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timestamp rendering for normalized records.
//!
//! Records keep the raw server value next to a human-relative phrase
//! ("3 days ago"). Relative phrasing uses the thresholds portal users
//! already know from the web frontend: under 45 seconds is "a few seconds",
//! under 45 minutes counts minutes, under 22 hours counts hours, under 26
//! days counts days, under 11 months counts months, then years.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
	pub raw: Option<String>,
	pub at: Option<DateTime<Utc>>,
	pub relative: Option<String>,
}

impl Timestamp {
	/// Unparseable values keep `raw` and leave `at`/`relative` empty.
	pub fn parse(raw: Option<&str>, now: DateTime<Utc>) -> Self {
		let raw = raw.map(str::trim).filter(|s| !s.is_empty());
		let at = raw.and_then(parse_datetime);
		Self {
			raw: raw.map(str::to_string),
			relative: at.map(|at| relative_to(at, now)),
			at,
		}
	}

	/// Relative phrase if parsed, otherwise the raw value.
	pub fn display(&self) -> &str {
		self
			.relative
			.as_deref()
			.or(self.raw.as_deref())
			.unwrap_or("")
	}
}

pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.ok()
		.or_else(|| {
			NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
				.ok()
				.map(|naive| naive.and_utc())
		})
}

pub fn relative_to(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
	let delta = now.signed_duration_since(at);
	let future = delta.num_milliseconds() < 0;
	let secs = delta.num_milliseconds().unsigned_abs() as f64 / 1000.0;
	let phrase = humanize(secs);
	if future {
		format!("in {phrase}")
	} else {
		format!("{phrase} ago")
	}
}

fn humanize(secs: f64) -> String {
	let seconds = secs.round() as u64;
	let minutes = (secs / 60.0).round() as u64;
	let hours = (secs / 3600.0).round() as u64;
	let days = (secs / SECS_PER_DAY).round() as u64;
	let months_exact = secs / SECS_PER_DAY * 4800.0 / 146_097.0;
	let months = months_exact.round() as u64;
	let years = (months_exact / 12.0).round() as u64;

	match () {
		_ if seconds < 45 => "a few seconds".to_string(),
		_ if minutes <= 1 => "a minute".to_string(),
		_ if minutes < 45 => format!("{minutes} minutes"),
		_ if hours <= 1 => "an hour".to_string(),
		_ if hours < 22 => format!("{hours} hours"),
		_ if days <= 1 => "a day".to_string(),
		_ if days < 26 => format!("{days} days"),
		_ if months <= 1 => "a month".to_string(),
		_ if months < 11 => format!("{months} months"),
		_ if years <= 1 => "a year".to_string(),
		_ => format!("{years} years"),
	}
}

/// Long form used for log lines, e.g. `January 1st 2024, 12:00:00 am`.
pub fn format_long(at: DateTime<Utc>) -> String {
	let day = at.day();
	format!(
		"{} {}{} {}, {}",
		at.format("%B"),
		day,
		ordinal_suffix(day),
		at.year(),
		at.format("%-I:%M:%S %P")
	)
}

fn ordinal_suffix(day: u32) -> &'static str {
	match (day % 10, day % 100) {
		(_, 11..=13) => "th",
		(1, _) => "st",
		(2, _) => "nd",
		(3, _) => "rd",
		_ => "th",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};
	use proptest::prelude::*;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
	}

	#[test]
	fn relative_phrases_follow_thresholds() {
		let cases = [
			(Duration::seconds(30), "a few seconds ago"),
			(Duration::seconds(70), "a minute ago"),
			(Duration::minutes(5), "5 minutes ago"),
			(Duration::minutes(50), "an hour ago"),
			(Duration::hours(2), "2 hours ago"),
			(Duration::hours(23), "a day ago"),
			(Duration::days(3), "3 days ago"),
			(Duration::days(30), "a month ago"),
			(Duration::days(95), "3 months ago"),
			(Duration::days(400), "a year ago"),
			(Duration::days(365 * 3), "3 years ago"),
		];
		for (delta, expected) in cases {
			assert_eq!(relative_to(now() - delta, now()), expected, "delta {delta}");
		}
	}

	#[test]
	fn future_timestamps_read_forward() {
		assert_eq!(relative_to(now() + Duration::minutes(5), now()), "in 5 minutes");
	}

	#[test]
	fn parse_accepts_rfc3339_and_naive() {
		let ts = Timestamp::parse(Some("2024-06-12T12:00:00Z"), now());
		assert_eq!(ts.relative.as_deref(), Some("3 days ago"));
		assert_eq!(ts.raw.as_deref(), Some("2024-06-12T12:00:00Z"));

		let naive = Timestamp::parse(Some("2024-06-15T11:55:00.123456"), now());
		assert_eq!(naive.relative.as_deref(), Some("5 minutes ago"));
	}

	#[test]
	fn unparseable_keeps_raw_only() {
		let ts = Timestamp::parse(Some("yesterday-ish"), now());
		assert_eq!(ts.raw.as_deref(), Some("yesterday-ish"));
		assert!(ts.at.is_none());
		assert_eq!(ts.display(), "yesterday-ish");

		let empty = Timestamp::parse(Some("  "), now());
		assert_eq!(empty, Timestamp::default());
	}

	#[test]
	fn long_format_uses_ordinals() {
		let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		assert_eq!(format_long(at), "January 1st 2024, 12:00:00 am");
		let at = Utc.with_ymd_and_hms(2024, 3, 22, 15, 4, 5).unwrap();
		assert_eq!(format_long(at), "March 22nd 2024, 3:04:05 pm");
		assert_eq!(ordinal_suffix(11), "th");
		assert_eq!(ordinal_suffix(23), "rd");
	}

	proptest! {
		#[test]
		fn past_is_ago_and_future_is_in(secs in 1i64..400_000_000) {
			let past = relative_to(now() - Duration::seconds(secs), now());
			let future = relative_to(now() + Duration::seconds(secs), now());
			prop_assert!(past.ends_with(" ago"));
			prop_assert!(future.starts_with("in "));
		}
	}
}
