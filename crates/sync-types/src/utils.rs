//! Text helpers.

/// Returns at most `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> &str {
	match text.char_indices().nth(max) {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}

/// Joins the distinct values in first-seen order.
pub fn join_distinct<'a, I>(values: I, separator: &str) -> String
where
	I: IntoIterator<Item = &'a str>,
{
	let mut seen: Vec<&str> = Vec::new();
	for value in values {
		if !seen.contains(&value) {
			seen.push(value);
		}
	}
	seen.join(separator)
}
