use std::collections::HashMap;

use serde::Serialize;

use crate::Token;
use crate::TokenKind;

/// One heading of a document outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
	pub level: u8,
	/// Heading text with markup removed.
	pub title: String,
	/// Anchor slug, unique within the document.
	pub slug: String,
	pub line: usize,
}

/// Collect every heading below `root` in document order. Headings nested in
/// blockquotes and list items are included. The tree is only read.
pub fn extract_toc(root: &Token) -> Vec<TocEntry> {
	let mut seen: HashMap<String, usize> = HashMap::new();

	root.descendants()
		.filter_map(|token| match token.kind() {
			TokenKind::Heading { level, .. } => Some((*level, token)),
			_ => None,
		})
		.map(|(level, token)| {
			let title = token.plain_text().trim().to_string();
			let slug = unique_slug(&mut seen, slugify(&title));
			TocEntry {
				level,
				title,
				slug,
				line: token.line(),
			}
		})
		.collect()
}

/// GitHub style anchor slug: lowercase, spaces become hyphens, and anything
/// that is not alphanumeric, `-` or `_` is dropped.
pub fn slugify(title: &str) -> String {
	title
		.trim()
		.chars()
		.filter_map(|c| {
			if c.is_alphanumeric() || c == '_' || c == '-' {
				Some(c.to_lowercase().collect::<String>())
			} else if c.is_whitespace() {
				Some("-".to_string())
			} else {
				None
			}
		})
		.collect()
}

fn unique_slug(seen: &mut HashMap<String, usize>, slug: String) -> String {
	let count = seen.entry(slug.clone()).or_insert(0);
	let unique = if *count == 0 {
		slug
	} else {
		format!("{slug}-{count}")
	};
	*count += 1;
	unique
}
