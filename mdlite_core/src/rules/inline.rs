use crate::Cursor;
use crate::Layout;
use crate::Rule;
use crate::RuleMatch;
use crate::TokenKind;
use crate::rules::ids;
use crate::rules::scan;

/// The default inline rules in priority order. The text fallback is last.
pub(crate) fn rules() -> Vec<Rule> {
	vec![
		Rule::new(ids::ESCAPE, escape),
		Rule::new(ids::CODE_SPAN, code_span),
		Rule::new(ids::AUTOLINK, autolink),
		Rule::new(ids::RAW_HTML, raw_html),
		Rule::new(ids::IMAGE, |cursor: &mut Cursor<'_>| link_like(cursor, true)),
		Rule::new(ids::LINK, |cursor: &mut Cursor<'_>| link_like(cursor, false)),
		Rule::new(ids::STRONG, |cursor: &mut Cursor<'_>| delimited(cursor, 2)),
		Rule::new(ids::EMPHASIS, |cursor: &mut Cursor<'_>| delimited(cursor, 1)),
		Rule::new(ids::STRIKETHROUGH, strikethrough),
		Rule::new(ids::BARE_AUTOLINK, bare_autolink),
		Rule::new(ids::HARD_BREAK, hard_break),
		Rule::new(ids::SOFT_BREAK, soft_break),
		Rule::fallback(ids::TEXT, text),
	]
}

fn escape(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let mut chars = cursor.rest().chars();
	if chars.next()? != '\\' {
		return None;
	}

	let next = chars.next()?;
	scan::is_punctuation(next)
		.then(|| RuleMatch::single(cursor.leaf(TokenKind::Escape, 1 + next.len_utf8())))
}

fn code_span(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let run = scan::run_len(rest, b'`');
	if run == 0 {
		return None;
	}

	let close = scan::closing_backticks(&rest[run..], run)?;
	Some(RuleMatch::single(cursor.leaf(TokenKind::CodeSpan, run + close + run)))
}

fn is_uri(text: &str) -> bool {
	let Some((scheme, rest)) = text.split_once(':') else {
		return false;
	};

	let valid_scheme = (2..=32).contains(&scheme.len())
		&& scheme.starts_with(|c: char| c.is_ascii_alphabetic())
		&& scheme
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'.' | b'-'));

	valid_scheme
		&& !rest
			.chars()
			.any(|c| c.is_whitespace() || c.is_control() || c == '<')
}

fn is_email(text: &str) -> bool {
	let Some((local, domain)) = text.split_once('@') else {
		return false;
	};

	let valid_local = !local.is_empty()
		&& local
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || b".!#$%&'*+/=?^_`{|}~-".contains(&b));

	let valid_domain = !domain.is_empty()
		&& domain.split('.').all(|label| {
			!label.is_empty()
				&& label.len() <= 63
				&& !label.starts_with('-')
				&& !label.ends_with('-')
				&& label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
		});

	valid_local && valid_domain
}

fn autolink(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest().strip_prefix('<')?;
	let end = rest.find(['>', '<', '\n'])?;
	if !rest[end..].starts_with('>') {
		return None;
	}

	let target = &rest[..end];
	let email = if is_uri(target) {
		false
	} else if is_email(target) {
		true
	} else {
		return None;
	};

	let kind = TokenKind::AutoLink {
		target: target.into(),
		email,
	};
	Some(RuleMatch::single(cursor.leaf(kind, end + 2)))
}

fn raw_html(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let len = scan::html_tag_len(cursor.rest())?;
	Some(RuleMatch::single(cursor.leaf(TokenKind::RawHtml, len)))
}

/// Links and images: inline (`[text](url "title")`), full reference
/// (`[text][label]`), collapsed (`[label][]`) and shortcut (`[label]`).
fn link_like(cursor: &mut Cursor<'_>, image: bool) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let bang = usize::from(image);
	if image && !rest.starts_with('!') {
		return None;
	}

	let close = bang + scan::closing_bracket(&rest[bang..])?;
	let label = bang + 1..close;
	let after = &rest[close + 1..];

	let (target, title, end) = if let Some(tail) = scan::inline_link_tail(after) {
		(tail.destination, tail.title, close + 1 + tail.len)
	} else if after.starts_with('[') {
		let reference_close = scan::closing_bracket(after)?;
		let reference = &after[1..reference_close];
		let key = if reference.trim().is_empty() {
			&rest[label.clone()]
		} else {
			reference
		};
		let definition = cursor.context().link(key)?;
		(
			definition.destination.to_string(),
			definition.title.as_deref().map(str::to_string),
			close + 1 + reference_close + 1,
		)
	} else {
		let definition = cursor.context().link(&rest[label.clone()])?;
		(
			definition.destination.to_string(),
			definition.title.as_deref().map(str::to_string),
			close + 1,
		)
	};

	let title = title.as_deref().map(Into::into);
	let kind = if image {
		TokenKind::Image {
			source: target.into(),
			title,
		}
	} else {
		TokenKind::Link {
			target: target.into(),
			title,
		}
	};

	let children = cursor.inline(label.clone());
	let layout = Layout::Framed {
		open: label.start,
		close: end - label.end,
	};
	Some(RuleMatch::single(cursor.node(kind, 0..end, layout, children)))
}

/// Find the closing delimiter for an opener of `width` bytes of `marker`
/// at the start of `text`. Inner openers of the same marker are counted so
/// that their closers are skipped. Returns the offset of the closer.
fn closer(text: &str, marker: u8, width: usize) -> Option<usize> {
	let bytes = text.as_bytes();
	let mut index = width;
	let mut open = 0usize;
	let underscore = marker == b'_';

	while index < bytes.len() {
		match bytes[index] {
			b'\\' => index += 2,
			b'`' => {
				let run = scan::run_len(&text[index..], b'`');
				index += run;
				if let Some(close) = scan::closing_backticks(&text[index..], run) {
					index += close + run;
				}
			}
			byte if byte == marker => {
				let run = scan::run_len(&text[index..], marker);
				let before = text[..index].chars().next_back();
				let after = text[index + run..].chars().next();
				let can_close = index > width
					&& before.is_some_and(|c| !c.is_whitespace())
					&& !(underscore && after.is_some_and(char::is_alphanumeric));
				let can_open = after.is_some_and(|c| !c.is_whitespace())
					&& !(underscore && before.is_some_and(char::is_alphanumeric));

				if can_close {
					let absorbed = open.min(run);
					open -= absorbed;
					if run - absorbed >= width {
						return Some(index + absorbed);
					}
				} else if can_open {
					open += run;
				}

				index += run;
			}
			_ => index += 1,
		}
	}

	None
}

/// Strong (`width` 2) and emphasis (`width` 1) with `*` or `_`.
fn delimited(cursor: &mut Cursor<'_>, width: usize) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let marker = *rest.as_bytes().first()?;
	if marker != b'*' && marker != b'_' {
		return None;
	}

	let run = scan::run_len(rest, marker);
	if run < width {
		return None;
	}

	let next = rest[run..].chars().next()?;
	if next.is_whitespace() {
		return None;
	}

	if marker == b'_' && cursor.before().is_some_and(char::is_alphanumeric) {
		return None;
	}

	let close = closer(rest, marker, width)?;
	let children = cursor.inline(width..close);
	let kind = if width == 2 {
		TokenKind::Strong
	} else {
		TokenKind::Emphasis
	};
	let layout = Layout::Framed {
		open: width,
		close: width,
	};
	Some(RuleMatch::single(cursor.node(
		kind,
		0..close + width,
		layout,
		children,
	)))
}

fn strikethrough(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	if !cursor.context().gfm() {
		return None;
	}

	let rest = cursor.rest();
	let run = scan::run_len(rest, b'~');
	if run == 0 || run > 2 || rest[run..].starts_with(char::is_whitespace) || rest.len() == run {
		return None;
	}

	let bytes = rest.as_bytes();
	let mut index = run;
	let mut close = None;

	while index < bytes.len() {
		match bytes[index] {
			b'\\' => index += 2,
			b'~' => {
				let len = scan::run_len(&rest[index..], b'~');
				let before = rest[..index].chars().next_back();
				if len == run && index > run && before.is_some_and(|c| !c.is_whitespace()) {
					close = Some(index);
					break;
				}
				index += len;
			}
			_ => index += 1,
		}
	}

	let close = close?;
	let children = cursor.inline(run..close);
	let layout = Layout::Framed {
		open: run,
		close: run,
	};
	Some(RuleMatch::single(cursor.node(
		TokenKind::Strikethrough,
		0..close + run,
		layout,
		children,
	)))
}

fn bare_autolink(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	if !cursor.context().gfm() || cursor.before().is_some_and(char::is_alphanumeric) {
		return None;
	}

	let rest = cursor.rest();
	let lower = rest.chars().take(8).collect::<String>().to_ascii_lowercase();
	let prefix = ["https://", "http://", "www."]
		.into_iter()
		.find(|prefix| lower.starts_with(prefix))?;

	let mut len = rest
		.find(|c: char| c.is_whitespace() || c == '<')
		.unwrap_or(rest.len());

	while len > prefix.len() {
		let last = rest[..len].chars().next_back()?;
		let unmatched_paren = last == ')' && rest[..len].matches('(').count() < rest[..len].matches(')').count();
		if matches!(last, '?' | '!' | '.' | ',' | ':' | '*' | '_' | '~' | '\'' | '"') || unmatched_paren {
			len -= last.len_utf8();
		} else {
			break;
		}
	}

	let host = &rest[prefix.len()..len];
	if !host.starts_with(char::is_alphanumeric) {
		return None;
	}

	let url = &rest[..len];
	let target = if prefix == "www." {
		format!("http://{url}")
	} else {
		url.to_string()
	};

	let kind = TokenKind::AutoLink {
		target: target.into(),
		email: false,
	};
	Some(RuleMatch::single(cursor.leaf(kind, len)))
}

/// Length of a line ending at the start of `text` plus the indentation of
/// the following line.
fn line_ending(text: &str) -> Option<usize> {
	let newline = if text.starts_with("\r\n") {
		2
	} else if text.starts_with('\n') {
		1
	} else {
		return None;
	};

	Some(newline + scan::skip_space(&text[newline..], false))
}

fn hard_break(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let len = if let Some(after) = rest.strip_prefix('\\') {
		1 + line_ending(after)?
	} else {
		let spaces = scan::run_len(rest, b' ');
		if spaces < 2 {
			return None;
		}
		spaces + line_ending(&rest[spaces..])?
	};

	Some(RuleMatch::single(cursor.leaf(TokenKind::LineBreak { hard: true }, len)))
}

fn soft_break(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let spaces = scan::run_len(rest, b' ').min(1);
	let len = spaces + line_ending(&rest[spaces..])?;
	Some(RuleMatch::single(cursor.leaf(TokenKind::LineBreak { hard: false }, len)))
}

/// Fallback: an alphanumeric run, a run of one delimiter character, or a
/// single other character.
fn text(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let first = rest.chars().next()?;

	let len = if first.is_alphanumeric() {
		rest.find(|c: char| !c.is_alphanumeric()).unwrap_or(rest.len())
	} else if matches!(first, '*' | '_' | '`' | '~') {
		scan::run_len(rest, first as u8)
	} else {
		first.len_utf8()
	};

	Some(RuleMatch::single(cursor.leaf(TokenKind::Text, len)))
}
