//! Byte level scanning helpers shared by the block and inline grammars.

/// Length of the first line of `text`, including its line ending.
pub fn line_len(text: &str) -> usize {
	text.find('\n').map_or(text.len(), |index| index + 1)
}

/// The first line of `text`, including its line ending.
pub fn first_line(text: &str) -> &str {
	&text[..line_len(text)]
}

/// `line` without its trailing `\n` or `\r\n`.
pub fn strip_newline(line: &str) -> &str {
	let line = line.strip_suffix('\n').unwrap_or(line);
	line.strip_suffix('\r').unwrap_or(line)
}

pub fn is_blank(line: &str) -> bool {
	line.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

/// Leading indentation of `line` as `(columns, bytes)`. Tabs advance to the
/// next multiple of four columns.
pub fn indent(line: &str) -> (usize, usize) {
	let mut columns = 0;
	let mut bytes = 0;

	for byte in line.bytes() {
		match byte {
			b' ' => columns += 1,
			b'\t' => columns += 4 - columns % 4,
			_ => break,
		}
		bytes += 1;
	}

	(columns, bytes)
}

/// Number of bytes to strip from the start of `line` to remove `columns`
/// columns of indentation. Stops early at the first non whitespace byte.
pub fn strip_columns(line: &str, columns: usize) -> usize {
	let mut seen = 0;
	let mut bytes = 0;

	for byte in line.bytes() {
		if seen >= columns {
			break;
		}

		match byte {
			b' ' => seen += 1,
			b'\t' => seen += 4 - seen % 4,
			_ => break,
		}
		bytes += 1;
	}

	bytes
}

/// Leading spaces and tabs, and trailing whitespace including line endings,
/// as `(open, close)` byte counts. Whitespace only text is all `open`.
pub fn whitespace_frame(text: &str) -> (usize, usize) {
	let open = text.len() - text.trim_start_matches([' ', '\t']).len();
	if open == text.len() || is_blank(text) {
		return (text.len(), 0);
	}

	let close = text.len() - text.trim_end().len();
	(open, close)
}

/// Number of consecutive `byte`s at the start of `text`.
pub fn run_len(text: &str, byte: u8) -> usize {
	text.bytes().take_while(|b| *b == byte).count()
}

pub fn is_punctuation(c: char) -> bool {
	c.is_ascii_punctuation()
}

/// Byte offset of the next run of exactly `len` backticks in `text`.
pub fn closing_backticks(text: &str, len: usize) -> Option<usize> {
	let bytes = text.as_bytes();
	let mut index = 0;

	while index < bytes.len() {
		if bytes[index] == b'`' {
			let run = run_len(&text[index..], b'`');
			if run == len {
				return Some(index);
			}
			index += run;
		} else {
			index += 1;
		}
	}

	None
}

/// Offset of the `]` closing the `[` at the start of `text`. Brackets nest,
/// and escapes and code spans are skipped. A blank line ends the search.
pub fn closing_bracket(text: &str) -> Option<usize> {
	let bytes = text.as_bytes();
	if bytes.first() != Some(&b'[') {
		return None;
	}

	let mut depth = 0usize;
	let mut index = 0;

	while index < bytes.len() {
		match bytes[index] {
			b'\\' => index += 2,
			b'`' => {
				let run = run_len(&text[index..], b'`');
				index += run;
				if let Some(close) = closing_backticks(&text[index..], run) {
					index += close + run;
				}
			}
			b'[' => {
				depth += 1;
				index += 1;
			}
			b']' => {
				depth -= 1;
				if depth == 0 {
					return Some(index);
				}
				index += 1;
			}
			b'\n' if text[index + 1..].starts_with('\n') => return None,
			_ => index += 1,
		}
	}

	None
}

/// A link destination and optional title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
	pub destination: String,
	pub title: Option<String>,
	/// Bytes consumed, including the surrounding parentheses when parsed as
	/// an inline link tail.
	pub len: usize,
}

/// Parse a destination at the start of `text`: either `<...>` or a run of
/// non whitespace with balanced parentheses. Returns the value and its
/// length in bytes.
pub fn destination(text: &str) -> Option<(String, usize)> {
	if let Some(rest) = text.strip_prefix('<') {
		let end = rest.find(['>', '\n', '<'])?;
		if !rest[end..].starts_with('>') {
			return None;
		}
		return Some((unescape(&rest[..end]), end + 2));
	}

	let mut depth = 0usize;
	let mut end = 0;
	let bytes = text.as_bytes();

	while end < bytes.len() {
		match bytes[end] {
			b'\\' if end + 1 < bytes.len() && bytes[end + 1].is_ascii_punctuation() => end += 2,
			b'(' => {
				depth += 1;
				end += 1;
			}
			b')' if depth == 0 => break,
			b')' => {
				depth -= 1;
				end += 1;
			}
			byte if byte.is_ascii_whitespace() || byte.is_ascii_control() => break,
			_ => end += 1,
		}
	}

	if end == 0 || depth != 0 {
		return None;
	}

	Some((unescape(&text[..end]), end))
}

/// Parse a link title (`"..."`, `'...'` or `(...)`) at the start of `text`.
pub fn title(text: &str) -> Option<(String, usize)> {
	let open = text.chars().next()?;
	let close = match open {
		'"' => '"',
		'\'' => '\'',
		'(' => ')',
		_ => return None,
	};

	let mut escaped = false;
	for (index, c) in text.char_indices().skip(1) {
		if escaped {
			escaped = false;
			continue;
		}

		match c {
			'\\' => escaped = true,
			'(' if open == '(' => return None,
			c if c == close => return Some((unescape(&text[1..index]), index + 1)),
			_ => {}
		}
	}

	None
}

/// Parse an inline link tail: `(destination "title")`.
pub fn inline_link_tail(text: &str) -> Option<Destination> {
	let inner = text.strip_prefix('(')?;
	let mut offset = 1 + skip_space(inner, true);

	if text[offset..].starts_with(')') {
		return Some(Destination {
			destination: String::new(),
			title: None,
			len: offset + 1,
		});
	}

	let (value, len) = destination(&text[offset..])?;
	offset += len;

	let spaces = skip_space(&text[offset..], true);
	let mut title_value = None;
	if spaces > 0 {
		if let Some((value, len)) = title(&text[offset + spaces..]) {
			title_value = Some(value);
			offset += spaces + len;
		}
	}

	offset += skip_space(&text[offset..], true);
	if !text[offset..].starts_with(')') {
		return None;
	}

	Some(Destination {
		destination: value,
		title: title_value,
		len: offset + 1,
	})
}

/// Count leading spaces and tabs, plus at most one line ending when
/// `newline` is set.
pub fn skip_space(text: &str, newline: bool) -> usize {
	let mut count = 0;
	let mut seen_newline = false;

	for byte in text.bytes() {
		match byte {
			b' ' | b'\t' => count += 1,
			b'\r' if newline && !seen_newline => count += 1,
			b'\n' if newline && !seen_newline => {
				seen_newline = true;
				count += 1;
			}
			_ => break,
		}
	}

	count
}

/// Remove backslashes that escape ASCII punctuation.
pub fn unescape(text: &str) -> String {
	let mut result = String::with_capacity(text.len());
	let mut chars = text.chars().peekable();

	while let Some(c) = chars.next() {
		if c == '\\' {
			if let Some(next) = chars.peek().copied() {
				if is_punctuation(next) {
					result.push(next);
					chars.next();
					continue;
				}
			}
		}
		result.push(c);
	}

	result
}

/// Length of an html tag, comment, processing instruction, declaration or
/// CDATA section at the start of `text`.
pub fn html_tag_len(text: &str) -> Option<usize> {
	let rest = text.strip_prefix('<')?;

	if let Some(comment) = rest.strip_prefix("!--") {
		if comment.starts_with('>') || comment.starts_with("->") {
			return None;
		}
		return comment.find("-->").map(|end| 4 + end + 3);
	}

	if let Some(cdata) = rest.strip_prefix("![CDATA[") {
		return cdata.find("]]>").map(|end| 9 + end + 3);
	}

	if let Some(instruction) = rest.strip_prefix('?') {
		return instruction.find("?>").map(|end| 2 + end + 2);
	}

	if let Some(declaration) = rest.strip_prefix('!') {
		if !declaration.starts_with(|c: char| c.is_ascii_alphabetic()) {
			return None;
		}
		return declaration.find('>').map(|end| 2 + end + 1);
	}

	if let Some(closing) = rest.strip_prefix('/') {
		let name = tag_name_len(closing)?;
		let spaces = skip_space(&closing[name..], true);
		let end = 2 + name + spaces;
		return text[end..].starts_with('>').then_some(end + 1);
	}

	let name = tag_name_len(rest)?;
	let mut offset = 1 + name;

	loop {
		let spaces = skip_space(&text[offset..], true);
		let after = &text[offset + spaces..];

		if after.starts_with("/>") {
			return Some(offset + spaces + 2);
		}

		if after.starts_with('>') {
			return Some(offset + spaces + 1);
		}

		if spaces == 0 {
			return None;
		}

		offset += spaces + attribute_len(after)?;
	}
}

fn tag_name_len(text: &str) -> Option<usize> {
	if !text.starts_with(|c: char| c.is_ascii_alphabetic()) {
		return None;
	}

	Some(
		text.bytes()
			.take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
			.count(),
	)
}

fn attribute_len(text: &str) -> Option<usize> {
	if !text.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == ':') {
		return None;
	}

	let name = text
		.bytes()
		.take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-'))
		.count();

	let spaces = skip_space(&text[name..], true);
	let after = &text[name + spaces..];
	let Some(value) = after.strip_prefix('=') else {
		return Some(name);
	};

	let value_spaces = skip_space(value, true);
	let value = &value[value_spaces..];
	let value_len = match value.chars().next()? {
		quote @ ('"' | '\'') => value[1..].find(quote)? + 2,
		_ => {
			let len = value
				.bytes()
				.take_while(|b| !b.is_ascii_whitespace() && !matches!(b, b'"' | b'\'' | b'=' | b'<' | b'>' | b'`'))
				.count();
			if len == 0 {
				return None;
			}
			len
		}
	};

	Some(name + spaces + 1 + value_spaces + value_len)
}
