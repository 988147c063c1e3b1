use logos::Logos;

use crate::rules::scan;

/// Raw lexemes recognized at the start of a line, after indentation.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
	#[regex(r"#{1,6}")]
	Hashes,
	#[regex(r"`{3,}")]
	BacktickFence,
	#[regex(r"~{3,}")]
	TildeFence,
	#[token(">")]
	Quote,
	#[regex(r"[0-9]{1,9}[.)]")]
	Ordered,
	#[token("-")]
	#[token("+")]
	#[token("*")]
	Bullet,
	#[token("<")]
	Angle,
	#[regex(r"=+")]
	Equals,
	#[regex(r"[ \t]+")]
	Space,
	#[regex(r"\r?\n")]
	Newline,
}

/// What a line starts with, as far as block structure is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineStart {
	Blank,
	/// Four or more columns of indentation.
	Indented,
	AtxHeading(u8),
	Fence {
		marker: u8,
		len: usize,
	},
	Quote,
	ThematicBreak,
	Bullet {
		marker: u8,
		/// No content follows the marker.
		empty: bool,
	},
	Ordered {
		number: u64,
		delimiter: u8,
		empty: bool,
	},
	/// A `<` that may open an html block.
	Angle,
	Text,
}

/// A classified line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineInfo {
	pub(crate) start: LineStart,
	/// Indentation in columns.
	pub(crate) indent: usize,
	/// Indentation in bytes.
	pub(crate) indent_bytes: usize,
	/// Byte offset just past the block marker, for markers that have one.
	pub(crate) marker_end: usize,
}

impl LineInfo {
	/// Whether this line can interrupt a paragraph.
	pub(crate) fn interrupts_paragraph(&self) -> bool {
		match self.start {
			LineStart::AtxHeading(_)
			| LineStart::Fence { .. }
			| LineStart::Quote
			| LineStart::ThematicBreak => true,
			LineStart::Bullet { empty, .. } => !empty,
			LineStart::Ordered { number, empty, .. } => number == 1 && !empty,
			_ => false,
		}
	}

	pub(crate) fn is_list_marker(&self) -> bool {
		matches!(
			self.start,
			LineStart::Bullet { .. } | LineStart::Ordered { .. }
		)
	}
}

/// Classify the block structure a line opens.
pub(crate) fn classify(line: &str) -> LineInfo {
	let (indent, indent_bytes) = scan::indent(line);
	let mut info = LineInfo {
		start: LineStart::Text,
		indent,
		indent_bytes,
		marker_end: indent_bytes,
	};

	if scan::is_blank(line) {
		info.start = LineStart::Blank;
		return info;
	}

	if indent >= 4 {
		info.start = LineStart::Indented;
		return info;
	}

	let content = &line[indent_bytes..];
	if is_thematic_break(content) {
		info.start = LineStart::ThematicBreak;
		return info;
	}

	let mut lexer = Lexeme::lexer(content);
	let Some(Ok(lexeme)) = lexer.next() else {
		return info;
	};

	let span = lexer.span();
	let after = &content[span.end..];
	let ends_marker = after.is_empty() || after.starts_with([' ', '\t', '\r', '\n']);
	let empty = scan::is_blank(after);
	info.marker_end = indent_bytes + span.end;

	info.start = match lexeme {
		Lexeme::Hashes if ends_marker => LineStart::AtxHeading(span.len() as u8),
		Lexeme::BacktickFence if !after.contains('`') => {
			LineStart::Fence {
				marker: b'`',
				len: span.len(),
			}
		}
		Lexeme::TildeFence => {
			LineStart::Fence {
				marker: b'~',
				len: span.len(),
			}
		}
		Lexeme::Quote => LineStart::Quote,
		Lexeme::Bullet if ends_marker => {
			LineStart::Bullet {
				marker: content.as_bytes()[span.start],
				empty,
			}
		}
		Lexeme::Ordered if ends_marker => {
			let slice = &content[span.clone()];
			let (digits, delimiter) = slice.split_at(slice.len() - 1);
			LineStart::Ordered {
				number: digits.parse().unwrap_or_default(),
				delimiter: delimiter.as_bytes()[0],
				empty,
			}
		}
		Lexeme::Angle => LineStart::Angle,
		_ => LineStart::Text,
	};

	info
}

/// Setext underline level: `1` for `===`, `2` for `---`.
pub(crate) fn setext_level(line: &str) -> Option<u8> {
	let (indent, indent_bytes) = scan::indent(line);
	if indent >= 4 {
		return None;
	}

	let content = &line[indent_bytes..];
	let mut lexer = Lexeme::lexer(content);
	let level = match lexer.next() {
		Some(Ok(Lexeme::Equals)) => 1,
		_ => {
			let dashes = scan::run_len(content, b'-');
			if dashes == 0 {
				return None;
			}
			return scan::is_blank(&content[dashes..]).then_some(2);
		}
	};

	match lexer.next() {
		None | Some(Ok(Lexeme::Newline)) => Some(level),
		Some(Ok(Lexeme::Space)) => {
			matches!(lexer.next(), None | Some(Ok(Lexeme::Newline))).then_some(level)
		}
		_ => None,
	}
}

/// Three or more matching `-`, `*` or `_` with optional spaces between.
fn is_thematic_break(content: &str) -> bool {
	let content = scan::strip_newline(content);
	let Some(marker) = content.bytes().next() else {
		return false;
	};

	if !matches!(marker, b'-' | b'*' | b'_') {
		return false;
	}

	let mut count = 0;
	for byte in content.bytes() {
		match byte {
			b' ' | b'\t' => {}
			byte if byte == marker => count += 1,
			_ => return false,
		}
	}

	count >= 3
}
