use std::sync::Arc;

use crate::Alignment;
use crate::ContextUpdate;
use crate::Cursor;
use crate::Diagnostic;
use crate::DiagnosticCode;
use crate::Layout;
use crate::LinkTarget;
use crate::Rule;
use crate::RuleMatch;
use crate::RowKind;
use crate::Token;
use crate::TokenKind;
use crate::lexer::LineInfo;
use crate::lexer::LineStart;
use crate::lexer::classify;
use crate::lexer::setext_level;
use crate::normalize_label;
use crate::rules::ids;
use crate::rules::scan;

/// The default block rules in priority order. The paragraph fallback is
/// last.
pub(crate) fn rules() -> Vec<Rule> {
	vec![
		Rule::new(ids::BLANK_LINE, blank_line),
		Rule::new(ids::FENCED_CODE, fenced_code),
		Rule::new(ids::INDENTED_CODE, indented_code),
		Rule::new(ids::ATX_HEADING, atx_heading),
		Rule::new(ids::THEMATIC_BREAK, thematic_break),
		Rule::new(ids::BLOCKQUOTE, blockquote),
		Rule::new(ids::LIST, list),
		Rule::new(ids::HTML_BLOCK, html_block),
		Rule::new(ids::LINK_DEFINITION, link_definition),
		Rule::new(ids::TABLE, table),
		Rule::fallback(ids::PARAGRAPH, paragraph),
	]
}

fn blank_line(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let len: usize = cursor
		.rest()
		.split_inclusive('\n')
		.take_while(|line| scan::is_blank(line))
		.map(str::len)
		.sum();

	(len > 0).then(|| RuleMatch::single(cursor.leaf(TokenKind::BlankLine, len)))
}

fn fenced_code(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let first = scan::first_line(rest);
	let info = classify(first);
	let LineStart::Fence { marker, len: fence } = info.start else {
		return None;
	};

	let info_string = scan::unescape(scan::strip_newline(&first[info.marker_end..]).trim());
	let mut len = first.len();

	for line in rest[len..].split_inclusive('\n') {
		len += line.len();
		if is_closing_fence(line, marker, fence) {
			break;
		}
	}

	let kind = TokenKind::CodeBlock {
		fenced: true,
		info: info_string.into(),
	};
	Some(RuleMatch::single(cursor.leaf(kind, len)))
}

fn is_closing_fence(line: &str, marker: u8, fence: usize) -> bool {
	let (indent, bytes) = scan::indent(line);
	if indent >= 4 {
		return false;
	}

	let content = &line[bytes..];
	let run = scan::run_len(content, marker);
	run >= fence && scan::is_blank(&content[run..])
}

fn indented_code(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let first = scan::first_line(rest);
	if classify(first).start != LineStart::Indented {
		return None;
	}

	let mut len = first.len();
	let mut committed = len;

	for line in rest[len..].split_inclusive('\n') {
		if scan::is_blank(line) {
			len += line.len();
		} else if scan::indent(line).0 >= 4 {
			len += line.len();
			committed = len;
		} else {
			break;
		}
	}

	let kind = TokenKind::CodeBlock {
		fenced: false,
		info: Arc::from(""),
	};
	Some(RuleMatch::single(cursor.leaf(kind, committed)))
}

fn atx_heading(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let first = scan::first_line(cursor.rest());
	let info = classify(first);
	let LineStart::AtxHeading(level) = info.start else {
		return None;
	};

	let line = scan::strip_newline(first);
	let start = info.marker_end + scan::skip_space(&line[info.marker_end..], false);
	let mut end = start + line[start..].trim_end().len();

	let body = &line[start..end];
	let hashes = body.len() - body.trim_end_matches('#').len();
	if hashes > 0 {
		let before = &body[..body.len() - hashes];
		if before.is_empty() {
			end = start;
		} else if before.ends_with([' ', '\t']) {
			end = start + before.trim_end().len();
		}
	}

	let kind = TokenKind::Heading {
		level,
		setext: false,
	};
	let layout = if end > start {
		Layout::Framed {
			open: start,
			close: first.len() - end,
		}
	} else {
		Layout::Framed {
			open: first.len(),
			close: 0,
		}
	};

	Some(RuleMatch::single(cursor.node(
		kind,
		0..first.len(),
		layout,
		Vec::new(),
	)))
}

fn thematic_break(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let first = scan::first_line(cursor.rest());
	(classify(first).start == LineStart::ThematicBreak)
		.then(|| RuleMatch::single(cursor.leaf(TokenKind::ThematicBreak, first.len())))
}

/// Whether the innermost content of `line`, after any quote and list
/// markers, is paragraph text that a lazy line could continue.
fn ends_in_paragraph(line: &str) -> bool {
	let mut content = line;

	loop {
		let info = classify(content);
		match info.start {
			LineStart::Text => return true,
			LineStart::Quote
			| LineStart::Bullet { empty: false, .. }
			| LineStart::Ordered { empty: false, .. } => {
				content = &content[info.marker_end..];
				content = &content[scan::skip_space(content, false).min(1)..];
			}
			_ => return false,
		}
	}
}

/// Whether `line` can continue a paragraph without its container prefix.
fn is_lazy_line(line: &str, info: &LineInfo) -> bool {
	match info.start {
		LineStart::Blank => false,
		LineStart::Angle => html_start(&line[info.indent_bytes..], false).is_none(),
		_ => !info.interrupts_paragraph(),
	}
}

fn blockquote(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let lazy = !cursor.context().strict();
	let mut prefixes = Vec::new();
	let mut inner = String::new();
	let mut len = 0;
	let mut continues_paragraph = false;

	for line in rest.split_inclusive('\n') {
		let info = classify(line);

		if info.start == LineStart::Quote {
			let mut prefix = info.marker_end;
			if line[prefix..].starts_with([' ', '\t']) {
				prefix += 1;
			}

			let content = &line[prefix..];
			prefixes.push(line[..prefix].to_string());
			inner.push_str(content);
			continues_paragraph = ends_in_paragraph(content);
		} else if len > 0 && lazy && continues_paragraph && is_lazy_line(line, &info) {
			prefixes.push(String::new());
			inner.push_str(line);
		} else {
			break;
		}

		len += line.len();
	}

	if len == 0 {
		return None;
	}

	let token = cursor.container(TokenKind::Blockquote, 0..len, inner, prefixes, false);
	Some(RuleMatch::single(token))
}

/// The lines of one list item, already split into prefixes and content.
struct ItemLines {
	len: usize,
	inner: String,
	prefixes: Vec<String>,
}

fn same_list(a: LineStart, b: LineStart) -> bool {
	match (a, b) {
		(LineStart::Bullet { marker: a, .. }, LineStart::Bullet { marker: b, .. }) => a == b,
		(
			LineStart::Ordered { delimiter: a, .. },
			LineStart::Ordered { delimiter: b, .. },
		) => a == b,
		_ => false,
	}
}

fn list_item_lines(text: &str, info: &LineInfo, lazy: bool) -> ItemLines {
	let first = scan::first_line(text);
	let after = &first[info.marker_end..];
	let marker_columns = info.indent + (info.marker_end - info.indent_bytes);
	let (spaces, space_bytes) = scan::indent(after);
	let empty_start = scan::is_blank(after);

	let (width, prefix) = if empty_start {
		(marker_columns + 1, info.marker_end)
	} else if spaces >= 5 {
		(marker_columns + 1, info.marker_end + 1)
	} else {
		(marker_columns + spaces, info.marker_end + space_bytes)
	};

	let mut item = ItemLines {
		len: first.len(),
		inner: first[prefix..].to_string(),
		prefixes: vec![first[..prefix].to_string()],
	};
	let mut continues_paragraph = ends_in_paragraph(&first[prefix..]);

	let lines: Vec<&str> = text[first.len()..].split_inclusive('\n').collect();
	let mut index = 0;

	while index < lines.len() {
		let line = lines[index];

		if scan::is_blank(line) {
			let end = lines[index..]
				.iter()
				.position(|line| !scan::is_blank(line))
				.map_or(lines.len(), |offset| index + offset);

			let next_continues = end < lines.len() && scan::indent(lines[end]).0 >= width;
			let only_marker = empty_start && item.prefixes.len() == 1;
			if !next_continues || only_marker {
				break;
			}

			for blank in &lines[index..end] {
				let strip = scan::strip_columns(blank, width).min(scan::strip_newline(blank).len());
				item.prefixes.push(blank[..strip].to_string());
				item.inner.push_str(&blank[strip..]);
				item.len += blank.len();
			}

			continues_paragraph = false;
			index = end;
			continue;
		}

		let line_info = classify(line);
		if line_info.indent >= width {
			let strip = scan::strip_columns(line, width);
			item.prefixes.push(line[..strip].to_string());
			item.inner.push_str(&line[strip..]);
			continues_paragraph = ends_in_paragraph(&line[strip..]);
		} else if lazy
			&& continues_paragraph
			&& !line_info.is_list_marker()
			&& is_lazy_line(line, &line_info)
		{
			item.prefixes.push(String::new());
			item.inner.push_str(line);
		} else {
			break;
		}

		item.len += line.len();
		index += 1;
	}

	item
}

fn task_state(content: &str) -> Option<bool> {
	let rest = content.strip_prefix('[')?;
	let checked = match rest.as_bytes().first()? {
		b' ' => false,
		b'x' | b'X' => true,
		_ => return None,
	};

	let after = rest.get(1..)?.strip_prefix(']')?;
	(after.is_empty() || after.starts_with([' ', '\t', '\r', '\n'])).then_some(checked)
}

fn list(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let first = classify(scan::first_line(rest));
	let (ordered, start, marker) = match first.start {
		LineStart::Bullet { marker, .. } => (false, None, marker as char),
		LineStart::Ordered {
			number, delimiter, ..
		} => (true, Some(number), delimiter as char),
		_ => return None,
	};

	let lazy = !cursor.context().strict();
	let gfm = cursor.context().gfm();
	let mut children = Vec::new();
	let mut loose = false;
	let mut offset = 0;
	let mut info = first;

	loop {
		let item = list_item_lines(&rest[offset..], &info, lazy);
		let task = if gfm { task_state(&item.inner) } else { None };
		let end = offset + item.len;
		let token = cursor.container(
			TokenKind::ListItem { task },
			offset..end,
			item.inner,
			item.prefixes,
			true,
		);

		let item_children = token.children();
		let inner_blank = item_children.len() > 2
			&& item_children[1..item_children.len() - 1]
				.iter()
				.any(|child| child.kind() == &TokenKind::BlankLine);
		loose |= inner_blank;
		children.push(token);
		offset = end;

		let blank_len: usize = rest[offset..]
			.split_inclusive('\n')
			.take_while(|line| scan::is_blank(line))
			.map(str::len)
			.sum();
		let next_at = offset + blank_len;
		if next_at >= rest.len() {
			break;
		}

		let next = classify(scan::first_line(&rest[next_at..]));
		if !same_list(first.start, next.start) {
			break;
		}

		if blank_len > 0 {
			children.push(cursor.leaf_at(TokenKind::BlankLine, offset..next_at));
			loose = true;
		}

		offset = next_at;
		info = next;
	}

	let kind = TokenKind::List {
		ordered,
		start,
		tight: !loose,
		marker,
	};
	Some(RuleMatch::single(cursor.node(
		kind,
		0..offset,
		Layout::Flat,
		children,
	)))
}

/// Block level html tags that start an html block of kind six.
const BLOCK_TAGS: &[&str] = &[
	"address", "article", "aside", "base", "basefont", "blockquote", "body", "caption", "center",
	"col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset",
	"figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5",
	"h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu",
	"menuitem", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "search", "section",
	"summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "track", "ul",
];

const RAW_TAGS: &[&str] = &["pre", "script", "style", "textarea"];

/// How an html block ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HtmlEnd {
	/// The line containing this text, compared case insensitively.
	Contains(&'static str),
	/// The next blank line, which is not part of the block.
	BlankLine,
}

/// Recognize the start condition of an html block. `generic` enables the
/// seventh kind: any complete tag alone on its line.
fn html_start(content: &str, generic: bool) -> Option<HtmlEnd> {
	let lower = content.to_ascii_lowercase();

	for tag in RAW_TAGS {
		if let Some(after) = lower.strip_prefix('<').and_then(|rest| rest.strip_prefix(tag)) {
			if after.is_empty() || after.starts_with([' ', '\t', '\r', '\n', '>']) {
				return Some(HtmlEnd::Contains(match *tag {
					"pre" => "</pre>",
					"script" => "</script>",
					"style" => "</style>",
					_ => "</textarea>",
				}));
			}
		}
	}

	if lower.starts_with("<!--") {
		return Some(HtmlEnd::Contains("-->"));
	}

	if lower.starts_with("<?") {
		return Some(HtmlEnd::Contains("?>"));
	}

	if lower.starts_with("<![cdata[") {
		return Some(HtmlEnd::Contains("]]>"));
	}

	if lower.starts_with("<!") && lower[2..].starts_with(|c: char| c.is_ascii_alphabetic()) {
		return Some(HtmlEnd::Contains(">"));
	}

	let name_start = if lower.starts_with("</") { 2 } else { 1 };
	let name: String = lower[name_start..]
		.chars()
		.take_while(char::is_ascii_alphanumeric)
		.collect();
	let after = &lower[name_start + name.len()..];
	let ends_name = after.is_empty() || after.starts_with([' ', '\t', '\r', '\n', '>']) || after.starts_with("/>");

	if ends_name && BLOCK_TAGS.contains(&name.as_str()) {
		return Some(HtmlEnd::BlankLine);
	}

	if generic && !RAW_TAGS.contains(&name.as_str()) {
		let line = scan::first_line(content);
		let is_tag = !line.starts_with("<!") && !line.starts_with("<?");
		if let Some(len) = scan::html_tag_len(line).filter(|_| is_tag) {
			if scan::is_blank(&line[len..]) {
				return Some(HtmlEnd::BlankLine);
			}
		}
	}

	None
}

fn html_block(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let first = scan::first_line(rest);
	let info = classify(first);
	if info.start != LineStart::Angle {
		return None;
	}

	let end = html_start(&first[info.indent_bytes..], !cursor.context().strict())?;
	let mut len = 0;

	for line in rest.split_inclusive('\n') {
		match end {
			HtmlEnd::Contains(pattern) => {
				len += line.len();
				if line.to_ascii_lowercase().contains(pattern) {
					break;
				}
			}
			HtmlEnd::BlankLine => {
				if scan::is_blank(line) {
					break;
				}
				len += line.len();
			}
		}
	}

	Some(RuleMatch::single(cursor.leaf(TokenKind::HtmlBlock, len)))
}

fn link_definition(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let info = classify(scan::first_line(rest));
	if matches!(info.start, LineStart::Indented | LineStart::Blank) {
		return None;
	}

	let text = &rest[info.indent_bytes..];
	let close = scan::closing_bracket(text)?;
	let label = &text[1..close];
	if label.trim().is_empty() || label.len() > 999 {
		return None;
	}

	let mut offset = close + 1;
	if !text[offset..].starts_with(':') {
		return None;
	}
	offset += 1;
	offset += scan::skip_space(&text[offset..], true);

	let (destination, destination_len) = scan::destination(&text[offset..])?;
	offset += destination_len;

	let mut title = None;
	let mut end = None;
	let spaces = scan::skip_space(&text[offset..], true);
	if spaces > 0 {
		if let Some((value, title_len)) = scan::title(&text[offset + spaces..]) {
			let after = offset + spaces + title_len;
			let tail = scan::first_line(&text[after..]);
			if scan::is_blank(tail) {
				title = Some(value);
				end = Some(after + tail.len());
			}
		}
	}

	let end = match end {
		Some(end) => end,
		None => {
			let tail = scan::first_line(&text[offset..]);
			if !scan::is_blank(tail) {
				return None;
			}
			offset + tail.len()
		}
	};

	let consumed = info.indent_bytes + end;
	let normalized = normalize_label(label);
	let target = LinkTarget {
		destination: destination.as_str().into(),
		title: title.as_deref().map(Arc::from),
	};
	let token = cursor.leaf(
		TokenKind::LinkDefinition {
			label: label.trim().into(),
			destination: target.destination.clone(),
			title: target.title.clone(),
		},
		consumed,
	);

	if cursor.context().link(label).is_some() {
		let message = format!("link reference `{}` is already defined; the first definition wins", label.trim());
		cursor.report(
			Diagnostic::info(DiagnosticCode::DuplicateLinkDefinition, message).with_token(&token),
		);
		return Some(RuleMatch::single(token));
	}

	Some(RuleMatch::single(token).with_update(ContextUpdate::DefineLink {
		label: normalized,
		target,
	}))
}

/// A table cell within a row: its byte range and the framing around its
/// content.
struct Cell {
	start: usize,
	end: usize,
	open: usize,
	close: usize,
}

/// Split a row into cells that tile the whole line, line ending included.
/// Each interior pipe starts the cell after it.
fn row_cells(line: &str) -> Vec<Cell> {
	let body = scan::strip_newline(line);
	let bytes = body.as_bytes();
	let mut pipes = Vec::new();
	let mut index = 0;

	while index < bytes.len() {
		match bytes[index] {
			b'\\' => index += 2,
			b'|' => {
				pipes.push(index);
				index += 1;
			}
			_ => index += 1,
		}
	}

	let leading = pipes
		.first()
		.copied()
		.filter(|pipe| body[..*pipe].trim().is_empty());
	let trailing = pipes
		.last()
		.copied()
		.filter(|pipe| body[pipe + 1..].trim().is_empty() && Some(*pipe) != leading);

	let interior: Vec<usize> = pipes
		.iter()
		.copied()
		.filter(|pipe| Some(*pipe) != leading && Some(*pipe) != trailing)
		.collect();

	let mut starts = vec![0];
	starts.extend(interior);
	let mut cells = Vec::with_capacity(starts.len());

	for (k, start) in starts.iter().copied().enumerate() {
		let last = k + 1 == starts.len();
		let end = if last { line.len() } else { starts[k + 1] };
		let mut lo = match (k, leading) {
			(0, Some(pipe)) => pipe + 1,
			(0, None) => 0,
			_ => start + 1,
		};
		lo += scan::skip_space(&body[lo..], false);

		let content_end = if last {
			trailing.unwrap_or(body.len())
		} else {
			end
		};
		let hi = (lo + body[lo..content_end.max(lo)].trim_end().len()).max(lo);

		cells.push(Cell {
			start,
			end,
			open: lo - start,
			close: end - hi,
		});
	}

	cells
}

fn delimiter_alignments(line: &str) -> Option<Vec<Alignment>> {
	let body = scan::strip_newline(line);
	if !body.contains(['|', '-']) {
		return None;
	}

	let cells = row_cells(line);
	let mut alignments = Vec::with_capacity(cells.len());

	for cell in &cells {
		let content = &line[cell.start + cell.open..cell.end - cell.close];
		let left = content.starts_with(':');
		let right = content.ends_with(':') && content.len() > 1;
		let dashes = content.trim_start_matches(':').trim_end_matches(':');
		if dashes.is_empty() || !dashes.bytes().all(|b| b == b'-') {
			return None;
		}

		alignments.push(match (left, right) {
			(true, true) => Alignment::Center,
			(true, false) => Alignment::Left,
			(false, true) => Alignment::Right,
			(false, false) => Alignment::None,
		});
	}

	Some(alignments)
}

fn table(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	if !cursor.context().gfm() {
		return None;
	}

	let rest = cursor.rest();
	let header = scan::first_line(rest);
	if !header.ends_with('\n') || !header.contains('|') {
		return None;
	}

	let info = classify(header);
	if !matches!(info.start, LineStart::Text | LineStart::Angle) {
		return None;
	}

	let delimiter = scan::first_line(&rest[header.len()..]);
	if classify(delimiter).indent >= 4 {
		return None;
	}
	let alignments = delimiter_alignments(delimiter)?;
	if row_cells(header).len() != alignments.len() {
		return None;
	}

	let mut rows = vec![
		table_row(cursor, 0, header, RowKind::Header, &alignments),
		cursor.leaf_at(
			TokenKind::TableRow {
				row: RowKind::Delimiter,
			},
			header.len()..header.len() + delimiter.len(),
		),
	];
	let mut len = header.len() + delimiter.len();

	for line in rest[len..].split_inclusive('\n') {
		let info = classify(line);
		if info.start == LineStart::Blank || info.interrupts_paragraph() {
			break;
		}

		rows.push(table_row(cursor, len, line, RowKind::Body, &alignments));
		len += line.len();
	}

	let kind = TokenKind::Table {
		alignments: alignments.into(),
	};
	Some(RuleMatch::single(cursor.node(kind, 0..len, Layout::Flat, rows)))
}

fn table_row(
	cursor: &Cursor<'_>,
	offset: usize,
	line: &str,
	row: RowKind,
	alignments: &[Alignment],
) -> Token {
	let cells = row_cells(line)
		.into_iter()
		.enumerate()
		.map(|(k, cell)| {
			let alignment = alignments.get(k).copied().unwrap_or(Alignment::None);
			cursor.node(
				TokenKind::TableCell { alignment },
				offset + cell.start..offset + cell.end,
				Layout::Framed {
					open: cell.open,
					close: cell.close,
				},
				Vec::new(),
			)
		})
		.collect();

	cursor.node(
		TokenKind::TableRow { row },
		offset..offset + line.len(),
		Layout::Flat,
		cells,
	)
}

fn paragraph(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest();
	let first = scan::first_line(rest);
	let mut len = first.len();
	let mut underline = None;

	for line in rest[len..].split_inclusive('\n') {
		if scan::is_blank(line) {
			break;
		}

		if let Some(level) = setext_level(line) {
			underline = Some((level, len));
			len += line.len();
			break;
		}

		let info = classify(line);
		let html = info.start == LineStart::Angle
			&& html_start(&line[info.indent_bytes..], false).is_some();
		if info.interrupts_paragraph() || html {
			break;
		}

		len += line.len();
	}

	let text = &rest[..len];

	let token = match underline {
		Some((level, underline_start)) => {
			let (open, _) = scan::whitespace_frame(text);
			let content_end = text[..underline_start].trim_end().len().max(open);
			cursor.node(
				TokenKind::Heading {
					level,
					setext: true,
				},
				0..len,
				Layout::Framed {
					open,
					close: len - content_end,
				},
				Vec::new(),
			)
		}
		None => {
			let (open, close) = scan::whitespace_frame(text);
			cursor.node(
				TokenKind::Paragraph,
				0..len,
				Layout::Framed { open, close },
				Vec::new(),
			)
		}
	};

	Some(RuleMatch::single(token))
}
