use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::Context;

/// The closed set of token kinds.
///
/// Renderers can match on this exhaustively. Syntax that only an extension
/// understands is carried by [`TokenKind::Extension`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TokenKind {
	// Block kinds.
	/// The root of a parsed document.
	Document,
	Paragraph,
	/// ATX (`# Title`) or setext (`Title\n===`) heading.
	Heading { level: u8, setext: bool },
	List {
		ordered: bool,
		/// Start number of an ordered list.
		start: Option<u64>,
		tight: bool,
		/// The bullet character, or the delimiter (`.` or `)`) of an ordered
		/// list.
		marker: char,
	},
	ListItem {
		/// GFM task list state: `Some(true)` for `[x]`, `Some(false)` for
		/// `[ ]`.
		task: Option<bool>,
	},
	Blockquote,
	CodeBlock { fenced: bool, info: Arc<str> },
	ThematicBreak,
	HtmlBlock,
	Table { alignments: Arc<[Alignment]> },
	TableRow { row: RowKind },
	TableCell { alignment: Alignment },
	LinkDefinition {
		label: Arc<str>,
		destination: Arc<str>,
		title: Option<Arc<str>>,
	},
	BlankLine,

	// Inline kinds.
	Text,
	Emphasis,
	Strong,
	Strikethrough,
	CodeSpan,
	Link {
		target: Arc<str>,
		title: Option<Arc<str>>,
	},
	Image {
		source: Arc<str>,
		title: Option<Arc<str>>,
	},
	AutoLink { target: Arc<str>, email: bool },
	LineBreak { hard: bool },
	RawHtml,
	/// A backslash escape such as `\*`.
	Escape,

	/// A kind introduced by an extension.
	Extension(ExtensionToken),
}

/// Payload of [`TokenKind::Extension`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionToken {
	pub name: Arc<str>,
	pub attributes: BTreeMap<String, String>,
}

impl ExtensionToken {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			attributes: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(key.into(), value.into());
		self
	}

	pub fn attribute(&self, key: &str) -> Option<&str> {
		self.attributes.get(key).map(String::as_str)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
	None,
	Left,
	Center,
	Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
	Header,
	/// The `| --- | :-: |` line. It has no cells.
	Delimiter,
	Body,
}

/// Field-less mirror of [`TokenKind`] used by predicates and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KindTag {
	Document,
	Paragraph,
	Heading,
	List,
	ListItem,
	Blockquote,
	CodeBlock,
	ThematicBreak,
	HtmlBlock,
	Table,
	TableRow,
	TableCell,
	LinkDefinition,
	BlankLine,
	Text,
	Emphasis,
	Strong,
	Strikethrough,
	CodeSpan,
	Link,
	Image,
	AutoLink,
	LineBreak,
	RawHtml,
	Escape,
	Extension,
}

impl Display for KindTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Document => "document",
			Self::Paragraph => "paragraph",
			Self::Heading => "heading",
			Self::List => "list",
			Self::ListItem => "list-item",
			Self::Blockquote => "blockquote",
			Self::CodeBlock => "code-block",
			Self::ThematicBreak => "thematic-break",
			Self::HtmlBlock => "html-block",
			Self::Table => "table",
			Self::TableRow => "table-row",
			Self::TableCell => "table-cell",
			Self::LinkDefinition => "link-definition",
			Self::BlankLine => "blank-line",
			Self::Text => "text",
			Self::Emphasis => "emphasis",
			Self::Strong => "strong",
			Self::Strikethrough => "strikethrough",
			Self::CodeSpan => "code-span",
			Self::Link => "link",
			Self::Image => "image",
			Self::AutoLink => "auto-link",
			Self::LineBreak => "line-break",
			Self::RawHtml => "raw-html",
			Self::Escape => "escape",
			Self::Extension => "extension",
		};
		write!(f, "{name}")
	}
}

impl TokenKind {
	pub fn tag(&self) -> KindTag {
		match self {
			Self::Document => KindTag::Document,
			Self::Paragraph => KindTag::Paragraph,
			Self::Heading { .. } => KindTag::Heading,
			Self::List { .. } => KindTag::List,
			Self::ListItem { .. } => KindTag::ListItem,
			Self::Blockquote => KindTag::Blockquote,
			Self::CodeBlock { .. } => KindTag::CodeBlock,
			Self::ThematicBreak => KindTag::ThematicBreak,
			Self::HtmlBlock => KindTag::HtmlBlock,
			Self::Table { .. } => KindTag::Table,
			Self::TableRow { .. } => KindTag::TableRow,
			Self::TableCell { .. } => KindTag::TableCell,
			Self::LinkDefinition { .. } => KindTag::LinkDefinition,
			Self::BlankLine => KindTag::BlankLine,
			Self::Text => KindTag::Text,
			Self::Emphasis => KindTag::Emphasis,
			Self::Strong => KindTag::Strong,
			Self::Strikethrough => KindTag::Strikethrough,
			Self::CodeSpan => KindTag::CodeSpan,
			Self::Link { .. } => KindTag::Link,
			Self::Image { .. } => KindTag::Image,
			Self::AutoLink { .. } => KindTag::AutoLink,
			Self::LineBreak { .. } => KindTag::LineBreak,
			Self::RawHtml => KindTag::RawHtml,
			Self::Escape => KindTag::Escape,
			Self::Extension(_) => KindTag::Extension,
		}
	}

	/// Kinds whose text is expanded by the inline pass.
	pub fn has_inline_content(&self) -> bool {
		matches!(
			self,
			Self::Paragraph | Self::Heading { .. } | Self::TableCell { .. }
		)
	}

	/// The payload of an extension kind with the given name.
	pub fn extension(&self, name: &str) -> Option<&ExtensionToken> {
		match self {
			Self::Extension(ext) if &*ext.name == name => Some(ext),
			_ => None,
		}
	}
}

/// How the children of a token cover its raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
	/// The children concatenate to the raw text.
	Flat,
	/// The children cover the raw text minus `open` leading and `close`
	/// trailing bytes.
	Framed { open: usize, close: usize },
	/// A line container: one prefix was stripped from every line, and the
	/// children were tokenized from the stripped text.
	Prefixed(Arc<[String]>),
}

struct TokenData {
	kind: TokenKind,
	source: Arc<str>,
	span: Range<usize>,
	layout: Layout,
	children: Vec<Token>,
	context: Arc<Context>,
	rule: Arc<str>,
	line: usize,
}

/// An immutable node of the token tree.
///
/// Cloning a token is cheap: it shares the node. Two tokens are the *same*
/// token when [`Token::ptr_eq`] holds, which is what the rewrite engine uses
/// to detect unchanged subtrees.
#[derive(Clone)]
pub struct Token(Arc<TokenData>);

/// Builder for [`Token`]. Rules normally go through
/// [`Cursor`](crate::Cursor) helpers instead.
pub struct TokenBuilder {
	data: TokenData,
}

impl TokenBuilder {
	#[must_use]
	pub fn layout(mut self, layout: Layout) -> Self {
		self.data.layout = layout;
		self
	}

	#[must_use]
	pub fn children(mut self, children: Vec<Token>) -> Self {
		self.data.children = children;
		self
	}

	#[must_use]
	pub fn line(mut self, line: usize) -> Self {
		self.data.line = line;
		self
	}

	pub fn build(self) -> Token {
		Token(Arc::new(self.data))
	}
}

impl Token {
	/// Start building a token spanning `span` of `source`.
	pub fn builder(
		kind: TokenKind,
		source: &Arc<str>,
		span: Range<usize>,
		context: &Arc<Context>,
		rule: &Arc<str>,
	) -> TokenBuilder {
		TokenBuilder {
			data: TokenData {
				kind,
				source: Arc::clone(source),
				span,
				layout: Layout::Flat,
				children: Vec::new(),
				context: Arc::clone(context),
				rule: Arc::clone(rule),
				line: 1,
			},
		}
	}

	pub fn kind(&self) -> &TokenKind {
		&self.0.kind
	}

	pub fn tag(&self) -> KindTag {
		self.0.kind.tag()
	}

	/// The raw markdown this token was derived from.
	pub fn raw(&self) -> &str {
		&self.0.source[self.0.span.clone()]
	}

	/// Byte range of [`Token::raw`] within [`Token::source`].
	pub fn span(&self) -> Range<usize> {
		self.0.span.clone()
	}

	/// The text buffer the span points into. Tokens inside a line container
	/// point into the container's stripped text.
	pub fn source(&self) -> &Arc<str> {
		&self.0.source
	}

	pub fn layout(&self) -> &Layout {
		&self.0.layout
	}

	pub fn children(&self) -> &[Token] {
		&self.0.children
	}

	pub fn is_leaf(&self) -> bool {
		self.0.children.is_empty()
	}

	/// The context snapshot at creation time.
	pub fn context(&self) -> &Arc<Context> {
		&self.0.context
	}

	/// Id of the rule that produced this token.
	pub fn rule(&self) -> &str {
		&self.0.rule
	}

	/// 1-based line where the token starts.
	pub fn line(&self) -> usize {
		self.0.line
	}

	/// Referential equality.
	pub fn ptr_eq(a: &Token, b: &Token) -> bool {
		Arc::ptr_eq(&a.0, &b.0)
	}

	/// The range of [`Token::source`] that children cover, for flat and
	/// framed layouts.
	pub fn inner_span(&self) -> Option<Range<usize>> {
		match &self.0.layout {
			Layout::Flat => Some(self.span()),
			Layout::Framed { open, close } => {
				let start = self.0.span.start + open;
				let end = self.0.span.end.saturating_sub(*close).max(start);
				Some(start..end)
			}
			Layout::Prefixed(_) => None,
		}
	}

	/// The text that children cover, for flat and framed layouts.
	pub fn inner(&self) -> Option<&str> {
		self.inner_span().map(|span| &self.0.source[span])
	}

	fn rebuild(&self, kind: TokenKind, layout: Layout, children: Vec<Token>) -> Token {
		Token(Arc::new(TokenData {
			kind,
			source: Arc::clone(&self.0.source),
			span: self.span(),
			layout,
			children,
			context: Arc::clone(&self.0.context),
			rule: Arc::clone(&self.0.rule),
			line: self.0.line,
		}))
	}

	/// A new token with the same text, context and children but a different
	/// kind.
	#[must_use]
	pub fn with_kind(&self, kind: TokenKind) -> Token {
		self.rebuild(kind, self.0.layout.clone(), self.0.children.clone())
	}

	/// A new token with the same kind and layout but different children.
	#[must_use]
	pub fn with_children(&self, children: Vec<Token>) -> Token {
		self.rebuild(self.0.kind.clone(), self.0.layout.clone(), children)
	}

	/// A new token with a different kind, layout and children over the same
	/// text.
	#[must_use]
	pub fn replaced(&self, kind: TokenKind, layout: Layout, children: Vec<Token>) -> Token {
		self.rebuild(kind, layout, children)
	}

	/// Rebuild the raw text from the children and layout. For a token that
	/// satisfies the coverage invariant this equals [`Token::raw`].
	pub fn reconstruct(&self) -> String {
		if self.is_leaf() {
			return self.raw().to_string();
		}

		let inner: String = self.0.children.iter().map(Token::reconstruct).collect();
		let raw = self.raw();

		match &self.0.layout {
			Layout::Flat => inner,
			Layout::Framed { open, close } => {
				let open = (*open).min(raw.len());
				let close = (*close).min(raw.len() - open);
				let mut result = String::with_capacity(raw.len());
				result.push_str(&raw[..open]);
				result.push_str(&inner);
				result.push_str(&raw[raw.len() - close..]);
				result
			}
			Layout::Prefixed(prefixes) => interleave_prefixes(prefixes, &inner),
		}
	}

	/// Check the coverage invariant for this token and every descendant.
	pub fn check_coverage(&self) -> bool {
		if self.is_leaf() {
			return true;
		}

		self.reconstruct() == self.raw() && self.0.children.iter().all(Token::check_coverage)
	}

	/// Structural equality: same kind, text, layout and structurally equal
	/// children. Shared subtrees compare in constant time.
	pub fn deep_eq(&self, other: &Token) -> bool {
		if Token::ptr_eq(self, other) {
			return true;
		}

		self.0.kind == other.0.kind
			&& self.raw() == other.raw()
			&& self.0.layout == other.0.layout
			&& self.0.children.len() == other.0.children.len()
			&& self
				.0
				.children
				.iter()
				.zip(other.0.children.iter())
				.all(|(a, b)| a.deep_eq(b))
	}

	/// Pre-order iterator over this token and all descendants.
	pub fn descendants(&self) -> Descendants<'_> {
		Descendants { stack: vec![self] }
	}

	/// Visible text with markup removed, as used for headings and link
	/// labels.
	pub fn plain_text(&self) -> String {
		let mut text = String::new();
		self.push_plain_text(&mut text);
		text
	}

	fn push_plain_text(&self, text: &mut String) {
		match &self.0.kind {
			TokenKind::Text => text.push_str(self.raw()),
			TokenKind::Escape => text.push_str(self.raw().get(1..).unwrap_or_default()),
			TokenKind::CodeSpan => text.push_str(&code_span_content(self.raw())),
			TokenKind::LineBreak { .. } => text.push(' '),
			TokenKind::AutoLink { target, .. } => text.push_str(target),
			TokenKind::Extension(ext) => {
				if self.is_leaf() {
					let label = ext.attribute("name").or_else(|| ext.attribute("uid"));
					text.push_str(label.unwrap_or_else(|| self.raw()));
				} else {
					for child in &self.0.children {
						child.push_plain_text(text);
					}
				}
			}
			TokenKind::RawHtml | TokenKind::LinkDefinition { .. } | TokenKind::BlankLine => {}
			_ => {
				if self.is_leaf() && self.0.kind.has_inline_content() {
					if let Some(inner) = self.inner() {
						text.push_str(inner.trim());
					}
				}
				for child in &self.0.children {
					child.push_plain_text(text);
				}
			}
		}
	}
}

/// Re-insert stripped line prefixes in front of each line of `inner`.
pub(crate) fn interleave_prefixes(prefixes: &[String], inner: &str) -> String {
	let mut lines = inner.split_inclusive('\n');
	let mut result = String::with_capacity(inner.len() + prefixes.len() * 2);

	for prefix in prefixes {
		result.push_str(prefix);
		if let Some(line) = lines.next() {
			result.push_str(line);
		}
	}

	for line in lines {
		result.push_str(line);
	}

	result
}

/// The content of a code span: backtick fences removed, line endings turned
/// into spaces, and one surrounding space stripped when both sides have one.
pub fn code_span_content(raw: &str) -> String {
	let fence = raw.bytes().take_while(|b| *b == b'`').count();
	if raw.len() < fence * 2 {
		return String::new();
	}

	let content = raw[fence..raw.len() - fence].replace("\r\n", " ").replace('\n', " ");
	let stripped = content.len() >= 2
		&& content.starts_with(' ')
		&& content.ends_with(' ')
		&& !content.bytes().all(|b| b == b' ');

	if stripped {
		content[1..content.len() - 1].to_string()
	} else {
		content
	}
}

/// Pre-order traversal returned by [`Token::descendants`].
pub struct Descendants<'a> {
	stack: Vec<&'a Token>,
}

impl<'a> Iterator for Descendants<'a> {
	type Item = &'a Token;

	fn next(&mut self) -> Option<Self::Item> {
		let token = self.stack.pop()?;
		self.stack.extend(token.0.children.iter().rev());
		Some(token)
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Token");
		debug.field("kind", &self.0.kind).field("raw", &self.raw());
		if !self.is_leaf() {
			debug.field("children", &self.0.children);
		}
		debug.finish()
	}
}

impl Serialize for Token {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		let mut state = serializer.serialize_struct("Token", 5)?;
		state.serialize_field("kind", &self.0.kind)?;
		state.serialize_field("raw", self.raw())?;
		state.serialize_field("line", &self.0.line)?;
		state.serialize_field("rule", &*self.0.rule)?;
		state.serialize_field("children", &self.0.children)?;
		state.end()
	}
}
