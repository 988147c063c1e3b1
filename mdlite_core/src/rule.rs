use std::fmt;
use std::fmt::Display;
use std::ops::Range;
use std::sync::Arc;

use tracing::warn;

use crate::Context;
use crate::ContextUpdate;
use crate::Diagnostic;
use crate::DiagnosticCode;
use crate::Layout;
use crate::MdliteError;
use crate::MdliteResult;
use crate::Token;
use crate::TokenKind;
use crate::rules::scan;
use crate::tokenizer;
use crate::tokenizer::Grammar;

/// Which rule set a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
	/// Rules that recognize whole lines: paragraphs, lists, fences.
	Block,
	/// Rules that run over the text of a paragraph, heading or table cell.
	Inline,
}

impl Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Block => write!(f, "block"),
			Self::Inline => write!(f, "inline"),
		}
	}
}

/// Where a registration lands relative to existing entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Priority {
	/// Highest priority.
	First,
	/// Lowest priority. Rules are placed immediately before the fallback.
	Last,
	/// Immediately before the entry with this id.
	Before(String),
	/// Immediately after the entry with this id.
	After(String),
}

/// The signature of a rule's producer.
pub type Matcher = dyn Fn(&mut Cursor<'_>) -> Option<RuleMatch> + Send + Sync;

/// A single grammar production.
#[derive(Clone)]
pub struct Rule {
	id: Arc<str>,
	fallback: bool,
	matcher: Arc<Matcher>,
}

impl Rule {
	pub fn new<F>(id: impl Into<Arc<str>>, matcher: F) -> Self
	where
		F: Fn(&mut Cursor<'_>) -> Option<RuleMatch> + Send + Sync + 'static,
	{
		Self {
			id: id.into(),
			fallback: false,
			matcher: Arc::new(matcher),
		}
	}

	/// A rule that must match any non-empty input. A rule set has exactly
	/// one and it always runs last.
	pub fn fallback<F>(id: impl Into<Arc<str>>, matcher: F) -> Self
	where
		F: Fn(&mut Cursor<'_>) -> Option<RuleMatch> + Send + Sync + 'static,
	{
		Self {
			fallback: true,
			..Self::new(id, matcher)
		}
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub(crate) fn shared_id(&self) -> &Arc<str> {
		&self.id
	}

	pub fn is_fallback(&self) -> bool {
		self.fallback
	}

	pub fn apply(&self, cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
		(self.matcher)(cursor)
	}
}

impl fmt::Debug for Rule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Rule")
			.field("id", &self.id)
			.field("fallback", &self.fallback)
			.finish_non_exhaustive()
	}
}

/// The result of a successful rule application.
#[derive(Debug, Clone, Default)]
pub struct RuleMatch {
	/// Bytes consumed from the cursor position. Must be at least one.
	pub consumed: usize,
	/// Emitted tokens. Together they must cover exactly the consumed range.
	pub tokens: Vec<Token>,
	pub updates: Vec<ContextUpdate>,
}

impl RuleMatch {
	pub fn new(consumed: usize, tokens: Vec<Token>) -> Self {
		Self {
			consumed,
			tokens,
			updates: Vec::new(),
		}
	}

	/// A match that emits a single token covering the consumed input.
	pub fn single(token: Token) -> Self {
		let consumed = token.span().len();
		Self::new(consumed, vec![token])
	}

	#[must_use]
	pub fn with_update(mut self, update: ContextUpdate) -> Self {
		self.updates.push(update);
		self
	}
}

/// Priority ordered rules for one [`Mode`].
#[derive(Debug, Clone)]
pub struct RuleSet {
	mode: Mode,
	rules: Vec<Rule>,
}

impl RuleSet {
	pub fn new(mode: Mode) -> Self {
		Self {
			mode,
			rules: Vec::new(),
		}
	}

	/// A rule set from rules already in priority order.
	pub(crate) fn from_rules(mode: Mode, rules: Vec<Rule>) -> Self {
		Self { mode, rules }
	}

	pub fn mode(&self) -> Mode {
		self.mode
	}

	pub fn rules(&self) -> &[Rule] {
		&self.rules
	}

	pub fn ids(&self) -> Vec<&str> {
		self.rules.iter().map(Rule::id).collect()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.position(id).is_some()
	}

	pub fn position(&self, id: &str) -> Option<usize> {
		self.rules.iter().position(|rule| rule.id() == id)
	}

	pub fn fallback(&self) -> Option<&Rule> {
		self.rules.last().filter(|rule| rule.is_fallback())
	}

	/// Insert a rule. A fallback rule always lands at the end, and a rule set
	/// can only hold one.
	pub fn insert(&mut self, rule: Rule, priority: &Priority) -> MdliteResult<()> {
		if self.contains(rule.id()) {
			return Err(MdliteError::DuplicateRule {
				mode: self.mode,
				rule: rule.id().to_string(),
			});
		}

		if rule.is_fallback() {
			if let Some(existing) = self.fallback() {
				return Err(MdliteError::FallbackExists {
					mode: self.mode,
					existing: existing.id().to_string(),
				});
			}

			self.rules.push(rule);
			return Ok(());
		}

		let limit = if self.fallback().is_some() {
			self.rules.len() - 1
		} else {
			self.rules.len()
		};

		let index = match priority {
			Priority::First => 0,
			Priority::Last => limit,
			Priority::Before(anchor) => self.anchor(anchor)?.min(limit),
			Priority::After(anchor) => (self.anchor(anchor)? + 1).min(limit),
		};

		self.rules.insert(index, rule);
		Ok(())
	}

	/// Remove a rule by id.
	pub fn remove(&mut self, id: &str) -> MdliteResult<Rule> {
		let index = self.anchor(id)?;
		Ok(self.rules.remove(index))
	}

	/// Check that the set ends with exactly one fallback.
	pub fn validate(&self) -> MdliteResult<()> {
		if self.fallback().is_none() {
			return Err(MdliteError::MissingFallback(self.mode));
		}

		Ok(())
	}

	fn anchor(&self, id: &str) -> MdliteResult<usize> {
		self.position(id)
			.ok_or_else(|| MdliteError::UnknownRule(id.to_string()))
	}
}

/// A rule's view of the input.
///
/// The cursor exposes the remaining input of the current region, the
/// current context snapshot, token builders spanning the shared buffer, and
/// recursion into the block and inline rule sets for container rules.
pub struct Cursor<'a> {
	grammar: &'a Grammar,
	source: &'a Arc<str>,
	region: Range<usize>,
	pos: usize,
	line: usize,
	context: &'a Arc<Context>,
	rule: &'a Arc<str>,
	inline_depth: usize,
	diagnostics: &'a mut Vec<Diagnostic>,
	forwarded: Vec<ContextUpdate>,
	error: Option<MdliteError>,
}

pub(crate) struct CursorOutcome {
	pub(crate) forwarded: Vec<ContextUpdate>,
	pub(crate) error: Option<MdliteError>,
}

/// Inline recursion deeper than this turns the remaining text into a single
/// text token.
const MAX_INLINE_DEPTH: usize = 64;

impl<'a> Cursor<'a> {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		grammar: &'a Grammar,
		source: &'a Arc<str>,
		region: Range<usize>,
		pos: usize,
		line: usize,
		context: &'a Arc<Context>,
		rule: &'a Arc<str>,
		inline_depth: usize,
		diagnostics: &'a mut Vec<Diagnostic>,
	) -> Self {
		Self {
			grammar,
			source,
			region,
			pos,
			line,
			context,
			rule,
			inline_depth,
			diagnostics,
			forwarded: Vec::new(),
			error: None,
		}
	}

	pub(crate) fn finish(self) -> CursorOutcome {
		CursorOutcome {
			forwarded: self.forwarded,
			error: self.error,
		}
	}

	/// The remaining input of the current region.
	pub fn rest(&self) -> &'a str {
		let source: &'a Arc<str> = self.source;
		&source[self.pos..self.region.end]
	}

	/// Absolute byte offset of the cursor within [`Cursor::source`].
	pub fn offset(&self) -> usize {
		self.pos
	}

	/// Whether the cursor sits at the start of the region being tokenized.
	pub fn at_region_start(&self) -> bool {
		self.pos == self.region.start
	}

	/// The character before the cursor, or `None` at the start of the
	/// region.
	pub fn before(&self) -> Option<char> {
		if self.at_region_start() {
			return None;
		}

		self.source[self.region.start..self.pos].chars().next_back()
	}

	pub fn source(&self) -> &'a Arc<str> {
		self.source
	}

	pub fn context(&self) -> &'a Arc<Context> {
		self.context
	}

	/// 1-based line of the cursor position.
	pub fn line(&self) -> usize {
		self.line
	}

	/// Line of the byte at `offset` relative to the cursor.
	pub fn line_at(&self, offset: usize) -> usize {
		let end = (self.pos + offset).min(self.region.end);
		self.line + self.source[self.pos..end].matches('\n').count()
	}

	pub fn rule_id(&self) -> &str {
		self.rule
	}

	/// Record a diagnostic for the current document.
	pub fn report(&mut self, diagnostic: Diagnostic) {
		let diagnostic = if diagnostic.source_id.is_empty() {
			diagnostic.with_source_id(self.context.source_id())
		} else {
			diagnostic
		};
		self.diagnostics.push(diagnostic);
	}

	/// A leaf token spanning the next `len` bytes.
	pub fn leaf(&self, kind: TokenKind, len: usize) -> Token {
		self.leaf_at(kind, 0..len)
	}

	/// A leaf token spanning `range`, relative to the cursor.
	pub fn leaf_at(&self, kind: TokenKind, range: Range<usize>) -> Token {
		self.node(kind, range, Layout::Flat, Vec::new())
	}

	/// A token spanning `range`, relative to the cursor.
	pub fn node(
		&self,
		kind: TokenKind,
		range: Range<usize>,
		layout: Layout,
		children: Vec<Token>,
	) -> Token {
		let line = self.line_at(range.start);
		let span = self.pos + range.start..self.pos + range.end;
		Token::builder(kind, self.source, span, self.context, self.rule)
			.layout(layout)
			.children(children)
			.line(line)
			.build()
	}

	/// Tokenize `range` (relative to the cursor) with the inline rule set.
	pub fn inline(&mut self, range: Range<usize>) -> Vec<Token> {
		if range.is_empty() {
			return Vec::new();
		}

		if self.inline_depth >= MAX_INLINE_DEPTH {
			let line = self.line_at(range.start);
			warn!(source_id = self.context.source_id(), line, "inline nesting limit reached");
			self.report(
				Diagnostic::warning(
					DiagnosticCode::NestingLimit,
					format!("inline content nested deeper than {MAX_INLINE_DEPTH} levels is treated as text"),
				)
				.with_line(line),
			);
			return vec![self.leaf_at(TokenKind::Text, range)];
		}

		let span = self.pos + range.start..self.pos + range.end;
		let line = self.line_at(range.start);
		let result = tokenizer::run(
			self.grammar,
			Mode::Inline,
			self.source,
			span,
			Arc::clone(self.context),
			line,
			self.inline_depth + 1,
			self.diagnostics,
		);

		match result {
			Ok(run) => run.tokens,
			Err(error) => {
				self.error.get_or_insert(error);
				Vec::new()
			}
		}
	}

	/// Build a line container spanning `range`, relative to the cursor.
	///
	/// `prefixes` holds the bytes stripped from each line and `inner` the
	/// remaining text, so that re-inserting every prefix in front of its line
	/// of `inner` reproduces the consumed input. The inner text is tokenized
	/// with the block rule set one nesting level deeper, starting from the
	/// current context plus whatever earlier containers of the same match
	/// forwarded. Context updates made inside are forwarded to the enclosing
	/// context.
	pub fn container(
		&mut self,
		kind: TokenKind,
		range: Range<usize>,
		inner: String,
		prefixes: Vec<String>,
		list_item: bool,
	) -> Token {
		let mut nested = if list_item {
			self.context.nested_list_item()
		} else {
			self.context.nested()
		};
		for update in &self.forwarded {
			nested.apply(update);
		}
		let nested = Arc::new(nested);
		let buffer: Arc<str> = Arc::from(inner);
		let line = self.line_at(range.start);

		let children = if self.context.is_nesting_exhausted() {
			warn!(
				source_id = self.context.source_id(),
				line,
				depth = nested.depth(),
				"container nesting limit reached"
			);
			self.report(
				Diagnostic::warning(
					DiagnosticCode::NestingLimit,
					format!(
						"containers nested deeper than {} levels are treated as a paragraph",
						nested.options().max_nesting_depth
					),
				)
				.with_line(line),
			);
			truncated_paragraph(&buffer, &nested, self.rule, line)
				.into_iter()
				.collect()
		} else {
			let result = tokenizer::run(
				self.grammar,
				Mode::Block,
				&buffer,
				0..buffer.len(),
				nested,
				line,
				0,
				self.diagnostics,
			);

			match result {
				Ok(run) => {
					self.forwarded.extend(run.updates);
					run.tokens
				}
				Err(error) => {
					self.error.get_or_insert(error);
					Vec::new()
				}
			}
		};

		Token::builder(
			kind,
			self.source,
			self.pos + range.start..self.pos + range.end,
			self.context,
			self.rule,
		)
		.layout(Layout::Prefixed(prefixes.into()))
		.children(children)
		.line(line)
		.build()
	}
}

fn truncated_paragraph(
	buffer: &Arc<str>,
	context: &Arc<Context>,
	rule: &Arc<str>,
	line: usize,
) -> Option<Token> {
	if buffer.is_empty() {
		return None;
	}

	let (open, close) = scan::whitespace_frame(buffer);
	Some(
		Token::builder(TokenKind::Paragraph, buffer, 0..buffer.len(), context, rule)
			.layout(Layout::Framed { open, close })
			.line(line)
			.build(),
	)
}
