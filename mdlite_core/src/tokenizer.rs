use std::ops::Range;
use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::Context;
use crate::ContextUpdate;
use crate::Cursor;
use crate::Diagnostic;
use crate::MdliteError;
use crate::MdliteResult;
use crate::Mode;
use crate::Rule;
use crate::RuleMatch;
use crate::RuleSet;
use crate::Token;
use crate::TokenKind;

/// The frozen block and inline rule sets of an engine.
#[derive(Debug, Clone)]
pub(crate) struct Grammar {
	pub(crate) block: RuleSet,
	pub(crate) inline: RuleSet,
}

impl Grammar {
	pub(crate) fn rules(&self, mode: Mode) -> &RuleSet {
		match mode {
			Mode::Block => &self.block,
			Mode::Inline => &self.inline,
		}
	}
}

/// Output of one run of the match, consume and emit loop.
pub(crate) struct Run {
	pub(crate) tokens: Vec<Token>,
	pub(crate) context: Arc<Context>,
	pub(crate) updates: Vec<ContextUpdate>,
}

/// Tokenize `span` of `source` with the rules of `mode`.
///
/// Rules are tried in priority order at every position and the first match
/// wins. Updates returned by a match are applied copy-on-write before the
/// next position, so earlier tokens keep the context they were built with.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
	grammar: &Grammar,
	mode: Mode,
	source: &Arc<str>,
	span: Range<usize>,
	context: Arc<Context>,
	line: usize,
	inline_depth: usize,
	diagnostics: &mut Vec<Diagnostic>,
) -> MdliteResult<Run> {
	let rules = grammar.rules(mode);
	let mut context = context;
	let mut tokens: Vec<Token> = Vec::new();
	let mut updates = Vec::new();
	let mut pos = span.start;
	let mut line = line;

	while pos < span.end {
		let mut matched: Option<(&Rule, RuleMatch)> = None;

		for rule in rules.rules() {
			let mut cursor = Cursor::new(
				grammar,
				source,
				span.clone(),
				pos,
				line,
				&context,
				rule.shared_id(),
				inline_depth,
				diagnostics,
			);
			let result = rule.apply(&mut cursor);
			let outcome = cursor.finish();

			if let Some(error) = outcome.error {
				return Err(error);
			}

			if let Some(mut rule_match) = result {
				rule_match.updates.extend(outcome.forwarded);
				matched = Some((rule, rule_match));
				break;
			}
		}

		let Some((rule, rule_match)) = matched else {
			error!(%mode, offset = pos, "no rule matched");
			return Err(MdliteError::NoRuleMatched { mode, offset: pos });
		};

		check_match(rule, source, pos, span.end, &rule_match)?;
		trace!(
			rule = rule.id(),
			offset = pos,
			consumed = rule_match.consumed,
			"rule matched"
		);

		for update in &rule_match.updates {
			if !Arc::make_mut(&mut context).apply(update) {
				debug!(rule = rule.id(), offset = pos, "ignored context update");
			}
		}

		let RuleMatch {
			consumed,
			tokens: emitted,
			updates: applied,
		} = rule_match;
		updates.extend(applied);

		for token in emitted {
			if mode == Mode::Inline {
				push_coalesced(&mut tokens, token);
			} else {
				tokens.push(token);
			}
		}

		line += source[pos..pos + consumed].matches('\n').count();
		pos += consumed;
	}

	Ok(Run {
		tokens,
		context,
		updates,
	})
}

/// Enforce the rule contract: progress, no overrun and exact tiling of the
/// consumed range.
fn check_match(
	rule: &Rule,
	source: &Arc<str>,
	pos: usize,
	end: usize,
	rule_match: &RuleMatch,
) -> MdliteResult<()> {
	let consumed = rule_match.consumed;

	if consumed == 0 {
		error!(rule = rule.id(), offset = pos, "rule matched without consuming input");
		return Err(MdliteError::EmptyMatch {
			rule: rule.id().to_string(),
			offset: pos,
		});
	}

	if pos + consumed > end {
		error!(rule = rule.id(), offset = pos, consumed, "rule consumed past the end of input");
		return Err(MdliteError::MatchOverrun {
			rule: rule.id().to_string(),
			offset: pos,
			consumed,
			remaining: end - pos,
		});
	}

	let mut expected = pos;
	for token in &rule_match.tokens {
		let tiles = Arc::ptr_eq(token.source(), source) && token.span().start == expected;
		if !tiles {
			break;
		}
		expected = token.span().end;
	}

	if rule_match.tokens.is_empty() || expected != pos + consumed {
		error!(rule = rule.id(), offset = pos, "emitted tokens do not tile the consumed input");
		return Err(MdliteError::CoverageViolation {
			rule: rule.id().to_string(),
			offset: pos,
		});
	}

	Ok(())
}

/// Merge adjacent text leaves so a fallback that advances one unit at a time
/// still yields maximal runs.
fn push_coalesced(tokens: &mut Vec<Token>, token: Token) {
	let mergeable = |token: &Token| token.kind() == &TokenKind::Text && token.is_leaf();

	if let Some(last) = tokens.last_mut() {
		if mergeable(last)
			&& mergeable(&token)
			&& last.span().end == token.span().start
			&& Arc::ptr_eq(last.source(), token.source())
		{
			let rule: Arc<str> = Arc::from(last.rule());
			*last = Token::builder(
				TokenKind::Text,
				last.source(),
				last.span().start..token.span().end,
				last.context(),
				&rule,
			)
			.line(last.line())
			.build();
			return;
		}
	}

	tokens.push(token);
}

/// Run the inline rule set over every leaf with inline content, using the
/// final document context. Unchanged subtrees are returned as is.
pub(crate) fn expand_inline(
	grammar: &Grammar,
	token: &Token,
	context: &Arc<Context>,
	diagnostics: &mut Vec<Diagnostic>,
) -> MdliteResult<Token> {
	if token.kind().has_inline_content() && token.is_leaf() {
		let Some(inner) = token.inner_span() else {
			return Ok(token.clone());
		};

		if inner.is_empty() {
			return Ok(token.clone());
		}

		let offset = inner.start - token.span().start;
		let line = token.line() + token.raw()[..offset].matches('\n').count();
		let run = run(
			grammar,
			Mode::Inline,
			token.source(),
			inner,
			Arc::clone(context),
			line,
			0,
			diagnostics,
		)?;

		return Ok(token.with_children(run.tokens));
	}

	let mut children: Option<Vec<Token>> = None;
	for (index, child) in token.children().iter().enumerate() {
		let expanded = expand_inline(grammar, child, context, diagnostics)?;

		if let Some(children) = children.as_mut() {
			children.push(expanded);
		} else if !Token::ptr_eq(&expanded, child) {
			let mut rebuilt = token.children()[..index].to_vec();
			rebuilt.push(expanded);
			children = Some(rebuilt);
		}
	}

	Ok(match children {
		Some(children) => token.with_children(children),
		None => token.clone(),
	})
}
