use std::fmt;
use std::sync::Arc;

use tracing::debug_span;
use tracing::error;
use tracing::trace;

use crate::Diagnostic;
use crate::Diagnostics;
use crate::KindTag;
use crate::MdliteError;
use crate::MdliteResult;
use crate::Priority;
use crate::SymbolTable;
use crate::Token;
use crate::TokenKind;

/// A rewriter's transform. Returning `None` means the token is unchanged.
pub type Transform = dyn Fn(&Token, &mut RewriteContext) -> Option<Token> + Send + Sync;

/// Decides which token kinds a rewriter is offered.
pub type KindPredicate = dyn Fn(&TokenKind) -> bool + Send + Sync;

/// When a rewriter runs relative to the cross document barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Needs only the document itself.
	#[default]
	Document,
	/// Needs the symbol table collected from every document.
	Linking,
}

/// A single post processing step.
#[derive(Clone)]
pub struct Rewriter {
	id: Arc<str>,
	stage: Stage,
	targets: Arc<KindPredicate>,
	transform: Arc<Transform>,
}

impl Rewriter {
	pub fn new<P, F>(id: impl Into<Arc<str>>, targets: P, transform: F) -> Self
	where
		P: Fn(&TokenKind) -> bool + Send + Sync + 'static,
		F: Fn(&Token, &mut RewriteContext) -> Option<Token> + Send + Sync + 'static,
	{
		Self {
			id: id.into(),
			stage: Stage::Document,
			targets: Arc::new(targets),
			transform: Arc::new(transform),
		}
	}

	/// A rewriter offered every token whose kind has one of `tags`.
	pub fn for_tags<F>(id: impl Into<Arc<str>>, tags: &[KindTag], transform: F) -> Self
	where
		F: Fn(&Token, &mut RewriteContext) -> Option<Token> + Send + Sync + 'static,
	{
		let tags = tags.to_vec();
		Self::new(id, move |kind: &TokenKind| tags.contains(&kind.tag()), transform)
	}

	#[must_use]
	pub fn with_stage(mut self, stage: Stage) -> Self {
		self.stage = stage;
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn stage(&self) -> Stage {
		self.stage
	}

	pub fn targets(&self, kind: &TokenKind) -> bool {
		(self.targets)(kind)
	}
}

impl fmt::Debug for Rewriter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Rewriter")
			.field("id", &self.id)
			.field("stage", &self.stage)
			.finish_non_exhaustive()
	}
}

/// State threaded through one rewrite pass.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
	source_id: String,
	symbols: Arc<SymbolTable>,
	diagnostics: Diagnostics,
}

impl RewriteContext {
	pub fn new(source_id: impl Into<String>) -> Self {
		Self {
			source_id: source_id.into(),
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_symbols(mut self, symbols: Arc<SymbolTable>) -> Self {
		self.symbols = symbols;
		self
	}

	pub fn source_id(&self) -> &str {
		&self.source_id
	}

	pub fn symbols(&self) -> &SymbolTable {
		&self.symbols
	}

	/// Record a diagnostic, filling in the source id when missing.
	pub fn report(&mut self, diagnostic: Diagnostic) {
		let diagnostic = if diagnostic.source_id.is_empty() {
			diagnostic.with_source_id(&self.source_id)
		} else {
			diagnostic
		};
		self.diagnostics.push(diagnostic);
	}

	pub fn diagnostics(&self) -> &Diagnostics {
		&self.diagnostics
	}

	pub fn into_diagnostics(self) -> Diagnostics {
		self.diagnostics
	}
}

/// An ordered list of rewriters applied in one depth first pass.
///
/// Children are rewritten before their parent is offered to the rewriters.
/// A token whose children all come back unchanged and that no rewriter
/// replaces is returned as is, so untouched subtrees are shared between the
/// input and output trees and a pass with nothing to do returns its input.
#[derive(Debug, Clone, Default)]
pub struct RewriteEngine {
	rewriters: Vec<Rewriter>,
}

impl RewriteEngine {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, rewriter: Rewriter) -> Self {
		self.rewriters.push(rewriter);
		self
	}

	pub fn rewriters(&self) -> &[Rewriter] {
		&self.rewriters
	}

	pub fn ids(&self) -> Vec<&str> {
		self.rewriters.iter().map(Rewriter::id).collect()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.position(id).is_some()
	}

	pub fn is_empty(&self) -> bool {
		self.rewriters.is_empty()
	}

	pub fn insert(&mut self, rewriter: Rewriter, priority: &Priority) -> MdliteResult<()> {
		if self.position(rewriter.id()).is_some() {
			return Err(MdliteError::DuplicateRewriter(rewriter.id().to_string()));
		}

		let index = match priority {
			Priority::First => 0,
			Priority::Last => self.rewriters.len(),
			Priority::Before(anchor) => self.anchor(anchor)?,
			Priority::After(anchor) => self.anchor(anchor)? + 1,
		};

		self.rewriters.insert(index, rewriter);
		Ok(())
	}

	pub fn remove(&mut self, id: &str) -> MdliteResult<Rewriter> {
		let index = self.anchor(id)?;
		Ok(self.rewriters.remove(index))
	}

	/// The rewriters of one stage, in order.
	#[must_use]
	pub fn stage(&self, stage: Stage) -> Self {
		Self {
			rewriters: self
				.rewriters
				.iter()
				.filter(|rewriter| rewriter.stage == stage)
				.cloned()
				.collect(),
		}
	}

	/// Rewrite `root` and everything below it.
	pub fn rewrite(&self, root: &Token, context: &mut RewriteContext) -> MdliteResult<Token> {
		let _span = debug_span!("rewrite", source_id = context.source_id(), rewriters = self.rewriters.len()).entered();

		if self.rewriters.is_empty() {
			return Ok(root.clone());
		}

		self.rewrite_token(root, context)
	}

	fn rewrite_token(&self, token: &Token, context: &mut RewriteContext) -> MdliteResult<Token> {
		let mut children: Option<Vec<Token>> = None;

		for (index, child) in token.children().iter().enumerate() {
			let rewritten = self.rewrite_token(child, context)?;

			if let Some(children) = children.as_mut() {
				children.push(rewritten);
			} else if !Token::ptr_eq(&rewritten, child) {
				let mut changed = token.children()[..index].to_vec();
				changed.push(rewritten);
				children = Some(changed);
			}
		}

		let mut current = match children {
			Some(children) => token.with_children(children),
			None => token.clone(),
		};

		for rewriter in &self.rewriters {
			if !rewriter.targets(current.kind()) {
				continue;
			}

			let Some(replacement) = (rewriter.transform)(&current, context) else {
				continue;
			};

			if Token::ptr_eq(&replacement, &current) {
				continue;
			}

			if replacement.deep_eq(&current) {
				error!(rewriter = rewriter.id(), "rewriter returned an identical copy");
				return Err(MdliteError::RedundantRewrite {
					rewriter: rewriter.id().to_string(),
				});
			}

			trace!(rewriter = rewriter.id(), kind = %current.tag(), "token rewritten");
			current = replacement;
		}

		Ok(current)
	}

	fn position(&self, id: &str) -> Option<usize> {
		self.rewriters.iter().position(|rewriter| rewriter.id() == id)
	}

	fn anchor(&self, id: &str) -> MdliteResult<usize> {
		self.position(id)
			.ok_or_else(|| MdliteError::UnknownRewriter(id.to_string()))
	}
}
