use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::debug_span;

use crate::Context;
use crate::ContextUpdate;
use crate::Diagnostics;
use crate::Layout;
use crate::MdliteError;
use crate::MdliteResult;
use crate::Mode;
use crate::ParseOptions;
use crate::Priority;
use crate::RewriteContext;
use crate::RewriteEngine;
use crate::Rewriter;
use crate::Rule;
use crate::RuleSet;
use crate::Stage;
use crate::SymbolTable;
use crate::Token;
use crate::TokenKind;
use crate::extensions;
use crate::rules;
use crate::tokenizer;
use crate::tokenizer::Grammar;

/// A bundle of rules and rewriters installed together.
pub trait Extension: Send + Sync {
	/// Stable id used by [`ParseOptions::enabled_extensions`].
	fn id(&self) -> &str;

	/// Register the extension's rules and rewriters.
	fn install(&self, registry: &mut Registry) -> MdliteResult<()>;
}

/// The mutable extension point. Rules and rewriters are registered here and
/// then frozen into a [`MarkdownEngine`].
#[derive(Debug, Clone)]
pub struct Registry {
	block: RuleSet,
	inline: RuleSet,
	rewriters: RewriteEngine,
	extensions: Vec<String>,
	installed: Vec<Installation>,
}

/// What one extension registered when it was installed.
#[derive(Debug, Clone)]
struct Installation {
	id: String,
	rules: Vec<(Mode, String)>,
	rewriters: Vec<String>,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new()
	}
}

impl Registry {
	/// An empty registry. Both rule sets need a fallback before
	/// [`Registry::build`] succeeds.
	pub fn new() -> Self {
		Self {
			block: RuleSet::new(Mode::Block),
			inline: RuleSet::new(Mode::Inline),
			rewriters: RewriteEngine::new(),
			extensions: Vec::new(),
			installed: Vec::new(),
		}
	}

	/// The default grammar without extensions.
	pub fn with_defaults() -> Self {
		Self {
			block: rules::block_rules(),
			inline: rules::inline_rules(),
			..Self::new()
		}
	}

	/// The default grammar plus every built-in extension enabled in
	/// `options`.
	pub fn for_options(options: &ParseOptions) -> MdliteResult<Self> {
		let mut registry = Self::with_defaults();

		for id in &options.enabled_extensions {
			let extension = extensions::builtin(id)
				.ok_or_else(|| MdliteError::UnknownExtension(id.clone()))?;
			registry.install(extension.as_ref())?;
		}

		Ok(registry)
	}

	pub fn rules(&self, mode: Mode) -> &RuleSet {
		match mode {
			Mode::Block => &self.block,
			Mode::Inline => &self.inline,
		}
	}

	fn rules_mut(&mut self, mode: Mode) -> &mut RuleSet {
		match mode {
			Mode::Block => &mut self.block,
			Mode::Inline => &mut self.inline,
		}
	}

	pub fn rewriters(&self) -> &RewriteEngine {
		&self.rewriters
	}

	/// Ids of the installed extensions, in installation order.
	pub fn extensions(&self) -> &[String] {
		&self.extensions
	}

	pub fn register_rule(&mut self, mode: Mode, rule: Rule, priority: Priority) -> MdliteResult<()> {
		debug!(%mode, rule = rule.id(), ?priority, "register rule");
		self.rules_mut(mode).insert(rule, &priority)
	}

	pub fn unregister_rule(&mut self, mode: Mode, id: &str) -> MdliteResult<Rule> {
		debug!(%mode, rule = id, "unregister rule");
		self.rules_mut(mode).remove(id)
	}

	pub fn register_rewriter(&mut self, rewriter: Rewriter, priority: Priority) -> MdliteResult<()> {
		debug!(rewriter = rewriter.id(), ?priority, "register rewriter");
		self.rewriters.insert(rewriter, &priority)
	}

	pub fn unregister_rewriter(&mut self, id: &str) -> MdliteResult<Rewriter> {
		debug!(rewriter = id, "unregister rewriter");
		self.rewriters.remove(id)
	}

	/// Install an extension once.
	///
	/// Installing the same id again does nothing while every rule and
	/// rewriter it registered is still present. If some were unregistered
	/// since, the remaining ones are removed and the extension is installed
	/// afresh.
	pub fn install(&mut self, extension: &dyn Extension) -> MdliteResult<()> {
		if let Some(index) = self
			.installed
			.iter()
			.position(|installed| installed.id == extension.id())
		{
			if self.is_intact(&self.installed[index]) {
				return Ok(());
			}

			debug!(extension = extension.id(), "reinstalling partially unregistered extension");
			let stale = self.installed.remove(index);
			self.extensions.retain(|id| id != &stale.id);
			for (mode, id) in &stale.rules {
				if self.rules(*mode).contains(id) {
					self.rules_mut(*mode).remove(id)?;
				}
			}
			for id in &stale.rewriters {
				if self.rewriters.contains(id) {
					self.rewriters.remove(id)?;
				}
			}
		}

		let block = owned_ids(self.block.ids());
		let inline = owned_ids(self.inline.ids());
		let rewriters = owned_ids(self.rewriters.ids());

		extension.install(self)?;

		let rules = added_ids(&block, self.block.ids())
			.into_iter()
			.map(|id| (Mode::Block, id))
			.chain(
				added_ids(&inline, self.inline.ids())
					.into_iter()
					.map(|id| (Mode::Inline, id)),
			)
			.collect();

		self.installed.push(Installation {
			id: extension.id().to_string(),
			rules,
			rewriters: added_ids(&rewriters, self.rewriters.ids()),
		});
		self.extensions.push(extension.id().to_string());
		Ok(())
	}

	fn is_intact(&self, installation: &Installation) -> bool {
		installation
			.rules
			.iter()
			.all(|(mode, id)| self.rules(*mode).contains(id))
			&& installation
				.rewriters
				.iter()
				.all(|id| self.rewriters.contains(id))
	}

	/// Freeze the registry.
	pub fn build(self) -> MdliteResult<MarkdownEngine> {
		self.block.validate()?;
		self.inline.validate()?;

		Ok(MarkdownEngine {
			grammar: Arc::new(Grammar {
				block: self.block,
				inline: self.inline,
			}),
			rewriters: self.rewriters,
			extensions: self.extensions,
		})
	}
}

fn owned_ids(ids: Vec<&str>) -> Vec<String> {
	ids.into_iter().map(str::to_string).collect()
}

/// Ids in `after` that are not in `before`.
fn added_ids(before: &[String], after: Vec<&str>) -> Vec<String> {
	after
		.into_iter()
		.filter(|id| !before.iter().any(|existing| existing == id))
		.map(str::to_string)
		.collect()
}

/// Output of [`MarkdownEngine::tokenize`].
#[derive(Debug, Clone)]
pub struct Tokenized {
	pub tokens: Vec<Token>,
	/// The context after every update was applied.
	pub context: Arc<Context>,
	/// Updates applied during the run, in order.
	pub updates: Vec<ContextUpdate>,
	pub diagnostics: Diagnostics,
}

/// A parsed document and everything recorded while producing it.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
	pub source_id: String,
	pub root: Token,
	#[serde(skip)]
	pub context: Arc<Context>,
	pub diagnostics: Diagnostics,
}

impl ParsedDocument {
	pub fn to_json(&self) -> MdliteResult<String> {
		serde_json::to_string_pretty(self).map_err(|e| MdliteError::Serialize(e.to_string()))
	}
}

/// An immutable engine: frozen rule sets plus registered rewriters. It is
/// `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct MarkdownEngine {
	grammar: Arc<Grammar>,
	rewriters: RewriteEngine,
	extensions: Vec<String>,
}

impl MarkdownEngine {
	/// The default grammar with the extensions enabled in `options`.
	pub fn from_options(options: &ParseOptions) -> MdliteResult<Self> {
		Registry::for_options(options)?.build()
	}

	pub fn rules(&self, mode: Mode) -> &RuleSet {
		self.grammar.rules(mode)
	}

	pub fn rewriters(&self) -> &RewriteEngine {
		&self.rewriters
	}

	pub fn extensions(&self) -> &[String] {
		&self.extensions
	}

	/// Run one rule set over `text` without the inline phase.
	pub fn tokenize(&self, text: &str, mode: Mode, context: Arc<Context>) -> MdliteResult<Tokenized> {
		let source: Arc<str> = Arc::from(text);
		let mut diagnostics = Vec::new();
		let run = tokenizer::run(
			&self.grammar,
			mode,
			&source,
			0..source.len(),
			context,
			1,
			0,
			&mut diagnostics,
		)?;

		Ok(Tokenized {
			tokens: run.tokens,
			context: run.context,
			updates: run.updates,
			diagnostics: diagnostics.into(),
		})
	}

	/// Parse a document: a block pass over the whole text, then an inline
	/// pass over every paragraph, heading and table cell using the final
	/// context.
	pub fn parse(&self, text: &str, options: &ParseOptions) -> MdliteResult<ParsedDocument> {
		let _span = debug_span!("parse", source_id = options.source_id.as_str(), len = text.len()).entered();

		let source: Arc<str> = Arc::from(text);
		let context = Arc::new(Context::new(options.clone()));
		let mut diagnostics = Vec::new();

		let blocks = tokenizer::run(
			&self.grammar,
			Mode::Block,
			&source,
			0..source.len(),
			Arc::clone(&context),
			1,
			0,
			&mut diagnostics,
		)?;

		let document_rule: Arc<str> = Arc::from("document");
		let document = Token::builder(
			TokenKind::Document,
			&source,
			0..source.len(),
			&blocks.context,
			&document_rule,
		)
		.layout(Layout::Flat)
		.children(blocks.tokens)
		.build();

		let root = tokenizer::expand_inline(&self.grammar, &document, &blocks.context, &mut diagnostics)?;
		debug!(diagnostics = diagnostics.len(), "parsed document");

		Ok(ParsedDocument {
			source_id: options.source_id.clone(),
			root,
			context: blocks.context,
			diagnostics: diagnostics.into(),
		})
	}

	/// Run the registered rewriters of one stage over `root`.
	pub fn rewrite(&self, root: &Token, stage: Stage, context: &mut RewriteContext) -> MdliteResult<Token> {
		self.rewriters.stage(stage).rewrite(root, context)
	}

	/// Run the rewriters of one stage over a parsed document, collecting
	/// their diagnostics into it.
	pub fn rewrite_document(
		&self,
		document: ParsedDocument,
		stage: Stage,
		symbols: &Arc<SymbolTable>,
	) -> MdliteResult<ParsedDocument> {
		let mut context =
			RewriteContext::new(document.source_id.clone()).with_symbols(Arc::clone(symbols));
		let root = self.rewrite(&document.root, stage, &mut context)?;
		let mut diagnostics = document.diagnostics;
		diagnostics.extend(context.into_diagnostics());

		Ok(ParsedDocument {
			root,
			diagnostics,
			..document
		})
	}

	/// Parse a single document and run both rewrite stages with `symbols`.
	pub fn process(
		&self,
		text: &str,
		options: &ParseOptions,
		symbols: &Arc<SymbolTable>,
	) -> MdliteResult<ParsedDocument> {
		let document = self.parse(text, options)?;
		let document = self.rewrite_document(document, Stage::Document, symbols)?;
		self.rewrite_document(document, Stage::Linking, symbols)
	}
}
