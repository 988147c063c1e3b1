use std::num::NonZeroUsize;
use std::panic;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::debug;
use tracing::info_span;
use tracing::warn;

use crate::Diagnostic;
use crate::DiagnosticCode;
use crate::MarkdownEngine;
use crate::MdliteResult;
use crate::ParseOptions;
use crate::ParsedDocument;
use crate::Stage;
use crate::SymbolTable;
use crate::exported_symbols;

/// A document handed to [`process_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
	/// Label used in diagnostics and as the href of exported symbols.
	pub source_id: String,
	pub text: String,
}

impl SourceDocument {
	pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			source_id: source_id.into(),
			text: text.into(),
		}
	}
}

/// The result of [`process_batch`].
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
	/// Processed documents in input order.
	pub documents: Vec<ParsedDocument>,
	/// The symbol table the linking stage resolved against.
	pub symbols: Arc<SymbolTable>,
}

/// Process a set of independent documents.
///
/// Documents are parsed and run through the [`Stage::Document`] rewriters on
/// scoped worker threads. Once every document is done, the symbols they
/// export are merged into `symbols` (host supplied entries first, then
/// documents in input order, the first uid wins) and the frozen table is
/// shared with the [`Stage::Linking`] rewriters, which run in parallel
/// again.
pub fn process_batch(
	engine: &MarkdownEngine,
	inputs: &[SourceDocument],
	options: &ParseOptions,
	symbols: &SymbolTable,
) -> MdliteResult<Batch> {
	let _span = info_span!("batch", documents = inputs.len()).entered();
	let empty = Arc::new(SymbolTable::new());

	let mut documents = parallel_map(inputs.iter().collect(), |input: &SourceDocument| {
		let options = options.clone().with_source_id(input.source_id.clone());
		let document = engine.parse(&input.text, &options)?;
		engine.rewrite_document(document, Stage::Document, &empty)
	})?;

	let symbols = Arc::new(collect_symbols(&mut documents, symbols));
	debug!(symbols = symbols.len(), "symbol table frozen");

	let documents = parallel_map(documents, |document: ParsedDocument| {
		engine.rewrite_document(document, Stage::Linking, &symbols)
	})?;

	Ok(Batch { documents, symbols })
}

fn collect_symbols(documents: &mut [ParsedDocument], external: &SymbolTable) -> SymbolTable {
	let mut table = external.clone();

	for document in documents {
		for (uid, target) in exported_symbols(&document.root, &document.source_id) {
			if table.insert(uid.clone(), target) {
				continue;
			}

			warn!(uid, source_id = document.source_id.as_str(), "duplicate symbol");
			document.diagnostics.push(
				Diagnostic::warning(
					DiagnosticCode::DuplicateSymbol,
					format!("uid `{uid}` is already declared elsewhere"),
				)
				.with_source_id(&document.source_id)
				.with_line(1),
			);
		}
	}

	table
}

/// Map `items` on scoped threads, one contiguous chunk per worker. Output
/// order matches input order. A panic in a worker is resumed on the caller.
fn parallel_map<T, R, F>(items: Vec<T>, map: F) -> MdliteResult<Vec<R>>
where
	T: Send,
	R: Send,
	F: Fn(T) -> MdliteResult<R> + Sync,
{
	if items.is_empty() {
		return Ok(Vec::new());
	}

	let workers = thread::available_parallelism()
		.map_or(1, NonZeroUsize::get)
		.min(items.len());
	let size = items.len().div_ceil(workers);
	let total = items.len();

	let mut chunks = Vec::with_capacity(workers);
	let mut items = items.into_iter().peekable();
	while items.peek().is_some() {
		chunks.push(items.by_ref().take(size).collect::<Vec<_>>());
	}

	let map = &map;
	let results = thread::scope(|scope| {
		let handles: Vec<_> = chunks
			.into_iter()
			.map(|chunk| scope.spawn(move || chunk.into_iter().map(map).collect::<MdliteResult<Vec<R>>>()))
			.collect();

		handles
			.into_iter()
			.map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
			.collect::<Vec<_>>()
	});

	let mut output = Vec::with_capacity(total);
	for result in results {
		output.extend(result?);
	}

	Ok(output)
}
