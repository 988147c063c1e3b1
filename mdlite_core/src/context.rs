use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::ParseOptions;

/// Opaque state stored by extensions. The core never looks inside.
pub type ExtensionValue = Arc<dyn Any + Send + Sync>;

/// Destination of a link reference definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkTarget {
	pub destination: Arc<str>,
	pub title: Option<Arc<str>>,
}

/// Parsing state for one document.
///
/// A context is shared by `Arc` between every token created while it was
/// current. Rules never mutate it directly: they return [`ContextUpdate`]s
/// and the tokenizer applies them copy-on-write, so a token always sees the
/// snapshot that existed when it was produced.
#[derive(Debug, Clone)]
pub struct Context {
	options: Arc<ParseOptions>,
	links: Arc<BTreeMap<String, LinkTarget>>,
	depth: usize,
	list_depth: usize,
	extensions: Arc<BTreeMap<String, ExtensionValue>>,
}

/// A monotonic change to a [`Context`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ContextUpdate {
	/// Register a link reference definition. The label must already be
	/// normalized with [`normalize_label`]. Ignored if the label exists.
	DefineLink { label: String, target: LinkTarget },
	/// Store a value in an extension slot. Ignored if the slot is set.
	SetExtension { key: String, value: ExtensionValue },
}

impl Context {
	pub fn new(options: ParseOptions) -> Self {
		Self {
			options: Arc::new(options),
			links: Arc::default(),
			depth: 0,
			list_depth: 0,
			extensions: Arc::default(),
		}
	}

	pub fn options(&self) -> &ParseOptions {
		&self.options
	}

	pub fn source_id(&self) -> &str {
		&self.options.source_id
	}

	pub fn gfm(&self) -> bool {
		self.options.gfm
	}

	pub fn strict(&self) -> bool {
		self.options.strict
	}

	/// Container nesting depth; `0` for the document itself.
	pub fn depth(&self) -> usize {
		self.depth
	}

	/// Number of enclosing list items.
	pub fn list_depth(&self) -> usize {
		self.list_depth
	}

	/// Whether a container opened here would exceed `max_nesting_depth`.
	pub fn is_nesting_exhausted(&self) -> bool {
		self.depth >= self.options.max_nesting_depth
	}

	/// Look up a link reference definition by its raw label.
	pub fn link(&self, label: &str) -> Option<&LinkTarget> {
		self.links.get(&normalize_label(label))
	}

	pub fn links(&self) -> &BTreeMap<String, LinkTarget> {
		&self.links
	}

	/// Read an extension slot, downcasting to the type the extension stored.
	pub fn extension<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
		self.extensions.get(key)?.downcast_ref::<T>()
	}

	/// Derive the context for the content of a container.
	#[must_use]
	pub fn nested(&self) -> Self {
		Self {
			depth: self.depth + 1,
			..self.clone()
		}
	}

	/// Derive the context for the content of a list item.
	#[must_use]
	pub fn nested_list_item(&self) -> Self {
		Self {
			depth: self.depth + 1,
			list_depth: self.list_depth + 1,
			..self.clone()
		}
	}

	/// Apply an update. Returns `false` when the update was refused because
	/// it would retract earlier state: a duplicate link label or an extension
	/// slot that is already set.
	pub fn apply(&mut self, update: &ContextUpdate) -> bool {
		match update {
			ContextUpdate::DefineLink { label, target } => {
				if self.links.contains_key(label) {
					return false;
				}

				Arc::make_mut(&mut self.links).insert(label.clone(), target.clone());
				true
			}
			ContextUpdate::SetExtension { key, value } => {
				if self.extensions.contains_key(key) {
					return false;
				}

				Arc::make_mut(&mut self.extensions).insert(key.clone(), Arc::clone(value));
				true
			}
		}
	}
}

/// Normalize a link label for matching: trim, collapse internal whitespace
/// and case fold.
pub fn normalize_label(label: &str) -> String {
	label
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.to_lowercase()
}
