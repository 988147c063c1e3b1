use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::MdliteError;
use crate::MdliteResult;
use crate::XrefTarget;

/// Default bound on container recursion (blockquotes and list items).
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 32;

/// Supported config file locations in discovery order (highest precedence
/// first). The core never reads them; hosts do.
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["mdlite.toml", ".mdlite.toml", ".config/mdlite.toml"];

/// Options that shape a single parse. A fresh [`Context`](crate::Context) is
/// built from these for every document.
///
/// ```toml
/// [parse]
/// gfm = true
/// strict = false
/// max_nesting_depth = 32
/// extensions = ["xref", "yaml-header"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
	/// Ids of built-in extensions to install, e.g. `xref`.
	#[serde(alias = "extensions", alias = "enabledExtensions")]
	pub enabled_extensions: BTreeSet<String>,
	/// Enable GitHub flavored additions: tables, strikethrough and bare
	/// autolinks.
	#[serde(alias = "gfmMode")]
	pub gfm: bool,
	/// Strict mode disables the lenient constructs: lazy continuation lines
	/// and generic html blocks.
	#[serde(alias = "strictMode")]
	pub strict: bool,
	/// Identifier of the source used in diagnostics. Usually a file path,
	/// but the core treats it as an opaque label.
	#[serde(alias = "sourceId", skip_serializing_if = "String::is_empty")]
	pub source_id: String,
	/// Containers nested deeper than this are truncated to a paragraph.
	pub max_nesting_depth: usize,
}

impl Default for ParseOptions {
	fn default() -> Self {
		Self {
			enabled_extensions: BTreeSet::new(),
			gfm: true,
			strict: false,
			source_id: String::new(),
			max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
		}
	}
}

impl ParseOptions {
	#[must_use]
	pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
		self.source_id = source_id.into();
		self
	}

	#[must_use]
	pub fn with_extension(mut self, id: impl Into<String>) -> Self {
		self.enabled_extensions.insert(id.into());
		self
	}

	#[must_use]
	pub fn with_gfm(mut self, gfm: bool) -> Self {
		self.gfm = gfm;
		self
	}

	#[must_use]
	pub fn with_strict(mut self, strict: bool) -> Self {
		self.strict = strict;
		self
	}

	#[must_use]
	pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
		self.max_nesting_depth = depth;
		self
	}

	pub fn is_enabled(&self, id: &str) -> bool {
		self.enabled_extensions.contains(id)
	}
}

/// Configuration loaded from an `mdlite.toml` file.
///
/// ```toml
/// [parse]
/// gfm = true
/// extensions = ["xref"]
///
/// [symbols]
/// "System.String" = { href = "https://learn.microsoft.com/dotnet/api/system.string", name = "String" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MdliteConfig {
	/// Options applied to every document.
	#[serde(default)]
	pub parse: ParseOptions,
	/// Externally known cross-reference targets keyed by uid. These seed the
	/// symbol table before any document exports its own symbols.
	#[serde(default)]
	pub symbols: BTreeMap<String, XrefTarget>,
}

impl MdliteConfig {
	pub fn from_toml_str(content: &str) -> MdliteResult<Self> {
		toml::from_str(content).map_err(|e| MdliteError::ConfigParse(e.to_string()))
	}
}
