//! Built-in extensions, enabled by id through
//! [`ParseOptions::enabled_extensions`](crate::ParseOptions::enabled_extensions).
//!
//! - `xref`: `@uid` and `<xref:uid>` cross references resolved against a
//!   [`SymbolTable`](crate::SymbolTable).
//! - `yaml-header`: YAML front matter at the top of a document.
//! - `sanitize`: turns raw html into text and neutralizes script links.

pub use sanitize::*;
pub use xref::*;
pub use yaml_header::*;

use crate::Extension;

mod sanitize;
mod xref;
mod yaml_header;

/// Look up a built-in extension by id.
pub fn builtin(id: &str) -> Option<Box<dyn Extension>> {
	match id {
		XREF => Some(Box::new(XrefExtension)),
		YAML_HEADER => Some(Box::new(YamlHeaderExtension)),
		SANITIZE => Some(Box::new(SanitizeExtension)),
		_ => None,
	}
}
