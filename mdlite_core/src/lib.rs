//! `mdlite_core` is a rule driven markdown tokenizer. It turns markdown text
//! into an immutable token tree and rewrites that tree functionally, sharing
//! every subtree a rewrite leaves untouched.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Markdown text + ParseOptions
//!   → Block pass (block rule set, first match wins, link definitions recorded)
//!   → Inline pass (inline rule set over paragraphs, headings and table cells)
//!   → Document rewriters (per document)
//!   → Linking rewriters (after every document exported its symbols)
//!   → Token tree handed to a renderer
//! ```
//!
//! Every token keeps the raw text it came from, and its children cover that
//! text exactly, so `document.root.reconstruct()` always returns the input.
//!
//! ## Modules
//!
//! - [`rules`]: The default CommonMark grammar with GFM tables,
//!   strikethrough and bare autolinks.
//! - [`extensions`]: Built-in extensions: `xref`, `yaml-header` and
//!   `sanitize`.
//! - [`visit`]: The renderer contract and a textual outline dump.
//!
//! ## Key Types
//!
//! - [`Token`]: An `Arc` shared node with a closed [`TokenKind`].
//! - [`Rule`] and [`RuleSet`]: Priority ordered grammar productions.
//! - [`Registry`]: Where rules, rewriters and extensions are registered.
//! - [`MarkdownEngine`]: The frozen, thread safe engine built from a
//!   registry.
//! - [`RewriteEngine`]: Ordered rewriters applied in one structurally shared
//!   pass.
//! - [`Diagnostic`]: A recoverable problem reported while parsing or
//!   rewriting.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mdlite_core::MarkdownEngine;
//! use mdlite_core::ParseOptions;
//! use mdlite_core::SymbolTable;
//!
//! let options = ParseOptions::default().with_extension("xref");
//! let engine = MarkdownEngine::from_options(&options)?;
//! let document = engine.process("# Hello *world*\n", &options, &Arc::new(SymbolTable::new()))?;
//!
//! assert_eq!(document.root.reconstruct(), "# Hello *world*\n");
//! # Ok::<(), mdlite_core::MdliteError>(())
//! ```

pub use batch::*;
pub use config::*;
pub use context::*;
pub use diagnostic::*;
pub use error::*;
pub use extensions::*;
pub use registry::*;
pub use rewrite::*;
pub use rule::*;
pub use toc::*;
pub use token::*;

mod batch;
mod config;
mod context;
mod diagnostic;
#[allow(unused_assignments)]
mod error;
pub mod extensions;
pub(crate) mod lexer;
mod registry;
mod rewrite;
mod rule;
pub mod rules;
mod toc;
mod token;
pub(crate) mod tokenizer;
pub mod visit;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
