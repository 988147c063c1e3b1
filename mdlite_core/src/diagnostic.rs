use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use derive_more::Deref;
use serde::Serialize;
use thiserror::Error;

use crate::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Info,
	Warning,
	Error,
}

impl Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
		}
	}
}

/// Stable identifier of a recoverable problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DiagnosticCode {
	/// Containers nested deeper than `max_nesting_depth`, or inline content
	/// nested past the inline recursion limit.
	NestingLimit,
	/// A link reference definition reused an existing label.
	DuplicateLinkDefinition,
	/// A cross reference had no entry in the symbol table.
	UnresolvedXref,
	/// Two documents exported the same cross reference uid.
	DuplicateSymbol,
	/// Front matter was not valid YAML.
	InvalidFrontMatter,
	/// Raw html was replaced by text.
	SanitizedHtml,
	/// A script link target was neutralized.
	UnsafeLink,
	/// A code chosen by a third party extension.
	Custom(Arc<str>),
}

impl DiagnosticCode {
	pub fn as_str(&self) -> &str {
		match self {
			Self::NestingLimit => "nesting-limit",
			Self::DuplicateLinkDefinition => "duplicate-link-definition",
			Self::UnresolvedXref => "unresolved-xref",
			Self::DuplicateSymbol => "duplicate-symbol",
			Self::InvalidFrontMatter => "invalid-front-matter",
			Self::SanitizedHtml => "sanitized-html",
			Self::UnsafeLink => "unsafe-link",
			Self::Custom(code) => code,
		}
	}
}

impl Display for DiagnosticCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl Serialize for DiagnosticCode {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

/// A recoverable problem found while parsing or rewriting.
///
/// Diagnostics belong to the session that produced them, never to a token.
/// They implement [`miette::Diagnostic`] so hosts can render them.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct Diagnostic {
	pub severity: Severity,
	pub code: DiagnosticCode,
	pub message: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub source_id: String,
	/// 1-based line, when known.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<usize>,
	/// The token that triggered the diagnostic.
	#[serde(skip)]
	pub token: Option<Token>,
}

impl Diagnostic {
	pub fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
		Self {
			severity,
			code,
			message: message.into(),
			source_id: String::new(),
			line: None,
			token: None,
		}
	}

	pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
		Self::new(Severity::Info, code, message)
	}

	pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
		Self::new(Severity::Warning, code, message)
	}

	#[must_use]
	pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
		self.source_id = source_id.into();
		self
	}

	#[must_use]
	pub fn with_line(mut self, line: usize) -> Self {
		self.line = Some(line);
		self
	}

	/// Attach the originating token, taking its line and source id.
	#[must_use]
	pub fn with_token(mut self, token: &Token) -> Self {
		self.line = Some(token.line());
		if self.source_id.is_empty() {
			self.source_id = token.context().source_id().to_string();
		}
		self.token = Some(token.clone());
		self
	}
}

impl miette::Diagnostic for Diagnostic {
	fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		Some(Box::new(format!("mdlite::{}", self.code)))
	}

	fn severity(&self) -> Option<miette::Severity> {
		Some(match self.severity {
			Severity::Info => miette::Severity::Advice,
			Severity::Warning => miette::Severity::Warning,
			Severity::Error => miette::Severity::Error,
		})
	}

	fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		match (&self.line, self.source_id.is_empty()) {
			(Some(line), false) => Some(Box::new(format!("{}:{line}", self.source_id))),
			(Some(line), true) => Some(Box::new(format!("line {line}"))),
			_ => None,
		}
	}
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, Deref, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
	pub fn push(&mut self, diagnostic: Diagnostic) {
		self.0.push(diagnostic);
	}

	pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
		self.0.extend(diagnostics);
	}

	/// Number of diagnostics with the given code.
	pub fn count(&self, code: &DiagnosticCode) -> usize {
		self.0.iter().filter(|d| &d.code == code).count()
	}
}

impl From<Vec<Diagnostic>> for Diagnostics {
	fn from(value: Vec<Diagnostic>) -> Self {
		Self(value)
	}
}

impl IntoIterator for Diagnostics {
	type Item = Diagnostic;
	type IntoIter = std::vec::IntoIter<Diagnostic>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

impl<'a> IntoIterator for &'a Diagnostics {
	type Item = &'a Diagnostic;
	type IntoIter = std::slice::Iter<'a, Diagnostic>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
