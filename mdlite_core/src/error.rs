use miette::Diagnostic;
use thiserror::Error;

use crate::Mode;

/// Hard failures. Every variant except [`MdliteError::ConfigParse`] and
/// [`MdliteError::UnknownExtension`] signals a bug in a rule or rewriter
/// rather than a problem with the markdown being processed.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum MdliteError {
	#[error("rule `{rule}` claimed a match at byte {offset} without consuming any input")]
	#[diagnostic(
		code(mdlite::empty_match),
		help("a matching rule must consume at least one byte; return `None` to signal no match")
	)]
	EmptyMatch { rule: String, offset: usize },

	#[error("rule `{rule}` consumed {consumed} bytes at byte {offset} but only {remaining} remain")]
	#[diagnostic(code(mdlite::match_overrun))]
	MatchOverrun {
		rule: String,
		offset: usize,
		consumed: usize,
		remaining: usize,
	},

	#[error("tokens emitted by rule `{rule}` at byte {offset} do not tile the consumed input")]
	#[diagnostic(
		code(mdlite::coverage_violation),
		help("emitted tokens must be contiguous and cover exactly the consumed range")
	)]
	CoverageViolation { rule: String, offset: usize },

	#[error("no {mode} rule matched at byte {offset}")]
	#[diagnostic(
		code(mdlite::no_rule_matched),
		help("the fallback rule of a rule set must match any non-empty input")
	)]
	NoRuleMatched { mode: Mode, offset: usize },

	#[error("the {0} rule set has no fallback rule")]
	#[diagnostic(code(mdlite::missing_fallback))]
	MissingFallback(Mode),

	#[error("a {mode} rule named `{rule}` is already registered")]
	#[diagnostic(code(mdlite::duplicate_rule))]
	DuplicateRule { mode: Mode, rule: String },

	#[error("the {mode} rule set already has the fallback rule `{existing}`")]
	#[diagnostic(
		code(mdlite::fallback_exists),
		help("unregister the existing fallback before registering a replacement")
	)]
	FallbackExists { mode: Mode, existing: String },

	#[error("a rewriter named `{0}` is already registered")]
	#[diagnostic(code(mdlite::duplicate_rewriter))]
	DuplicateRewriter(String),

	#[error("no rule named `{0}` is registered")]
	#[diagnostic(code(mdlite::unknown_rule))]
	UnknownRule(String),

	#[error("no rewriter named `{0}` is registered")]
	#[diagnostic(code(mdlite::unknown_rewriter))]
	UnknownRewriter(String),

	#[error("rewriter `{rewriter}` returned a new token identical to its input")]
	#[diagnostic(
		code(mdlite::redundant_rewrite),
		help("return `None` from a rewriter when the token does not change")
	)]
	RedundantRewrite { rewriter: String },

	#[error("unknown extension: `{0}`")]
	#[diagnostic(
		code(mdlite::unknown_extension),
		help("built-in extensions: xref, yaml-header, sanitize")
	)]
	UnknownExtension(String),

	#[error("failed to parse config: {0}")]
	#[diagnostic(
		code(mdlite::config_parse),
		help("check that mdlite.toml is valid TOML")
	)]
	ConfigParse(String),

	#[error("failed to serialize: {0}")]
	#[diagnostic(code(mdlite::serialize))]
	Serialize(String),
}

pub type MdliteResult<T> = Result<T, MdliteError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
