//! The default CommonMark grammar with GitHub flavored additions.
//!
//! GFM rules (`table`, `strikethrough` and `bare-autolink`) are always
//! registered and consult [`Context::gfm`](crate::Context::gfm) when they
//! run, so a single engine serves documents with and without GFM.

use crate::Mode;
use crate::RuleSet;

pub(crate) mod block;
pub(crate) mod inline;
pub mod scan;

/// Ids of the default rules, usable as [`Priority`](crate::Priority)
/// anchors.
pub mod ids {
	pub const BLANK_LINE: &str = "blank-line";
	pub const FENCED_CODE: &str = "fenced-code";
	pub const INDENTED_CODE: &str = "indented-code";
	pub const ATX_HEADING: &str = "atx-heading";
	pub const THEMATIC_BREAK: &str = "thematic-break";
	pub const BLOCKQUOTE: &str = "blockquote";
	pub const LIST: &str = "list";
	pub const HTML_BLOCK: &str = "html-block";
	pub const LINK_DEFINITION: &str = "link-definition";
	pub const TABLE: &str = "table";
	pub const PARAGRAPH: &str = "paragraph";

	pub const ESCAPE: &str = "escape";
	pub const CODE_SPAN: &str = "code-span";
	pub const AUTOLINK: &str = "autolink";
	pub const RAW_HTML: &str = "raw-html";
	pub const IMAGE: &str = "image";
	pub const LINK: &str = "link";
	pub const STRONG: &str = "strong";
	pub const EMPHASIS: &str = "emphasis";
	pub const STRIKETHROUGH: &str = "strikethrough";
	pub const BARE_AUTOLINK: &str = "bare-autolink";
	pub const HARD_BREAK: &str = "hard-break";
	pub const SOFT_BREAK: &str = "soft-break";
	pub const TEXT: &str = "text";
}

/// The default block rules.
pub fn block_rules() -> RuleSet {
	RuleSet::from_rules(Mode::Block, block::rules())
}

/// The default inline rules.
pub fn inline_rules() -> RuleSet {
	RuleSet::from_rules(Mode::Inline, inline::rules())
}
