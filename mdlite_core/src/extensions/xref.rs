use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Cursor;
use crate::Diagnostic;
use crate::DiagnosticCode;
use crate::Extension;
use crate::ExtensionToken;
use crate::MdliteResult;
use crate::Mode;
use crate::Priority;
use crate::Registry;
use crate::RewriteContext;
use crate::Rewriter;
use crate::Rule;
use crate::RuleMatch;
use crate::Stage;
use crate::Token;
use crate::TokenKind;
use crate::extensions::yaml_header::YAML_HEADER;

pub const XREF: &str = "xref";
/// Rule id of the `@uid` shorthand.
pub const XREF_SHORTHAND: &str = "xref-shorthand";
/// Rule id of the `<xref:uid>` autolink.
pub const XREF_AUTOLINK: &str = "xref-autolink";
/// Rewriter id of the resolution pass.
pub const XREF_RESOLVE: &str = "xref-resolve";

/// Attribute marking an `xref:` link whose uid had no target.
const UNRESOLVED: &str = "unresolved";

const LINK_SCHEME: &str = "xref:";

/// Where a cross reference points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrefTarget {
	pub href: String,
	/// Display name used when the reference has no text of its own.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

/// The uid to target map used by the resolution pass. It is assembled once
/// every document has been parsed and then shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolTable {
	symbols: BTreeMap<String, XrefTarget>,
}

impl SymbolTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a symbol. The first registration of a uid wins; returns `false`
	/// when the uid was already known.
	pub fn insert(&mut self, uid: impl Into<String>, target: XrefTarget) -> bool {
		let uid = uid.into();
		if self.symbols.contains_key(&uid) {
			return false;
		}

		self.symbols.insert(uid, target);
		true
	}

	pub fn get(&self, uid: &str) -> Option<&XrefTarget> {
		self.symbols.get(uid)
	}

	pub fn contains(&self, uid: &str) -> bool {
		self.symbols.contains_key(uid)
	}

	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &XrefTarget)> {
		self.symbols.iter()
	}
}

impl From<BTreeMap<String, XrefTarget>> for SymbolTable {
	fn from(symbols: BTreeMap<String, XrefTarget>) -> Self {
		Self { symbols }
	}
}

impl FromIterator<(String, XrefTarget)> for SymbolTable {
	fn from_iter<T: IntoIterator<Item = (String, XrefTarget)>>(iter: T) -> Self {
		let mut table = Self::new();
		for (uid, target) in iter {
			table.insert(uid, target);
		}
		table
	}
}

/// Symbols a document declares for other documents: the `uid` of its front
/// matter, named by its `title`. The document is addressed by `source_id`.
pub fn exported_symbols(root: &Token, source_id: &str) -> Vec<(String, XrefTarget)> {
	root.children()
		.iter()
		.filter_map(|child| child.kind().extension(YAML_HEADER))
		.filter_map(|header| {
			let uid = header.attribute("uid")?;
			Some((
				uid.to_string(),
				XrefTarget {
					href: source_id.to_string(),
					name: header.attribute("title").map(str::to_string),
				},
			))
		})
		.collect()
}

/// Cross references in the DocFX style.
///
/// - `@System.String` and `@"uid with spaces"` shorthands.
/// - `<xref:System.String>` autolinks.
/// - `[text](xref:System.String)` links.
///
/// Shorthands and autolinks become `xref` extension tokens carrying a `uid`
/// attribute. The [`Stage::Linking`] rewriter resolves them: resolved tokens
/// gain `href` and `name` attributes, resolved links get the target's href,
/// unresolved shorthands fall back to plain text and unresolved links become
/// `xref` tokens marked `unresolved` that keep the link text. Each miss is
/// reported once, so running the pass again is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct XrefExtension;

impl Extension for XrefExtension {
	fn id(&self) -> &str {
		XREF
	}

	fn install(&self, registry: &mut Registry) -> MdliteResult<()> {
		registry.register_rule(Mode::Inline, Rule::new(XREF_AUTOLINK, autolink), Priority::First)?;
		registry.register_rule(
			Mode::Inline,
			Rule::new(XREF_SHORTHAND, shorthand),
			Priority::After(XREF_AUTOLINK.to_string()),
		)?;
		registry.register_rewriter(resolver(), Priority::Last)
	}
}

fn xref_token(uid: &str) -> TokenKind {
	TokenKind::Extension(ExtensionToken::new(XREF).with_attribute("uid", uid))
}

fn is_uid_char(c: char) -> bool {
	c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '#' | '*' | ':' | '/' | '~' | '`' | '(' | ')' | ',')
}

fn shorthand(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest().strip_prefix('@')?;
	if cursor.before().is_some_and(|c| c.is_alphanumeric() || c == '@') {
		return None;
	}

	let (uid, len) = match rest.chars().next()? {
		quote @ ('"' | '\'') => {
			let end = rest[1..].find([quote, '\n'])?;
			if !rest[1 + end..].starts_with(quote) || end == 0 {
				return None;
			}
			(&rest[1..=end], end + 2)
		}
		c if c.is_alphabetic() => {
			let end = rest.find(|c: char| !is_uid_char(c)).unwrap_or(rest.len());
			let uid = rest[..end].trim_end_matches(['.', ',', ':', ')', '(', '*', '`']);
			(uid, uid.len())
		}
		_ => return None,
	};

	Some(RuleMatch::single(cursor.leaf(xref_token(uid), len + 1)))
}

fn autolink(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	let rest = cursor.rest().strip_prefix('<')?.strip_prefix(LINK_SCHEME)?;
	let end = rest.find(['>', '<', '\n', ' '])?;
	if !rest[end..].starts_with('>') || end == 0 {
		return None;
	}

	let reference = &rest[..end];
	let uid = reference.split_once('?').map_or(reference, |(uid, _)| uid);
	let len = 1 + LINK_SCHEME.len() + end + 1;
	Some(RuleMatch::single(cursor.leaf(xref_token(uid), len)))
}

fn is_unresolved_xref(kind: &TokenKind) -> bool {
	match kind {
		TokenKind::Extension(ext) => {
			&*ext.name == XREF && ext.attribute("href").is_none() && ext.attribute(UNRESOLVED).is_none()
		}
		TokenKind::Link { target, .. } => target.starts_with(LINK_SCHEME),
		_ => false,
	}
}

/// The resolution pass. It runs after the barrier because it needs the
/// symbols of every document.
pub fn resolver() -> Rewriter {
	Rewriter::new(XREF_RESOLVE, is_unresolved_xref, resolve).with_stage(Stage::Linking)
}

fn resolve(token: &Token, context: &mut RewriteContext) -> Option<Token> {
	match token.kind() {
		TokenKind::Extension(ext) => {
			let uid = ext.attribute("uid")?;

			if let Some(target) = context.symbols().get(uid) {
				let name = target.name.clone().unwrap_or_else(|| uid.to_string());
				let resolved = ext
					.clone()
					.with_attribute("href", target.href.clone())
					.with_attribute("name", name);
				return Some(token.with_kind(TokenKind::Extension(resolved)));
			}

			report_unresolved(token, uid, context);
			Some(token.with_kind(TokenKind::Text))
		}
		TokenKind::Link { target, title } => {
			let uid = target.strip_prefix(LINK_SCHEME)?;
			let uid = uid.split_once('?').map_or(uid, |(uid, _)| uid);

			let Some(resolved) = context.symbols().get(uid) else {
				report_unresolved(token, uid, context);
				let placeholder = ExtensionToken::new(XREF)
					.with_attribute("uid", uid)
					.with_attribute(UNRESOLVED, "true");
				return Some(token.with_kind(TokenKind::Extension(placeholder)));
			};

			Some(token.with_kind(TokenKind::Link {
				target: resolved.href.as_str().into(),
				title: title.clone(),
			}))
		}
		_ => None,
	}
}

fn report_unresolved(token: &Token, uid: &str, context: &mut RewriteContext) {
	warn!(uid, source_id = context.source_id(), line = token.line(), "unresolved cross reference");
	context.report(
		Diagnostic::warning(
			DiagnosticCode::UnresolvedXref,
			format!("cross reference `{uid}` has no known target"),
		)
		.with_token(token),
	);
}
