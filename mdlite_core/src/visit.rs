//! The renderer contract.
//!
//! Renderers live outside this crate. They consume the closed [`TokenKind`]
//! enum, either by walking [`Token::children`] themselves or by implementing
//! [`Visitor`] and letting [`fold`] drive a bottom-up traversal.

use std::fmt::Write;

use crate::Token;
use crate::TokenKind;

/// Bottom-up tree consumer. [`fold`] calls [`Visitor::visit`] for every
/// token after all of its children, handing over their outputs in order.
pub trait Visitor {
	type Output;

	fn visit(&mut self, token: &Token, children: Vec<Self::Output>) -> Self::Output;
}

/// Fold `root` with `visitor`.
pub fn fold<V: Visitor>(root: &Token, visitor: &mut V) -> V::Output {
	let children = root
		.children()
		.iter()
		.map(|child| fold(child, visitor))
		.collect();
	visitor.visit(root, children)
}

/// A textual dump of a token tree, one token per line, indented by depth.
///
/// ```text
/// document
///   heading level=1
///     text "Title"
/// ```
pub fn outline(root: &Token) -> String {
	fold(root, &mut Outline).join("\n")
}

struct Outline;

impl Visitor for Outline {
	type Output = Vec<String>;

	fn visit(&mut self, token: &Token, children: Vec<Vec<String>>) -> Vec<String> {
		let mut line = describe(token.kind());
		if token.is_leaf() {
			let _ = write!(line, " {:?}", token.raw());
		}

		let mut lines = vec![line];
		lines.extend(children.into_iter().flatten().map(|child| format!("  {child}")));
		lines
	}
}

fn describe(kind: &TokenKind) -> String {
	let tag = kind.tag().to_string();
	match kind {
		TokenKind::Heading { level, .. } => format!("{tag} level={level}"),
		TokenKind::List {
			ordered,
			start,
			tight,
			..
		} => {
			let mut line = format!("{tag} ordered={ordered} tight={tight}");
			if let Some(start) = start {
				let _ = write!(line, " start={start}");
			}
			line
		}
		TokenKind::ListItem { task: Some(done) } => format!("{tag} task={done}"),
		TokenKind::CodeBlock { info, .. } if !info.is_empty() => format!("{tag} info={info}"),
		TokenKind::TableRow { row } => format!("{tag} {row:?}").to_lowercase(),
		TokenKind::TableCell { alignment } => format!("{tag} {alignment:?}").to_lowercase(),
		TokenKind::LinkDefinition {
			label, destination, ..
		} => format!("{tag} [{label}] {destination}"),
		TokenKind::Link { target, .. } | TokenKind::AutoLink { target, .. } => {
			format!("{tag} {target}")
		}
		TokenKind::Image { source, .. } => format!("{tag} {source}"),
		TokenKind::LineBreak { hard: true } => format!("{tag} hard"),
		TokenKind::Extension(ext) => {
			let mut line = format!("{tag} {}", ext.name);
			for (key, value) in &ext.attributes {
				let _ = write!(line, " {key}={value}");
			}
			line
		}
		_ => tag,
	}
}
