use std::sync::Arc;

use crate::ContextUpdate;
use crate::Cursor;
use crate::ExtensionToken;
use crate::KindTag;
use crate::Layout;
use crate::MarkdownEngine;
use crate::MdliteResult;
use crate::Mode;
use crate::ParseOptions;
use crate::ParsedDocument;
use crate::Priority;
use crate::Registry;
use crate::Rule;
use crate::RuleMatch;
use crate::SymbolTable;
use crate::Token;
use crate::TokenKind;
use crate::XrefTarget;

pub fn default_engine() -> MdliteResult<MarkdownEngine> {
	MarkdownEngine::from_options(&ParseOptions::default())
}

pub fn parse(input: &str) -> MdliteResult<ParsedDocument> {
	parse_with(input, &ParseOptions::default())
}

pub fn parse_with(input: &str, options: &ParseOptions) -> MdliteResult<ParsedDocument> {
	MarkdownEngine::from_options(options)?.parse(input, options)
}

/// Tags of the children of `token`, in order.
pub fn child_tags(token: &Token) -> Vec<KindTag> {
	token.children().iter().map(Token::tag).collect()
}

/// Every token below `root` with the given tag, in document order.
pub fn find_all(root: &Token, tag: KindTag) -> Vec<Token> {
	root.descendants()
		.filter(|token| token.tag() == tag)
		.cloned()
		.collect()
}

/// The first token below `root` with the given tag.
pub fn find(root: &Token, tag: KindTag) -> Option<Token> {
	root.descendants().find(|token| token.tag() == tag).cloned()
}

/// Raw text of every leaf below `root`, in document order.
pub fn leaf_texts(root: &Token) -> Vec<String> {
	root.descendants()
		.filter(|token| token.is_leaf())
		.map(|token| token.raw().to_string())
		.collect()
}

/// An inline rule recognizing the literal `@foo` as a `mention` extension
/// token.
pub fn mention_rule() -> Rule {
	Rule::new("mention", |cursor: &mut Cursor<'_>| {
		if !cursor.rest().starts_with("@foo") {
			return None;
		}

		let kind = TokenKind::Extension(ExtensionToken::new("mention").with_attribute("user", "foo"));
		Some(RuleMatch::single(cursor.leaf(kind, 4)))
	})
}

/// An inline rule matching `ab` that tags its token with `name`.
pub fn tagging_rule(name: &'static str) -> Rule {
	Rule::new(name, move |cursor: &mut Cursor<'_>| {
		if !cursor.rest().starts_with("ab") {
			return None;
		}

		let kind = TokenKind::Extension(ExtensionToken::new(name));
		Some(RuleMatch::single(cursor.leaf(kind, 2)))
	})
}

/// Context slot written by [`marker_writer_rule`].
pub const MARKER_SLOT: &str = "marker";

/// A block rule for `%A` style lines that stores the letter in
/// [`MARKER_SLOT`].
pub fn marker_writer_rule() -> Rule {
	Rule::new("marker-writer", |cursor: &mut Cursor<'_>| {
		let line = cursor.rest().split_inclusive('\n').next()?;
		let letter = line
			.strip_prefix('%')?
			.chars()
			.next()
			.filter(char::is_ascii_alphabetic)?;

		let token = cursor.leaf(TokenKind::Extension(ExtensionToken::new("marker")), line.len());
		Some(RuleMatch::single(token).with_update(ContextUpdate::SetExtension {
			key: MARKER_SLOT.to_string(),
			value: Arc::new(letter.to_string()),
		}))
	})
}

/// A block rule for `%?` lines that records what [`MARKER_SLOT`] held when
/// it ran, as the `seen` attribute of a `marker-read` token.
pub fn marker_reader_rule() -> Rule {
	Rule::new("marker-reader", |cursor: &mut Cursor<'_>| {
		let line = cursor.rest().split_inclusive('\n').next()?;
		if line.trim_end() != "%?" {
			return None;
		}

		let seen = cursor
			.context()
			.extension::<String>(MARKER_SLOT)
			.map_or("none", String::as_str);
		let kind = TokenKind::Extension(ExtensionToken::new("marker-read").with_attribute("seen", seen));
		Some(RuleMatch::single(cursor.leaf(kind, line.len())))
	})
}

pub fn marker_engine() -> MdliteResult<MarkdownEngine> {
	let mut registry = Registry::with_defaults();
	registry.register_rule(Mode::Block, marker_writer_rule(), Priority::First)?;
	registry.register_rule(Mode::Block, marker_reader_rule(), Priority::First)?;
	registry.build()
}

/// An inline rule that wraps everything after a leading `^` in a `nest`
/// token, tokenizing the rest one inline level deeper.
pub fn caret_nesting_rule() -> Rule {
	Rule::new("caret-nest", |cursor: &mut Cursor<'_>| {
		let len = cursor.rest().len();
		if !cursor.rest().starts_with('^') || len < 2 {
			return None;
		}

		let children = cursor.inline(1..len);
		let kind = TokenKind::Extension(ExtensionToken::new("nest"));
		let token = cursor.node(kind, 0..len, Layout::Framed { open: 1, close: 0 }, children);
		Some(RuleMatch::single(token))
	})
}

pub fn symbols() -> Arc<SymbolTable> {
	Arc::new(SymbolTable::from_iter([
		(
			"System.String".to_string(),
			XrefTarget {
				href: "https://learn.microsoft.com/dotnet/api/system.string".to_string(),
				name: Some("String".to_string()),
			},
		),
		(
			"guide".to_string(),
			XrefTarget {
				href: "docs/guide.md".to_string(),
				name: None,
			},
		),
	]))
}

/// A document exercising most of the default grammar.
pub const KITCHEN_SINK: &str = r#"# Heading with *emphasis*

Setext heading
==============

A paragraph with **strong**, `code`, [a link](https://example.com "title"),
![an image](img.png), <https://auto.link>, and a hard break\
on the next line. Escaped \*stars\* and <span>inline html</span>.

> A quote
lazily continued
> > nested quote

- item one
- item two
  continued

1. first

2. second

- [x] done
- [ ] todo

```rust
fn main() {}
```

    indented code

***

<div>
block html
</div>

[ref]: https://example.com/ref "Reference"

Use [the reference][ref] or [ref].

| Left | Center | Right |
| :--- | :----: | ----: |
| a    | b      | c     |

~~struck~~ and www.example.com
"#;
