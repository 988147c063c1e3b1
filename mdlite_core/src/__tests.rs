use std::sync::Arc;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::rules::ids;
use crate::visit::outline;

#[rstest]
#[case::empty("")]
#[case::plain("plain text")]
#[case::kitchen_sink(KITCHEN_SINK)]
#[case::quote_with_blank("> a\n>\n> b\n")]
#[case::loose_item("- a\n\n  b\n- c\n")]
#[case::deep_quote("> > > > x\n")]
#[case::thematic_break("***")]
#[case::unclosed_emphasis("*unclosed")]
#[case::unbalanced_delimiters("**a *b c")]
#[case::broken_link("[broken](")]
#[case::unclosed_html("<div")]
#[case::unclosed_fence("```\nunclosed")]
#[case::minimal_table("| a |\n| - |\n")]
#[case::tab_indent("\t- tab\n")]
#[case::crlf("a\r\nb\r\n\r\n> c\r\n")]
#[case::ordered_paren("1) x\n2) y")]
#[case::bare_hash("#")]
#[case::closed_atx("###### h ######\n")]
#[case::unicode("emoji 😀 *ü* «quoted»\n")]
#[case::lone_backslash("\\")]
#[case::lone_backtick("`")]
#[case::trailing_spaces("line   \nnext  ")]
#[case::nested_list("- a\n  - b\n    - c\n")]
fn parsed_document_reconstructs_input(#[case] input: &str) -> MdliteResult<()> {
	let document = parse(input)?;

	assert_eq!(document.root.reconstruct(), input);
	assert!(document.root.check_coverage());
	assert_eq!(document.root.raw(), input);

	Ok(())
}

#[test]
fn leaves_keep_every_byte_outside_delimiters() -> MdliteResult<()> {
	let document = parse("Some *text* with `code`.")?;

	assert_eq!(leaf_texts(&document.root).concat(), "Some text with `code`.");

	Ok(())
}

#[test]
fn blockquote_holds_one_paragraph_with_stripped_lines() -> MdliteResult<()> {
	let document = parse("> hello\n> world")?;
	let root = &document.root;

	assert_eq!(child_tags(root), vec![KindTag::Blockquote]);
	let quote = &root.children()[0];
	assert_eq!(child_tags(quote), vec![KindTag::Paragraph]);
	assert_eq!(quote.children()[0].raw(), "hello\nworld");
	assert_eq!(root.reconstruct(), "> hello\n> world");

	Ok(())
}

#[test]
fn triple_delimiters_nest_emphasis_inside_strong() -> MdliteResult<()> {
	let document = parse("***x***")?;
	let paragraph = &document.root.children()[0];

	assert_eq!(child_tags(paragraph), vec![KindTag::Strong]);
	let strong = &paragraph.children()[0];
	assert_eq!(child_tags(strong), vec![KindTag::Emphasis]);
	let emphasis = &strong.children()[0];
	assert_eq!(child_tags(emphasis), vec![KindTag::Text]);
	assert_eq!(emphasis.children()[0].raw(), "x");

	Ok(())
}

#[test]
fn registered_inline_rule_splits_text_and_unregistering_restores_it() -> MdliteResult<()> {
	let options = ParseOptions::default();
	let mut registry = Registry::with_defaults();
	registry.register_rule(Mode::Inline, mention_rule(), Priority::Before(ids::TEXT.to_string()))?;

	let engine = registry.clone().build()?;
	let document = engine.parse("see @foo here", &options)?;
	let paragraph = &document.root.children()[0];
	let raws: Vec<&str> = paragraph.children().iter().map(Token::raw).collect();

	assert_eq!(raws, vec!["see ", "@foo", " here"]);
	assert_eq!(
		child_tags(paragraph),
		vec![KindTag::Text, KindTag::Extension, KindTag::Text]
	);
	assert!(paragraph.children()[1].kind().extension("mention").is_some());

	registry.unregister_rule(Mode::Inline, "mention")?;
	let engine = registry.build()?;
	let document = engine.parse("see @foo here", &options)?;
	let paragraph = &document.root.children()[0];

	assert_eq!(child_tags(paragraph), vec![KindTag::Text]);
	assert_eq!(paragraph.children()[0].raw(), "see @foo here");

	Ok(())
}

#[test]
fn unresolved_xref_becomes_text_and_shares_siblings() -> MdliteResult<()> {
	let options = ParseOptions::default().with_extension(XREF);
	let engine = MarkdownEngine::from_options(&options)?;
	let document = engine.parse("Unknown @Missing.Type here.\n\nSecond paragraph.\n", &options)?;
	let before = &document.root;

	let mut context = RewriteContext::new("doc.md");
	let after = engine.rewrite(before, Stage::Linking, &mut context)?;

	assert_eq!(context.diagnostics().len(), 1);
	assert_eq!(context.diagnostics().count(&DiagnosticCode::UnresolvedXref), 1);
	assert_eq!(context.diagnostics()[0].line, Some(1));

	assert!(!Token::ptr_eq(before, &after));
	assert!(Token::ptr_eq(&before.children()[1], &after.children()[1]));
	assert!(Token::ptr_eq(&before.children()[2], &after.children()[2]));

	let old = &before.children()[0];
	let new = &after.children()[0];
	assert!(Token::ptr_eq(&old.children()[0], &new.children()[0]));
	assert!(Token::ptr_eq(&old.children()[2], &new.children()[2]));
	assert_eq!(new.children()[1].kind(), &TokenKind::Text);
	assert_eq!(new.children()[1].raw(), "@Missing.Type");
	assert_eq!(after.reconstruct(), before.reconstruct());

	Ok(())
}

#[rstest]
#[case::both_last(Priority::Last, "first")]
#[case::second_before_first(Priority::Before("first".to_string()), "second")]
#[case::second_first(Priority::First, "second")]
fn first_matching_rule_in_priority_order_wins(
	#[case] second: Priority,
	#[case] expected: &str,
) -> MdliteResult<()> {
	let mut registry = Registry::with_defaults();
	registry.register_rule(Mode::Inline, tagging_rule("first"), Priority::Last)?;
	registry.register_rule(Mode::Inline, tagging_rule("second"), second)?;
	let engine = registry.build()?;

	for _ in 0..3 {
		let document = engine.parse("ab ab\n", &ParseOptions::default())?;
		let names: Vec<String> = find_all(&document.root, KindTag::Extension)
			.iter()
			.filter_map(|token| match token.kind() {
				TokenKind::Extension(ext) => Some(ext.name.to_string()),
				_ => None,
			})
			.collect();

		assert_eq!(names, vec![expected.to_string(), expected.to_string()]);
	}

	Ok(())
}

#[test]
fn last_priority_keeps_fallback_at_the_end() -> MdliteResult<()> {
	let mut registry = Registry::with_defaults();
	registry.register_rule(Mode::Inline, tagging_rule("first"), Priority::Last)?;
	registry.register_rule(Mode::Inline, tagging_rule("second"), Priority::Last)?;

	let rule_ids = registry.rules(Mode::Inline).ids();
	assert_eq!(
		rule_ids[rule_ids.len() - 3..].to_vec(),
		vec!["first", "second", ids::TEXT]
	);
	assert_eq!(
		registry.rules(Mode::Inline).fallback().map(Rule::id),
		Some(ids::TEXT)
	);

	Ok(())
}

#[rstest]
#[case::atx("# h\n\ntext\n", vec![KindTag::Heading, KindTag::BlankLine, KindTag::Paragraph])]
#[case::fenced("```\ncode\n```\n", vec![KindTag::CodeBlock])]
#[case::indented("    code\n", vec![KindTag::CodeBlock])]
#[case::thematic_break("---\n", vec![KindTag::ThematicBreak])]
#[case::blockquote("> q\n", vec![KindTag::Blockquote])]
#[case::list("- a\n- b\n", vec![KindTag::List])]
#[case::html("<div>\nx\n</div>\n", vec![KindTag::HtmlBlock])]
#[case::definition("[a]: /u\n", vec![KindTag::LinkDefinition])]
#[case::table("| a |\n| - |\n", vec![KindTag::Table])]
#[case::setext("t\n===\n", vec![KindTag::Heading])]
#[case::paragraph_then_list("text\n- item\n", vec![KindTag::Paragraph, KindTag::List])]
fn block_structure(#[case] input: &str, #[case] expected: Vec<KindTag>) -> MdliteResult<()> {
	let document = parse(input)?;
	assert_eq!(child_tags(&document.root), expected);

	Ok(())
}

#[rstest]
#[case::emphasis("a *b* c", vec![KindTag::Text, KindTag::Emphasis, KindTag::Text])]
#[case::strong("**s**", vec![KindTag::Strong])]
#[case::underscore_strong("__s__", vec![KindTag::Strong])]
#[case::intraword_underscore("snake_case_name", vec![KindTag::Text])]
#[case::code_span("`c`", vec![KindTag::CodeSpan])]
#[case::escape("\\*", vec![KindTag::Escape])]
#[case::autolink("<https://x.y>", vec![KindTag::AutoLink])]
#[case::email("<me@example.com>", vec![KindTag::AutoLink])]
#[case::raw_html("a <b>x</b>", vec![KindTag::Text, KindTag::RawHtml, KindTag::Text, KindTag::RawHtml])]
#[case::link("[l](u)", vec![KindTag::Link])]
#[case::image("![i](s)", vec![KindTag::Image])]
#[case::strikethrough("~~s~~", vec![KindTag::Strikethrough])]
#[case::hard_break("a  \nb", vec![KindTag::Text, KindTag::LineBreak, KindTag::Text])]
#[case::soft_break("a\nb", vec![KindTag::Text, KindTag::LineBreak, KindTag::Text])]
#[case::bare_autolink("see https://x.com.", vec![KindTag::Text, KindTag::AutoLink, KindTag::Text])]
#[case::unmatched("**a *b c", vec![KindTag::Text])]
fn inline_structure(#[case] input: &str, #[case] expected: Vec<KindTag>) -> MdliteResult<()> {
	let document = parse(input)?;
	let paragraph = &document.root.children()[0];

	assert_eq!(paragraph.tag(), KindTag::Paragraph);
	assert_eq!(child_tags(paragraph), expected);

	Ok(())
}

#[rstest]
#[case::strikethrough("~~s~~\n")]
#[case::bare_autolink("see https://x.com\n")]
fn gfm_inline_syntax_is_text_without_gfm(#[case] input: &str) -> MdliteResult<()> {
	let document = parse_with(input, &ParseOptions::default().with_gfm(false))?;
	let paragraph = &document.root.children()[0];

	assert_eq!(child_tags(paragraph), vec![KindTag::Text]);

	Ok(())
}

#[test]
fn tables_need_gfm() -> MdliteResult<()> {
	let input = "| a |\n| - |\n";
	let without = parse_with(input, &ParseOptions::default().with_gfm(false))?;

	assert_eq!(child_tags(&without.root), vec![KindTag::Paragraph]);

	Ok(())
}

#[test]
fn table_rows_cells_and_alignments() -> MdliteResult<()> {
	let input = "| Left | Center | Right |\n| :--- | :----: | ----: |\n| a | *b* | c |\n";
	let document = parse(input)?;
	let table = &document.root.children()[0];

	let TokenKind::Table { alignments } = table.kind() else {
		panic!("expected a table, found {:?}", table.kind());
	};
	assert_eq!(
		alignments.to_vec(),
		vec![Alignment::Left, Alignment::Center, Alignment::Right]
	);
	assert_eq!(
		table
			.children()
			.iter()
			.map(|row| row.kind().clone())
			.collect::<Vec<_>>(),
		vec![
			TokenKind::TableRow {
				row: RowKind::Header
			},
			TokenKind::TableRow {
				row: RowKind::Delimiter
			},
			TokenKind::TableRow { row: RowKind::Body },
		]
	);

	let body = &table.children()[2];
	assert_eq!(body.children().len(), 3);
	assert_eq!(body.children()[1].inner(), Some("*b*"));
	assert_eq!(child_tags(&body.children()[1]), vec![KindTag::Emphasis]);
	assert_eq!(table.reconstruct(), input);

	Ok(())
}

#[rstest]
#[case::tight("- a\n- b\n", true, None)]
#[case::loose_between_items("- a\n\n- b\n", false, None)]
#[case::loose_inside_item("- a\n\n  b\n", false, None)]
#[case::ordered("3. x\n4. y\n", true, Some(3))]
fn list_tightness_and_start(
	#[case] input: &str,
	#[case] tight: bool,
	#[case] start: Option<u64>,
) -> MdliteResult<()> {
	let document = parse(input)?;
	let list = &document.root.children()[0];

	let TokenKind::List {
		tight: actual_tight,
		start: actual_start,
		..
	} = list.kind()
	else {
		panic!("expected a list, found {:?}", list.kind());
	};
	assert_eq!(*actual_tight, tight);
	assert_eq!(*actual_start, start);

	Ok(())
}

#[test]
fn task_list_items() -> MdliteResult<()> {
	let document = parse("- [x] done\n- [ ] todo\n- plain\n")?;
	let tasks: Vec<Option<bool>> = find_all(&document.root, KindTag::ListItem)
		.iter()
		.map(|item| match item.kind() {
			TokenKind::ListItem { task } => *task,
			_ => None,
		})
		.collect();

	assert_eq!(tasks, vec![Some(true), Some(false), None]);

	Ok(())
}

#[test]
fn nested_list_items_recurse() -> MdliteResult<()> {
	let document = parse("- a\n  - b\n    - c\n")?;
	let lists = find_all(&document.root, KindTag::List);

	assert_eq!(lists.len(), 3);
	assert_eq!(lists[2].context().list_depth(), 2);
	assert_eq!(lists[2].context().depth(), 2);

	Ok(())
}

#[test]
fn headings_code_blocks_and_breaks() -> MdliteResult<()> {
	let document = parse("### Three\n\nSetext\n---\n\n```rust title\nfn main() {}\n```\n")?;
	let kinds: Vec<TokenKind> = document
		.root
		.children()
		.iter()
		.filter(|token| token.tag() != KindTag::BlankLine)
		.map(|token| token.kind().clone())
		.collect();

	assert_eq!(
		kinds,
		vec![
			TokenKind::Heading {
				level: 3,
				setext: false
			},
			TokenKind::Heading {
				level: 2,
				setext: true
			},
			TokenKind::CodeBlock {
				fenced: true,
				info: "rust title".into()
			},
		]
	);

	Ok(())
}

#[test]
fn reference_links_resolve_with_the_final_context() -> MdliteResult<()> {
	let document = parse("Use [the docs][ref], [ref][] or [ref].\n\n[ref]: /docs \"Docs\"\n")?;
	let links = find_all(&document.root, KindTag::Link);

	assert_eq!(links.len(), 3);
	for link in &links {
		assert_eq!(
			link.kind(),
			&TokenKind::Link {
				target: "/docs".into(),
				title: Some("Docs".into()),
			}
		);
	}
	assert_eq!(links[0].plain_text(), "the docs");

	Ok(())
}

#[test]
fn definitions_inside_containers_reach_the_document() -> MdliteResult<()> {
	let document = parse("> [a]: /x\n\n[a]\n")?;
	let link = find(&document.root, KindTag::Link);

	assert_eq!(
		link.map(|token| token.kind().clone()),
		Some(TokenKind::Link {
			target: "/x".into(),
			title: None,
		})
	);
	assert!(document.context.link("A").is_some());

	Ok(())
}

#[test]
fn tokens_keep_the_context_snapshot_they_were_built_with() -> MdliteResult<()> {
	let document = parse("para\n\n[a]: /x\n")?;
	let paragraph = &document.root.children()[0];

	assert!(paragraph.context().link("a").is_none());
	assert!(document.context.link("a").is_some());

	Ok(())
}

#[test]
fn duplicate_link_definitions_keep_the_first() -> MdliteResult<()> {
	let document = parse("[a]: /first\n[a]: /second\n\n[a]\n")?;
	let link = find(&document.root, KindTag::Link);

	assert_eq!(
		link.map(|token| token.kind().clone()),
		Some(TokenKind::Link {
			target: "/first".into(),
			title: None,
		})
	);
	assert_eq!(
		document
			.diagnostics
			.count(&DiagnosticCode::DuplicateLinkDefinition),
		1
	);
	assert_eq!(document.diagnostics[0].severity, Severity::Info);
	assert_eq!(document.diagnostics[0].line, Some(2));

	Ok(())
}

#[test]
fn duplicate_link_definitions_across_list_items_are_reported() -> MdliteResult<()> {
	let document = parse("- [x]: /a\n- [x]: /b\n\n[x]\n")?;

	assert_eq!(
		document
			.diagnostics
			.count(&DiagnosticCode::DuplicateLinkDefinition),
		1
	);
	assert_eq!(document.diagnostics[0].line, Some(2));
	assert_eq!(
		find(&document.root, KindTag::Link).map(|token| token.kind().clone()),
		Some(TokenKind::Link {
			target: "/a".into(),
			title: None,
		})
	);

	Ok(())
}

#[rstest]
#[case::top_level("%A\n%B\n%?\n")]
#[case::inside_blockquote("> %A\n\n%?\n")]
#[case::list_item_then_blockquote("- %A\n\n> %B\n\n%?\n")]
fn extension_slots_keep_the_first_write(#[case] input: &str) -> MdliteResult<()> {
	let document = marker_engine()?.parse(input, &ParseOptions::default())?;

	assert_eq!(
		document
			.context
			.extension::<String>(MARKER_SLOT)
			.map(String::as_str),
		Some("A")
	);

	let seen: Vec<String> = find_all(&document.root, KindTag::Extension)
		.iter()
		.filter_map(|token| token.kind().extension("marker-read"))
		.filter_map(|ext| ext.attribute("seen").map(str::to_string))
		.collect();
	assert_eq!(seen, vec!["A".to_string()]);
	assert_eq!(document.root.reconstruct(), input);

	Ok(())
}

#[test]
fn context_updates_never_retract_state() {
	let mut context = Context::new(ParseOptions::default());
	let marker = |letter: &str| ContextUpdate::SetExtension {
		key: MARKER_SLOT.to_string(),
		value: Arc::new(letter.to_string()),
	};

	assert!(context.apply(&marker("A")));
	assert!(!context.apply(&marker("B")));
	assert_eq!(
		context.extension::<String>(MARKER_SLOT).map(String::as_str),
		Some("A")
	);
	assert!(context.extension::<usize>(MARKER_SLOT).is_none());
}

#[test]
#[traced_test]
fn nesting_beyond_the_limit_is_truncated() -> MdliteResult<()> {
	let input = "> > > deep\n";
	let options = ParseOptions::default().with_max_nesting_depth(2);
	let document = parse_with(input, &options)?;

	assert_eq!(document.root.reconstruct(), input);
	assert_eq!(document.diagnostics.count(&DiagnosticCode::NestingLimit), 1);
	assert_eq!(find_all(&document.root, KindTag::Blockquote).len(), 3);

	let paragraph = find(&document.root, KindTag::Paragraph);
	assert_eq!(paragraph.map(|token| token.raw().to_string()), Some("deep\n".to_string()));
	assert!(logs_contain("container nesting limit reached"));

	Ok(())
}

#[test]
#[traced_test]
fn inline_recursion_beyond_the_limit_is_reported() -> MdliteResult<()> {
	let mut registry = Registry::with_defaults();
	registry.register_rule(Mode::Inline, caret_nesting_rule(), Priority::First)?;
	let engine = registry.build()?;

	let input = format!("{}x", "^".repeat(80));
	let document = engine.parse(&input, &ParseOptions::default())?;

	assert_eq!(document.root.reconstruct(), input);
	assert_eq!(document.diagnostics.count(&DiagnosticCode::NestingLimit), 1);
	assert_eq!(document.diagnostics[0].line, Some(1));
	assert!(logs_contain("inline nesting limit reached"));

	Ok(())
}

#[test]
fn tokenize_runs_a_single_rule_set() -> MdliteResult<()> {
	let engine = default_engine()?;
	let context = Arc::new(Context::new(ParseOptions::default()));
	let tokenized = engine.tokenize("a *b*", Mode::Inline, context)?;

	assert_eq!(
		tokenized.tokens.iter().map(Token::tag).collect::<Vec<_>>(),
		vec![KindTag::Text, KindTag::Emphasis]
	);
	assert_eq!(tokenized.tokens[0].raw(), "a ");

	let context = Arc::new(Context::new(ParseOptions::default()));
	let tokenized = engine.tokenize("[x]: /y\n", Mode::Block, context)?;
	assert_eq!(tokenized.updates.len(), 1);
	assert!(tokenized.context.link("x").is_some());

	Ok(())
}

#[test]
fn rewriting_without_matching_targets_returns_the_same_tree() -> MdliteResult<()> {
	let document = parse(KITCHEN_SINK)?;
	let engine = RewriteEngine::new().with(Rewriter::for_tags(
		"never",
		&[KindTag::Extension],
		|token: &Token, _: &mut RewriteContext| Some(token.with_kind(TokenKind::Text)),
	));

	let rewritten = engine.rewrite(&document.root, &mut RewriteContext::default())?;
	assert!(Token::ptr_eq(&rewritten, &document.root));

	Ok(())
}

#[test]
fn rewriting_shares_untouched_subtrees() -> MdliteResult<()> {
	let document = parse("*a* b\n\nother\n")?;
	let engine = RewriteEngine::new().with(Rewriter::for_tags(
		"embolden",
		&[KindTag::Emphasis],
		|token: &Token, _: &mut RewriteContext| Some(token.with_kind(TokenKind::Strong)),
	));

	let rewritten = engine.rewrite(&document.root, &mut RewriteContext::default())?;

	assert!(!Token::ptr_eq(&rewritten, &document.root));
	assert_eq!(
		child_tags(&rewritten.children()[0]),
		vec![KindTag::Strong, KindTag::Text]
	);
	assert!(Token::ptr_eq(
		&rewritten.children()[2],
		&document.root.children()[2]
	));
	assert!(Token::ptr_eq(
		&rewritten.children()[0].children()[1],
		&document.root.children()[0].children()[1]
	));

	let again = engine.rewrite(&rewritten, &mut RewriteContext::default())?;
	assert!(Token::ptr_eq(&again, &rewritten));

	Ok(())
}

#[test]
fn identical_copies_from_a_rewriter_are_rejected() -> MdliteResult<()> {
	let document = parse("hello\n")?;
	let engine = RewriteEngine::new().with(Rewriter::for_tags(
		"copy",
		&[KindTag::Text],
		|token: &Token, _: &mut RewriteContext| Some(token.with_kind(TokenKind::Text)),
	));

	let result = engine.rewrite(&document.root, &mut RewriteContext::default());
	assert!(matches!(
		result,
		Err(MdliteError::RedundantRewrite { rewriter }) if rewriter == "copy"
	));

	Ok(())
}

#[test]
fn rewriter_order_follows_priority() -> MdliteResult<()> {
	let noop = |_: &Token, _: &mut RewriteContext| None;
	let mut engine = RewriteEngine::new();
	engine.insert(Rewriter::for_tags("b", &[KindTag::Text], noop), &Priority::Last)?;
	engine.insert(Rewriter::for_tags("a", &[KindTag::Text], noop), &Priority::First)?;
	engine.insert(
		Rewriter::for_tags("c", &[KindTag::Text], noop),
		&Priority::After("b".to_string()),
	)?;

	assert_eq!(engine.ids(), vec!["a", "b", "c"]);
	assert!(matches!(
		engine.insert(Rewriter::for_tags("a", &[KindTag::Text], noop), &Priority::Last),
		Err(MdliteError::DuplicateRewriter(id)) if id == "a"
	));

	engine.remove("b")?;
	assert_eq!(engine.ids(), vec!["a", "c"]);

	Ok(())
}

fn rejecting_rule(
	id: &'static str,
	matcher: fn(&mut Cursor<'_>) -> Option<RuleMatch>,
) -> MdliteResult<MarkdownEngine> {
	let mut registry = Registry::with_defaults();
	registry.register_rule(Mode::Inline, Rule::new(id, matcher), Priority::First)?;
	registry.build()
}

#[test]
fn empty_matches_abort_the_parse() -> MdliteResult<()> {
	let engine = rejecting_rule("empty", |cursor| {
		cursor.rest().starts_with('@').then(|| RuleMatch::new(0, Vec::new()))
	})?;

	let result = engine.parse("a @b", &ParseOptions::default());
	assert!(matches!(
		result,
		Err(MdliteError::EmptyMatch { rule, offset: 2 }) if rule == "empty"
	));

	Ok(())
}

#[test]
fn tokens_that_do_not_tile_the_match_abort_the_parse() -> MdliteResult<()> {
	let engine = rejecting_rule("gap", |cursor| {
		cursor
			.rest()
			.starts_with("@@")
			.then(|| RuleMatch::new(2, vec![cursor.leaf(TokenKind::Text, 1)]))
	})?;

	let result = engine.parse("x @@", &ParseOptions::default());
	assert!(matches!(
		result,
		Err(MdliteError::CoverageViolation { rule, .. }) if rule == "gap"
	));

	Ok(())
}

#[test]
fn overlong_matches_abort_the_parse() -> MdliteResult<()> {
	let engine = rejecting_rule("greedy", |cursor| {
		cursor
			.rest()
			.starts_with('@')
			.then(|| RuleMatch::new(100, vec![cursor.leaf(TokenKind::Text, 1)]))
	})?;

	let result = engine.parse("x @", &ParseOptions::default());
	assert!(matches!(
		result,
		Err(MdliteError::MatchOverrun {
			consumed: 100,
			remaining: 1,
			..
		})
	));

	Ok(())
}

#[test]
fn a_fallback_that_never_matches_fails_loudly() -> MdliteResult<()> {
	let mut registry = Registry::new();
	registry.register_rule(
		Mode::Block,
		Rule::fallback("never", |_: &mut Cursor<'_>| None),
		Priority::Last,
	)?;
	registry.register_rule(
		Mode::Inline,
		Rule::fallback("never", |_: &mut Cursor<'_>| None),
		Priority::Last,
	)?;
	let engine = registry.build()?;

	let context = Arc::new(Context::new(ParseOptions::default()));
	let result = engine.tokenize("x", Mode::Block, context);
	assert!(matches!(
		result,
		Err(MdliteError::NoRuleMatched {
			mode: Mode::Block,
			offset: 0
		})
	));

	Ok(())
}

#[test]
fn registry_contract_errors() -> MdliteResult<()> {
	assert!(matches!(
		Registry::new().build(),
		Err(MdliteError::MissingFallback(Mode::Block))
	));

	let mut registry = Registry::with_defaults();
	let never = |_: &mut Cursor<'_>| None;

	assert!(matches!(
		registry.register_rule(Mode::Inline, Rule::new(ids::TEXT, never), Priority::Last),
		Err(MdliteError::DuplicateRule { mode: Mode::Inline, rule }) if rule == ids::TEXT
	));
	assert!(matches!(
		registry.register_rule(
			Mode::Inline,
			Rule::new("orphan", never),
			Priority::Before("missing".to_string())
		),
		Err(MdliteError::UnknownRule(id)) if id == "missing"
	));
	assert!(matches!(
		registry.register_rule(Mode::Block, Rule::fallback("second", never), Priority::Last),
		Err(MdliteError::FallbackExists { existing, .. }) if existing == ids::PARAGRAPH
	));
	assert!(matches!(
		registry.unregister_rule(Mode::Block, "missing"),
		Err(MdliteError::UnknownRule(_))
	));
	assert!(matches!(
		registry.register_rewriter(
			Rewriter::for_tags("orphan", &[KindTag::Text], |_: &Token, _: &mut RewriteContext| None),
			Priority::After("missing".to_string())
		),
		Err(MdliteError::UnknownRewriter(id)) if id == "missing"
	));
	assert!(matches!(
		registry.unregister_rewriter("missing"),
		Err(MdliteError::UnknownRewriter(id)) if id == "missing"
	));
	assert!(matches!(
		MarkdownEngine::from_options(&ParseOptions::default().with_extension("nope")),
		Err(MdliteError::UnknownExtension(id)) if id == "nope"
	));

	Ok(())
}

#[test]
fn extensions_install_once() -> MdliteResult<()> {
	let mut registry = Registry::with_defaults();
	registry.install(&XrefExtension)?;
	registry.install(&XrefExtension)?;

	assert_eq!(registry.extensions().to_vec(), vec![XREF.to_string()]);
	assert_eq!(
		registry.rules(Mode::Inline).ids()[..2].to_vec(),
		vec![XREF_AUTOLINK, XREF_SHORTHAND]
	);
	assert_eq!(registry.rewriters().ids(), vec![XREF_RESOLVE]);

	Ok(())
}

#[test]
fn reinstalling_restores_unregistered_extension_rules() -> MdliteResult<()> {
	let mut registry = Registry::with_defaults();
	registry.install(&XrefExtension)?;
	registry.unregister_rule(Mode::Inline, XREF_SHORTHAND)?;
	registry.install(&XrefExtension)?;

	assert_eq!(registry.extensions().to_vec(), vec![XREF.to_string()]);
	assert_eq!(
		registry.rules(Mode::Inline).ids()[..2].to_vec(),
		vec![XREF_AUTOLINK, XREF_SHORTHAND]
	);
	assert_eq!(registry.rewriters().ids(), vec![XREF_RESOLVE]);

	let document = registry.build()?.parse("see @guide", &ParseOptions::default())?;
	assert!(
		find(&document.root, KindTag::Extension)
			.is_some_and(|token| token.kind().extension(XREF).is_some())
	);

	Ok(())
}

#[test]
fn engines_are_shareable_across_threads() {
	fn assert_send_sync<T: Send + Sync>() {}
	assert_send_sync::<MarkdownEngine>();
	assert_send_sync::<Token>();
	assert_send_sync::<ParsedDocument>();
}

#[test]
fn xref_shorthand_autolink_and_links_resolve() -> MdliteResult<()> {
	let options = ParseOptions::default().with_extension(XREF);
	let engine = MarkdownEngine::from_options(&options)?;
	let input = "See @System.String, <xref:guide> and [docs](xref:guide).\n";
	let document = engine.process(input, &options, &symbols())?;

	let resolved: Vec<(String, String)> = find_all(&document.root, KindTag::Extension)
		.iter()
		.filter_map(|token| token.kind().extension(XREF))
		.map(|ext| {
			(
				ext.attribute("href").unwrap_or_default().to_string(),
				ext.attribute("name").unwrap_or_default().to_string(),
			)
		})
		.collect();

	assert_eq!(
		resolved,
		vec![
			(
				"https://learn.microsoft.com/dotnet/api/system.string".to_string(),
				"String".to_string()
			),
			("docs/guide.md".to_string(), "guide".to_string()),
		]
	);
	assert_eq!(
		find(&document.root, KindTag::Link).map(|token| token.kind().clone()),
		Some(TokenKind::Link {
			target: "docs/guide.md".into(),
			title: None,
		})
	);
	assert!(document.diagnostics.is_empty());
	assert_eq!(document.root.reconstruct(), input);

	Ok(())
}

#[test]
fn unresolved_xref_links_are_reported_once() -> MdliteResult<()> {
	let options = ParseOptions::default().with_extension(XREF);
	let engine = MarkdownEngine::from_options(&options)?;
	let input = "Read [the guide](xref:missing).\n";
	let document = engine.process(input, &options, &symbols())?;

	assert_eq!(document.diagnostics.count(&DiagnosticCode::UnresolvedXref), 1);
	assert!(find(&document.root, KindTag::Link).is_none());

	let placeholder = find(&document.root, KindTag::Extension);
	let ext = placeholder
		.as_ref()
		.and_then(|token| token.kind().extension(XREF));
	assert_eq!(ext.and_then(|ext| ext.attribute("uid")), Some("missing"));
	assert_eq!(ext.and_then(|ext| ext.attribute("href")), None);
	assert_eq!(document.root.reconstruct(), input);

	let mut context = RewriteContext::new("doc.md").with_symbols(symbols());
	let again = engine.rewrite(&document.root, Stage::Linking, &mut context)?;

	assert!(Token::ptr_eq(&again, &document.root));
	assert!(context.diagnostics().is_empty());

	Ok(())
}

#[rstest]
#[case::quoted("@\"uid with spaces\" next", "uid with spaces")]
#[case::trailing_punctuation("see @Foo.Bar.", "Foo.Bar")]
#[case::autolink_query("<xref:Foo?displayProperty=name>", "Foo")]
fn xref_uids(#[case] input: &str, #[case] uid: &str) -> MdliteResult<()> {
	let document = parse_with(input, &ParseOptions::default().with_extension(XREF))?;
	let ext = find(&document.root, KindTag::Extension);

	assert_eq!(
		ext.as_ref()
			.and_then(|token| token.kind().extension(XREF))
			.and_then(|ext| ext.attribute("uid")),
		Some(uid)
	);

	Ok(())
}

#[test]
fn email_addresses_are_not_xrefs() -> MdliteResult<()> {
	let document = parse_with("mail me@example.com", &ParseOptions::default().with_extension(XREF))?;
	assert!(find(&document.root, KindTag::Extension).is_none());

	Ok(())
}

#[test]
fn front_matter_becomes_a_yaml_header() -> MdliteResult<()> {
	let input = "---\ntitle: Guide\nuid: guide\ndraft: false\ntags: [a, b]\n---\n# Body\n";
	let document = parse_with(input, &ParseOptions::default().with_extension(YAML_HEADER))?;
	let header = &document.root.children()[0];
	let ext = header.kind().extension(YAML_HEADER);

	assert_eq!(ext.and_then(|ext| ext.attribute("title")), Some("Guide"));
	assert_eq!(ext.and_then(|ext| ext.attribute("uid")), Some("guide"));
	assert_eq!(ext.and_then(|ext| ext.attribute("draft")), Some("false"));
	assert_eq!(ext.and_then(|ext| ext.attribute("tags")), None);
	assert_eq!(header.raw(), "---\ntitle: Guide\nuid: guide\ndraft: false\ntags: [a, b]\n---\n");
	assert_eq!(child_tags(&document.root)[1], KindTag::Heading);
	assert_eq!(
		exported_symbols(&document.root, "guide.md"),
		vec![(
			"guide".to_string(),
			XrefTarget {
				href: "guide.md".to_string(),
				name: Some("Guide".to_string()),
			}
		)]
	);

	Ok(())
}

#[rstest]
#[case::invalid_yaml("---\nkey: [unclosed\n---\n")]
#[case::not_a_mapping("---\n- a\n- b\n---\n")]
fn malformed_front_matter_is_reported(#[case] input: &str) -> MdliteResult<()> {
	let document = parse_with(input, &ParseOptions::default().with_extension(YAML_HEADER))?;

	assert_eq!(child_tags(&document.root), vec![KindTag::Extension]);
	assert_eq!(document.diagnostics.count(&DiagnosticCode::InvalidFrontMatter), 1);

	Ok(())
}

#[test]
fn front_matter_only_at_the_start() -> MdliteResult<()> {
	let options = ParseOptions::default().with_extension(YAML_HEADER);
	let document = parse_with("text\n\n---\na: b\n---\n", &options)?;

	assert!(find(&document.root, KindTag::Extension).is_none());

	let without = parse("---\ntitle: x\n---\n")?;
	assert_eq!(child_tags(&without.root)[0], KindTag::ThematicBreak);

	Ok(())
}

#[test]
fn sanitize_neutralizes_html_and_script_links() -> MdliteResult<()> {
	let options = ParseOptions::default().with_extension(SANITIZE);
	let engine = MarkdownEngine::from_options(&options)?;
	let input = "Click <b>here</b> [x](javascript:alert(1)) ![i](data:image/png;base64,AA) \
	             ![j](data:text/html,x)\n\n<div>\nhtml\n</div>\n";
	let document = engine.process(input, &options, &Arc::new(SymbolTable::new()))?;
	let root = &document.root;

	assert!(find(root, KindTag::RawHtml).is_none());
	assert!(find(root, KindTag::HtmlBlock).is_none());
	assert_eq!(
		find(root, KindTag::Link).map(|token| token.kind().clone()),
		Some(TokenKind::Link {
			target: "#".into(),
			title: None,
		})
	);

	let sources: Vec<TokenKind> = find_all(root, KindTag::Image)
		.iter()
		.map(|token| token.kind().clone())
		.collect();
	assert_eq!(
		sources,
		vec![
			TokenKind::Image {
				source: "data:image/png;base64,AA".into(),
				title: None,
			},
			TokenKind::Image {
				source: "#".into(),
				title: None,
			},
		]
	);

	assert_eq!(root.children()[2].tag(), KindTag::Paragraph);
	assert_eq!(document.diagnostics.count(&DiagnosticCode::SanitizedHtml), 3);
	assert_eq!(document.diagnostics.count(&DiagnosticCode::UnsafeLink), 2);
	assert!(root.check_coverage());
	assert_eq!(root.reconstruct(), input);

	let again = engine.rewrite(root, Stage::Document, &mut RewriteContext::default())?;
	assert!(Token::ptr_eq(&again, root));

	Ok(())
}

#[rstest]
#[case::javascript("javascript:alert(1)", false, true)]
#[case::mixed_case("JaVaScRiPt:x", false, true)]
#[case::whitespace(" java\tscript:x", false, true)]
#[case::vbscript("vbscript:x", false, true)]
#[case::data_link("data:text/html,x", false, true)]
#[case::data_image("data:image/png;base64,AA", true, false)]
#[case::https("https://example.com", false, false)]
#[case::relative("docs/guide.md", false, false)]
fn unsafe_targets(#[case] target: &str, #[case] image: bool, #[case] expected: bool) {
	assert_eq!(is_unsafe_target(target, image), expected);
}

#[test]
fn batch_resolves_symbols_across_documents() -> MdliteResult<()> {
	let options = ParseOptions::default()
		.with_extension(XREF)
		.with_extension(YAML_HEADER);
	let engine = MarkdownEngine::from_options(&options)?;
	let inputs = vec![
		SourceDocument::new("a.md", "---\nuid: a\ntitle: Alpha\n---\nSee @b.\n"),
		SourceDocument::new("b.md", "---\nuid: b\n---\nBack to @a, @ext and @missing.\n"),
	];
	let external = SymbolTable::from_iter([(
		"ext".to_string(),
		XrefTarget {
			href: "https://example.com/ext".to_string(),
			name: None,
		},
	)]);

	let batch = process_batch(&engine, &inputs, &options, &external)?;

	assert_eq!(batch.symbols.len(), 3);
	assert_eq!(
		batch
			.documents
			.iter()
			.map(|document| document.source_id.as_str())
			.collect::<Vec<_>>(),
		vec!["a.md", "b.md"]
	);

	let hrefs = |document: &ParsedDocument| -> Vec<String> {
		find_all(&document.root, KindTag::Extension)
			.iter()
			.filter_map(|token| token.kind().extension(XREF))
			.filter_map(|ext| ext.attribute("href").map(str::to_string))
			.collect()
	};

	assert_eq!(hrefs(&batch.documents[0]), vec!["b.md".to_string()]);
	assert_eq!(
		hrefs(&batch.documents[1]),
		vec!["a.md".to_string(), "https://example.com/ext".to_string()]
	);
	assert!(batch.documents[0].diagnostics.is_empty());
	assert_eq!(
		batch.documents[1]
			.diagnostics
			.count(&DiagnosticCode::UnresolvedXref),
		1
	);
	assert_eq!(batch.documents[1].diagnostics[0].source_id, "b.md");

	Ok(())
}

#[test]
fn batch_reports_duplicate_symbols() -> MdliteResult<()> {
	let options = ParseOptions::default().with_extension(YAML_HEADER);
	let engine = MarkdownEngine::from_options(&options)?;
	let inputs = vec![
		SourceDocument::new("one.md", "---\nuid: same\n---\n"),
		SourceDocument::new("two.md", "---\nuid: same\n---\n"),
	];

	let batch = process_batch(&engine, &inputs, &options, &SymbolTable::new())?;

	assert_eq!(batch.symbols.get("same").map(|target| target.href.as_str()), Some("one.md"));
	assert!(batch.documents[0].diagnostics.is_empty());
	assert_eq!(
		batch.documents[1]
			.diagnostics
			.count(&DiagnosticCode::DuplicateSymbol),
		1
	);

	Ok(())
}

#[test]
fn batch_of_many_documents_preserves_order() -> MdliteResult<()> {
	let engine = default_engine()?;
	let inputs: Vec<SourceDocument> = (0..37)
		.map(|index| SourceDocument::new(format!("{index}.md"), format!("# Doc {index}\n")))
		.collect();

	let batch = process_batch(&engine, &inputs, &ParseOptions::default(), &SymbolTable::new())?;

	assert_eq!(batch.documents.len(), 37);
	for (index, document) in batch.documents.iter().enumerate() {
		assert_eq!(document.source_id, format!("{index}.md"));
		assert_eq!(document.root.reconstruct(), format!("# Doc {index}\n"));
	}

	let empty = process_batch(&engine, &[], &ParseOptions::default(), &SymbolTable::new())?;
	assert!(empty.documents.is_empty());

	Ok(())
}

#[test]
fn table_of_contents() -> MdliteResult<()> {
	let document = parse("# Intro\n\n## Setup *fast*\n\n## Setup *fast*\n\n> # Quoted\n")?;
	let toc = extract_toc(&document.root);

	assert_eq!(
		toc,
		vec![
			TocEntry {
				level: 1,
				title: "Intro".to_string(),
				slug: "intro".to_string(),
				line: 1,
			},
			TocEntry {
				level: 2,
				title: "Setup fast".to_string(),
				slug: "setup-fast".to_string(),
				line: 3,
			},
			TocEntry {
				level: 2,
				title: "Setup fast".to_string(),
				slug: "setup-fast-1".to_string(),
				line: 5,
			},
			TocEntry {
				level: 1,
				title: "Quoted".to_string(),
				slug: "quoted".to_string(),
				line: 7,
			},
		]
	);

	Ok(())
}

#[rstest]
#[case::words("Hello World", "hello-world")]
#[case::symbols("C++ & Rust", "c--rust")]
#[case::underscore("API_v2 (beta)", "api_v2-beta")]
#[case::unicode("Über Café", "über-café")]
fn slugs(#[case] title: &str, #[case] expected: &str) {
	assert_eq!(slugify(title), expected);
}

#[test]
fn outline_dump() -> MdliteResult<()> {
	let document = parse("# Title\n\n- [x] *done*\n")?;

	insta::assert_snapshot!(outline(&document.root), @r#"
document
  heading level=1
    text "Title"
  blank-line "\n"
  list ordered=false tight=true
    list-item task=true
      paragraph
        text "[x] "
        emphasis
          text "done"
"#);

	Ok(())
}

#[test]
fn visitors_fold_bottom_up() -> MdliteResult<()> {
	struct Depth;

	impl visit::Visitor for Depth {
		type Output = usize;

		fn visit(&mut self, _: &Token, children: Vec<usize>) -> usize {
			children.into_iter().max().map_or(1, |depth| depth + 1)
		}
	}

	let document = parse("> **a**\n")?;
	assert_eq!(visit::fold(&document.root, &mut Depth), 5);

	Ok(())
}

#[test]
fn documents_serialize_to_json() -> MdliteResult<()> {
	let document = parse_with("# Hi\n", &ParseOptions::default().with_source_id("hi.md"))?;
	let json = document.to_json()?;

	assert!(json.contains("\"source_id\": \"hi.md\""));
	assert!(json.contains("\"type\": \"heading\""));
	assert!(json.contains("\"level\": 1"));
	assert!(json.contains("\"raw\": \"Hi\""));

	Ok(())
}

#[test]
fn diagnostics_render_through_miette() -> MdliteResult<()> {
	let document = parse_with(
		"> > x\n",
		&ParseOptions::default()
			.with_max_nesting_depth(1)
			.with_source_id("deep.md"),
	)?;
	let diagnostic = &document.diagnostics[0];

	assert_eq!(
		miette::Diagnostic::code(diagnostic).map(|code| code.to_string()),
		Some("mdlite::nesting-limit".to_string())
	);
	assert_eq!(
		miette::Diagnostic::help(diagnostic).map(|help| help.to_string()),
		Some("deep.md:1".to_string())
	);
	assert_eq!(diagnostic.severity, Severity::Warning);

	Ok(())
}

#[test]
fn config_reads_parse_options_and_symbols() -> MdliteResult<()> {
	let config = MdliteConfig::from_toml_str(
		r#"
[parse]
gfm = false
strict = true
max_nesting_depth = 8
extensions = ["xref", "yaml-header"]

[symbols]
"System.String" = { href = "https://example.com/string", name = "String" }
"#,
	)?;

	assert!(!config.parse.gfm);
	assert!(config.parse.strict);
	assert_eq!(config.parse.max_nesting_depth, 8);
	assert!(config.parse.is_enabled(XREF));
	assert!(config.parse.is_enabled(YAML_HEADER));
	assert_eq!(
		config.symbols.get("System.String").map(|target| target.href.as_str()),
		Some("https://example.com/string")
	);

	let defaults = MdliteConfig::from_toml_str("")?;
	assert_eq!(defaults.parse, ParseOptions::default());

	assert!(matches!(
		MdliteConfig::from_toml_str("[parse\n"),
		Err(MdliteError::ConfigParse(_))
	));

	Ok(())
}

#[test]
fn strict_mode_disables_lazy_continuation() -> MdliteResult<()> {
	let input = "> quoted\nlazy\n";
	let lenient = parse(input)?;
	let strict = parse_with(input, &ParseOptions::default().with_strict(true))?;

	assert_eq!(child_tags(&lenient.root), vec![KindTag::Blockquote]);
	assert_eq!(
		child_tags(&strict.root),
		vec![KindTag::Blockquote, KindTag::Paragraph]
	);
	assert_eq!(strict.root.reconstruct(), input);

	Ok(())
}

#[test]
fn kitchen_sink_contains_every_default_construct() -> MdliteResult<()> {
	let document = parse(KITCHEN_SINK)?;
	let root = &document.root;

	for tag in [
		KindTag::Heading,
		KindTag::Paragraph,
		KindTag::Blockquote,
		KindTag::List,
		KindTag::ListItem,
		KindTag::CodeBlock,
		KindTag::ThematicBreak,
		KindTag::HtmlBlock,
		KindTag::LinkDefinition,
		KindTag::Table,
		KindTag::TableCell,
		KindTag::Emphasis,
		KindTag::Strong,
		KindTag::Strikethrough,
		KindTag::CodeSpan,
		KindTag::Link,
		KindTag::Image,
		KindTag::AutoLink,
		KindTag::LineBreak,
		KindTag::RawHtml,
		KindTag::Escape,
	] {
		assert!(find(root, tag).is_some(), "missing {tag}");
	}

	assert!(find_all(root, KindTag::LineBreak).iter().any(|token| {
		token.kind() == &TokenKind::LineBreak { hard: true }
	}));
	assert!(document.diagnostics.is_empty());

	Ok(())
}
