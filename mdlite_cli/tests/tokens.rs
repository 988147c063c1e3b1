mod common;

use mdlite_core::AnyEmptyResult;
use predicates::prelude::PredicateBooleanExt;
use rstest::rstest;
use serde_json::Value;

#[test]
fn tokens_prints_an_outline() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("hi.md"), "# Hi\n")?;

	common::mdlite_cmd()
		.arg("tokens")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains(
			"hi.md\ndocument\n  heading level=1\n    text \"Hi\"\n",
		));

	Ok(())
}

#[test]
fn tokens_prints_json() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("hi.md"), "# Hi\n")?;

	let output = common::mdlite_cmd()
		.arg("tokens")
		.arg("--format")
		.arg("json")
		.arg("--path")
		.arg(tmp.path())
		.output()?;

	assert!(output.status.success());

	let json: Value = serde_json::from_slice(&output.stdout)?;
	let document = &json[0];
	assert_eq!(document["source_id"], "hi.md");
	assert_eq!(document["root"]["kind"]["type"], "document");
	assert_eq!(document["root"]["raw"], "# Hi\n");
	assert_eq!(document["root"]["children"][0]["kind"]["type"], "heading");
	assert_eq!(document["root"]["children"][0]["kind"]["level"], 1);

	Ok(())
}

#[rstest]
#[case::extension_flag(&["--extension", "yaml-header"], true)]
#[case::short_flag(&["-e", "yaml-header"], true)]
#[case::not_enabled(&[], false)]
fn front_matter_needs_the_extension(
	#[case] flags: &[&str],
	#[case] enabled: bool,
) -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("doc.md"), "---\ntitle: Doc\n---\n# Body\n")?;

	let predicate = predicates::str::contains("extension yaml-header title=Doc");
	let assert = common::mdlite_cmd()
		.arg("tokens")
		.args(flags)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	if enabled {
		assert.stdout(predicate);
	} else {
		assert.stdout(predicate.not());
	}

	Ok(())
}

#[test]
fn strict_flag_disables_lazy_continuation() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("quote.md"), "> quoted\nlazy\n")?;

	common::mdlite_cmd()
		.arg("tokens")
		.arg("--strict")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("\n  paragraph\n    text \"lazy\"\n"));

	Ok(())
}
