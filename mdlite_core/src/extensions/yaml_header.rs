use serde_yaml_ng::Value;

use crate::Cursor;
use crate::Diagnostic;
use crate::DiagnosticCode;
use crate::Extension;
use crate::ExtensionToken;
use crate::MdliteResult;
use crate::Mode;
use crate::Priority;
use crate::Registry;
use crate::Rule;
use crate::RuleMatch;
use crate::TokenKind;
use crate::rules::scan;

pub const YAML_HEADER: &str = "yaml-header";

/// YAML front matter delimited by `---` and `---` (or `...`) at the very
/// start of a document. Top level scalar keys become attributes of a
/// `yaml-header` extension token.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlHeaderExtension;

impl Extension for YamlHeaderExtension {
	fn id(&self) -> &str {
		YAML_HEADER
	}

	fn install(&self, registry: &mut Registry) -> MdliteResult<()> {
		registry.register_rule(Mode::Block, Rule::new(YAML_HEADER, front_matter), Priority::First)
	}
}

fn is_delimiter(line: &str, closing: bool) -> bool {
	let line = scan::strip_newline(line).trim_end();
	line == "---" || (closing && line == "...")
}

fn front_matter(cursor: &mut Cursor<'_>) -> Option<RuleMatch> {
	if cursor.offset() != 0 || cursor.context().depth() != 0 {
		return None;
	}

	let rest = cursor.rest();
	let opening = scan::first_line(rest);
	if !is_delimiter(opening, false) {
		return None;
	}

	let mut len = opening.len();
	let mut closed = false;
	for line in rest[len..].split_inclusive('\n') {
		len += line.len();
		if is_delimiter(line, true) {
			closed = true;
			break;
		}
	}

	if !closed {
		return None;
	}

	let body = &rest[opening.len()..len - closing_len(&rest[..len])];
	let mut extension = ExtensionToken::new(YAML_HEADER);
	let mut problem = None;

	match serde_yaml_ng::from_str::<Value>(body) {
		Ok(Value::Mapping(mapping)) => {
			for (key, value) in &mapping {
				if let (Some(key), Some(value)) = (key.as_str(), scalar(value)) {
					extension = extension.with_attribute(key, value);
				}
			}
		}
		Ok(Value::Null) => {}
		Ok(_) => problem = Some("front matter is not a mapping".to_string()),
		Err(error) => problem = Some(format!("front matter is not valid YAML: {error}")),
	}

	let token = cursor.leaf(TokenKind::Extension(extension), len);
	if let Some(message) = problem {
		cursor.report(Diagnostic::warning(DiagnosticCode::InvalidFrontMatter, message).with_token(&token));
	}

	Some(RuleMatch::single(token))
}

/// Length of the closing delimiter line at the end of `block`.
fn closing_len(block: &str) -> usize {
	let trimmed = block.strip_suffix('\n').unwrap_or(block);
	let start = trimmed.rfind('\n').map_or(0, |index| index + 1);
	block.len() - start
}

fn scalar(value: &Value) -> Option<String> {
	match value {
		Value::String(value) => Some(value.clone()),
		Value::Bool(value) => Some(value.to_string()),
		Value::Number(value) => Some(value.to_string()),
		_ => None,
	}
}
