use std::sync::Arc;

use tracing::debug;

use crate::Diagnostic;
use crate::DiagnosticCode;
use crate::Extension;
use crate::KindTag;
use crate::Layout;
use crate::MdliteResult;
use crate::Priority;
use crate::Registry;
use crate::RewriteContext;
use crate::Rewriter;
use crate::Token;
use crate::TokenKind;

pub const SANITIZE: &str = "sanitize";

/// Replacement for neutralized link targets.
const SAFE_TARGET: &str = "#";

const UNSAFE_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

/// Strips raw html and script links from a document.
///
/// Inline html becomes text, html blocks become paragraphs of text, and
/// `javascript:`, `vbscript:` and non-image `data:` targets are replaced by
/// `#`. Every change is reported as an informational diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeExtension;

impl Extension for SanitizeExtension {
	fn id(&self) -> &str {
		SANITIZE
	}

	fn install(&self, registry: &mut Registry) -> MdliteResult<()> {
		let rewriter = Rewriter::for_tags(
			SANITIZE,
			&[
				KindTag::RawHtml,
				KindTag::HtmlBlock,
				KindTag::Link,
				KindTag::Image,
				KindTag::AutoLink,
			],
			sanitize,
		);
		registry.register_rewriter(rewriter, Priority::Last)
	}
}

/// Whether a link target would run script when followed.
pub fn is_unsafe_target(target: &str, image: bool) -> bool {
	let normalized: String = target
		.chars()
		.filter(|c| !c.is_ascii_whitespace() && !c.is_control())
		.take(16)
		.collect::<String>()
		.to_ascii_lowercase();

	if image && normalized.starts_with("data:image/") {
		return false;
	}

	UNSAFE_SCHEMES.iter().any(|scheme| normalized.starts_with(scheme))
}

fn sanitize(token: &Token, context: &mut RewriteContext) -> Option<Token> {
	let replacement = match token.kind() {
		TokenKind::RawHtml => {
			report(context, token, DiagnosticCode::SanitizedHtml, "inline html replaced by text");
			token.with_kind(TokenKind::Text)
		}
		TokenKind::HtmlBlock => {
			report(context, token, DiagnosticCode::SanitizedHtml, "html block replaced by a paragraph");
			let rule: Arc<str> = Arc::from(SANITIZE);
			let text = Token::builder(TokenKind::Text, token.source(), token.span(), token.context(), &rule)
				.line(token.line())
				.build();
			token.replaced(TokenKind::Paragraph, Layout::Flat, vec![text])
		}
		TokenKind::Link { target, title } if is_unsafe_target(target, false) => {
			report(context, token, DiagnosticCode::UnsafeLink, "unsafe link target neutralized");
			token.with_kind(TokenKind::Link {
				target: SAFE_TARGET.into(),
				title: title.clone(),
			})
		}
		TokenKind::Image { source, title } if is_unsafe_target(source, true) => {
			report(context, token, DiagnosticCode::UnsafeLink, "unsafe image source neutralized");
			token.with_kind(TokenKind::Image {
				source: SAFE_TARGET.into(),
				title: title.clone(),
			})
		}
		TokenKind::AutoLink { target, email: false } if is_unsafe_target(target, false) => {
			report(context, token, DiagnosticCode::UnsafeLink, "unsafe autolink neutralized");
			token.with_kind(TokenKind::AutoLink {
				target: SAFE_TARGET.into(),
				email: false,
			})
		}
		_ => return None,
	};

	Some(replacement)
}

fn report(context: &mut RewriteContext, token: &Token, code: DiagnosticCode, message: &str) {
	debug!(code = %code, line = token.line(), "sanitized");
	context.report(Diagnostic::info(code, message).with_token(token));
}
