use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use clap::Parser;
use ignore::WalkBuilder;
use mdlite_cli::Commands;
use mdlite_cli::MdliteCli;
use mdlite_cli::OutputFormat;
use mdlite_core::AnyEmptyResult;
use mdlite_core::AnyResult;
use mdlite_core::Batch;
use mdlite_core::CONFIG_FILE_CANDIDATES;
use mdlite_core::Diagnostic;
use mdlite_core::MarkdownEngine;
use mdlite_core::MdliteConfig;
use mdlite_core::Severity;
use mdlite_core::SourceDocument;
use mdlite_core::SymbolTable;
use mdlite_core::extract_toc;
use mdlite_core::process_batch;
use mdlite_core::visit::outline;
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = MdliteCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	init_tracing(args.verbose, use_color);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Tokens { files }) => run_tokens(&args, files),
		Some(Commands::Check { files }) => run_check(&args, files),
		Some(Commands::Toc { files }) => run_toc(&args, files),
		None => {
			eprintln!("No subcommand specified. Run `mdlite --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<mdlite_core::MdliteError>() {
			Ok(mdlite_err) => {
				let report: miette::Report = (*mdlite_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Logs go to stderr so that json output on stdout stays parseable.
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool, use_color: bool) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "error" }));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.try_init();
}

fn resolve_root(args: &MdliteCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Load the first config file found in `root`, in candidate order.
fn load_config(root: &Path) -> AnyResult<(Option<PathBuf>, MdliteConfig)> {
	let Some(path) = CONFIG_FILE_CANDIDATES
		.iter()
		.map(|candidate| root.join(candidate))
		.find(|path| path.is_file())
	else {
		return Ok((None, MdliteConfig::default()));
	};

	let content = std::fs::read_to_string(&path)?;
	let config = MdliteConfig::from_toml_str(&content)?;
	debug!(path = %path.display(), "loaded config");

	Ok((Some(path), config))
}

/// Every markdown file below `root`, honoring `.gitignore` and skipping
/// hidden entries.
fn discover_files(root: &Path) -> AnyResult<Vec<PathBuf>> {
	let mut files = Vec::new();

	for entry in WalkBuilder::new(root).require_git(false).build() {
		let entry = entry?;
		let path = entry.path();
		let is_markdown = path
			.extension()
			.and_then(|extension| extension.to_str())
			.is_some_and(|extension| matches!(extension, "md" | "markdown"));

		if is_markdown && entry.file_type().is_some_and(|kind| kind.is_file()) {
			files.push(path.to_path_buf());
		}
	}

	// Sort for deterministic ordering.
	files.sort();
	Ok(files)
}

fn collect_inputs(root: &Path, files: &[PathBuf]) -> AnyResult<Vec<SourceDocument>> {
	let paths = if files.is_empty() {
		discover_files(root)?
	} else {
		files.to_vec()
	};

	paths
		.iter()
		.map(|path| -> AnyResult<SourceDocument> {
			let text = std::fs::read_to_string(path)
				.map_err(|e| format!("failed to read {}: {e}", path.display()))?;
			Ok(SourceDocument::new(make_relative(path, root), text))
		})
		.collect()
}

/// Read the config and the documents, then run them through the core as one
/// batch.
fn run_batch(args: &MdliteCli, files: &[PathBuf]) -> AnyResult<Batch> {
	let root = resolve_root(args);
	let (config_path, config) = load_config(&root)?;

	let mut options = config.parse;
	options
		.enabled_extensions
		.extend(args.extensions.iter().cloned());
	options.strict |= args.strict;

	let engine = MarkdownEngine::from_options(&options)?;
	let inputs = collect_inputs(&root, files)?;
	debug!(
		config = ?config_path,
		documents = inputs.len(),
		extensions = ?engine.extensions(),
		"processing batch"
	);

	let symbols = SymbolTable::from(config.symbols);
	Ok(process_batch(&engine, &inputs, &options, &symbols)?)
}

fn run_tokens(args: &MdliteCli, files: &[PathBuf]) -> AnyEmptyResult {
	let batch = run_batch(args, files)?;

	match args.format {
		OutputFormat::Json => {
			println!("{}", serde_json::to_string_pretty(&batch.documents)?);
		}
		OutputFormat::Text => {
			for (index, document) in batch.documents.iter().enumerate() {
				if index > 0 {
					println!();
				}
				println!("{}", colored!(document.source_id.as_str(), bold));
				println!("{}", outline(&document.root));
			}
		}
	}

	Ok(())
}

fn run_check(args: &MdliteCli, files: &[PathBuf]) -> AnyEmptyResult {
	let batch = run_batch(args, files)?;
	let diagnostics: Vec<&Diagnostic> = batch
		.documents
		.iter()
		.flat_map(|document| document.diagnostics.iter())
		.collect();

	let count = |severity: Severity| {
		diagnostics
			.iter()
			.filter(|diagnostic| diagnostic.severity == severity)
			.count()
	};
	let errors = count(Severity::Error);
	let warnings = count(Severity::Warning);
	let failed = errors + warnings > 0;

	match args.format {
		OutputFormat::Json => {
			let output = serde_json::json!({
				"ok": !failed,
				"documents": batch.documents.len(),
				"diagnostics": diagnostics,
			});
			println!("{output}");
		}
		OutputFormat::Text => {
			for diagnostic in &diagnostics {
				if diagnostic.severity == Severity::Info && !args.verbose {
					continue;
				}

				let report = miette::Report::new((*diagnostic).clone());
				eprintln!("{report:?}");
			}

			let summary = format!(
				"Checked {} document(s): {errors} error(s), {warnings} warning(s).",
				batch.documents.len()
			);
			if failed {
				eprintln!("{}", colored!(summary, red));
			} else {
				println!("{}", colored!(summary, green));
			}
		}
	}

	if failed {
		process::exit(1);
	}

	Ok(())
}

fn run_toc(args: &MdliteCli, files: &[PathBuf]) -> AnyEmptyResult {
	let batch = run_batch(args, files)?;

	match args.format {
		OutputFormat::Json => {
			let output: Vec<serde_json::Value> = batch
				.documents
				.iter()
				.map(|document| {
					serde_json::json!({
						"file": document.source_id,
						"entries": extract_toc(&document.root),
					})
				})
				.collect();
			println!("{}", serde_json::to_string_pretty(&output)?);
		}
		OutputFormat::Text => {
			for (index, document) in batch.documents.iter().enumerate() {
				if index > 0 {
					println!();
				}
				println!("{}", colored!(document.source_id.as_str(), bold));

				let entries = extract_toc(&document.root);
				if entries.is_empty() {
					println!("  (no headings)");
				}
				for entry in entries {
					let indent = "  ".repeat(usize::from(entry.level));
					println!("{indent}- [{}](#{})", entry.title, entry.slug);
				}
			}
		}
	}

	Ok(())
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
