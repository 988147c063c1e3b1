use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Tokenize, check and outline markdown documents.",
	long_about = "mdlite runs markdown documents through a rule driven tokenizer and prints what \
	              it found: the token tree, the diagnostics collected while parsing and \
	              resolving cross references, or a table of contents.\n\nWithout file \
	              arguments every markdown file below the project root is processed as one \
	              batch, so `@uid` cross references resolve across documents.\n\nQuick start:\n  \
	              mdlite check   Report problems in every markdown file\n  mdlite tokens  \
	              Print the token tree of each document\n  mdlite toc     Print a table of \
	              contents for each document"
)]
pub struct MdliteCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory. Config files are discovered here
	/// and source ids are reported relative to it.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output, including info diagnostics and debug logs.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,

	/// Output format.
	#[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
	pub format: OutputFormat,

	/// Enable a built-in extension in addition to those in `mdlite.toml`.
	/// Can be repeated.
	#[arg(long = "extension", short = 'e', global = true, value_name = "ID")]
	pub extensions: Vec<String>,

	/// Disable lazy continuation lines and generic html blocks.
	#[arg(long, global = true, default_value_t = false)]
	pub strict: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Print the token tree of each document.
	///
	/// The text format prints an indented outline with one token per line.
	/// The json format prints every parsed document, including the raw text
	/// of each token and the diagnostics collected for it.
	Tokens {
		/// Markdown files to process. Defaults to every markdown file below
		/// the project root.
		files: Vec<PathBuf>,
	},
	/// Report diagnostics for each document.
	///
	/// Exits with a non-zero status code when any warning or error is
	/// reported. Info diagnostics are only shown with `--verbose`.
	Check {
		/// Markdown files to process. Defaults to every markdown file below
		/// the project root.
		files: Vec<PathBuf>,
	},
	/// Print a table of contents for each document.
	Toc {
		/// Markdown files to process. Defaults to every markdown file below
		/// the project root.
		files: Vec<PathBuf>,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}
