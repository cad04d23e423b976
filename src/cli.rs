//! Command-line interface for bindref.

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::config::{Config, SourceFilter, DEFAULT_CONFIG, DEFAULT_CONFIG_NAMES};
use crate::frontend::{CompileDatabase, Frontend, SourceFile};
use crate::registry::DisplayNamePolicy;
use crate::render::{self, ClassOrder};
use crate::runner::Runner;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 2;

/// Script binding reference generator.
///
/// Scans C++ sources for luabind-style `class_<T>("Name").def(...)`
/// registrations and prints every exposed class with the signatures of
/// its bound methods, using script-visible names wherever a bound class
/// appears.
#[derive(Parser)]
#[command(name = "bindref")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the binding reference for a set of sources
    #[command(visible_alias = "docs")]
    Scan(ScanArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Source files or directories (default: every compilation database entry)
    pub sources: Vec<PathBuf>,

    /// Build directory containing compile_commands.json
    #[arg(short = 'p', long = "build-dir")]
    pub build_dir: Option<PathBuf>,

    /// Additional include directory
    #[arg(short = 'I', long = "include-dir")]
    pub include_dirs: Vec<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parameters whose type contains this are omitted ("" keeps all)
    #[arg(long)]
    pub context_marker: Option<String>,

    /// Order of classes in the report
    #[arg(long, value_enum)]
    pub class_order: Option<ClassOrder>,

    /// How a class's display name is chosen across registrations
    #[arg(long, value_enum)]
    pub display_name_policy: Option<DisplayNamePolicy>,

    /// Do not parse headers reached through #include
    #[arg(long)]
    pub no_follow_includes: bool,

    /// Number of worker threads (default: one per core)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "bindref.yaml")]
    pub output: PathBuf,
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over
/// the verbosity flag.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the config named on the command line, or a discovered one, or
/// defaults; then apply command-line overrides.
pub fn resolve_config(args: &ScanArgs) -> anyhow::Result<Config> {
    let path = match &args.config {
        Some(p) => Some(p.clone()),
        None => Config::discover(Path::new(".")),
    };

    let mut config = match &path {
        Some(p) => Config::parse_file(p)
            .with_context(|| format!("failed to load config {}", p.display()))?,
        None => Config::default(),
    };
    if let Some(p) = &path {
        tracing::debug!(path = %p.display(), "loaded config");
    }

    if let Some(marker) = &args.context_marker {
        config.context_marker = marker.clone();
    }
    if let Some(order) = args.class_order {
        config.class_order = order;
    }
    if let Some(policy) = args.display_name_policy {
        config.display_name_policy = policy;
    }
    if args.no_follow_includes {
        config.follow_includes = false;
    }
    // Command-line directories are searched before configured ones.
    let mut include_dirs = args.include_dirs.clone();
    include_dirs.append(&mut config.include_dirs);
    config.include_dirs = include_dirs;

    Ok(config)
}

/// Collect source files under `root` accepted by the filter.
pub fn collect_files(root: &Path, filter: &SourceFilter) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // Skip hidden directories
            let hidden = e.depth() > 0 && e.file_name().to_string_lossy().starts_with('.');
            !(e.file_type().is_dir() && hidden)
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if filter.accepts(path) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Expand positional inputs: files are taken as given, directories are
/// walked. Duplicates are dropped, first occurrence kept.
fn expand_inputs(inputs: &[PathBuf], filter: &SourceFilter) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for input in inputs {
        let metadata = std::fs::metadata(input)
            .with_context(|| format!("cannot access {}", input.display()))?;
        let found = if metadata.is_dir() {
            collect_files(input, filter)?
        } else {
            vec![input.clone()]
        };
        for file in found {
            let key = file.canonicalize().unwrap_or_else(|_| file.clone());
            if seen.insert(key) {
                files.push(file);
            }
        }
    }
    Ok(files)
}

/// Decide which files to analyze and with which include directories.
pub fn plan_sources(
    inputs: &[PathBuf],
    build_dir: Option<&Path>,
    config: &Config,
) -> anyhow::Result<Vec<SourceFile>> {
    let filter = config.source_filter()?;
    let with_globals = |mut source: SourceFile| {
        source.include_dirs.extend(config.include_dirs.iter().cloned());
        source
    };

    let Some(build_dir) = build_dir else {
        let files = expand_inputs(inputs, &filter)?;
        return Ok(files
            .into_iter()
            .map(|path| SourceFile::new(path, config.include_dirs.clone()))
            .collect());
    };

    let db = CompileDatabase::load(build_dir)?;
    tracing::debug!(entries = db.entries().len(), "loaded compilation database");

    if inputs.is_empty() {
        return Ok(db.entries().iter().cloned().map(with_globals).collect());
    }

    let files = expand_inputs(inputs, &filter)?;
    Ok(files
        .into_iter()
        .map(|path| match db.find(&path) {
            Some(entry) => with_globals(entry.clone()),
            None => {
                tracing::warn!(
                    path = %path.display(),
                    "not in compilation database, using global include directories"
                );
                SourceFile::new(path, config.include_dirs.clone())
            }
        })
        .collect())
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    init_logging(args.verbose);

    if let Some(jobs) = args.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            tracing::warn!("could not size thread pool: {}", e);
        }
    }

    let config = resolve_config(args)?;

    if args.sources.is_empty() && args.build_dir.is_none() {
        anyhow::bail!("no input sources (pass files, directories or -p <build-dir>)");
    }

    let sources = plan_sources(&args.sources, args.build_dir.as_deref(), &config)?;
    if sources.is_empty() {
        anyhow::bail!("no source files found");
    }

    let workspace = Frontend::new()
        .follow_includes(config.follow_includes)
        .load(&sources)?;
    let catalog = Runner::new(config.display_name_policy).collect(&workspace)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    render::render(&catalog, &config.render_options(), &mut out)
        .context("failed to write report")?;
    out.flush().context("failed to write report")?;

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    // Check if output already exists
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    std::fs::write(&args.output, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("Created {}", args.output.display());
    if !DEFAULT_CONFIG_NAMES
        .iter()
        .any(|name| args.output.file_name() == Some(OsStr::new(name)))
    {
        println!("Pass it explicitly: bindref scan --config {} ...", args.output.display());
    }

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scan_args(argv: &[&str]) -> ScanArgs {
        let mut full = vec!["bindref", "scan"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Scan(args) => args,
            Commands::Init(_) => panic!("expected scan"),
        }
    }

    #[test]
    fn test_cli_parses_overrides() {
        let args = scan_args(&[
            "a.cpp",
            "-p",
            "build",
            "-I",
            "inc",
            "--class-order",
            "alphabetical",
            "--display-name-policy",
            "prefer-literal",
            "--context-marker",
            "",
            "-vv",
        ]);
        assert_eq!(args.sources, vec![PathBuf::from("a.cpp")]);
        assert_eq!(args.build_dir, Some(PathBuf::from("build")));
        assert_eq!(args.class_order, Some(ClassOrder::Alphabetical));
        assert_eq!(args.display_name_policy, Some(DisplayNamePolicy::PreferLiteral));
        assert_eq!(args.verbose, 2);

        let mut args = args;
        args.config = Some(PathBuf::from("/nonexistent/bindref.yaml"));
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn test_docs_alias() {
        assert!(matches!(
            Cli::parse_from(["bindref", "docs", "x.cpp"]).command,
            Commands::Scan(_)
        ));
    }

    #[test]
    fn test_collect_files_filters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("third_party")).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join(".git/x.cpp"), "").unwrap();
        std::fs::write(root.join("third_party/lua.h"), "").unwrap();
        std::fs::write(root.join("src/b.cpp"), "").unwrap();
        std::fs::write(root.join("src/a.hpp"), "").unwrap();
        std::fs::write(root.join("README.md"), "").unwrap();

        let config = Config::parse_str("exclude: [\"**/third_party/**\"]\n").unwrap();
        let files = collect_files(root, &config.source_filter().unwrap()).unwrap();
        assert_eq!(files, vec![root.join("src/a.hpp"), root.join("src/b.cpp")]);
    }

    #[test]
    fn test_plan_sources_with_database() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let build = root.join("build");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(root.join("a.cpp"), "").unwrap();
        std::fs::write(root.join("b.cpp"), "").unwrap();
        let db = format!(
            r#"[{{"directory": "{}", "file": "{}", "arguments": ["c++", "-Iinc", "-c", "a.cpp"]}}]"#,
            root.display(),
            root.join("a.cpp").display()
        );
        std::fs::write(build.join("compile_commands.json"), db).unwrap();

        let mut config = Config::default();
        config.include_dirs = vec![PathBuf::from("/global")];

        let all = plan_sources(&[], Some(&build), &config).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(
            all[0].include_dirs,
            vec![root.join("inc"), PathBuf::from("/global")]
        );

        let listed = plan_sources(
            &[root.join("b.cpp"), root.join("a.cpp"), root.join("a.cpp")],
            Some(&build),
            &config,
        )
        .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].include_dirs, vec![PathBuf::from("/global")]);
        assert_eq!(listed[1].include_dirs.len(), 2);
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("conf/bindref.yaml");
        let args = InitArgs {
            output: output.clone(),
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert!(Config::parse_file(&output).is_ok());
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);
    }
}
