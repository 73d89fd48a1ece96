use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{debug, error};
use sessionkit_core::{
    DocumentHost, Geometry, MemoryHost, OptionMap, TabId, WindowHost, WindowLayout,
};
use sessionkit_session::{
    ConfigStore, DeleteOptions, DocumentRef, LayoutNode, ResetPolicy, SessionConfig,
    SessionDocument, SessionManager,
};

#[derive(Parser)]
#[command(
    name = "sessionkit",
    about = "Inspect and manage stored editor sessions",
    author,
    version
)]
struct Cli {
    /// 設定檔路徑。 / Configuration file (JSON); defaults are used when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// 工作階段根目錄。 / Overrides the session root directory.
    #[arg(long, global = true, value_name = "PATH")]
    root: Option<PathBuf>,
    /// 工作階段子目錄。 / Session sub-directory under the root.
    #[arg(long, global = true, value_name = "NAME")]
    dir: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出已儲存的工作階段。 / List stored sessions.
    List(ListArgs),
    /// 顯示工作階段內容。 / Show a stored session.
    Show(ShowArgs),
    /// 刪除工作階段。 / Delete a stored session.
    Delete(NameArgs),
    /// 在指定顯示大小下預覽還原結果。 / Restore a session into an in-memory editor and
    /// print the resulting windows.
    Preview(PreviewArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Include scope, working directory and tab count.
    #[arg(long)]
    details: bool,
}

#[derive(Args)]
struct NameArgs {
    name: String,
}

#[derive(Args)]
struct ShowArgs {
    name: String,
    /// Print the stored JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PreviewArgs {
    name: String,
    #[arg(long, default_value_t = 120)]
    width: u32,
    #[arg(long, default_value_t = 40)]
    height: u32,
}

fn init_logger() {
    // RUST_LOG overrides, e.g. RUST_LOG=debug sessionkit preview work
    Builder::from_env(Env::default().default_filter_or("warn")).init();
}

fn main() {
    init_logger();
    if let Err(err) = run() {
        error!("{err:?}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        config,
        root,
        dir,
        command,
    } = Cli::parse();
    let manager = SessionManager::new(load_config(config, root)?);
    let dir = dir.as_deref();
    match command {
        Commands::List(args) => execute_list(&manager, dir, args.details),
        Commands::Show(args) => execute_show(&manager, dir, &args.name, args.json),
        Commands::Delete(args) => execute_delete(manager, dir, &args.name),
        Commands::Preview(args) => execute_preview(manager, dir, args),
    }
}

fn load_config(path: Option<PathBuf>, root: Option<PathBuf>) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => ConfigStore::load(&path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?
            .into_config(),
        None => SessionConfig::default(),
    };
    if let Some(root) = root {
        config.session_root = root;
    }
    debug!("session root {}", config.session_root.display());
    Ok(config)
}

fn execute_list(manager: &SessionManager, dir: Option<&str>, details: bool) -> Result<()> {
    if !details {
        let names = manager.list(dir).context("failed to list sessions")?;
        if names.is_empty() {
            println!("No sessions found.");
        }
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let summaries = manager
        .list_detailed(dir)
        .context("failed to list sessions")?;
    if summaries.is_empty() {
        println!("No sessions found.");
    }
    for summary in summaries {
        println!(
            "{}\t{}\t{} tab(s)\t{}",
            summary.name,
            if summary.tab_scoped { "tab" } else { "global" },
            summary.tab_count,
            summary.cwd.display()
        );
    }
    Ok(())
}

fn read_session(manager: &SessionManager, dir: Option<&str>, name: &str) -> Result<SessionDocument> {
    manager
        .store(dir)
        .read(name)
        .with_context(|| format!("failed to read session '{name}'"))
}

fn execute_show(manager: &SessionManager, dir: Option<&str>, name: &str, json: bool) -> Result<()> {
    let document = read_session(manager, dir, name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("Session: {name}");
    println!(
        "  scope: {}",
        if document.tab_scoped { "tab" } else { "global" }
    );
    println!("  cwd: {}", document.cwd.display());
    println!(
        "  display: {}x{}",
        document.geometry.width, document.geometry.height
    );
    if let Some(version) = &document.metadata.application_version {
        println!("  saved by: {version}");
    }
    if !document.options.is_empty() {
        println!("  options: {}", format_options(&document.options));
    }

    println!("Tabs:");
    for (index, tab) in document.tabs.iter().enumerate() {
        let marker = if tab.current { "*" } else { " " };
        match &tab.cwd {
            Some(cwd) => println!("  [{}]{marker} cwd={}", index + 1, cwd.display()),
            None => println!("  [{}]{marker}", index + 1),
        }
        print_layout(&tab.layout, 2);
    }

    println!("Documents:");
    for record in &document.documents {
        println!(
            "  {}{} last edit {}:{}",
            record.name,
            if record.loaded { "" } else { " (not loaded)" },
            record.last_edit.line,
            record.last_edit.column
        );
    }
    if !document.extensions.is_empty() {
        let names: Vec<&str> = document.extensions.keys().map(String::as_str).collect();
        println!("Extensions: {}", names.join(", "));
    }
    Ok(())
}

fn print_layout(node: &LayoutNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        LayoutNode::Split {
            orientation,
            children,
            sizes,
        } => {
            println!("{indent}{} {sizes:?}", orientation.as_str());
            for child in children {
                print_layout(child, depth + 1);
            }
        }
        LayoutNode::Leaf(leaf) => {
            let target = match &leaf.document {
                DocumentRef::Document(name) => name.as_str(),
                DocumentRef::Unsupported => "[unsupported]",
            };
            let extension = leaf
                .extension
                .as_ref()
                .map(|ext| format!(" via {}", ext.extension))
                .unwrap_or_default();
            println!(
                "{indent}{target} @{}:{}{extension}{}",
                leaf.cursor.line,
                leaf.cursor.column,
                if leaf.current { " (current)" } else { "" }
            );
        }
    }
}

fn format_options(options: &OptionMap) -> String {
    options
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn execute_delete(mut manager: SessionManager, dir: Option<&str>, name: &str) -> Result<()> {
    let mut host = MemoryHost::new(Geometry::new(80, 24), PathBuf::from("."));
    let options = DeleteOptions {
        dir: dir.map(str::to_string),
        notify: Some(false),
    };
    let path = manager
        .delete(&mut host, Some(name), options)
        .with_context(|| format!("failed to delete session '{name}'"))?;
    println!("Deleted session '{name}' ({})", path.display());
    Ok(())
}

fn execute_preview(mut manager: SessionManager, dir: Option<&str>, args: PreviewArgs) -> Result<()> {
    let document = read_session(&manager, dir, &args.name)?;
    let mut host = MemoryHost::new(
        Geometry::new(args.width, args.height),
        document.cwd.clone(),
    );
    let outcome = manager
        .restore_session(&mut host, &document, ResetPolicy::Always)
        .with_context(|| format!("failed to restore session '{}'", args.name))?;

    println!(
        "Preview of '{}' at {}x{} (recorded at {}x{})",
        args.name, args.width, args.height, document.geometry.width, document.geometry.height
    );
    for tab in &outcome.tabs {
        print_tab(&host, *tab)?;
    }
    for skipped in &outcome.skipped_documents {
        println!("skipped: {skipped}");
    }
    for failed in &outcome.failed_extensions {
        println!("extension failed: {failed}");
    }
    Ok(())
}

fn print_tab(host: &MemoryHost, tab: TabId) -> Result<()> {
    let marker = if tab == host.current_tab() { " (current)" } else { "" };
    println!("{tab}{marker}");
    let layout = host.window_layout(tab)?;
    print_windows(host, &layout, 1)
}

fn print_windows(host: &MemoryHost, layout: &WindowLayout, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    match layout {
        WindowLayout::Row(children) | WindowLayout::Col(children) => {
            let label = if matches!(layout, WindowLayout::Row(_)) {
                "row"
            } else {
                "col"
            };
            println!("{indent}{label}");
            for child in children {
                print_windows(host, child, depth + 1)?;
            }
        }
        WindowLayout::Leaf(win) => {
            let size = host.window_size(*win)?;
            let buf = host.window_buffer(*win)?;
            let info = host.buffer_info(buf)?;
            let cursor = host.cursor(*win)?;
            let shown = if info.name.is_empty() {
                "[placeholder]"
            } else {
                info.name.as_str()
            };
            let current = if *win == host.current_window() {
                " (current)"
            } else {
                ""
            };
            println!(
                "{indent}{win} {}x{} {shown} @{}:{}{current}",
                size.width, size.height, cursor.line, cursor.column
            );
        }
    }
    Ok(())
}
