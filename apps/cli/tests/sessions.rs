use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use sessionkit_core::{Geometry, Mark, OptionMap, Orientation};
use sessionkit_session::{
    DocumentRecord, DocumentRef, LayoutNode, LeafState, SessionDocument, SessionStore, TabRecord,
};
use tempfile::tempdir;

fn leaf(name: &str, cursor: Mark, current: bool) -> LayoutNode {
    LayoutNode::Leaf(LeafState {
        document: DocumentRef::Document(name.to_string()),
        cursor,
        current,
        ..LeafState::default()
    })
}

/// Stores `work`: notes.txt and main.rs side by side at 60/40 on a 100x30 display.
fn seed(root: &Path, workspace: &Path) -> Result<(), Box<dyn Error>> {
    let notes = workspace.join("notes.txt");
    let main = workspace.join("main.rs");
    fs::write(&notes, "one\ntwo\nthree\n")?;
    fs::write(&main, "fn main() {}\n")?;
    let notes = notes.to_string_lossy().into_owned();
    let main = main.to_string_lossy().into_owned();

    let mut document = SessionDocument::new(workspace.to_path_buf(), Geometry::new(100, 30));
    document.tabs.push(TabRecord {
        cwd: None,
        options: OptionMap::new(),
        current: true,
        layout: LayoutNode::Split {
            orientation: Orientation::Horizontal,
            children: vec![
                leaf(&notes, Mark::new(3, 2), true),
                leaf(&main, Mark::default(), false),
            ],
            sizes: vec![60, 40],
        },
    });
    for name in [notes, main] {
        document.documents.push(DocumentRecord {
            name,
            loaded: true,
            options: OptionMap::new(),
            last_edit: Mark::default(),
        });
    }
    SessionStore::new(root.join("session")).write("work", &document)?;
    Ok(())
}

fn cli(root: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("sessionkit")?;
    cmd.args(["--root", root.to_str().expect("utf-8 temp path")]);
    Ok(cmd)
}

#[test]
fn list_reports_stored_sessions() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let workspace = tempdir()?;

    cli(root.path())?
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions found."));

    seed(root.path(), workspace.path())?;
    cli(root.path())?
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::diff("work\n"));

    cli(root.path())?
        .args(["list", "--details"])
        .assert()
        .success()
        .stdout(predicate::str::contains("work\tglobal\t1 tab(s)"));
    Ok(())
}

#[test]
fn show_prints_layout_and_documents() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let workspace = tempdir()?;
    seed(root.path(), workspace.path())?;

    cli(root.path())?
        .args(["show", "work"])
        .assert()
        .success()
        .stdout(predicate::str::contains("horizontal [60, 40]"))
        .stdout(predicate::str::contains("notes.txt @3:2 (current)"))
        .stdout(predicate::str::contains("display: 100x30"));

    cli(root.path())?
        .args(["show", "work", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"format_version\": 1"));
    Ok(())
}

#[test]
fn preview_scales_to_the_requested_display() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let workspace = tempdir()?;
    seed(root.path(), workspace.path())?;

    cli(root.path())?
        .args(["preview", "work", "--width", "200", "--height", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("120x30"))
        .stdout(predicate::str::contains("80x30"))
        .stdout(predicate::str::contains("notes.txt @3:2 (current)"));
    Ok(())
}

#[test]
fn preview_replaces_missing_documents_with_placeholders() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let workspace = tempdir()?;
    seed(root.path(), workspace.path())?;
    fs::remove_file(workspace.path().join("main.rs"))?;

    cli(root.path())?
        .args(["preview", "work", "--width", "100", "--height", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[placeholder]"))
        .stdout(predicate::str::contains("skipped:"));
    Ok(())
}

#[test]
fn delete_removes_the_session_and_then_fails() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let workspace = tempdir()?;
    seed(root.path(), workspace.path())?;

    cli(root.path())?
        .args(["delete", "work"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted session 'work'"));
    assert!(!root.path().join("session").join("work.json").exists());

    cli(root.path())?
        .args(["delete", "work"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn dir_flag_selects_a_sub_directory() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let workspace = tempdir()?;
    seed(root.path(), workspace.path())?;

    cli(root.path())?
        .args(["--dir", "other", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions found."));
    Ok(())
}
