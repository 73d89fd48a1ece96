use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::{json, Value};
use sessionkit_core::{
    BufferId, DocumentHost, Geometry, Host, MemoryHost, NotifyLevel, Orientation, WindowHost,
    WindowId,
};
use sessionkit_session::{
    AutosaveConfig, DeleteOptions, Extension, HookPoint, LayoutNode, LoadOptions, LoadingFlag,
    LoadingGuard, ResetPolicy, SaveOptions, SessionConfig, SessionError, SessionManager,
    SessionStore,
};
use tempfile::{tempdir, TempDir};

struct Fixture {
    dir: TempDir,
    host: MemoryHost,
    manager: SessionManager,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut SessionConfig)) -> Self {
        let dir = tempdir().expect("tempdir");
        let mut config = SessionConfig {
            session_root: dir.path().join("sessions"),
            ..SessionConfig::default()
        };
        adjust(&mut config);
        let host = MemoryHost::new(Geometry::new(120, 40), dir.path());
        Self {
            manager: SessionManager::new(config),
            host,
            dir,
        }
    }

    fn open(&mut self, file: &str, text: &str) -> WindowId {
        let path = self.dir.path().join(file);
        fs::write(&path, text).expect("write fixture");
        let win = self.host.current_window();
        self.host.edit(win, &path).expect("edit");
        win
    }

    fn store(&self) -> SessionStore {
        self.manager.store(None)
    }

    fn messages(&self) -> Vec<String> {
        self.host
            .notifications()
            .iter()
            .map(|note| note.message.clone())
            .collect()
    }
}

#[test]
fn save_then_load_restores_into_a_reset_workspace() {
    let mut fx = Fixture::new();
    let win = fx.open("notes.md", "# notes\n\nbody\n");
    fx.host
        .split_window(win, Orientation::Horizontal)
        .expect("split");

    let path = fx
        .manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    assert!(path.ends_with("session/work.json"));
    assert_eq!(fx.manager.list(None).expect("list"), vec!["work".to_string()]);

    fx.host.new_tab().expect("tab");
    let outcome = fx
        .manager
        .load(&mut fx.host, Some("work"), LoadOptions::default())
        .expect("load")
        .expect("session exists");
    assert_eq!(outcome.tabs.len(), 1);
    assert_eq!(fx.host.tabs().len(), 1);
    let windows = fx
        .host
        .window_layout(fx.host.current_tab())
        .expect("layout")
        .windows();
    assert_eq!(windows.len(), 2);
    assert_eq!(
        fx.messages(),
        vec!["Saved session work".to_string(), "Loaded session work".to_string()]
    );
}

#[test]
fn deleting_a_missing_session_reports_not_found() {
    let mut fx = Fixture::new();
    let err = fx
        .manager
        .delete(&mut fx.host, Some("foo"), DeleteOptions::default())
        .expect_err("nothing to delete");
    assert!(err.is_not_found());
    assert!(fx.host.notifications().is_empty());

    let err = fx
        .manager
        .load(&mut fx.host, Some("foo"), LoadOptions::default())
        .expect_err("nothing to load");
    assert!(err.is_not_found());

    let silent = fx
        .manager
        .load(
            &mut fx.host,
            Some("foo"),
            LoadOptions {
                silence_errors: true,
                ..LoadOptions::default()
            },
        )
        .expect("silenced");
    assert!(silent.is_none());
}

#[test]
fn attachment_follows_save_load_and_delete() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    assert!(matches!(
        fx.manager.save(&mut fx.host, None, SaveOptions::default()),
        Err(SessionError::MissingName)
    ));

    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    let info = fx.manager.current_info(&fx.host).expect("attached");
    assert_eq!(info.name, "work");
    assert_eq!(info.dir, "session");
    assert!(!info.tab_scoped);

    fx.manager
        .save(&mut fx.host, None, SaveOptions::default())
        .expect("save attached");

    fx.manager
        .save_tab(&mut fx.host, Some("solo"), SaveOptions::default())
        .expect("save tab");
    let info = fx.manager.current_info(&fx.host).expect("tab attached");
    assert_eq!(info.name, "solo");
    assert!(info.tab_scoped);

    fx.manager
        .load(&mut fx.host, Some("work"), LoadOptions::default())
        .expect("load");
    let info = fx.manager.current_info(&fx.host).expect("attached");
    assert_eq!(info.name, "work");
    assert!(!info.tab_scoped);

    fx.manager
        .delete(&mut fx.host, None, DeleteOptions::default())
        .expect("delete attached");
    assert!(fx.manager.current(&fx.host).is_none());
    assert_eq!(fx.manager.list(None).expect("list"), vec!["solo".to_string()]);
}

#[test]
fn unattached_saves_leave_attachment_alone() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save(
            &mut fx.host,
            Some("copy"),
            SaveOptions {
                dir: Some("backups".into()),
                attach: false,
                notify: Some(false),
            },
        )
        .expect("save");
    assert!(fx.manager.current(&fx.host).is_none());
    assert!(fx.host.notifications().is_empty());
    assert_eq!(
        fx.manager.list(Some("backups")).expect("list"),
        vec!["copy".to_string()]
    );
    assert!(fx.manager.list(None).expect("list").is_empty());
}

#[test]
fn hooks_run_around_each_operation() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    let seen = Rc::new(RefCell::new(Vec::new()));
    for point in [
        HookPoint::PreSave,
        HookPoint::PostSave,
        HookPoint::PreLoad,
        HookPoint::PostLoad,
        HookPoint::PreDelete,
        HookPoint::PostDelete,
    ] {
        let seen = Rc::clone(&seen);
        fx.manager.hooks_mut().add(point, move |event| {
            seen.borrow_mut()
                .push(format!("{}:{}", event.point, event.name))
        });
    }
    let unknown = fx.manager.hooks_mut().add_named("after_save", |_| {});
    assert!(matches!(unknown, Err(SessionError::UnknownHook(name)) if name == "after_save"));

    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    fx.manager
        .load(&mut fx.host, Some("work"), LoadOptions::default())
        .expect("load");
    fx.manager
        .delete(&mut fx.host, Some("work"), DeleteOptions::default())
        .expect("delete");

    assert_eq!(
        *seen.borrow(),
        vec![
            "pre_save:work",
            "post_save:work",
            "pre_load:work",
            "post_load:work",
            "pre_delete:work",
            "post_delete:work",
        ]
    );
}

struct Recorder {
    name: &'static str,
    payload: Option<Value>,
    loaded: Rc<RefCell<Vec<Value>>>,
    flag: Option<LoadingFlag>,
    loading_seen: Rc<RefCell<Vec<bool>>>,
}

impl Recorder {
    fn new(name: &'static str, payload: Option<Value>) -> Self {
        Self {
            name,
            payload,
            loaded: Rc::default(),
            flag: None,
            loading_seen: Rc::default(),
        }
    }
}

impl Extension for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn on_save(&mut self, _host: &dyn Host) -> anyhow::Result<Option<Value>> {
        Ok(self.payload.clone())
    }

    fn on_load(&mut self, _host: &mut dyn Host, payload: &Value) -> anyhow::Result<()> {
        if let Some(flag) = &self.flag {
            self.loading_seen.borrow_mut().push(flag.is_set());
        }
        self.loaded.borrow_mut().push(payload.clone());
        Ok(())
    }
}

struct Broken;

impl Extension for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn on_save(&mut self, _host: &dyn Host) -> anyhow::Result<Option<Value>> {
        Err(anyhow!("state unavailable"))
    }
}

#[test]
fn failing_extension_is_reported_and_the_session_still_saves() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    let recorder = Recorder::new("marks", Some(json!({"a": [1, 0]})));
    let loaded = Rc::clone(&recorder.loaded);
    fx.manager.register_extension(Box::new(recorder));
    fx.manager.register_extension(Box::new(Broken));

    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save despite failing extension");
    let document = fx.store().read("work").expect("read");
    assert_eq!(document.extensions.len(), 1);
    assert_eq!(document.extensions["marks"], json!({"a": [1, 0]}));
    assert!(fx
        .host
        .notifications()
        .iter()
        .any(|note| note.level == NotifyLevel::Warn && note.message.contains("broken")));

    fx.manager
        .load(&mut fx.host, Some("work"), LoadOptions::default())
        .expect("load");
    assert_eq!(*loaded.borrow(), vec![json!({"a": [1, 0]})]);
}

#[test]
fn restore_is_flagged_and_rejects_reentry() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    let mut recorder = Recorder::new("probe", Some(json!(true)));
    recorder.flag = Some(fx.manager.loading_flag());
    let seen = Rc::clone(&recorder.loading_seen);
    fx.manager.register_extension(Box::new(recorder));

    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    fx.manager
        .load(&mut fx.host, Some("work"), LoadOptions::default())
        .expect("load");
    assert_eq!(*seen.borrow(), vec![true]);
    assert!(!fx.manager.is_loading());

    let flag = fx.manager.loading_flag();
    let _outer = LoadingGuard::enter(&flag).expect("first entry");
    let err = fx
        .manager
        .load(&mut fx.host, Some("work"), LoadOptions::default())
        .expect_err("nested restore");
    assert!(matches!(err, SessionError::Misuse(_)));
}

#[test]
fn reset_policies_decide_what_survives() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    fx.manager
        .save_tab(&mut fx.host, Some("solo"), SaveOptions::default())
        .expect("save tab");

    fx.host.new_tab().expect("tab");
    fx.manager
        .load(
            &mut fx.host,
            Some("work"),
            LoadOptions {
                reset: ResetPolicy::Always,
                ..LoadOptions::default()
            },
        )
        .expect("load");
    assert_eq!(fx.host.tabs().len(), 1);

    fx.manager
        .load(
            &mut fx.host,
            Some("work"),
            LoadOptions {
                reset: ResetPolicy::Never,
                ..LoadOptions::default()
            },
        )
        .expect("load");
    assert_eq!(fx.host.tabs().len(), 2);

    // Tab sessions open next to what is there.
    fx.manager
        .load(&mut fx.host, Some("solo"), LoadOptions::default())
        .expect("load tab");
    assert_eq!(fx.host.tabs().len(), 3);
    let info = fx.manager.current_info(&fx.host).expect("attached");
    assert!(info.tab_scoped);
}

#[test]
fn a_blank_tab_is_reused_instead_of_opening_another() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save_tab(&mut fx.host, Some("solo"), SaveOptions::default())
        .expect("save tab");

    let mut fresh = MemoryHost::new(Geometry::new(120, 40), fx.dir.path());
    fx.manager
        .load(&mut fresh, Some("solo"), LoadOptions::default())
        .expect("load");
    assert_eq!(fresh.tabs().len(), 1);
    let win = fresh.current_window();
    let buf = fresh.window_buffer(win).expect("buffer");
    assert!(fresh
        .buffer_info(buf)
        .expect("info")
        .name
        .ends_with("a.txt"));
}

#[test]
fn save_all_detaches_sessions_of_closed_tabs() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    let extra = fx.host.new_tab().expect("tab");
    fx.manager
        .save_tab(&mut fx.host, Some("solo"), SaveOptions::default())
        .expect("save tab");

    let saved = fx.manager.save_all(&mut fx.host, Some(false)).expect("save all");
    assert_eq!(saved, vec!["work".to_string(), "solo".to_string()]);

    fx.host.close_tab(extra).expect("close");
    let saved = fx.manager.save_all(&mut fx.host, Some(false)).expect("save all");
    assert_eq!(saved, vec!["work".to_string()]);
}

#[test]
fn save_all_keeps_going_past_a_failed_session() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    fx.host.new_tab().expect("tab");
    fx.manager
        .save_tab(&mut fx.host, Some("solo"), SaveOptions::default())
        .expect("save tab");

    let store = fx.store();
    let blocked = store.path_for("work").expect("path");
    fs::remove_file(&blocked).expect("remove");
    fs::create_dir(&blocked).expect("block with a directory");
    let solo = store.path_for("solo").expect("path");
    fs::remove_file(&solo).expect("remove");

    let saved = fx.manager.save_all(&mut fx.host, Some(false)).expect("save all");
    assert_eq!(saved, vec!["solo".to_string()]);
    assert!(solo.is_file());
    assert!(fx
        .messages()
        .iter()
        .any(|message| message.starts_with("failed to save session work")));
}

#[test]
fn autosave_waits_for_the_interval() {
    let mut fx = Fixture::with_config(|config| {
        config.autosave = AutosaveConfig {
            enabled: true,
            interval_seconds: 60,
            notify: false,
        };
    });
    let win = fx.open("a.txt", "a\n");
    let start = Instant::now();
    assert!(!fx.manager.autosave_tick(&mut fx.host, start).expect("tick"));

    fx.manager
        .save(
            &mut fx.host,
            Some("work"),
            SaveOptions {
                notify: Some(false),
                ..SaveOptions::default()
            },
        )
        .expect("save");
    assert!(!fx.manager.autosave_tick(&mut fx.host, start).expect("tick"));
    assert!(!fx
        .manager
        .autosave_tick(&mut fx.host, start + Duration::from_secs(30))
        .expect("tick"));

    fx.host
        .split_window(win, Orientation::Vertical)
        .expect("split");
    assert!(fx
        .manager
        .autosave_tick(&mut fx.host, start + Duration::from_secs(61))
        .expect("tick"));
    assert!(fx.host.notifications().is_empty());

    let document = fx.store().read("work").expect("read");
    assert!(matches!(document.tabs[0].layout, LayoutNode::Split { .. }));
}

#[test]
fn autosave_is_off_by_default() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    let start = Instant::now();
    fx.manager.autosave_tick(&mut fx.host, start).expect("tick");
    assert!(!fx
        .manager
        .autosave_tick(&mut fx.host, start + Duration::from_secs(3600))
        .expect("tick"));
}

#[test]
fn custom_filter_excludes_documents() {
    let mut fx = Fixture::new();
    fx.open("keep.txt", "k\n");
    let win = fx.host.current_window();
    let other = fx.host.split_window(win, Orientation::Horizontal).expect("split");
    let path = fx.dir.path().join("skip.log");
    fs::write(&path, "log\n").expect("write");
    fx.host.edit(other, &path).expect("edit");

    fx.manager.set_buffer_filter(Box::new(|host: &dyn Host, buf: BufferId| {
        host.buffer_info(buf)
            .map(|info| !info.name.ends_with(".log"))
            .unwrap_or(false)
    }));
    fx.manager
        .save(&mut fx.host, Some("work"), SaveOptions::default())
        .expect("save");
    let document = fx.store().read("work").expect("read");
    assert_eq!(document.documents.len(), 1);
    assert!(document.documents[0].name.ends_with("keep.txt"));
    assert_eq!(document.tabs[0].layout.leaves().len(), 2);
}

#[test]
fn list_detailed_describes_stored_sessions() {
    let mut fx = Fixture::new();
    fx.open("a.txt", "a\n");
    fx.manager
        .save(&mut fx.host, Some("b-global"), SaveOptions::default())
        .expect("save");
    fx.manager
        .save_tab(&mut fx.host, Some("a-tab"), SaveOptions::default())
        .expect("save tab");
    fs::write(fx.store().dir().join("broken.json"), "{").expect("write");

    let summaries = fx.manager.list_detailed(None).expect("list");
    let names: Vec<_> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a-tab", "b-global"]);
    assert!(summaries[0].tab_scoped);
    assert_eq!(summaries[1].tab_count, 1);
    assert_eq!(summaries[1].cwd, fx.dir.path());
}
