//! Integration tests: dirty tracking across nested observable graphs.
//!
//! Validates:
//! 1. A change on a leaf marks every owner up the chain dirty.
//! 2. Construction-time changes never mark a fresh entity dirty.
//! 3. Sticky flag, non-sticky delivery: every change reaches listeners while
//!    the flag flips once per dirty period.
//! 4. Deferred entity listeners run on the UI queue thread only.
//! 5. Teardown: `stop_observing` and entity drop detach forwarders.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;

use ctrack_core::{Dispatch, Registry, UiQueue, UiQueueConfig};
use ctrack_harness::{ManualQueue, RecordingListener};
use ctrack_runtime::{DirtyState, Property, TrackedEntity};

/// A document with a title and a nested section, wired the way a loader
/// would: fields assigned, children observed, then initialized.
struct Document {
    entity: TrackedEntity<&'static str>,
    title: Property<String>,
    section: Section,
}

struct Section {
    entity: TrackedEntity<&'static str>,
    body: Property<String>,
}

impl Section {
    fn load(exec: &Arc<ManualQueue>, body: &str) -> Self {
        let entity = TrackedEntity::new(exec.clone(), "section");
        let prop = Property::new(exec.clone(), String::new());
        entity.observe(prop.registry()).unwrap();
        prop.set(body.to_string());
        entity.mark_initialized();
        Self { entity, body: prop }
    }
}

impl Document {
    fn load(exec: &Arc<ManualQueue>, title: &str, body: &str) -> Self {
        let entity = TrackedEntity::new(exec.clone(), "document");
        let title_prop = Property::new(exec.clone(), String::new());
        entity.observe(title_prop.registry()).unwrap();
        let section = Section::load(exec, body);
        entity.observe(section.entity.registry()).unwrap();
        title_prop.set(title.to_string());
        entity.mark_initialized();
        Self {
            entity,
            title: title_prop,
            section,
        }
    }
}

#[test]
fn freshly_loaded_document_is_clean() {
    let exec = Arc::new(ManualQueue::new());
    let doc = Document::load(&exec, "Title", "Body");
    assert!(!doc.entity.is_modified());
    assert!(!doc.section.entity.is_modified());
    assert_eq!(doc.entity.state(), DirtyState::CleanInitialized);
    assert_eq!(doc.title.get(), "Title");
}

#[test]
fn leaf_change_dirties_every_owner() {
    let exec = Arc::new(ManualQueue::new());
    let doc = Document::load(&exec, "Title", "Body");

    doc.section.body.set("Edited".into());
    assert!(doc.section.entity.is_modified());
    assert!(doc.entity.is_modified());
}

#[test]
fn sibling_change_leaves_nested_section_clean() {
    let exec = Arc::new(ManualQueue::new());
    let doc = Document::load(&exec, "Title", "Body");

    doc.title.set("Renamed".into());
    assert!(doc.entity.is_modified());
    assert!(!doc.section.entity.is_modified());
}

#[test]
fn forwarding_without_direct_listener() {
    let exec = Arc::new(ManualQueue::new());
    let parent = TrackedEntity::new(exec.clone(), "parent");
    let child: Registry<u64> = Registry::new(exec.clone());
    parent.observe(&child).unwrap();
    parent.mark_initialized();

    assert!(parent.registry().is_empty());
    child.notify(1);
    assert!(parent.is_modified());
}

#[test]
fn every_change_is_delivered_but_flag_flips_once() {
    let exec = Arc::new(ManualQueue::new());
    let doc = Document::load(&exec, "Title", "Body");
    let rec = RecordingListener::shared();
    doc.entity
        .registry()
        .register(rec.handle(), Dispatch::Immediate)
        .unwrap();

    doc.title.set("a".into());
    doc.title.set("b".into());
    doc.section.body.set("c".into());

    assert_eq!(rec.count(), 3);
    assert_eq!(rec.payloads(), vec!["document"; 3]);
    assert_eq!(doc.entity.dirty_transitions(), 1);

    doc.entity.saved();
    assert!(!doc.entity.is_modified());
    // The section was never saved, so it stays dirty on its own.
    assert!(doc.section.entity.is_modified());

    doc.section.body.set("d".into());
    assert!(doc.entity.is_modified());
    assert_eq!(doc.entity.dirty_transitions(), 2);
    assert_eq!(rec.count(), 4);
}

#[test]
fn changes_before_initialization_produce_no_notifications() {
    let exec = Arc::new(ManualQueue::new());
    let entity = TrackedEntity::new(exec.clone(), 99u32);
    let rec = RecordingListener::shared();
    entity
        .registry()
        .register(rec.handle(), Dispatch::Immediate)
        .unwrap();
    entity
        .registry()
        .register(rec.handle(), Dispatch::Deferred)
        .unwrap();
    let field = Property::new(exec.clone(), 0i64);
    entity.observe(field.registry()).unwrap();

    field.set(10);
    field.set(20);
    entity.touch();
    exec.run_pending();

    assert!(!entity.is_modified());
    assert_eq!(rec.count(), 0);
    assert_eq!(entity.registry().stats().suppressed, 3);
}

#[test]
fn stop_observing_detaches_child() {
    let exec = Arc::new(ManualQueue::new());
    let doc = Document::load(&exec, "Title", "Body");
    assert!(doc.entity.stop_observing(doc.title.registry()));
    assert!(!doc.entity.stop_observing(doc.title.registry()));

    doc.title.set("Unwatched".into());
    assert!(!doc.entity.is_modified());
}

#[test]
fn dropped_owner_is_not_notified() {
    let exec = Arc::new(ManualQueue::new());
    let body = Property::new(exec.clone(), String::from("x"));
    {
        let owner = TrackedEntity::new(exec.clone(), "owner");
        owner.observe(body.registry()).unwrap();
        owner.mark_initialized();
        assert_eq!(body.registry().len(), 1);
    }
    assert!(body.registry().is_empty());
    assert!(body.set("y".into()));
    assert_eq!(body.registry().stats().listener_panics, 0);
}

#[test]
fn deferred_entity_listeners_run_on_ui_thread() {
    let ui = Arc::new(
        UiQueue::with_config(UiQueueConfig::default().with_thread_name("entity-ui"))
            .expect("spawn ui queue"),
    );
    let entity = TrackedEntity::new(ui.clone(), "doc");
    let field = Property::new(ui.clone(), 0u8);
    entity.observe(field.registry()).unwrap();
    entity.mark_initialized();

    let ui_rec = RecordingListener::shared();
    let inline_rec = RecordingListener::shared();
    entity
        .registry()
        .register(ui_rec.handle(), Dispatch::Deferred)
        .unwrap();
    entity
        .registry()
        .register(inline_rec.handle(), Dispatch::Immediate)
        .unwrap();

    let worker = thread::spawn({
        let field = Arc::new(field);
        move || {
            for v in 1..=5u8 {
                field.set(v);
            }
            thread::current().id()
        }
    });
    let worker_id = worker.join().unwrap();

    ui.wait_idle().unwrap();
    assert!(entity.is_modified());
    assert_eq!(inline_rec.count(), 5);
    assert!(inline_rec.all_on(worker_id));
    assert_eq!(ui_rec.count(), 5);
    assert!(ui_rec.all_on(ui.thread_id()));
    ui.shutdown();
}
