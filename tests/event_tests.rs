mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::*;
use coral::event::ChannelTransport;
use coral::prelude::*;

#[test]
fn test_resource_creation_is_anchored_on_class() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let docs = doc_schema(&session)?;
    let board = session.event()?;
    let on_documents = recorder(
        board,
        EventKind::ResourceCreation,
        docs.document.id().into(),
    );
    let on_folders = recorder(board, EventKind::ResourceCreation, docs.folder.id().into());

    let root = session.store().root_resource()?;
    let doc = session
        .store()
        .create_resource("d", root.id(), docs.document.id(), titled(&docs, "D"))?;

    assert_eq!(
        *on_documents.lock().unwrap(),
        vec![CoralEvent::ResourceCreation {
            resource: doc.id(),
            resource_class: docs.document.id(),
        }]
    );
    assert!(on_folders.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_role_assignment_reaches_subject_and_role_listeners() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let security = session.security();
    let alice = security.create_subject("alice")?;
    let editor = security.create_role("editor")?;

    let board = session.event()?;
    let by_subject = recorder(board, EventKind::RoleAssignmentChange, alice.id().into());
    let by_role = recorder(board, EventKind::RoleAssignmentChange, editor.id().into());
    let by_any = recorder(board, EventKind::RoleAssignmentChange, Anchor::Any);

    security.grant_role(editor.id(), alice.id(), false)?;
    security.revoke_role(editor.id(), alice.id())?;

    assert_eq!(by_subject.lock().unwrap().len(), 2);
    assert_eq!(by_role.lock().unwrap().len(), 2);
    let all = by_any.lock().unwrap();
    assert_eq!(
        *all,
        vec![
            CoralEvent::RoleAssignmentChange {
                subject: alice.id(),
                role: editor.id(),
                added: true,
            },
            CoralEvent::RoleAssignmentChange {
                subject: alice.id(),
                role: editor.id(),
                added: false,
            },
        ]
    );
    Ok(())
}

#[test]
fn test_failed_mutation_fires_nothing() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let docs = doc_schema(&session)?;
    let seen = recorder(session.event()?, EventKind::ResourceCreation, Anchor::Any);

    let root = session.store().root_resource()?;
    let result = session
        .store()
        .create_resource("d", root.id(), docs.document.id(), BTreeMap::new());
    assert!(result.is_err());
    assert!(seen.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_delete_tree_reports_every_deletion() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let docs = doc_schema(&session)?;
    let store = session.store();
    let root = store.root_resource()?;
    let a = store.create_resource("a", root.id(), docs.folder.id(), BTreeMap::new())?;
    store.create_resource("b", a.id(), docs.folder.id(), BTreeMap::new())?;

    let board = session.event()?;
    let deletions = recorder(board, EventKind::ResourceDeletion, docs.folder.id().into());
    let trees = recorder(board, EventKind::ResourceTreeDeletion, a.id().into());

    store.delete_tree(a.id())?;
    assert_eq!(deletions.lock().unwrap().len(), 2);
    assert_eq!(
        *trees.lock().unwrap(),
        vec![CoralEvent::ResourceTreeDeletion { root: a.id() }]
    );
    Ok(())
}

#[test]
fn test_listener_may_call_back_into_coral() -> CoralResult<()> {
    let coral = temp_coral();
    let session = Arc::new(coral.root_session()?);
    let docs = doc_schema(&session)?;
    let observed_paths = Arc::new(Mutex::new(Vec::new()));

    let listener: ListenerRef = {
        let session = session.clone();
        let observed_paths = observed_paths.clone();
        Arc::new(move |event: &CoralEvent| {
            if let CoralEvent::ResourceCreation { resource, .. } = event {
                let path = session.store().path(*resource).unwrap();
                observed_paths.lock().unwrap().push(path);
            }
        })
    };
    session
        .event()?
        .add_listener(EventKind::ResourceCreation, listener.clone(), Anchor::Any);

    let root = session.store().root_resource()?;
    session
        .store()
        .create_resource("inbox", root.id(), docs.folder.id(), BTreeMap::new())?;
    assert_eq!(*observed_paths.lock().unwrap(), vec!["/inbox".to_owned()]);

    // break the session <-> listener cycle
    session.event()?.remove_listener_everywhere(&listener);
    Ok(())
}

#[test]
fn test_local_and_inbound_events_meet_on_global() -> CoralResult<()> {
    let coral = temp_coral();
    let hub = coral.event_hub();
    let global = Arc::new(AtomicUsize::new(0));
    let outbound = Arc::new(AtomicUsize::new(0));
    for (board, counter) in [(hub.global(), &global), (hub.outbound(), &outbound)] {
        let counter = counter.clone();
        board.add_listener_for_all(
            Arc::new(move |_: &CoralEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Anchor::Any,
        );
    }

    let session = coral.root_session()?;
    session.security().create_role("editor")?;
    hub.inbound().fire(&CoralEvent::RoleChange { role: RoleId(99) });

    assert_eq!(global.load(Ordering::SeqCst), 2);
    assert_eq!(outbound.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_bridge_carries_events_between_instances() -> CoralResult<()> {
    let left = temp_coral();
    let right = temp_coral();
    let (to_right, right_rx) = ChannelTransport::pair();
    let (to_left, left_rx) = ChannelTransport::pair();
    let left_bridge = left.attach_bridge(1, Arc::new(to_right));
    let right_bridge = right.attach_bridge(2, Arc::new(to_left));

    let heard = recorder(right.event_hub().global(), EventKind::SubjectChange, Anchor::Any);
    let right_inbound = recorder(right.event_hub().inbound(), EventKind::SubjectChange, Anchor::Any);

    let session = left.root_session()?;
    let alice = session.security().create_subject("alice")?;

    assert_eq!(left_bridge.sent(), 1);
    assert_eq!(right_bridge.pump(&right_rx)?, 1);
    assert_eq!(
        *heard.lock().unwrap(),
        vec![CoralEvent::SubjectChange {
            subject: alice.id()
        }]
    );
    assert_eq!(right_inbound.lock().unwrap().len(), 1);

    // nothing is echoed back to the sender
    assert_eq!(right_bridge.sent(), 0);
    assert_eq!(left_bridge.pump(&left_rx)?, 0);
    Ok(())
}
