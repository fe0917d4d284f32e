mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::*;
use coral::prelude::*;

#[test]
fn test_bootstrap_subjects_and_root_role() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let security = session.security();

    let root = security.root_subject()?;
    let anonymous = security.anonymous_subject()?;
    assert_eq!(root.name(), "root");
    assert_eq!(anonymous.name(), "anonymous");

    let root_role = security.root_role()?;
    assert!(security.has_role(root.id(), root_role.id())?);
    assert!(security.is_superuser(root.id())?);
    assert!(!security.is_superuser(anonymous.id())?);

    let assignment = &security.role_assignments(root.id())?[0];
    assert!(assignment.granting_allowed);
    Ok(())
}

#[test]
fn test_entity_names_are_unique_and_renamable() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let security = session.security();

    let alice = security.create_subject("alice")?;
    assert!(matches!(
        security.create_subject("alice"),
        Err(CoralError::EntityExists {
            kind: EntityKind::Subject,
            ..
        })
    ));
    assert!(matches!(
        security.create_role(""),
        Err(CoralError::InvalidArgument(_))
    ));

    let renamed = security.rename_subject(alice.id(), "alicia")?;
    assert_eq!(renamed, alice);
    assert_eq!(security.subject_by_name("alicia")?.id(), alice.id());
    assert!(matches!(
        security.subject_by_name("alice"),
        Err(CoralError::EntityDoesNotExist { .. })
    ));
    assert!(matches!(
        security.rename_subject(security.root_subject()?.id(), "admin"),
        Err(CoralError::Security(_))
    ));
    Ok(())
}

#[test]
fn test_role_implication_closure() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let security = session.security();
    let admin = security.create_role("admin")?;
    let editor = security.create_role("editor")?;
    let viewer = security.create_role("viewer")?;

    security.add_sub_role(admin.id(), editor.id())?;
    security.add_sub_role(editor.id(), viewer.id())?;

    assert_eq!(
        security.implied_roles(admin.id())?,
        BTreeSet::from([admin.id(), editor.id(), viewer.id()])
    );
    assert_eq!(security.sub_roles(admin.id())?, vec![editor.clone()]);
    assert_eq!(security.super_roles(viewer.id())?, vec![editor.clone()]);

    assert!(matches!(
        security.add_sub_role(viewer.id(), admin.id()),
        Err(CoralError::CircularDependency(_))
    ));
    assert!(matches!(
        security.add_sub_role(admin.id(), admin.id()),
        Err(CoralError::CircularDependency(_))
    ));
    assert!(matches!(
        security.add_sub_role(admin.id(), editor.id()),
        Err(CoralError::EntityExists { .. })
    ));

    security.delete_sub_role(editor.id(), viewer.id())?;
    assert_eq!(
        security.implied_roles(admin.id())?,
        BTreeSet::from([admin.id(), editor.id()])
    );
    Ok(())
}

#[test]
fn test_grant_role_requires_granting_right() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let alice = root.security().create_subject("alice")?;
    let bob = root.security().create_subject("bob")?;
    let editor = root.security().create_role("editor")?;
    let viewer = root.security().create_role("viewer")?;
    root.security().add_sub_role(editor.id(), viewer.id())?;
    root.security().grant_role(editor.id(), alice.id(), true)?;

    let session = coral.session("alice")?;
    // alice holds editor, which implies viewer, with granting allowed
    session.security().grant_role(viewer.id(), bob.id(), false)?;
    assert!(session.security().has_role(bob.id(), viewer.id())?);
    assert_eq!(session.security().roles_of(bob.id())?, vec![viewer.clone()]);
    drop(session);

    let session = coral.session("bob")?;
    let carol = {
        root.make_current()?;
        let carol = root.security().create_subject("carol")?;
        session.make_current()?;
        carol
    };
    assert!(matches!(
        session.security().grant_role(viewer.id(), carol.id(), false),
        Err(CoralError::Security(_))
    ));
    assert!(matches!(
        session.security().revoke_role(viewer.id(), bob.id()),
        Err(CoralError::Security(_))
    ));
    Ok(())
}

#[test]
fn test_root_role_cannot_be_revoked_from_root() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let security = session.security();
    let root = security.root_subject()?;
    let root_role = security.root_role()?;

    assert!(matches!(
        security.revoke_role(root_role.id(), root.id()),
        Err(CoralError::Security(_))
    ));
    assert!(matches!(
        security.delete_role(root_role.id()),
        Err(CoralError::Security(_))
    ));
    Ok(())
}

#[test]
fn test_holding_root_role_makes_superuser() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let admin = root.security().create_subject("admin")?;
    let root_role = root.security().root_role()?;
    root.security().grant_role(root_role.id(), admin.id(), false)?;
    drop(root);

    let session = coral.session("admin")?;
    session.security().create_role("auditor")?;
    Ok(())
}

#[test]
fn test_permission_inheritance_down_the_tree() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let docs = doc_schema(&root)?;
    let store = root.store();
    let top = store.root_resource()?;
    let a = store.create_resource("a", top.id(), docs.folder.id(), BTreeMap::new())?;
    let b = store.create_resource("b", a.id(), docs.folder.id(), BTreeMap::new())?;
    let c = store.create_resource("c", b.id(), docs.document.id(), titled(&docs, "C"))?;

    let security = root.security();
    let alice = security.create_subject("alice")?;
    let editor = security.create_role("editor")?;
    let reviewer = security.create_role("reviewer")?;
    security.add_sub_role(editor.id(), reviewer.id())?;
    security.grant_role(editor.id(), alice.id(), false)?;

    // a grant without inheritance covers only the resource itself
    security.grant_permission(a.id(), reviewer.id(), docs.read.id(), false)?;
    assert!(security.has_permission(alice.id(), a.id(), docs.read.id())?);
    assert!(!security.has_permission(alice.id(), b.id(), docs.read.id())?);

    // an inherited grant covers the whole subtree
    security.grant_permission(b.id(), reviewer.id(), docs.write.id(), true)?;
    assert!(security.has_permission(alice.id(), b.id(), docs.write.id())?);
    assert!(security.has_permission(alice.id(), c.id(), docs.write.id())?);
    assert!(!security.has_permission(alice.id(), a.id(), docs.write.id())?);

    let anonymous = security.anonymous_subject()?;
    assert!(!security.has_permission(anonymous.id(), c.id(), docs.write.id())?);
    assert!(security.has_permission(security.root_subject()?.id(), c.id(), docs.write.id())?);

    assert_eq!(security.permission_assignments(b.id())?.len(), 1);
    security.revoke_permission(b.id(), reviewer.id(), docs.write.id())?;
    assert!(!security.has_permission(alice.id(), c.id(), docs.write.id())?);
    Ok(())
}

#[test]
fn test_grant_permission_checks_association_and_authority() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let docs = doc_schema(&root)?;
    let top = root.store().root_resource()?;
    let folder = root
        .store()
        .create_resource("f", top.id(), docs.folder.id(), BTreeMap::new())?;
    let editor = root.security().create_role("editor")?;
    let delete = root.security().create_permission("delete")?;
    root.security().create_subject("alice")?;

    assert!(matches!(
        root.security()
            .grant_permission(folder.id(), editor.id(), delete.id(), false),
        Err(CoralError::InvalidArgument(_))
    ));
    root.security()
        .grant_permission(folder.id(), editor.id(), docs.read.id(), false)?;
    assert!(matches!(
        root.security()
            .grant_permission(folder.id(), editor.id(), docs.read.id(), true),
        Err(CoralError::EntityExists { .. })
    ));

    let alice = coral.session("alice")?;
    assert!(matches!(
        alice
            .security()
            .grant_permission(folder.id(), editor.id(), docs.write.id(), false),
        Err(CoralError::Security(_))
    ));

    // owners may grant on their own resources
    let own = alice
        .store()
        .create_resource("mine", top.id(), docs.folder.id(), BTreeMap::new())?;
    alice
        .security()
        .grant_permission(own.id(), editor.id(), docs.write.id(), true)?;
    Ok(())
}

#[test]
fn test_referenced_entities_cannot_be_deleted() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let docs = doc_schema(&root)?;
    let security = root.security();
    let alice = security.create_subject("alice")?;
    let editor = security.create_role("editor")?;
    security.grant_role(editor.id(), alice.id(), false)?;

    assert!(matches!(
        security.delete_role(editor.id()),
        Err(CoralError::EntityInUse { .. })
    ));
    assert!(matches!(
        security.delete_permission(docs.read.id()),
        Err(CoralError::EntityInUse { .. })
    ));

    // deleting the subject revokes its roles
    security.delete_subject(alice.id())?;
    security.delete_role(editor.id())?;
    assert!(security.role_by_name("editor").is_err());
    Ok(())
}

#[test]
fn test_subject_owning_resources_is_in_use() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let docs = doc_schema(&root)?;
    let alice_subject = root.security().create_subject("alice")?;
    let top = root.store().root_resource()?;

    let alice = coral.session("alice")?;
    let folder = alice
        .store()
        .create_resource("f", top.id(), docs.folder.id(), BTreeMap::new())?;
    drop(alice);

    root.make_current()?;
    assert!(matches!(
        root.security().delete_subject(alice_subject.id()),
        Err(CoralError::EntityInUse { .. })
    ));
    root.store().delete_resource(folder.id())?;
    root.security().delete_subject(alice_subject.id())?;
    Ok(())
}

#[test]
fn test_subject_in_audit_fields_or_grants_is_in_use() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let docs = doc_schema(&root)?;
    let alice_subject = root.security().create_subject("alice")?;
    let bob = root.security().create_subject("bob")?;
    let editor = root.security().create_role("editor")?;
    root.security().grant_role(editor.id(), alice_subject.id(), true)?;
    let top = root.store().root_resource()?;

    let alice = coral.session("alice")?;
    let folder = alice
        .store()
        .create_resource("f", top.id(), docs.folder.id(), BTreeMap::new())?;
    alice.security().grant_role(editor.id(), bob.id(), false)?;
    drop(alice);

    root.make_current()?;
    let folder = root.store().set_owner(folder.id(), root.subject_id())?;
    assert_eq!(folder.created_by(), alice_subject.id());
    // alice no longer owns it but is still its creator
    assert!(matches!(
        root.security().delete_subject(alice_subject.id()),
        Err(CoralError::EntityInUse { .. })
    ));
    root.store().delete_resource(folder.id())?;
    // and she granted bob his role
    assert!(matches!(
        root.security().delete_subject(alice_subject.id()),
        Err(CoralError::EntityInUse { .. })
    ));
    root.security().revoke_role(editor.id(), bob.id())?;
    root.security().delete_subject(alice_subject.id())?;
    assert!(root.security().subject_by_name("alice").is_err());
    Ok(())
}

#[test]
fn test_principals_held_in_attribute_values_are_in_use() -> CoralResult<()> {
    let coral = temp_coral();
    let root = coral.root_session()?;
    let schema = root.schema();
    let profile = schema.create_resource_class("profile", "", ResourceClassFlags::NONE)?;
    let define = |name: &str, value_type: AttributeType| -> CoralResult<AttributeDefinitionId> {
        let class = schema.attribute_class_for(value_type)?;
        let attribute = schema.add_attribute(
            profile.id(),
            NewAttribute::builder()
                .name(name)
                .attribute_class(class.id())
                .build(),
        )?;
        Ok(attribute.id())
    };
    let person = define("person", AttributeType::Subject)?;
    let duty = define("duty", AttributeType::Role)?;
    let right = define("right", AttributeType::Permission)?;

    let security = root.security();
    let carol = security.create_subject("carol")?;
    let auditor = security.create_role("auditor")?;
    let audit = security.create_permission("audit")?;
    let top = root.store().root_resource()?;
    let card = root.store().create_resource(
        "card",
        top.id(),
        profile.id(),
        BTreeMap::from([
            (person, AttributeValue::Subject(carol.id())),
            (duty, AttributeValue::Role(auditor.id())),
            (right, AttributeValue::Permission(audit.id())),
        ]),
    )?;

    assert!(matches!(
        security.delete_subject(carol.id()),
        Err(CoralError::EntityInUse { .. })
    ));
    assert!(matches!(
        security.delete_role(auditor.id()),
        Err(CoralError::EntityInUse { .. })
    ));
    assert!(matches!(
        security.delete_permission(audit.id()),
        Err(CoralError::EntityInUse { .. })
    ));

    root.store().delete_resource(card.id())?;
    security.delete_subject(carol.id())?;
    security.delete_role(auditor.id())?;
    security.delete_permission(audit.id())?;
    Ok(())
}

#[test]
fn test_non_superusers_cannot_manage_principals() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.anonymous_session()?;
    assert!(matches!(
        session.security().create_subject("eve"),
        Err(CoralError::Security(_))
    ));
    assert!(matches!(
        session.security().create_permission("steal"),
        Err(CoralError::Security(_))
    ));
    Ok(())
}
