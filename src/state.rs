//! The in-memory state of a Coral instance, shared by all of its sessions.

use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use crate::config::CoralConfig;
use crate::databases::SledStore;
use crate::entity::{AttributeClassId, ResourceClassId, ResourceId, RoleId, SubjectId};
use crate::error::{CoralError, CoralResult, EntityKind};
use crate::event::CoralEvent;
use crate::schema::state::SchemaState;
use crate::schema::{AttributeClass, AttributeType, ResourceClass, ResourceClassFlags};
use crate::security::state::SecurityState;
use crate::security::{Role, RoleAssignment, Subject};
use crate::store::Resource;
use crate::store::state::StoreState;
use crate::utils::datetime::now;

/// Name of the built-in class of the root resource
pub const NODE_CLASS: &str = "coral.Node";

/// Name of the root resource
pub const ROOT_RESOURCE: &str = "root";

/// Ids of the entities every database is bootstrapped with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Builtins {
    pub root_subject: SubjectId,
    pub anonymous_subject: SubjectId,
    pub root_role: RoleId,
    pub root_resource: ResourceId,
    pub node_class: ResourceClassId,
}

pub(crate) struct CoralState {
    db: SledStore,
    pub schema: SchemaState,
    pub security: SecurityState,
    pub store: StoreState,
    pub builtins: Builtins,
    pending: Vec<CoralEvent>,
}

impl CoralState {
    /// Load every tree of `db`, bootstrapping it first if it is empty.
    pub fn load(db: SledStore, config: &CoralConfig) -> CoralResult<Self> {
        let mut schema = SchemaState::load(&db)?;
        let mut security = SecurityState::load(&db)?;
        let mut store = StoreState::load(&db)?;

        let builtins = if security.subjects.is_empty() {
            let builtins = bootstrap(&db, config, &mut schema, &mut security, &mut store)?;
            schema.commit()?;
            security.commit()?;
            store.commit()?;
            db.flush()?;
            builtins
        } else {
            resolve_builtins(config, &schema, &security, &store)?
        };

        Ok(Self {
            db,
            schema,
            security,
            store,
            builtins,
            pending: Vec::new(),
        })
    }

    pub fn next_id(&self) -> CoralResult<u64> {
        self.db.generate_id()
    }

    /// Queue an event to be fired once the current mutation completes
    pub fn emit(&mut self, event: CoralEvent) {
        self.pending.push(event);
    }

    pub fn take_events(&mut self) -> Vec<CoralEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Persist every change made since the last commit.
    ///
    /// Each tree is written as one batch.
    pub fn commit(&mut self) -> CoralResult<()> {
        self.schema.commit()?;
        self.security.commit()?;
        self.store.commit()
    }

    /// Undo every uncommitted change and drop the queued events
    pub fn rollback(&mut self) {
        self.schema.rollback();
        self.security.rollback();
        self.store.rollback();
        self.pending.clear();
    }

    /// The root subject, or any subject holding the root role
    pub fn is_superuser(&self, subject: SubjectId) -> bool {
        subject == self.builtins.root_subject
            || self
                .security
                .effective_roles(subject)
                .contains(&self.builtins.root_role)
    }

    pub fn require_superuser(&self, subject: SubjectId, action: &str) -> CoralResult<()> {
        if self.is_superuser(subject) {
            Ok(())
        } else {
            Err(CoralError::Security(format!(
                "subject {subject} may not {action}"
            )))
        }
    }
}

fn bootstrap(
    db: &SledStore,
    config: &CoralConfig,
    schema: &mut SchemaState,
    security: &mut SecurityState,
    store: &mut StoreState,
) -> CoralResult<Builtins> {
    log::info!("bootstrapping new coral database");

    for value_type in AttributeType::iter() {
        let class = AttributeClass::builtin(AttributeClassId(db.generate_id()?), value_type);
        schema.attribute_classes.insert(class)?;
    }

    let node_class = ResourceClassId(db.generate_id()?);
    schema.resource_classes.insert(ResourceClass::new(
        node_class,
        NODE_CLASS,
        "",
        ResourceClassFlags::BUILTIN,
    ))?;

    let root_subject = SubjectId(db.generate_id()?);
    security
        .subjects
        .insert(Subject::new(root_subject, config.root_subject.as_str()))?;
    let anonymous_subject = SubjectId(db.generate_id()?);
    security.subjects.insert(Subject::new(
        anonymous_subject,
        config.anonymous_subject.as_str(),
    ))?;

    let root_role = RoleId(db.generate_id()?);
    security
        .roles
        .insert(Role::new(root_role, config.root_role.as_str()))?;
    security.role_assignments.insert(RoleAssignment {
        subject: root_subject,
        role: root_role,
        grantor: root_subject,
        granting_allowed: true,
        grant_time: now(),
    })?;

    let root_resource = ResourceId(db.generate_id()?);
    let created = now();
    store.insert(Resource {
        id: root_resource,
        name: ROOT_RESOURCE.to_owned(),
        resource_class: node_class,
        parent: None,
        owner: root_subject,
        created_by: root_subject,
        creation_time: created,
        modified_by: root_subject,
        modification_time: created,
        attributes: BTreeMap::new(),
    })?;

    Ok(Builtins {
        root_subject,
        anonymous_subject,
        root_role,
        root_resource,
        node_class,
    })
}

fn resolve_builtins(
    config: &CoralConfig,
    schema: &SchemaState,
    security: &SecurityState,
    store: &StoreState,
) -> CoralResult<Builtins> {
    let root_resource = store
        .iter()
        .find(|r| r.parent.is_none())
        .map(|r| r.id)
        .ok_or_else(|| CoralError::missing(EntityKind::Resource, ROOT_RESOURCE))?;
    log::info!(
        "opened coral database with {} subjects and {} resources",
        security.subjects.len(),
        store.len()
    );
    Ok(Builtins {
        root_subject: security.subjects.get_by_name(&config.root_subject)?.id(),
        anonymous_subject: security
            .subjects
            .get_by_name(&config.anonymous_subject)?
            .id(),
        root_role: security.roles.get_by_name(&config.root_role)?.id(),
        root_resource,
        node_class: schema.resource_classes.get_by_name(NODE_CLASS)?.id(),
    })
}
