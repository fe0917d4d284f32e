// Common test utilities and helpers
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use coral::prelude::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Open a temporary instance
pub fn temp_coral() -> Coral {
    init_logging();
    Coral::temp().expect("open temporary coral")
}

/// A small document schema used across the integration tests.
///
/// `folder` has no attributes. `document` declares a required `title` and an
/// optional `pages` count.
pub struct DocSchema {
    pub folder: ResourceClass,
    pub document: ResourceClass,
    pub title: AttributeDefinition,
    pub pages: AttributeDefinition,
    pub read: Permission,
    pub write: Permission,
}

pub fn doc_schema(session: &CoralSession) -> CoralResult<DocSchema> {
    let schema = session.schema();
    let folder = schema.create_resource_class("folder", "folders", ResourceClassFlags::NONE)?;
    let document = schema.create_resource_class("document", "documents", ResourceClassFlags::NONE)?;
    let string = schema.attribute_class_for(AttributeType::String)?;
    let integer = schema.attribute_class_for(AttributeType::Integer)?;
    let title = schema.add_attribute(
        document.id(),
        NewAttribute::builder()
            .name("title")
            .attribute_class(string.id())
            .flags(AttributeFlags::REQUIRED)
            .build(),
    )?;
    let pages = schema.add_attribute(
        document.id(),
        NewAttribute::builder()
            .name("pages")
            .attribute_class(integer.id())
            .build(),
    )?;

    let security = session.security();
    let read = security.create_permission("read")?;
    let write = security.create_permission("write")?;
    for class in [folder.id(), document.id()] {
        schema.add_class_permission(class, read.id())?;
        schema.add_class_permission(class, write.id())?;
    }

    Ok(DocSchema {
        folder,
        document,
        title,
        pages,
        read,
        write,
    })
}

pub fn titled(schema: &DocSchema, title: &str) -> BTreeMap<AttributeDefinitionId, AttributeValue> {
    BTreeMap::from([(schema.title.id(), AttributeValue::String(title.to_owned()))])
}

/// Collect every event of `kind` delivered on `anchor`
pub fn recorder(
    board: &EventWhiteboard,
    kind: EventKind,
    anchor: Anchor,
) -> Arc<Mutex<Vec<CoralEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    board.add_listener(
        kind,
        Arc::new(move |event: &CoralEvent| sink.lock().unwrap().push(event.clone())),
        anchor,
    );
    seen
}
