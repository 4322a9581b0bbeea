//! Parsing of OpenNebula pool documents into platform types.

use std::collections::{BTreeMap, BTreeSet};

use xot::Node;

use super::xml::XmlDocument;
use crate::error::{Error, Result};
use crate::platform::{TargetGroup, TargetUser, Workload, WorkloadState};

/// Parses a `GROUP_POOL` document.
pub fn parse_group_pool(xml: &str) -> Result<Vec<TargetGroup>> {
    let doc = pool_document(xml, "GROUP_POOL")?;
    doc.children_named(doc.root(), "GROUP")
        .map(|group| {
            Ok(TargetGroup::new(
                doc.required_int(group, "ID")?,
                doc.required_text(group, "NAME")?,
            ))
        })
        .collect()
}

/// Parses a `USER_POOL` document.
pub fn parse_user_pool(xml: &str) -> Result<Vec<TargetUser>> {
    let doc = pool_document(xml, "USER_POOL")?;
    doc.children_named(doc.root(), "USER")
        .map(|user| user_from(&doc, user))
        .collect()
}

/// Parses the `USER` document returned by `one.user.info`.
pub fn parse_user(xml: &str) -> Result<TargetUser> {
    let doc = pool_document(xml, "USER")?;
    user_from(&doc, doc.root())
}

/// Parses a `VM_POOL` document.
pub fn parse_vm_pool(xml: &str) -> Result<Vec<Workload>> {
    let doc = pool_document(xml, "VM_POOL")?;
    doc.children_named(doc.root(), "VM")
        .map(|vm| {
            Ok(Workload {
                id: doc.required_int(vm, "ID")?,
                owner_id: doc.required_int(vm, "UID")?,
                name: doc.child_text(vm, "NAME").unwrap_or_default(),
                state: WorkloadState::from_code(doc.required_int(vm, "STATE")?),
            })
        })
        .collect()
}

fn pool_document(xml: &str, root: &str) -> Result<XmlDocument> {
    let doc = XmlDocument::parse(xml)?;
    match doc.name(doc.root()) {
        Some(name) if name == root => Ok(doc),
        other => Err(Error::protocol(format!(
            "expected <{}>, got <{}>",
            root,
            other.unwrap_or("?")
        ))),
    }
}

fn user_from(doc: &XmlDocument, user: Node) -> Result<TargetUser> {
    let primary_group_id = doc.required_int(user, "GID")?;
    let mut group_ids = BTreeSet::from([primary_group_id]);
    if let Some(groups) = doc.child(user, "GROUPS") {
        for id in doc.children_named(groups, "ID") {
            let text = doc.text(id);
            let gid = text
                .trim()
                .parse()
                .map_err(|_| Error::protocol(format!("bad group ID {:?}", text)))?;
            group_ids.insert(gid);
        }
    }

    let properties: BTreeMap<String, String> = match doc.child(user, "TEMPLATE") {
        Some(template) => doc
            .elements(template)
            .filter_map(|item| doc.name(item).map(|name| (name.to_string(), doc.text(item))))
            .collect(),
        None => BTreeMap::new(),
    };

    Ok(TargetUser {
        id: doc.required_int(user, "ID")?,
        name: doc.required_text(user, "NAME")?,
        auth_driver: doc.child_text(user, "AUTH_DRIVER").unwrap_or_default(),
        password: doc.child_text(user, "PASSWORD").unwrap_or_default(),
        primary_group_id,
        group_ids,
        properties,
    })
}
