//! Filter evaluation over an in-memory collection of JSON documents.
//!
//! Shared by the memory and file stores; callers hold the collection lock.

use super::{Document, Filter};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub(crate) type Collection = BTreeMap<Uuid, Value>;

fn decode<D: Document>(value: &Value) -> Result<D> {
    Ok(serde_json::from_value(value.clone())?)
}

/// All documents matching `filter`, in id order
pub(crate) fn scan<D: Document>(collection: &Collection, filter: &Filter) -> Result<Vec<D>> {
    if let Some(id) = filter.id {
        return match collection.get(&id) {
            Some(value) => {
                let doc = decode::<D>(value)?;
                Ok(if filter.matches(&doc) { vec![doc] } else { Vec::new() })
            }
            None => Ok(Vec::new()),
        };
    }

    let mut docs = Vec::new();
    for value in collection.values() {
        let doc = decode::<D>(value)?;
        if filter.matches(&doc) {
            docs.push(doc);
        }
    }
    Ok(docs)
}

pub(crate) fn insert<D: Document>(collection: &mut Collection, doc: &D) -> Result<()> {
    let id = doc.id();
    if collection.contains_key(&id) {
        return Err(Error::Store(format!(
            "{} {} already exists",
            D::COLLECTION,
            id
        )));
    }
    collection.insert(id, serde_json::to_value(doc)?);
    Ok(())
}

pub(crate) fn update_first<D, F>(collection: &mut Collection, filter: &Filter, mutation: F) -> Result<u64>
where
    D: Document,
    F: FnOnce(&mut D) -> Result<()>,
{
    let Some(mut doc) = scan::<D>(collection, filter)?.into_iter().next() else {
        return Ok(0);
    };
    let id = doc.id();
    mutation(&mut doc)?;
    if doc.id() != id {
        return Err(Error::Store(format!(
            "mutation changed the id of {} {}",
            D::COLLECTION,
            id
        )));
    }
    collection.insert(id, serde_json::to_value(&doc)?);
    Ok(1)
}

pub(crate) fn delete_first<D: Document>(collection: &mut Collection, filter: &Filter) -> Result<u64> {
    let Some(doc) = scan::<D>(collection, filter)?.into_iter().next() else {
        return Ok(0);
    };
    Ok(u64::from(collection.remove(&doc.id()).is_some()))
}
