use crate::acl::ObjectType;
use crate::acl::permission::{CAN_READ, CAN_WRITE};
use crate::error::SparseError;
use crate::types::value::PropertyMap;
use std::collections::{BTreeMap, BTreeSet};

/// Per-property deny sets for one subject at one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAcl {
    object_type: ObjectType,
    path: String,
    read_denied: BTreeSet<String>,
    write_denied: BTreeSet<String>,
}

impl PropertyAcl {
    /// No restrictions; what admins get.
    pub fn unrestricted(object_type: ObjectType, path: &str) -> Self {
        Self {
            object_type,
            path: path.to_string(),
            read_denied: BTreeSet::new(),
            write_denied: BTreeSet::new(),
        }
    }

    /// Builds the deny sets from per-property `(granted, denied)` bits. A bit
    /// counts as denied only when no held principal grants it.
    pub fn from_bits(
        object_type: ObjectType,
        path: &str,
        bits: &BTreeMap<String, (i32, i32)>,
    ) -> Self {
        let mut acl = Self::unrestricted(object_type, path);
        for (property, (granted, denied)) in bits {
            let effective = denied & !granted;
            if CAN_READ.is_contained_in(effective) {
                acl.read_denied.insert(property.clone());
            }
            if CAN_WRITE.is_contained_in(effective) {
                acl.write_denied.insert(property.clone());
            }
        }
        acl
    }

    pub fn read_denied(&self) -> &BTreeSet<String> {
        &self.read_denied
    }

    pub fn write_denied(&self) -> &BTreeSet<String> {
        &self.write_denied
    }

    pub fn can_read(&self, property: &str) -> bool {
        !self.read_denied.contains(property)
    }

    pub fn can_write(&self, property: &str) -> bool {
        !self.write_denied.contains(property)
    }

    /// Copy of `map` without properties the subject may not read.
    pub fn filter_readable(&self, map: &PropertyMap) -> PropertyMap {
        map.iter()
            .filter(|(name, _)| self.can_read(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Fails on the first property in `map` the subject may not write.
    pub fn check_writable(&self, map: &PropertyMap) -> Result<(), SparseError> {
        match map.keys().find(|name| !self.can_write(name)) {
            Some(name) => Err(SparseError::AccessDenied {
                object_type: self.object_type.to_string(),
                path: format!("{}@{name}", self.path),
                permission: CAN_WRITE.to_string(),
            }),
            None => Ok(()),
        }
    }
}
