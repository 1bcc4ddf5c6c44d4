//! Named permission flags. Bitmaps are `i32`; only the low 16 bits are used.

use std::fmt;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    bitmap: i32,
    name: &'static str,
}

impl Permission {
    pub const fn new(bitmap: i32, name: &'static str) -> Self {
        Self { bitmap, name }
    }

    pub const fn bitmap(self) -> i32 {
        self.bitmap
    }

    pub const fn name(self) -> &'static str {
        self.name
    }

    /// True when every bit of `self` is set in `bitmap`.
    pub const fn is_contained_in(self, bitmap: i32) -> bool {
        bitmap & self.bitmap == self.bitmap
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_bitmap(self.bitmap))
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permission::new(self.bitmap | rhs.bitmap, "combined")
    }
}

pub const CAN_READ: Permission = Permission::new(0x0001, "read");
pub const CAN_WRITE: Permission = Permission::new(0x0002, "write");
pub const CAN_DELETE: Permission = Permission::new(0x0004, "delete");
pub const CAN_READ_ACL: Permission = Permission::new(0x1000, "read_acl");
pub const CAN_WRITE_ACL: Permission = Permission::new(0x2000, "write_acl");
pub const CAN_DELETE_ACL: Permission = Permission::new(0x4000, "delete_acl");
pub const CAN_MANAGE: Permission = Permission::new(0x7007, "manage");
pub const ALL: Permission = Permission::new(0xffff, "all");

/// Decomposition order for `list_permissions`. Flags must stay disjoint.
pub const PRIMARY_PERMISSIONS: [Permission; 6] = [
    CAN_READ,
    CAN_WRITE,
    CAN_DELETE,
    CAN_READ_ACL,
    CAN_WRITE_ACL,
    CAN_DELETE_ACL,
];

pub fn list_permissions(bitmap: i32) -> Vec<Permission> {
    PRIMARY_PERMISSIONS
        .iter()
        .copied()
        .filter(|p| p.is_contained_in(bitmap))
        .collect()
}

/// Human-readable form used in access-denied errors, e.g. `read|write_acl`.
pub fn describe_bitmap(bitmap: i32) -> String {
    if bitmap == 0 {
        return "none".to_string();
    }
    let named = list_permissions(bitmap);
    let covered = named.iter().fold(0, |acc, p| acc | p.bitmap());
    let mut parts: Vec<String> = named.iter().map(|p| p.name().to_string()).collect();
    let rest = bitmap & !covered;
    if rest != 0 {
        parts.push(format!("{rest:#06x}"));
    }
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::{
        ALL, CAN_DELETE_ACL, CAN_MANAGE, CAN_READ, CAN_READ_ACL, CAN_WRITE, PRIMARY_PERMISSIONS,
        describe_bitmap, list_permissions,
    };

    #[test]
    fn primaries_are_disjoint_and_make_up_manage() {
        let mut seen = 0;
        for p in PRIMARY_PERMISSIONS {
            assert_eq!(seen & p.bitmap(), 0, "{} overlaps", p.name());
            seen |= p.bitmap();
        }
        assert_eq!(seen, CAN_MANAGE.bitmap());
        assert!(CAN_MANAGE.is_contained_in(ALL.bitmap()));
    }

    #[test]
    fn list_decomposes_in_fixed_order() {
        let listed = list_permissions(CAN_READ_ACL.bitmap() | CAN_READ.bitmap());
        assert_eq!(listed, vec![CAN_READ, CAN_READ_ACL]);
        assert_eq!(list_permissions(ALL.bitmap()).len(), PRIMARY_PERMISSIONS.len());
        assert!(list_permissions(0).is_empty());
    }

    #[test]
    fn description_names_flags_and_leftover_bits() {
        assert_eq!(describe_bitmap(0), "none");
        assert_eq!((CAN_READ | CAN_WRITE).to_string(), "read|write");
        assert_eq!(describe_bitmap(CAN_DELETE_ACL.bitmap() | 0x0100), "delete_acl|0x0100");
    }
}
