//! Pure bitmap algebra over ACEs and the ACE key grammar.
//!
//! Keys: `<principal>@g` grants, `<principal>@d` denies, `_tp_<token>@g|d` is a
//! dynamic principal, `_pp_<principal>@<property>@g|d` is a property ACE.

use crate::acl::permission::Permission;
use serde::{Deserialize, Serialize};

pub const GRANT_SUFFIX: &str = "@g";
pub const DENY_SUFFIX: &str = "@d";
pub const DYNAMIC_PRINCIPAL_PREFIX: &str = "_tp_";
pub const PROPERTY_ACE_PREFIX: &str = "_pp_";

/// The permission space `filter_acl` and `remove_acl` invert within.
pub const FILTER_MASK: i32 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Replace,
    Or,
    And,
    Xor,
    /// Complements the operand. The existing bitmap is ignored.
    Not,
    /// Removes the ACE key. Not a bitmap transform.
    Delete,
}

/// `Delete` returns `existing` unchanged; the caller drops the key instead.
pub fn modify(existing: i32, operation: Operation, operand: i32) -> i32 {
    match operation {
        Operation::Replace => operand,
        Operation::Or => existing | operand,
        Operation::And => existing & operand,
        Operation::Xor => operand ^ existing,
        Operation::Not => !operand,
        Operation::Delete => existing,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclModification {
    key: String,
    bitmap: i32,
    operation: Operation,
}

impl AclModification {
    pub fn new(key: impl Into<String>, bitmap: i32, operation: Operation) -> Self {
        Self {
            key: key.into(),
            bitmap,
            operation,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(key, 0, Operation::Delete)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bitmap(&self) -> i32 {
        self.bitmap
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    pub fn apply(&self, existing: i32) -> i32 {
        modify(existing, self.operation, self.bitmap)
    }
}

pub fn grant_key(principal: &str) -> String {
    format!("{principal}{GRANT_SUFFIX}")
}

pub fn deny_key(principal: &str) -> String {
    format!("{principal}{DENY_SUFFIX}")
}

pub fn is_grant(key: &str) -> bool {
    key.ends_with(GRANT_SUFFIX)
}

pub fn is_deny(key: &str) -> bool {
    key.ends_with(DENY_SUFFIX)
}

/// Principal part of an ACE key; `None` when the key is too short to hold a
/// principal and a marker or has no recognised marker.
pub fn principal_of(key: &str) -> Option<&str> {
    if key.len() <= GRANT_SUFFIX.len() {
        return None;
    }
    key.strip_suffix(GRANT_SUFFIX)
        .or_else(|| key.strip_suffix(DENY_SUFFIX))
}

fn ace_key(principal: &str, grant: bool) -> String {
    if grant {
        grant_key(principal)
    } else {
        deny_key(principal)
    }
}

/// Sets `permission` on the principal's grant or deny ACE.
pub fn add_acl(
    grant: bool,
    permission: Permission,
    principal: &str,
    modifications: &mut Vec<AclModification>,
) {
    modifications.push(AclModification::new(
        ace_key(principal, grant),
        permission.bitmap(),
        Operation::Or,
    ));
}

/// Clears `permission` from the principal's grant or deny ACE.
pub fn remove_acl(
    grant: bool,
    permission: Permission,
    principal: &str,
    modifications: &mut Vec<AclModification>,
) {
    modifications.push(AclModification::new(
        ace_key(principal, grant),
        FILTER_MASK ^ permission.bitmap(),
        Operation::And,
    ));
}

/// One modification on the principal's grant or deny ACE: clearing ANDs with
/// the inverted bitmap, setting ORs the bitmap in.
pub fn filter_acl(
    principal: &str,
    grant: bool,
    permission: Permission,
    clear: bool,
    modifications: &mut Vec<AclModification>,
) {
    let bitmap = permission.bitmap();
    let (operand, operation) = if clear {
        (FILTER_MASK ^ bitmap, Operation::And)
    } else {
        (bitmap, Operation::Or)
    };
    modifications.push(AclModification::new(ace_key(principal, grant), operand, operation));
}

/// Makes the principal's ACEs grant exactly `to_grant` and deny exactly
/// `to_deny` among the listed bits. A bit in both lists ends up denied.
pub fn exact_acl(
    principal: &str,
    to_grant: &[Permission],
    to_deny: &[Permission],
    modifications: &mut Vec<AclModification>,
) {
    let deny_bits = to_deny.iter().fold(0, |acc, p| acc | p.bitmap());
    let grant_bits = to_grant.iter().fold(0, |acc, p| acc | p.bitmap()) & !deny_bits;
    let grant_bitmap = Permission::new(grant_bits, "combined");
    let deny_bitmap = Permission::new(deny_bits, "combined");
    filter_acl(principal, true, grant_bitmap, false, modifications);
    filter_acl(principal, true, deny_bitmap, true, modifications);
    filter_acl(principal, false, deny_bitmap, false, modifications);
    filter_acl(principal, false, grant_bitmap, true, modifications);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAce<'a> {
    pub principal: &'a str,
    pub property: &'a str,
    pub grant: bool,
}

pub fn property_ace_key(principal: &str, property: &str, grant: bool) -> String {
    ace_key(&format!("{PROPERTY_ACE_PREFIX}{principal}@{property}"), grant)
}

/// Splits `_pp_<principal>@<property>@g|d`. The property is taken after the
/// last `@`, so principals may contain `@` but property names may not.
pub fn parse_property_ace(key: &str) -> Option<PropertyAce<'_>> {
    let body = key.strip_prefix(PROPERTY_ACE_PREFIX)?;
    let grant = is_grant(body);
    let inner = principal_of(body)?;
    let (principal, property) = inner.rsplit_once('@')?;
    if principal.is_empty() || property.is_empty() {
        return None;
    }
    Some(PropertyAce {
        principal,
        property,
        grant,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        AclModification, Operation, PropertyAce, add_acl, deny_key, exact_acl, filter_acl,
        grant_key, is_deny, is_grant, modify, parse_property_ace, principal_of, property_ace_key,
        remove_acl,
    };
    use crate::acl::permission::{CAN_DELETE, CAN_READ, CAN_WRITE};
    use proptest::prelude::*;

    #[test]
    fn documented_operation_results() {
        assert_eq!(modify(0b1010, Operation::Or, 0b0101), 0b1111);
        assert_eq!(modify(0b1111, Operation::And, 0b1010), 0b1010);
        assert_eq!(modify(0b1111, Operation::Replace, 0b0001), 0b0001);
        assert_eq!(modify(0b1100, Operation::Xor, 0b1010), 0b0110);
        assert_eq!(modify(0b0110, Operation::Delete, 0b0001), 0b0110);
    }

    proptest! {
        #[test]
        fn not_ignores_existing(existing in any::<i32>(), operand in any::<i32>()) {
            prop_assert_eq!(modify(existing, Operation::Not, operand), !operand);
        }

        #[test]
        fn xor_matches_bitwise(existing in any::<i32>(), operand in any::<i32>()) {
            prop_assert_eq!(modify(existing, Operation::Xor, operand), existing ^ operand);
        }
    }

    #[test]
    fn ace_keys_and_principals() {
        assert_eq!(grant_key("alice"), "alice@g");
        assert_eq!(deny_key("alice"), "alice@d");
        assert!(is_grant("alice@g") && !is_deny("alice@g"));
        assert_eq!(principal_of("alice@d"), Some("alice"));
        assert_eq!(principal_of("bob@example.com@g"), Some("bob@example.com"));
        assert_eq!(principal_of("@g"), None);
        assert_eq!(principal_of("x"), None);
        assert_eq!(principal_of("alice@x"), None);
    }

    #[test]
    fn add_and_remove_build_or_and_pairs() {
        let mut mods = Vec::new();
        add_acl(true, CAN_READ, "alice", &mut mods);
        remove_acl(false, CAN_WRITE, "alice", &mut mods);
        assert_eq!(
            mods,
            vec![
                AclModification::new("alice@g", 0x1, Operation::Or),
                AclModification::new("alice@d", 0xffff ^ 0x2, Operation::And),
            ]
        );
    }

    #[test]
    fn filter_acl_clears_with_inverted_and() {
        let mut mods = Vec::new();
        filter_acl("alice", true, CAN_WRITE, true, &mut mods);
        filter_acl("alice", false, CAN_READ | CAN_WRITE, true, &mut mods);
        assert_eq!(
            mods,
            vec![
                AclModification::new("alice@g", 0xffff ^ 0x2, Operation::And),
                AclModification::new("alice@d", 0xffff ^ 0x3, Operation::And),
            ]
        );
        assert_eq!(mods[0].apply(0x7), 0x5);
        assert_eq!(mods[1].apply(0x6), 0x4);
    }

    #[test]
    fn filter_acl_sets_with_or() {
        let mut mods = Vec::new();
        filter_acl("alice", false, CAN_DELETE, false, &mut mods);
        assert_eq!(mods, vec![AclModification::new("alice@d", 0x4, Operation::Or)]);
        assert_eq!(mods[0].apply(0x1), 0x5);
    }

    #[test]
    fn exact_acl_sets_exact_bits_with_deny_winning() {
        let mut mods = Vec::new();
        exact_acl("alice", &[CAN_READ, CAN_WRITE], &[CAN_WRITE, CAN_DELETE], &mut mods);
        let mut grant = 0x4;
        let mut deny = 0x1;
        for m in &mods {
            match m.key() {
                "alice@g" => grant = m.apply(grant),
                "alice@d" => deny = m.apply(deny),
                other => panic!("unexpected key {other}"),
            }
        }
        assert_eq!(grant, 0x1);
        assert_eq!(deny, 0x2 | 0x4);
    }

    #[test]
    fn property_ace_keys_parse_back() {
        let key = property_ace_key("bob@example.com", "salary", false);
        assert_eq!(key, "_pp_bob@example.com@salary@d");
        assert_eq!(
            parse_property_ace(&key),
            Some(PropertyAce {
                principal: "bob@example.com",
                property: "salary",
                grant: false,
            })
        );
        assert_eq!(parse_property_ace("alice@g"), None);
        assert_eq!(parse_property_ace("_pp_alice@g"), None);
    }
}
