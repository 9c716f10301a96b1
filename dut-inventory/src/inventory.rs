//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

/// Variables of a host or group, as found in the inventory.
pub type Vars = BTreeMap<String, serde_json::Value>;

/// Source of hosts, groups and their variables.
pub trait Inventory {
    /// Returns the files the inventory was loaded from.
    fn sources(&self) -> &[String];

    /// Returns the variables defined for the host itself, or `None` if the
    /// host doesn't exist.
    fn host_vars(&self, hostname: &str) -> Option<Vars>;

    /// Returns the hosts of a group, including the hosts of its descendants,
    /// or `None` if the group doesn't exist.
    fn group_hosts(&self, group: &str) -> Option<Vec<String>>;

    /// Returns all variables visible to a host: the variables of every group
    /// the host belongs to, from the outermost group inwards, then the host
    /// variables.
    fn visible_vars(&self, hostname: &str) -> Option<Vars>;
}
