//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::inventory::{Inventory, Vars};

/// Inventory loaded from files in the `ansible-inventory --list` format.
///
/// ```json
/// {
///   "_meta": { "hostvars": { "str-msn2700-01": { "hwsku": "ACS-MSN2700" } } },
///   "all": { "children": ["sonic", "server_1"] },
///   "sonic": { "hosts": ["str-msn2700-01"], "vars": { "ansible_user": "admin" } }
/// }
/// ```
///
/// When several files are loaded, later files override the variables defined
/// by earlier ones, while group memberships are merged.
#[derive(Debug, Default)]
pub struct JsonInventory {
    sources: Vec<String>,
    hosts: BTreeMap<String, Vars>,
    groups: BTreeMap<String, Group>,
}

#[derive(Debug, Default)]
struct Group {
    hosts: Vec<String>,
    children: Vec<String>,
    vars: Vars,
}

#[derive(Debug, Deserialize)]
struct RawInventory {
    #[serde(default, rename = "_meta")]
    meta: RawMeta,
    #[serde(flatten)]
    groups: BTreeMap<String, RawGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    hostvars: BTreeMap<String, Vars>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    hosts: Vec<String>,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    vars: Vars,
}

// ===== impl JsonInventory =====

impl JsonInventory {
    /// Loads and merges the given inventory files, in order.
    pub fn load(files: &[String]) -> Result<JsonInventory, Error> {
        let mut inventory = JsonInventory::default();
        for file in files {
            let path = PathBuf::from(file);
            let data = std::fs::read_to_string(&path)
                .map_err(|error| Error::ReadError(path.clone(), error))?;
            let raw = serde_json::from_str(&data)
                .map_err(|error| Error::ParseError(path.clone(), error))?;
            inventory.merge(raw);
            inventory.sources.push(file.clone());
        }

        debug!(
            sources = ?inventory.sources,
            hosts = %inventory.hosts.len(),
            groups = %inventory.groups.len(),
            "loaded inventory"
        );
        Ok(inventory)
    }

    fn merge(&mut self, raw: RawInventory) {
        for (name, raw_group) in raw.groups {
            let group = self.groups.entry(name).or_default();
            for hostname in raw_group.hosts {
                self.hosts.entry(hostname.clone()).or_default();
                if !group.hosts.contains(&hostname) {
                    group.hosts.push(hostname);
                }
            }
            for child in raw_group.children {
                if !group.children.contains(&child) {
                    group.children.push(child);
                }
            }
            group.vars.extend(raw_group.vars);
        }

        for (hostname, vars) in raw.meta.hostvars {
            self.hosts.entry(hostname).or_default().extend(vars);
        }
    }

    // Returns the names of all groups the host belongs to, either directly
    // or through a descendant group.
    fn host_groups(&self, hostname: &str) -> BTreeSet<&str> {
        let mut groups = BTreeSet::new();
        let mut pending = self
            .groups
            .iter()
            .filter(|(_, group)| group.hosts.iter().any(|host| host == hostname))
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        while let Some(name) = pending.pop() {
            if groups.insert(name) {
                pending.extend(self.parents(name));
            }
        }
        groups
    }

    fn parents<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a str> {
        self.groups
            .iter()
            .filter(move |(_, parent)| {
                parent.children.iter().any(|child| child == group)
            })
            .map(|(name, _)| name.as_str())
    }

    // Distance of a group from the top of the hierarchy, through its deepest
    // ancestor chain.
    fn depth(&self, group: &str, visiting: &mut BTreeSet<String>) -> usize {
        if !visiting.insert(group.to_owned()) {
            return 0;
        }
        let parents = self.parents(group).collect::<Vec<_>>();
        let depth = parents
            .into_iter()
            .map(|parent| self.depth(parent, visiting) + 1)
            .max()
            .unwrap_or(0);
        visiting.remove(group);
        depth
    }
}

impl Inventory for JsonInventory {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn host_vars(&self, hostname: &str) -> Option<Vars> {
        self.hosts.get(hostname).cloned()
    }

    fn group_hosts(&self, group: &str) -> Option<Vec<String>> {
        self.groups.get(group)?;

        let mut hosts = Vec::new();
        let mut visited = BTreeSet::new();
        let mut pending = vec![group];
        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            let Some(group) = self.groups.get(name) else {
                continue;
            };
            for hostname in &group.hosts {
                if !hosts.contains(hostname) {
                    hosts.push(hostname.clone());
                }
            }
            pending.extend(group.children.iter().rev().map(String::as_str));
        }
        Some(hosts)
    }

    fn visible_vars(&self, hostname: &str) -> Option<Vars> {
        let host_vars = self.hosts.get(hostname)?;

        let groups = self.host_groups(hostname);
        let mut ordered = groups
            .iter()
            .map(|name| (self.depth(name, &mut BTreeSet::new()), *name))
            .collect::<Vec<_>>();
        ordered.sort();

        let mut vars = Vars::new();
        for (_, name) in &ordered {
            vars.extend(self.groups[*name].vars.clone());
        }
        vars.extend(host_vars.clone());

        let group_names = groups
            .into_iter()
            .filter(|name| *name != "all" && *name != "ungrouped")
            .collect::<Vec<_>>();
        vars.insert("inventory_hostname".to_owned(), hostname.into());
        vars.insert("group_names".to_owned(), group_names.into());
        Some(vars)
    }
}
