//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::sync::LazyLock as Lazy;

use derive_new::new;
use dut_cache::{CallArgs, Cached, FactsCache, zone_by_param};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::Error;
use crate::inventory::{Inventory, Vars};
use crate::json::JsonInventory;

// Hosts of a server group that are neighbor VMs rather than the test server.
static NEIGHBOR_VM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^VM[0-9]+").unwrap());

type Loader =
    Arc<dyn Fn(&[String]) -> Result<Box<dyn Inventory>, Error> + Send + Sync>;

type Lookup<A> = Cached<A, Option<Vars>, Error, Provenance>;

/// Cached inventory lookups.
///
/// Every lookup is cached in the zone of the host, group or server it was
/// made for. Cached entries remember the inventory files they were computed
/// from and are recomputed when asked for with a different file list.
pub struct Facts {
    host_vars: Lookup<HostArgs>,
    host_visible_vars: Lookup<HostArgs>,
    group_visible_vars: Lookup<GroupArgs>,
    test_server_vars: Lookup<ServerArgs>,
    test_server_visible_vars: Lookup<ServerArgs>,
}

#[derive(Clone, Debug, new)]
pub struct HostArgs {
    pub inv_files: Vec<String>,
    pub hostname: String,
}

#[derive(Clone, Debug, new)]
pub struct GroupArgs {
    pub inv_files: Vec<String>,
    pub group_name: String,
}

#[derive(Clone, Debug, new)]
pub struct ServerArgs {
    pub inv_files: Vec<String>,
    pub server: String,
}

// Arguments of the lookups that depend on a list of inventory files.
trait InventoryArgs: CallArgs {
    fn inv_files(&self) -> &[String];
}

// Cached facts along with the inventory files they were computed from.
#[derive(Debug, Deserialize, Serialize)]
struct Provenance {
    inv_files: Vec<String>,
    vars: Option<Vars>,
}

// ===== impl Facts =====

impl Facts {
    /// Creates the lookups on top of JSON inventory files.
    pub fn new(cache: Arc<FactsCache>) -> Facts {
        Facts::with_loader(cache, |files| {
            let inventory = JsonInventory::load(files)?;
            Ok(Box::new(inventory) as Box<dyn Inventory>)
        })
    }

    /// Creates the lookups on top of a custom inventory loader.
    pub fn with_loader<L>(cache: Arc<FactsCache>, loader: L) -> Facts
    where
        L: Fn(&[String]) -> Result<Box<dyn Inventory>, Error>
            + Send
            + Sync
            + 'static,
    {
        let loader: Loader = Arc::new(loader);
        Facts {
            host_vars: lookup(
                "host_vars",
                &cache,
                "hostname",
                &loader,
                |inventory, args: &HostArgs| {
                    host_or_log(inventory, &args.hostname)?;
                    inventory.host_vars(&args.hostname)
                },
            ),
            host_visible_vars: lookup(
                "host_visible_vars",
                &cache,
                "hostname",
                &loader,
                |inventory, args: &HostArgs| {
                    host_or_log(inventory, &args.hostname)?;
                    inventory.visible_vars(&args.hostname)
                },
            ),
            group_visible_vars: lookup(
                "group_visible_vars",
                &cache,
                "group_name",
                &loader,
                |inventory, args: &GroupArgs| {
                    let hosts = group_or_log(inventory, &args.group_name)?;
                    let Some(first_host) = hosts.first() else {
                        error!(group = %args.group_name, "no host in group");
                        return None;
                    };
                    inventory.visible_vars(first_host)
                },
            ),
            test_server_vars: lookup(
                "test_server_vars",
                &cache,
                "server",
                &loader,
                |inventory, args: &ServerArgs| {
                    let host = test_server_host(inventory, &args.server)?;
                    inventory.host_vars(&host)
                },
            ),
            test_server_visible_vars: lookup(
                "test_server_visible_vars",
                &cache,
                "server",
                &loader,
                |inventory, args: &ServerArgs| {
                    let host = test_server_host(inventory, &args.server)?;
                    inventory.visible_vars(&host)
                },
            ),
        }
    }

    /// Returns the variables defined for a host, or `None` if the host isn't
    /// in the inventory.
    pub fn get_host_vars(
        &self,
        inv_files: &[String],
        hostname: &str,
    ) -> Result<Option<Vars>, Error> {
        self.host_vars
            .call(&HostArgs::new(inv_files.to_vec(), hostname.to_owned()))
    }

    /// Returns the variables visible to a host, including the variables of
    /// the groups it belongs to.
    pub fn get_host_visible_vars(
        &self,
        inv_files: &[String],
        hostname: &str,
    ) -> Result<Option<Vars>, Error> {
        self.host_visible_vars
            .call(&HostArgs::new(inv_files.to_vec(), hostname.to_owned()))
    }

    /// Returns the variables visible to the first host of a group.
    pub fn get_group_visible_vars(
        &self,
        inv_files: &[String],
        group_name: &str,
    ) -> Result<Option<Vars>, Error> {
        self.group_visible_vars
            .call(&GroupArgs::new(inv_files.to_vec(), group_name.to_owned()))
    }

    /// Returns the variables of the test server of a server group.
    pub fn get_test_server_vars(
        &self,
        inv_files: &[String],
        server: &str,
    ) -> Result<Option<Vars>, Error> {
        self.test_server_vars
            .call(&ServerArgs::new(inv_files.to_vec(), server.to_owned()))
    }

    /// Returns the variables visible to the test server of a server group.
    pub fn get_test_server_visible_vars(
        &self,
        inv_files: &[String],
        server: &str,
    ) -> Result<Option<Vars>, Error> {
        self.test_server_visible_vars
            .call(&ServerArgs::new(inv_files.to_vec(), server.to_owned()))
    }

    /// Returns the reboot timeouts of a host for the given test case.
    ///
    /// The table is taken from the `plt_reboot_dict` variable of the host.
    /// Entries whose key is part of the test name are merged first; when none
    /// matches, the entry of the reboot type is used. An empty table means
    /// the defaults apply.
    pub fn get_reboot_ctrl(
        &self,
        inv_files: &[String],
        hostname: &str,
        test_name: &str,
        reboot_type: &str,
    ) -> Result<Vars, Error> {
        let vars = self
            .get_host_visible_vars(inv_files, hostname)?
            .ok_or_else(|| Error::HostNotFound(hostname.to_owned()))?;
        let ctrl = reboot_ctrl(&vars, test_name, reboot_type);
        debug!(%hostname, %test_name, %reboot_type, ?ctrl, "reboot control");
        Ok(ctrl)
    }
}

impl std::fmt::Debug for Facts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facts").finish_non_exhaustive()
    }
}

// ===== impl HostArgs =====

impl CallArgs for HostArgs {
    fn param(&self, name: &str) -> Option<String> {
        (name == "hostname").then(|| self.hostname.clone())
    }
}

impl InventoryArgs for HostArgs {
    fn inv_files(&self) -> &[String] {
        &self.inv_files
    }
}

// ===== impl GroupArgs =====

impl CallArgs for GroupArgs {
    fn param(&self, name: &str) -> Option<String> {
        (name == "group_name").then(|| self.group_name.clone())
    }
}

impl InventoryArgs for GroupArgs {
    fn inv_files(&self) -> &[String] {
        &self.inv_files
    }
}

// ===== impl ServerArgs =====

impl CallArgs for ServerArgs {
    fn param(&self, name: &str) -> Option<String> {
        (name == "server").then(|| self.server.clone())
    }
}

impl InventoryArgs for ServerArgs {
    fn inv_files(&self) -> &[String] {
        &self.inv_files
    }
}

// ===== helper functions =====

fn lookup<A, F>(
    namespace: &str,
    cache: &Arc<FactsCache>,
    zone_param: &'static str,
    loader: &Loader,
    f: F,
) -> Lookup<A>
where
    A: InventoryArgs + 'static,
    F: Fn(&dyn Inventory, &A) -> Option<Vars> + Send + Sync + 'static,
{
    let loader = loader.clone();
    Cached::with_hooks(
        namespace,
        cache.clone(),
        zone_by_param(zone_param),
        check_provenance::<A>,
        mark_provenance::<A>,
        move |args: &A| {
            let inventory = (loader)(args.inv_files())?;
            Ok(f(inventory.as_ref(), args))
        },
    )
}

// Accepts a cached entry only if it was computed from the same inventory
// files.
fn check_provenance<A: InventoryArgs>(
    cached: Option<Provenance>,
    args: &A,
) -> Option<Option<Vars>> {
    let cached = cached?;
    if cached.inv_files != args.inv_files() {
        debug!(cached = ?cached.inv_files, requested = ?args.inv_files(), "inventory changed");
        return None;
    }
    Some(cached.vars)
}

fn mark_provenance<A: InventoryArgs>(vars: &Option<Vars>, args: &A) -> Provenance {
    Provenance {
        inv_files: args.inv_files().to_vec(),
        vars: vars.clone(),
    }
}

fn host_or_log(inventory: &dyn Inventory, hostname: &str) -> Option<()> {
    if inventory.host_vars(hostname).is_none() {
        error!(%hostname, sources = ?inventory.sources(), "unable to find host");
        return None;
    }
    Some(())
}

fn group_or_log(inventory: &dyn Inventory, group: &str) -> Option<Vec<String>> {
    let hosts = inventory.group_hosts(group);
    if hosts.is_none() {
        error!(%group, sources = ?inventory.sources(), "unable to find group");
    }
    hosts
}

// The test server is the first host of the server group that isn't one of
// the neighbor VMs.
fn test_server_host(inventory: &dyn Inventory, server: &str) -> Option<String> {
    let host = group_or_log(inventory, server)?
        .into_iter()
        .find(|hostname| !NEIGHBOR_VM.is_match(hostname));
    if host.is_none() {
        error!(%server, "unable to find test server host");
    }
    host
}

fn reboot_ctrl(vars: &Vars, test_name: &str, reboot_type: &str) -> Vars {
    let Some(Value::Object(table)) = vars.get("plt_reboot_dict") else {
        return Vars::new();
    };

    let mut ctrl = Vars::new();
    for (key, entry) in table {
        if test_name.contains(key.as_str())
            && let Value::Object(entry) = entry
        {
            ctrl.extend(entry.clone());
        }
    }
    if ctrl.is_empty()
        && let Some(Value::Object(entry)) = table.get(reboot_type)
    {
        ctrl.extend(entry.clone());
    }
    ctrl
}

// ===== unit tests =====
