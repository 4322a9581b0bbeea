//! # OpenNebula Client
//!
//! Implements [`Platform`] against OpenNebula's XML-RPC endpoint
//! (`http://<frontend>:2633/RPC2` by default). Every call is a blocking HTTP
//! POST whose first parameter is the `user:password` session string.
//!
//! Connect, read and write timeouts all come from the caller; a stalled
//! frontend fails the call with `Error::Transport` rather than hanging the
//! run.

mod pool;
mod xml;
mod xmlrpc;

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::platform::{Platform, TargetGroup, TargetUser, Workload};

pub use xmlrpc::{Param, Value};

/// VM pool state filter meaning "any state except DONE".
const VM_STATE_ANY_ALIVE: i64 = -1;
/// `one.user.update` mode merging into the existing template.
const UPDATE_MERGE: i64 = 1;
/// VM action for a hard shutdown that also releases the VM.
const ACTION_TERMINATE_HARD: &str = "terminate-hard";
const ACTION_TERMINATE: &str = "terminate";

/// Blocking XML-RPC client for one OpenNebula frontend.
pub struct OneClient {
    agent: ureq::Agent,
    endpoint: Url,
    session: String,
}

impl OneClient {
    pub fn new(endpoint: Url, username: &str, password: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(concat!("metacloud-export/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            endpoint,
            session: format!("{}:{}", username, password),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Performs one call, prepending the session string to `params`.
    pub fn call(&self, method: &str, params: &[Param]) -> Result<Value> {
        let mut all = Vec::with_capacity(params.len() + 1);
        all.push(Param::Str(self.session.clone()));
        all.extend_from_slice(params);

        debug!("Calling {}", method);
        let body = xmlrpc::encode_call(method, &all);
        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "text/xml")
            .send_string(&body)
            .map_err(|e| self.transport_error(e.to_string()))?;
        let text = response
            .into_string()
            .map_err(|e| self.transport_error(e.to_string()))?;
        trace!("{} answered: {}", method, text);

        xmlrpc::decode_response(method, &text)
    }

    fn call_string(&self, method: &str, params: &[Param]) -> Result<String> {
        self.call(method, params)?.into_string()
    }

    fn call_unit(&self, method: &str, params: &[Param]) -> Result<()> {
        self.call(method, params).map(|_| ())
    }

    fn transport_error(&self, message: String) -> Error {
        Error::Transport {
            endpoint: self.endpoint.to_string(),
            message,
        }
    }
}

impl Platform for OneClient {
    fn list_groups(&self) -> Result<Vec<TargetGroup>> {
        let xml = self.call_string("one.grouppool.info", &[])?;
        pool::parse_group_pool(&xml)
    }

    fn list_users(&self) -> Result<Vec<TargetUser>> {
        let xml = self.call_string("one.userpool.info", &[])?;
        pool::parse_user_pool(&xml)
    }

    fn user_info(&self, user_id: i64) -> Result<TargetUser> {
        let xml = self.call_string("one.user.info", &[user_id.into()])?;
        pool::parse_user(&xml)
    }

    fn allocate_user(&self, login: &str, password: &str, auth_driver: &str) -> Result<i64> {
        self.call(
            "one.user.allocate",
            &[login.into(), password.into(), auth_driver.into()],
        )?
        .into_int()
    }

    fn set_primary_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        self.call_unit("one.user.chgrp", &[user_id.into(), group_id.into()])
    }

    fn add_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        self.call_unit("one.user.addgroup", &[user_id.into(), group_id.into()])
    }

    fn remove_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        self.call_unit("one.user.delgroup", &[user_id.into(), group_id.into()])
    }

    fn set_auth_driver(&self, user_id: i64, auth_driver: &str) -> Result<()> {
        // an empty password keeps the stored one
        self.call_unit(
            "one.user.chauth",
            &[user_id.into(), auth_driver.into(), "".into()],
        )
    }

    fn set_password(&self, user_id: i64, password: &str) -> Result<()> {
        self.call_unit("one.user.passwd", &[user_id.into(), password.into()])
    }

    fn update_properties(
        &self,
        user_id: i64,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let template = render_template(properties);
        self.call_unit(
            "one.user.update",
            &[user_id.into(), template.as_str().into(), UPDATE_MERGE.into()],
        )
    }

    fn delete_user(&self, user_id: i64) -> Result<()> {
        self.call_unit("one.user.delete", &[user_id.into()])
    }

    fn list_workloads(&self, owner_id: i64) -> Result<Vec<Workload>> {
        let xml = self.call_string(
            "one.vmpool.info",
            &[
                owner_id.into(),
                (-1i64).into(),
                (-1i64).into(),
                VM_STATE_ANY_ALIVE.into(),
            ],
        )?;
        // filter on the client as well, older frontends ignore the UID filter
        Ok(pool::parse_vm_pool(&xml)?
            .into_iter()
            .filter(|vm| vm.owner_id == owner_id)
            .collect())
    }

    fn shutdown_workload(&self, workload_id: i64, hard: bool) -> Result<()> {
        let action = if hard {
            ACTION_TERMINATE_HARD
        } else {
            ACTION_TERMINATE
        };
        self.call_unit("one.vm.action", &[action.into(), workload_id.into()])
    }
}

/// Renders properties as an OpenNebula template (`KEY = "value"` lines).
fn render_template(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(key, value)| {
            format!(
                "{} = \"{}\"\n",
                key,
                value.replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
        .collect()
}
