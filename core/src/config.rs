//! Persisted configuration access and start-time option assembly.
//!
//! The host platform owns the actual key-value persistence (SharedPreferences
//! on Android, NSUserDefaults on iOS). This module defines the store contract
//! the daemon consumes, the key namespace, and the `StartConfig` snapshot that
//! is assembled fresh from the store before every start attempt.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Keys the daemon reads from the config store.
pub mod keys {
    pub const AUTH_KEY: &str = "authkey";
    pub const SOCKS5_ADDR: &str = "socks5";
    pub const HTTP_PROXY_ADDR: &str = "httpproxy";
    pub const SSH_ADDR: &str = "sshserver";
    pub const HOSTNAME: &str = "hostname";
    pub const LOGIN_SERVER: &str = "login_server";
    pub const ACCEPT_ROUTES: &str = "accept_routes";
    pub const ACCEPT_DNS: &str = "accept_dns";
    pub const EXIT_NODE: &str = "exit_node_ip";
    pub const EXIT_NODE_ALLOW_LAN: &str = "exit_node_allow_lan";
    pub const ADVERTISE_EXIT_NODE: &str = "advertise_exit_node";
    pub const EXTRA_ARGS: &str = "extra_args_raw";
    pub const FORCE_BACKGROUND: &str = "force_bg";
    pub const DESIRED_RUNNING: &str = "desired_running";
}

pub const DEFAULT_SOCKS5_ADDR: &str = "127.0.0.1:1055";
pub const DEFAULT_SSH_ADDR: &str = "127.0.0.1:1056";
pub const DEFAULT_HTTP_PROXY_ADDR: &str = "127.0.0.1:1057";

/// Errors for missing or invalid required settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Key-value settings storage surviving process restarts.
///
/// Injected into the controller and reconciler rather than looked up
/// globally, so both stay testable without a host runtime. Absent keys
/// return `None`; callers apply their own defaults.
pub trait ConfigStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_string(&self, key: &str, value: &str);
    fn set_bool(&self, key: &str, value: bool);
}

/// Does the user want the engine running? Survives process death and reboot.
pub fn desired_running(store: &dyn ConfigStore) -> bool {
    store.get_bool(keys::DESIRED_RUNNING).unwrap_or(false)
}

/// Record user intent. Crate-private: only the controller and the boot
/// reconciler may flip desired state, never UI code.
pub(crate) fn set_desired_running(store: &dyn ConfigStore, running: bool) {
    store.set_bool(keys::DESIRED_RUNNING, running);
}

/// Options for one start attempt, snapshotted from the config store.
///
/// Assembled fresh before every attempt so settings edits take effect on the
/// next start without any cache invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConfig {
    pub socks5_addr: String,
    pub http_proxy_addr: String,
    /// Blank disables the in-engine SSH server.
    pub ssh_addr: String,
    pub auth_key: String,
    pub hostname: String,
    pub login_server: String,
    pub accept_routes: bool,
    pub accept_dns: bool,
    pub exit_node: String,
    pub exit_node_allow_lan: bool,
    pub advertise_exit_node: bool,
    pub extra_args: String,
}

impl StartConfig {
    /// Snapshot the store, applying the stock bind-address defaults for
    /// absent keys.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let string_or = |key: &str, default: &str| {
            store
                .get_string(key)
                .unwrap_or_else(|| default.to_string())
        };
        let bool_or = |key: &str, default: bool| store.get_bool(key).unwrap_or(default);

        Self {
            socks5_addr: string_or(keys::SOCKS5_ADDR, DEFAULT_SOCKS5_ADDR),
            http_proxy_addr: string_or(keys::HTTP_PROXY_ADDR, DEFAULT_HTTP_PROXY_ADDR),
            ssh_addr: string_or(keys::SSH_ADDR, DEFAULT_SSH_ADDR),
            auth_key: string_or(keys::AUTH_KEY, ""),
            hostname: string_or(keys::HOSTNAME, ""),
            login_server: string_or(keys::LOGIN_SERVER, ""),
            accept_routes: bool_or(keys::ACCEPT_ROUTES, false),
            accept_dns: bool_or(keys::ACCEPT_DNS, true),
            exit_node: string_or(keys::EXIT_NODE, ""),
            exit_node_allow_lan: bool_or(keys::EXIT_NODE_ALLOW_LAN, false),
            advertise_exit_node: bool_or(keys::ADVERTISE_EXIT_NODE, false),
            extra_args: string_or(keys::EXTRA_ARGS, ""),
        }
    }

    /// Validate before any side effect of a start attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_key.trim().is_empty() {
            return Err(ConfigError::Invalid("auth key is not set".to_string()));
        }

        if self.socks5_addr.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "SOCKS5 bind address cannot be blank".to_string(),
            ));
        }

        if self.http_proxy_addr.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "HTTP proxy bind address cannot be blank".to_string(),
            ));
        }

        Ok(())
    }

    /// Flags handed to the engine's registration step, in the order the
    /// settings screen documents them. Empty fields are skipped.
    pub fn up_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if !self.hostname.is_empty() {
            args.push(format!("--hostname={}", self.hostname));
        }

        if !self.login_server.is_empty() {
            args.push(format!("--login-server={}", self.login_server));
        }

        if self.accept_routes {
            args.push("--accept-routes".to_string());
        }

        if !self.accept_dns {
            args.push("--accept-dns=false".to_string());
        }

        if !self.exit_node.is_empty() {
            args.push(format!("--exit-node={}", self.exit_node));
            if self.exit_node_allow_lan {
                args.push("--exit-node-allow-lan-access".to_string());
            }
        }

        if self.advertise_exit_node {
            args.push("--advertise-exit-node".to_string());
        }

        args.extend(self.extra_args.split_whitespace().map(String::from));

        args
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    strings: HashMap<String, String>,
    bools: HashMap<String, bool>,
}

/// In-memory `ConfigStore` for tests and host-free runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.inner.read().strings.get(key).cloned()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.read().bools.get(key).copied()
    }

    fn set_string(&self, key: &str, value: &str) {
        self.inner
            .write()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.inner.write().bools.insert(key.to_string(), value);
    }
}
