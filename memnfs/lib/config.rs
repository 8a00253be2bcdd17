//! Startup configuration, read once from a YAML document.

use std::path::Path;

use async_recursion::async_recursion;
use getset::Getters;
use memfs::{FileHandle, MemFs};
use serde::{Deserialize, Serialize};
use tokio::fs;
use typed_builder::TypedBuilder;

use crate::defaults::{
    DEFAULT_LEASE_TIME, DEFAULT_MAX_RECORD_SIZE, DEFAULT_NFS_HOST, DEFAULT_NFS_PORT,
};
use crate::NfsResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Bind address, protocol limits and the initial tree of the server.
///
/// ```yaml
/// host: 127.0.0.1
/// port: 11112
/// lease_time: 60
/// root:
///   - dir: home
///   - dir: init
///     contents:
///       - file: rc
///         contents: "#!/bin/sh"
///   - dir: etc
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "ServerConfig::default_host")]
    #[builder(default = ServerConfig::default_host(), setter(into))]
    host: String,

    /// Port to listen on
    #[serde(default = "ServerConfig::default_port")]
    #[builder(default = ServerConfig::default_port())]
    port: u16,

    /// Lease time in seconds
    #[serde(default = "ServerConfig::default_lease_time")]
    #[builder(default = ServerConfig::default_lease_time())]
    lease_time: u32,

    /// Largest RPC record accepted, in bytes
    #[serde(default = "ServerConfig::default_max_record_size")]
    #[builder(default = ServerConfig::default_max_record_size())]
    max_record_size: usize,

    /// Initial tree below the root directory
    #[serde(default = "ServerConfig::default_root")]
    #[builder(default = ServerConfig::default_root())]
    root: Vec<SeedNode>,
}

/// A node of the initial tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SeedNode {
    /// A directory and its children
    Dir {
        /// Directory name
        dir: String,

        /// Children
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contents: Vec<SeedNode>,
    },

    /// A file and its content
    File {
        /// File name
        file: String,

        /// Initial content
        #[serde(default)]
        contents: String,
    },
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerConfig {
    /// Reads a configuration from a YAML file.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub async fn load(path: impl AsRef<Path>) -> NfsResult<Self> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&contents)
    }

    /// Parses a configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> NfsResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Returns the `host:port` address to bind to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Creates the configured tree below the root of `fs`.
    pub async fn seed(&self, fs: &MemFs) -> NfsResult<()> {
        seed_nodes(fs, &fs.root_handle(), &self.root).await
    }

    fn default_host() -> String {
        DEFAULT_NFS_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_NFS_PORT
    }

    fn default_lease_time() -> u32 {
        DEFAULT_LEASE_TIME
    }

    fn default_max_record_size() -> usize {
        DEFAULT_MAX_RECORD_SIZE
    }

    fn default_root() -> Vec<SeedNode> {
        ["home", "init", "etc"]
            .into_iter()
            .map(|name| SeedNode::Dir {
                dir: name.to_string(),
                contents: Vec::new(),
            })
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

#[async_recursion]
async fn seed_nodes(fs: &MemFs, parent: &FileHandle, nodes: &[SeedNode]) -> NfsResult<()> {
    for node in nodes {
        match node {
            SeedNode::Dir { dir, contents } => {
                let handle = fs.create_directory(parent, dir).await?;
                seed_nodes(fs, &handle, contents).await?;
            }
            SeedNode::File { file, contents } => {
                let handle = fs.create_file(parent, file).await?;
                fs.write(&handle, 0, contents.as_bytes()).await?;
            }
        }
    }
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
