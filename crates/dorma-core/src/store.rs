//! Local store for host and credential mappings.
//!
//! Two JSON object files live in a per-user config directory
//! (`~/.dorma` by default): `app-hosts` maps an application id to the
//! portal host, `host-credentials` maps a host to its username and
//! password. Each mapping is loaded fully into memory, optionally
//! extended by prompting the user, and rewritten as a whole file. A
//! missing file is an empty mapping, not an error.
//!
//! There is no file locking; two concurrent processes race with
//! last-writer-wins. Fine for a single-user interactive tool.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::DormaError;
use crate::models::Credential;
use crate::prompt;

/// App-id → host mapping file name.
const APP_HOSTS_FILE: &str = "app-hosts";

/// Host → credential mapping file name.
const HOST_CREDENTIALS_FILE: &str = "host-credentials";

/// Config directory under the user's home.
const CONFIG_DIR_NAME: &str = ".dorma";

/// Store for the two persisted mappings.
///
/// The config directory is an explicit constructor argument; there is
/// no process-global state.
pub struct LocalStore {
    config_dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at the given config directory.
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a store rooted at `~/.dorma`.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            DormaError::ConfigIo("could not determine home directory".to_string())
        })?;
        Ok(Self::new(home.join(CONFIG_DIR_NAME)))
    }

    /// Return the host configured for an application id, asking the
    /// user and persisting the answer when none is stored yet.
    pub fn resolve_host(&self, app_id: &str) -> Result<String> {
        let mut hosts = self.load_app_hosts()?;
        if let Some(host) = hosts.get(app_id) {
            debug!(app_id, host = %host, "resolved host from store");
            return Ok(host.clone());
        }

        println!(
            "No Dorma host for app {:?} defined. Please enter host below:",
            app_id
        );
        print!("> ");
        std::io::stdout().flush()?;
        let host = prompt::read_line()?;

        hosts.insert(app_id.to_string(), host.clone());
        self.save_app_hosts(&hosts)?;

        Ok(host)
    }

    /// Return the credentials stored for a host, asking the user and
    /// persisting the answer when none are stored yet. The password
    /// prompt is masked.
    pub fn resolve_credentials(&self, host: &str) -> Result<Credential> {
        let mut credentials = self.load_host_credentials()?;
        if let Some(credential) = credentials.get(host) {
            debug!(host, user = %credential.user, "resolved credentials from store");
            return Ok(credential.clone());
        }

        println!(
            "No credentials for host {:?} available. Please enter host below:",
            host
        );
        print!("User> ");
        std::io::stdout().flush()?;
        let user = prompt::read_line()?;

        print!("Pass> ");
        std::io::stdout().flush()?;
        let pass = prompt::read_secret()?;

        let credential = Credential { user, pass };
        credentials.insert(host.to_string(), credential.clone());
        self.save_host_credentials(&credentials)?;

        Ok(credential)
    }

    /// Load the app-id → host mapping.
    pub fn load_app_hosts(&self) -> Result<BTreeMap<String, String>> {
        read_json(&self.config_dir.join(APP_HOSTS_FILE))
    }

    /// Rewrite the app-id → host mapping file.
    pub fn save_app_hosts(&self, hosts: &BTreeMap<String, String>) -> Result<()> {
        write_json(&self.config_dir.join(APP_HOSTS_FILE), hosts)
    }

    /// Load the host → credential mapping.
    pub fn load_host_credentials(&self) -> Result<BTreeMap<String, Credential>> {
        read_json(&self.config_dir.join(HOST_CREDENTIALS_FILE))
    }

    /// Rewrite the host → credential mapping file.
    pub fn save_host_credentials(
        &self,
        credentials: &BTreeMap<String, Credential>,
    ) -> Result<()> {
        write_json(&self.config_dir.join(HOST_CREDENTIALS_FILE), credentials)
    }
}

/// Read a whole JSON mapping file. A missing file yields the empty
/// mapping; any other read or parse failure is a `ConfigIo` error.
fn read_json<T>(path: &Path) -> Result<T>
where
    T: Default + DeserializeOwned,
{
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(DormaError::ConfigIo(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
            .into())
        }
    };

    serde_json::from_slice(&data).map_err(|e| {
        DormaError::ConfigIo(format!("{} is not valid JSON: {}", path.display(), e)).into()
    })
}

/// Rewrite a whole JSON mapping file, creating the config directory
/// first when needed.
fn write_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        // The ~/.dorma layout has always been world-permissive.
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o777);
        }
        builder.create(parent).map_err(|e| {
            DormaError::ConfigIo(format!(
                "failed to create {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let data = serde_json::to_vec(value).map_err(|e| {
        DormaError::ConfigIo(format!("failed to encode {}: {}", path.display(), e))
    })?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o777);
    }
    options
        .open(path)
        .and_then(|mut file| file.write_all(&data))
        .map_err(|e| {
            DormaError::ConfigIo(format!("failed to write {}: {}", path.display(), e))
        })?;

    Ok(())
}
