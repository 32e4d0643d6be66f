use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LaunchError;
use crate::models::AppType;

/// Immutable application configuration, passed by value to whoever needs it.
///
/// The on-disk form is a JSON document with PascalCase sections. Every field
/// has a default, so a partial file deserializes cleanly and newly added
/// keys are filled in and written back on the next load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AppConfig {
    pub settings: Settings,
    pub source_priority: SourcePriority,
    pub smb_source: SmbConfig,
    pub http_source: HttpConfig,
    pub ftp_source: FtpConfig,
    pub local_installer_names: LocalInstallerNames,
}

impl AppConfig {
    /// Loads the configuration from `path`, creating the file with defaults
    /// when it is missing and rewriting it when the parsed form gained keys
    /// the file did not have. Never fails: a broken file logs a warning and
    /// yields the in-memory defaults.
    pub fn load_or_init(path: &Path) -> AppConfig {
        if !path.exists() {
            let config = AppConfig::default();
            match config.persist(path) {
                Ok(()) => log::info!("created default configuration at '{}'", path.display()),
                Err(err) => log::warn!(
                    "could not create configuration file '{}': {err}; using in-memory defaults",
                    path.display()
                ),
            }
            return config;
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!(
                    "could not read configuration file '{}': {err}; using in-memory defaults",
                    path.display()
                );
                return AppConfig::default();
            }
        };

        match serde_json::from_str::<AppConfig>(&raw) {
            Ok(config) => {
                // Write back so keys introduced since the file was created
                // show up in it.
                if let Ok(full) = serde_json::to_string_pretty(&config) {
                    if full.trim() != raw.trim() {
                        if let Err(err) = fs::write(path, full) {
                            log::warn!(
                                "could not update configuration file '{}': {err}",
                                path.display()
                            );
                        } else {
                            log::info!("configuration file '{}' updated with new keys", path.display());
                        }
                    }
                }
                config
            }
            Err(err) => {
                log::warn!(
                    "configuration file '{}' is not valid: {err}; using in-memory defaults",
                    path.display()
                );
                AppConfig::default()
            }
        }
    }

    pub fn persist(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let rendered = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, rendered)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.http_request_timeout_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Settings {
    pub http_request_timeout_sec: u64,
    pub installer_root: PathBuf,
    pub config_file_wait_timeout_sec: u64,
    pub config_file_check_interval_ms: u64,
    pub default_login: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            http_request_timeout_sec: 15,
            installer_root: PathBuf::from("C:\\iiko_Distr"),
            config_file_wait_timeout_sec: 60,
            config_file_check_interval_ms: 100,
            default_login: "iikoUser".to_string(),
        }
    }
}

/// Comma-separated source order, checked left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SourcePriority {
    pub order: String,
}

impl Default for SourcePriority {
    fn default() -> Self {
        SourcePriority {
            order: "smb, http, ftp".to_string(),
        }
    }
}

/// Per-app-type archive name templates; `{version}` is substituted with the
/// formatted version. Syrve templates carry their vendor sub-path directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveNames {
    #[serde(rename = "iikoRMS_ArchiveName")]
    pub iiko_rms: String,
    #[serde(rename = "iikoChain_ArchiveName")]
    pub iiko_chain: String,
    #[serde(rename = "SyrveRMS_ArchiveName")]
    pub syrve_rms: String,
    #[serde(rename = "SyrveChain_ArchiveName")]
    pub syrve_chain: String,
}

impl Default for ArchiveNames {
    fn default() -> Self {
        ArchiveNames {
            iiko_rms: "RMSOffice{version}.zip".to_string(),
            iiko_chain: "ChainOffice{version}.zip".to_string(),
            syrve_rms: "Syrve/RMSSOffice{version}.zip".to_string(),
            syrve_chain: "Syrve/ChainSOffice{version}.zip".to_string(),
        }
    }
}

impl ArchiveNames {
    pub fn template_for(&self, app_type: AppType) -> &str {
        match app_type {
            AppType::IikoRms => &self.iiko_rms,
            AppType::IikoChain => &self.iiko_chain,
            AppType::SyrveRms => &self.syrve_rms,
            AppType::SyrveChain => &self.syrve_chain,
        }
    }

    /// Archive name for the given flavour and formatted version, or `None`
    /// when the template is not configured.
    pub fn archive_name(&self, app_type: AppType, version: &str) -> Option<String> {
        let template = self.template_for(app_type);
        if template.is_empty() {
            return None;
        }
        Some(template.replace("{version}", version))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SmbConfig {
    pub enabled: bool,
    pub path: String,
    #[serde(flatten)]
    pub archives: ArchiveNames,
}

impl Default for SmbConfig {
    fn default() -> Self {
        SmbConfig {
            enabled: false,
            path: "\\\\10.25.100.5\\sharedisk\\iikoBacks".to_string(),
            archives: ArchiveNames::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct HttpConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(flatten)]
    pub archives: ArchiveNames,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            enabled: true,
            url: "https://f.serty.top/iikoBacks".to_string(),
            archives: ArchiveNames::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub directory: String,
    #[serde(flatten)]
    pub archives: ArchiveNames,
}

impl Default for FtpConfig {
    fn default() -> Self {
        FtpConfig {
            enabled: true,
            host: "ftp.serty.top".to_string(),
            port: 21,
            username: "ftpuser".to_string(),
            password: "11".to_string(),
            directory: "/iikoBacks".to_string(),
            archives: ArchiveNames::default(),
        }
    }
}

/// Base names of the local distribution directories under the installer
/// root; the formatted version is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalInstallerNames {
    #[serde(rename = "iikoRMS")]
    pub iiko_rms: String,
    #[serde(rename = "iikoChain")]
    pub iiko_chain: String,
    #[serde(rename = "SyrveRMS")]
    pub syrve_rms: String,
    #[serde(rename = "SyrveChain")]
    pub syrve_chain: String,
}

impl Default for LocalInstallerNames {
    fn default() -> Self {
        LocalInstallerNames {
            iiko_rms: "RMSOffice".to_string(),
            iiko_chain: "ChainOffice".to_string(),
            syrve_rms: "RMSSOffice".to_string(),
            syrve_chain: "ChainSOffice".to_string(),
        }
    }
}

impl LocalInstallerNames {
    pub fn base_for(&self, app_type: AppType) -> &str {
        match app_type {
            AppType::IikoRms => &self.iiko_rms,
            AppType::IikoChain => &self.iiko_chain,
            AppType::SyrveRms => &self.syrve_rms,
            AppType::SyrveChain => &self.syrve_chain,
        }
    }

    /// Expected local distribution directory name for the given flavour and
    /// formatted version.
    pub fn dir_name(&self, app_type: AppType, version: &str) -> Result<String, LaunchError> {
        let base = self.base_for(app_type);
        if base.is_empty() {
            return Err(LaunchError::Config(format!(
                "no local directory name configured for {app_type}"
            )));
        }
        Ok(format!("{base}{version}"))
    }
}
