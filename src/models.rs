use std::fmt;

use crate::error::LaunchError;

/// Product vendor the target server belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Iiko,
    Syrve,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Iiko => "iiko",
            Vendor::Syrve => "Syrve",
        }
    }

    /// Case-insensitive substring match against an executable's embedded
    /// CompanyName.
    pub fn matches_company(&self, company: &str) -> bool {
        company
            .to_ascii_lowercase()
            .contains(&self.as_str().to_ascii_lowercase())
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four supported BackOffice flavours: vendor x edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppType {
    IikoRms,
    IikoChain,
    SyrveRms,
    SyrveChain,
}

impl AppType {
    /// Canonical name used in configuration keys and status lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::IikoRms => "iikoRMS",
            AppType::IikoChain => "iikoChain",
            AppType::SyrveRms => "SyrveRMS",
            AppType::SyrveChain => "SyrveChain",
        }
    }

    pub fn vendor(&self) -> Vendor {
        match self {
            AppType::IikoRms | AppType::IikoChain => Vendor::Iiko,
            AppType::SyrveRms | AppType::SyrveChain => Vendor::Syrve,
        }
    }

    pub fn is_rms(&self) -> bool {
        matches!(self, AppType::IikoRms | AppType::SyrveRms)
    }

    pub fn from_parts(vendor: Vendor, choice: AppTypeChoice) -> AppType {
        match (vendor, choice) {
            (Vendor::Iiko, AppTypeChoice::Rms) => AppType::IikoRms,
            (Vendor::Iiko, AppTypeChoice::Chain) => AppType::IikoChain,
            (Vendor::Syrve, AppTypeChoice::Rms) => AppType::SyrveRms,
            (Vendor::Syrve, AppTypeChoice::Chain) => AppType::SyrveChain,
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edition half of an `AppType`, offered to the user when the server's
/// edition field did not identify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppTypeChoice {
    Rms,
    Chain,
}

/// Outcome of mapping the probe response onto an application flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppVariant {
    Known(AppType),
    /// The edition was empty or unrecognized; the vendor is still known
    /// (sniffed from the raw target input), the edition must be asked.
    NeedsChoice(Vendor),
}

/// Determines vendor and edition from the raw target input and the server's
/// reported edition. The vendor is Syrve whenever the input mentions it,
/// iiko otherwise; "default" maps to RMS and "chain" to Chain.
pub fn determine_app_variant(target_input: &str, edition: &str) -> AppVariant {
    let vendor = if target_input.to_lowercase().contains("syrve") {
        Vendor::Syrve
    } else {
        Vendor::Iiko
    };

    match edition.to_lowercase().as_str() {
        "default" => AppVariant::Known(AppType::from_parts(vendor, AppTypeChoice::Rms)),
        "chain" => AppVariant::Known(AppType::from_parts(vendor, AppTypeChoice::Chain)),
        other => {
            log::warn!(
                "could not determine RMS/Chain from edition '{other}' (vendor '{vendor}'); user choice required"
            );
            AppVariant::NeedsChoice(vendor)
        }
    }
}

/// The three response fields the launch sequence needs. Extracted from the
/// raw probe JSON; any missing or non-string field is an invalid response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub edition: String,
    pub version: String,
    pub server_state: String,
}

impl ServerInfo {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, LaunchError> {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        match (field("edition"), field("version"), field("serverState")) {
            (Some(edition), Some(version), Some(server_state)) => Ok(ServerInfo {
                edition,
                version,
                server_state,
            }),
            _ => Err(LaunchError::InvalidResponse(
                "response is missing one of the required keys: edition, version, serverState"
                    .into(),
            )),
        }
    }
}
