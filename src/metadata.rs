use std::path::Path;

use pelite::FileMap;

use crate::models::Vendor;

/// Reads the CompanyName string from an executable's embedded version
/// resources. Returns `None` when the file is missing, is not a PE image,
/// or carries no usable version info; absence of metadata is never treated
/// as a failure.
pub fn file_company_name(path: &Path) -> Option<String> {
    if !path.is_file() {
        log::debug!("no file to read metadata from: '{}'", path.display());
        return None;
    }

    let map = match FileMap::open(path) {
        Ok(map) => map,
        Err(err) => {
            log::debug!("could not map '{}': {err}", path.display());
            return None;
        }
    };

    let file = match pelite::PeFile::from_bytes(map.as_ref()) {
        Ok(file) => file,
        Err(err) => {
            log::debug!("'{}' is not a PE image: {err}", path.display());
            return None;
        }
    };
    let resources = match file.resources() {
        Ok(resources) => resources,
        Err(err) => {
            log::debug!("no resources in '{}': {err}", path.display());
            return None;
        }
    };
    let version_info = match resources.version_info() {
        Ok(info) => info,
        Err(err) => {
            log::debug!("no version info in '{}': {err}", path.display());
            return None;
        }
    };

    let lang = *version_info.translation().first()?;
    version_info
        .value(lang, "CompanyName")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Vendor verdict for an executable: a readable CompanyName must contain
/// the vendor name, while unreadable or absent metadata counts as a match.
pub fn vendor_matches(company: Option<&str>, vendor: Vendor) -> bool {
    match company {
        Some(company) => vendor.matches_company(company),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn non_pe_file_has_no_company_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plain text, not an executable").unwrap();
        assert_eq!(file_company_name(file.path()), None);
    }

    #[test]
    fn missing_file_has_no_company_name() {
        assert_eq!(file_company_name(Path::new("does/not/exist.exe")), None);
    }

    #[test]
    fn absent_metadata_counts_as_match() {
        assert!(vendor_matches(None, Vendor::Iiko));
        assert!(vendor_matches(Some("Syrve International"), Vendor::Syrve));
        assert!(!vendor_matches(Some("iiko Software"), Vendor::Syrve));
    }
}
