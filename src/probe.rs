use std::time::Duration;

use crate::error::LaunchError;
use crate::target::ParsedTarget;

/// Monitoring endpoint every BackOffice server exposes.
const MONITORING_ENDPOINT: &str = "/resto/getServerMonitoringInfo.jsp";

/// Builds the probe URL for a resolved target. The port is included only
/// when it is not the scheme's standard port.
pub fn probe_url(target: &ParsedTarget) -> String {
    if target.port == target.scheme.standard_port() {
        format!("{}://{}{MONITORING_ENDPOINT}", target.scheme, target.host)
    } else {
        format!(
            "{}://{}:{}{MONITORING_ENDPOINT}",
            target.scheme, target.host, target.port
        )
    }
}

/// Performs the blocking GET against the monitoring endpoint and returns
/// the raw JSON response. Connection, timeout and HTTP-status failures are
/// probe errors; a non-JSON body is an invalid response.
pub fn fetch_server_info(url: &str, timeout: Duration) -> Result<serde_json::Value, LaunchError> {
    log::info!("requesting server info from '{url}'");

    let probe_err = |message: String| LaunchError::Probe {
        url: url.to_string(),
        message,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| probe_err(err.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|err| {
            if err.is_timeout() {
                probe_err(format!("timed out after {}s", timeout.as_secs()))
            } else {
                probe_err(err.to_string())
            }
        })?
        .error_for_status()
        .map_err(|err| probe_err(err.to_string()))?;

    response
        .json::<serde_json::Value>()
        .map_err(|err| LaunchError::InvalidResponse(format!("response body is not JSON: {err}")))
}
