use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: String,
    pub arch: String,
}

pub fn build_app_info_response(name: &str, version: &str, description: &str) -> AppInfoResponse {
    AppInfoResponse {
        name: name.to_string(),
        version: version.to_string(),
        description: description.to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

pub fn app_info() -> AppInfoResponse {
    build_app_info_response(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_DESCRIPTION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_info_contains_build_metadata() {
        let response = app_info();

        assert_eq!(response.name, "market-sync");
        assert!(!response.version.is_empty());
        assert!(!response.description.is_empty());
        assert!(!response.platform.is_empty());
        assert!(!response.arch.is_empty());
    }
}
