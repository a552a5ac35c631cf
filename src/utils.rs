use crate::config::ServerConfig;

// Prepends the protocol scheme to an ICE server URL when it is missing.
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_scheme_from_type() {
        let cfg = ServerConfig {
            id: "x".into(),
            r#type: "turn".into(),
            url: "turn.example.org:3478".into(),
            username: Some("u".into()),
            credential: Some("p".into()),
        };
        assert_eq!(add_ice_url_scheme(&cfg), "turn:turn.example.org:3478");
    }

    #[test]
    fn existing_scheme_is_kept() {
        let cfg = ServerConfig {
            id: "x".into(),
            r#type: "turn".into(),
            url: "stun:stun.example.org".into(),
            username: None,
            credential: None,
        };
        assert_eq!(add_ice_url_scheme(&cfg), "stun:stun.example.org");
    }
}
