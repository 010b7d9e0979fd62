use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use paygate::validation::is_email;
use paygate::Issue;
use url::Url;

/// Check if an IPv4 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()          // 127.0.0.0/8
        || ip.is_private()    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || ip.is_link_local() // 169.254.0.0/16
        || ip.is_broadcast()  // 255.255.255.255
        || ip.is_unspecified() // 0.0.0.0
        || ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGNAT)
}

/// Check if an IPv6 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    ip.is_loopback()
        || ip.is_unspecified()
        || {
            let segments = ip.segments();
            // fc00::/7 (unique local)
            (segments[0] & 0xFE00) == 0xFC00
            // fe80::/10 (link-local)
            || (segments[0] & 0xFFC0) == 0xFE80
            || match ip.to_ipv4_mapped() {
                Some(v4) => is_private_ipv4(&v4),
                None => false,
            }
        }
}

/// Validate a merchant IPN URL: http(s), has a host, and unless `allow_private`
/// is set, no private/loopback IPs or local domains.
pub fn validate_ipn_url(url: &str, allow_private: bool) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|_| "invalid URL format".to_string())?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("IPN URL must use http or https".to_string());
    }

    let host = parsed
        .host()
        .ok_or_else(|| "IPN URL must have a host".to_string())?;

    if allow_private {
        return Ok(());
    }

    match host {
        url::Host::Ipv4(ip) if is_private_ipv4(&ip) => {
            Err("IPN URL cannot be a private or loopback IP address".to_string())
        }
        url::Host::Ipv6(ip) if is_private_ipv6(&ip) => {
            Err("IPN URL cannot be a private or loopback IP address".to_string())
        }
        url::Host::Domain(domain) => {
            let domain_lower = domain.to_lowercase();
            if domain_lower == "localhost"
                || domain_lower.ends_with(".localhost")
                || domain_lower.ends_with(".local")
                || domain_lower.ends_with(".internal")
            {
                Err("IPN URL cannot be localhost or local domain".to_string())
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// POST an empty body to the IPN URL; the merchant must answer 204.
pub async fn probe_ipn_url(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    match client.post(url).timeout(timeout).send().await {
        Ok(resp) if resp.status() == reqwest::StatusCode::NO_CONTENT => true,
        Ok(resp) => {
            tracing::debug!(url, status = resp.status().as_u16(), "IPN probe rejected");
            false
        }
        Err(e) => {
            tracing::debug!(url, error = %e, "IPN probe unreachable");
            false
        }
    }
}

/// Field checks for a merchant registration that do not need the network.
pub fn merchant_issues(email: &str, ipn_url: &str, allow_private: bool) -> Vec<Issue> {
    let mut issues = Vec::new();
    if !is_email(email) {
        issues.push(Issue {
            field: "email".to_string(),
            message: "Invalid email".to_string(),
        });
    }
    if let Err(message) = validate_ipn_url(ipn_url, allow_private) {
        issues.push(Issue {
            field: "ipnUrl".to_string(),
            message,
        });
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ipv4() {
        assert!(is_private_ipv4(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ipv4(&"10.1.2.3".parse().unwrap()));
        assert!(is_private_ipv4(&"100.64.0.1".parse().unwrap()));
        assert!(!is_private_ipv4(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_private_ipv6() {
        assert!(is_private_ipv6(&"::1".parse().unwrap()));
        assert!(is_private_ipv6(&"fd00::1".parse().unwrap()));
        assert!(is_private_ipv6(&"::ffff:192.168.1.1".parse().unwrap()));
        assert!(!is_private_ipv6(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn ipn_url_rules() {
        assert!(validate_ipn_url("https://shop.example/ipn", false).is_ok());
        assert!(validate_ipn_url("http://shop.example/ipn", false).is_ok());
        assert!(validate_ipn_url("ftp://shop.example/ipn", false).is_err());
        assert!(validate_ipn_url("http://127.0.0.1:8080/ipn", false).is_err());
        assert!(validate_ipn_url("http://printer.local/ipn", false).is_err());
        assert!(validate_ipn_url("http://127.0.0.1:8080/ipn", true).is_ok());
        assert!(validate_ipn_url("not a url", true).is_err());
    }

    #[test]
    fn merchant_issues_name_fields() {
        let issues = merchant_issues("nope", "http://localhost/ipn", false);
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "ipnUrl"]);
        assert!(merchant_issues("a@shop.example", "https://shop.example/ipn", false).is_empty());
    }

    #[tokio::test]
    async fn probe_requires_no_content() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/ok").with_status(204).create_async().await;
        server.mock("POST", "/wrong").with_status(200).create_async().await;
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(2);

        assert!(probe_ipn_url(&client, &format!("{}/ok", server.url()), timeout).await);
        assert!(!probe_ipn_url(&client, &format!("{}/wrong", server.url()), timeout).await);
        assert!(!probe_ipn_url(&client, "http://127.0.0.1:1/ipn", timeout).await);
    }
}
