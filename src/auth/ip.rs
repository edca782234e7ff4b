//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request};

use crate::cli::ClientIpHeader;

/// Extract the client IP used as the rate limiting key.
///
/// With `ip_header` unset, the connection address is used and any forwarding
/// headers are ignored, since clients control them. With `ip_header` set,
/// the header written by the trusted proxy is required and there is no
/// fallback to the connection address. Returns `Ok(None)` when no header is
/// configured and no connection info is attached to the request.
pub fn extract_client_ip(
    request: &Request,
    ip_header: Option<ClientIpHeader>,
) -> Result<Option<String>, &'static str> {
    match ip_header {
        Some(header) => {
            let value = request
                .headers()
                .get(header.header_name())
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            header.parse(value).map(|ip| Some(ip.to_string()))
        }
        None => Ok(request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())),
    }
}

impl ClientIpHeader {
    pub fn header_name(&self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
        }
    }

    /// The proxy appends the peer it saw to `X-Forwarded-For`, so only the
    /// last entry is trustworthy. Earlier entries come from the client.
    fn parse(&self, value: &str) -> Result<IpAddr, &'static str> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.rsplit(',').next().unwrap_or(value),
            ClientIpHeader::XRealIp => value,
        };
        candidate
            .trim()
            .parse()
            .map_err(|_| "IP header does not contain a valid address")
    }
}
