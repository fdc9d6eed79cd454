use autoroute_proto::WireDialect;

/// Where the duplex transport connects and how it names commands.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Full `ws://`/`wss://` URL, or a bare `host[:port][/path]`.
    pub url: String,
    pub dialect: WireDialect,
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dialect: WireDialect::Socket,
        }
    }

    /// URL to dial. Bare hosts get `wss://`, except loopback which stays
    /// plain.
    pub fn endpoint(&self) -> String {
        if self.url.contains("://") {
            return self.url.clone();
        }
        let scheme = if is_loopback(&self.url) { "ws" } else { "wss" };
        format!("{scheme}://{}", self.url)
    }
}

fn is_loopback(bare: &str) -> bool {
    ["localhost", "127.", "[::1]"]
        .iter()
        .any(|prefix| bare.starts_with(prefix))
}
