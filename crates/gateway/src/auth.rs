use ackbridge_protocol::reasons;

// ── Types ────────────────────────────────────────────────────────────────────

/// Static set of client IDs admitted at handshake time.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: Vec<String>,
}

/// Result of a handshake authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub ok: bool,
    /// Wire reason sent back in `connect_error`.
    pub reason: Option<&'static str>,
    /// Finer-grained cause, for logs only.
    pub detail: Option<&'static str>,
}

impl AuthResult {
    fn admitted() -> Self {
        Self {
            ok: true,
            reason: None,
            detail: None,
        }
    }

    fn rejected(detail: &'static str) -> Self {
        Self {
            ok: false,
            reason: Some(reasons::INVALID_CLIENT_ID),
            detail: Some(detail),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

// ── Auth logic ───────────────────────────────────────────────────────────────

impl AllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, client_id: &str) -> bool {
        // Compare against every entry so timing does not reveal the position.
        self.ids
            .iter()
            .fold(false, |found, id| safe_equal(id, client_id) | found)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Authenticate an incoming handshake against the allow-list.
pub fn authorize_connect(allow: &AllowList, client_id: Option<&str>) -> AuthResult {
    let Some(given) = client_id.filter(|id| !id.is_empty()) else {
        return AuthResult::rejected("client_id_missing");
    };
    if !allow.contains(given) {
        return AuthResult::rejected("client_id_unknown");
    }
    AuthResult::admitted()
}
