//! `Device.OpcuaConfig` authentication: anonymous unless
//! credentials are supplied.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Anonymous,
    UserPassword,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub auth_type: Option<AuthType>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Credentials {
            auth_type: Some(AuthType::Anonymous),
            username: None,
            password: None,
        }
    }

    /// Resolves the effective auth type: `UserPassword` only when both
    /// a username and password were actually supplied, regardless of
    /// what the caller labeled `auth_type` as (mirrors the Python
    /// service's `if username and password` guard).
    pub fn effective_auth_type(&self) -> AuthType {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => AuthType::UserPassword,
            _ => AuthType::Anonymous,
        }
    }
}
