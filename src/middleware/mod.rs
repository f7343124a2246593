mod license_gate;

pub use license_gate::license_gate;

/// Caller role attached to the request by the authentication layer upstream
/// of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
    User,
}

/// Caller identity, as far as the gate cares: enough to decide bypass.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub role: Role,
}

impl AuthContext {
    /// Privileged callers skip the license check entirely so administrators
    /// can always reach the system to fix a lapsed license.
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
