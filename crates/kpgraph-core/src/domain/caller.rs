//! Authorized caller identity
//!
//! Authentication happens upstream. Entry points receive the caller as-is
//! and only record it in logs and audit events.

use serde::{Deserialize, Serialize};

/// Role of an authorized caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An already-authorized caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: i64,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Local operator acting through the command line
    pub fn system() -> Self {
        Self::new(0, Role::Admin)
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.role, self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_display() {
        assert_eq!(Caller::new(7, Role::Teacher).to_string(), "teacher:7");
        assert_eq!(Caller::system().to_string(), "admin:0");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Student"), Some(Role::Student));
        assert_eq!(Role::parse("guest"), None);
    }
}
