use serde::{Deserialize, Serialize};

/// Registration row read from the origin store. Never written by this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: serde_json::Value,
    #[serde(default)]
    pub guardian_name: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl RegistrationRecord {
    /// Name to copy onto a row of the given kind.
    pub fn name_for(&self, student: bool) -> Option<&str> {
        let name = if student {
            self.student_name.as_deref()
        } else {
            self.guardian_name.as_deref()
        };
        name.filter(|n| !n.trim().is_empty())
    }
}
