//! Customer profile for personalization.
//!
//! A customer holds a non-owning list of session ids — sessions own their
//! messages, customers merely reference sessions. No inverse object graphs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Language;

/// Customer profile used for personalization during assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    /// Stable customer identifier
    pub id: String,

    /// Display name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Contact email, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Preferred response language
    #[serde(default)]
    pub preferred_language: Language,

    /// Session ids this customer has opened (non-owning references)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_ids: Vec<String>,

    /// Lifetime interaction count
    #[serde(default)]
    pub interaction_count: u64,

    /// Last interaction timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<DateTime<Utc>>,
}

impl CustomerProfile {
    /// Name to address the customer by in generated text.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Valued Customer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_name() {
        let profile = CustomerProfile {
            id: "cust_1".into(),
            name: Some("Mei Lin".into()),
            email: Some("mei@example.com".into()),
            ..Default::default()
        };
        assert_eq!(profile.display_name(), "Mei Lin");
    }

    #[test]
    fn display_name_falls_back_to_email_then_generic() {
        let with_email = CustomerProfile {
            id: "cust_2".into(),
            email: Some("mei@example.com".into()),
            ..Default::default()
        };
        assert_eq!(with_email.display_name(), "mei@example.com");

        let anonymous = CustomerProfile { id: "cust_3".into(), ..Default::default() };
        assert_eq!(anonymous.display_name(), "Valued Customer");
    }
}
