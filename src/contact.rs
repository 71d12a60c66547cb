//! Contact form submissions
//!
//! A [`ContactRequest`] is what a visitor posts; [`ContactRequest::contact`]
//! turns it into the stored [`Contact`] under the tag of the form it came
//! from.

use serde::{Deserialize, Serialize};
use store_object::{Model, StoreError};
use table_derive::entity;

/// Table the contact store persists to
pub const CONTACTS_TABLE: &str = "contacts";

#[entity]
#[table(name = "contacts")]
#[derive(Default, PartialEq, Serialize)]
pub struct Contact {
    #[model]
    #[serde(flatten)]
    pub model: Model,

    #[field(create, update)]
    pub first_name: String,

    #[field(create, update)]
    pub last_name: String,

    #[field(create, update)]
    pub email: String,

    #[field(create, update)]
    pub phone: String,

    #[field(create, update)]
    pub company: String,

    #[field(create, update)]
    pub subject: String,

    #[field(create, update)]
    pub message: String,

    #[field(create)]
    pub tag: String,
}

/// Submitted contact form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactRequest {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub captcha_response: Option<String>,
}

impl ContactRequest {
    /// Check the required fields
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.first_name.trim().is_empty() {
            return Err(StoreError::validation("first_name", "required"));
        }
        if self.email.trim().is_empty() {
            return Err(StoreError::validation("email", "required"));
        }
        if !is_email(self.email.trim()) {
            return Err(StoreError::validation("email", "invalid email"));
        }
        if self.message.trim().is_empty() {
            return Err(StoreError::validation("message", "required"));
        }
        Ok(())
    }

    /// Unsaved contact for this submission
    pub fn contact(&self, tag: &str) -> Contact {
        Contact {
            model: Model::new(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            company: self.company.clone(),
            subject: self.subject.clone(),
            message: self.message.clone(),
            tag: tag.to_string(),
        }
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store_object::TableMetadata;

    fn request() -> ContactRequest {
        serde_json::from_value(json!({
            "first_name": "Ada",
            "email": "ada@example.com",
            "message": "Hello there",
            "captcha_response": "token"
        }))
        .unwrap()
    }

    #[test]
    fn test_contact_table_metadata() {
        assert_eq!(Contact::table_name(), CONTACTS_TABLE);
        assert_eq!(
            Contact::create_fields(),
            &["first_name", "last_name", "email", "phone", "company", "subject", "message", "tag"]
        );
        assert!(!Contact::update_fields().contains(&"tag"));
        assert_eq!(Contact::update_fields().len(), 7);
        assert!(Contact::all_columns().contains(&"tag"));
        assert!(Contact::all_columns().contains(&"external_id"));
    }

    #[test]
    fn test_request_to_contact() {
        let req = request();
        assert!(req.validate().is_ok());

        let contact = req.contact("website");
        assert_eq!(contact.first_name, "Ada");
        assert_eq!(contact.last_name, "");
        assert_eq!(contact.tag, "website");
        assert!(!contact.model.is_saved());
        assert!(!contact.model.external_id.is_nil());
        assert_eq!(contact.column_value("email"), Some(json!("ada@example.com")));
    }

    #[test]
    fn test_request_validation() {
        let mut req = request();
        req.email = "not-an-email".to_string();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "email"));

        let mut req = request();
        req.message = "   ".to_string();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "message"));

        let mut req = request();
        req.first_name.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_contact_serializes_flat() {
        let contact = request().contact("website");
        let value = serde_json::to_value(&contact).unwrap();
        assert_eq!(value["first_name"], "Ada");
        assert_eq!(value["id"], 0);
        assert!(value.get("model").is_none());
    }
}
