//! Core types for contact dispatch.

use serde::Deserialize;

/// A web contact-form submission.
///
/// All fields are plain text and attacker-controlled; the dispatch pipeline
/// escapes them at render time and never validates them beyond treating an
/// absent optional field as "omitted from rendering". A submission lives
/// for one request and is discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContactSubmission {
    /// Sender's name.
    pub name: String,
    /// Sender's phone number, if provided.
    #[serde(default)]
    pub phone: Option<String>,
    /// Sender's email address.
    pub email: String,
    /// Sender's location, if provided.
    #[serde(default)]
    pub location: Option<String>,
    /// The message body.
    pub message: String,
}

impl ContactSubmission {
    /// Creates a submission with the required fields.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone: None,
            email: email.into(),
            location: None,
            message: message.into(),
        }
    }

    /// Sets the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
