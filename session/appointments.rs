use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::AppointmentSettings;
use crate::schema::Disease;

/// A recommendation to see a specialist, kept per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub disease: Disease,
    pub recommended_specialist: String,
    pub booking_link: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, in-memory appointment history.
#[derive(Debug, Default)]
pub struct AppointmentBook {
    booking_base_url: Option<String>,
    entries: DashMap<String, Vec<AppointmentRecord>>,
}

impl AppointmentBook {
    pub fn new(settings: &AppointmentSettings) -> Self {
        AppointmentBook {
            booking_base_url: settings.booking_base_url.clone(),
            entries: DashMap::new(),
        }
    }

    fn booking_link(&self, specialist: &str) -> Option<String> {
        let base = self.booking_base_url.as_deref()?.trim_end_matches(['/', '?']);
        let separator = if base.contains('?') { '&' } else { '?' };
        Some(format!(
            "{base}{separator}specialist={}",
            specialist.to_ascii_lowercase()
        ))
    }

    /// Records a booking for `username` at the current time.
    pub fn book(&self, username: &str, disease: Disease) -> AppointmentRecord {
        self.book_at(username, disease, Utc::now())
    }

    pub fn book_at(
        &self,
        username: &str,
        disease: Disease,
        timestamp: DateTime<Utc>,
    ) -> AppointmentRecord {
        let specialist = disease.specialist();
        let record = AppointmentRecord {
            disease,
            recommended_specialist: specialist.to_string(),
            booking_link: self.booking_link(specialist),
            timestamp,
        };
        self.entries
            .entry(username.to_string())
            .or_default()
            .push(record.clone());
        log::debug!("Booked {specialist} for '{username}'");
        record
    }

    /// Bookings for `username`, oldest first.
    pub fn history(&self, username: &str) -> Vec<AppointmentRecord> {
        self.entries
            .get(username)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bookings_append_in_order_per_user() {
        let book = AppointmentBook::default();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        book.book_at("asha", Disease::Heart, t0);
        book.book_at("asha", Disease::Kidney, t1);
        book.book_at("ravi", Disease::Liver, t0);

        let history = book.history("asha");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].recommended_specialist, "Cardiologist");
        assert_eq!(history[1].recommended_specialist, "Nephrologist");
        assert_eq!(history[1].timestamp, t1);
        assert!(history[0].booking_link.is_none());
        assert!(book.history("nobody").is_empty());
    }

    #[test]
    fn booking_link_uses_configured_base() {
        let settings = AppointmentSettings {
            booking_base_url: Some("https://clinic.test/book/".into()),
        };
        let book = AppointmentBook::new(&settings);
        let record = book.book("asha", Disease::Diabetes);
        assert_eq!(
            record.booking_link.as_deref(),
            Some("https://clinic.test/book?specialist=endocrinologist")
        );

        let settings = AppointmentSettings {
            booking_base_url: Some("https://clinic.test/find?city=pune".into()),
        };
        let record = AppointmentBook::new(&settings).book("asha", Disease::Liver);
        assert_eq!(
            record.booking_link.as_deref(),
            Some("https://clinic.test/find?city=pune&specialist=hepatologist")
        );
    }
}
