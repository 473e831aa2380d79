//! PDPA compliance for crabdesk.
//!
//! Three concerns live here:
//! - **PII scrubbing** — Singapore-specific identifiers (NRIC/FIN, +65
//!   phone numbers, emails, addresses) are masked before a message reaches
//!   retrieval or generation
//! - **Retention** — sessions idle past the configured window are purged,
//!   not merely flagged
//! - **Language detection** — lightweight script/phrase detection for the
//!   four supported languages

pub mod language;
pub mod pii;
pub mod retention;

pub use language::LanguageDetector;
pub use pii::{PiiKind, PiiScrubber, ScrubResult};
pub use retention::RetentionPolicy;
