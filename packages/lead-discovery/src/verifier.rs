//! Confidence scoring for extracted leads.

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::types::{Completeness, Lead, LeadDraft};

/// Points for each scored field that is known.
pub const FIELD_POINTS: u32 = 20;

/// Bonus for leads from an API-verified source.
pub const VERIFIED_SOURCE_BONUS: u32 = 10;

pub const MAX_CONFIDENCE: u32 = 100;

#[derive(Debug, Error)]
enum VerifyError {
    #[error("lead URL is not absolute http(s): {0}")]
    InvalidUrl(String),

    #[error("lead has an empty title")]
    EmptyTitle,
}

/// A scored lead.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub lead: Lead,
    pub confidence: u8,
}

impl Verification {
    /// True when scoring failed and the lead passed through unscored.
    pub fn is_degraded(&self) -> bool {
        self.lead.verification_note.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier;

impl Verifier {
    pub fn new() -> Self {
        Self
    }

    /// Score a draft. Never fails: a draft that cannot be scored comes back
    /// with confidence 0 and a note explaining why.
    pub fn verify(&self, draft: LeadDraft) -> Verification {
        let completeness = Completeness::of(&draft.fields);
        let (confidence, note) = match score(&draft, &completeness) {
            Ok(confidence) => (confidence, None),
            Err(e) => {
                warn!(url = %draft.candidate.url, error = %e, "Lead verification failed, passing through unscored");
                (0, Some(e.to_string()))
            }
        };

        let LeadDraft {
            candidate,
            fields,
            description,
        } = draft;

        Verification {
            lead: Lead {
                title: candidate.title,
                url: candidate.url,
                source: candidate.source,
                verified_source: candidate.verified_source,
                published_at: candidate.published_at,
                fields,
                description,
                confidence,
                completeness,
                verification_note: note,
            },
            confidence,
        }
    }
}

fn score(draft: &LeadDraft, completeness: &Completeness) -> Result<u8, VerifyError> {
    if draft.candidate.title.trim().is_empty() {
        return Err(VerifyError::EmptyTitle);
    }
    match Url::parse(&draft.candidate.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return Err(VerifyError::InvalidUrl(draft.candidate.url.clone())),
    }

    let scored_fields = [
        completeness.company,
        completeness.location,
        completeness.project_type,
        completeness.budget,
        completeness.room_count,
    ];
    let mut points: u32 = scored_fields.iter().filter(|known| **known).count() as u32 * FIELD_POINTS;
    if draft.candidate.verified_source {
        points += VERIFIED_SOURCE_BONUS;
    }

    Ok(points.min(MAX_CONFIDENCE) as u8)
}
