use crate::util::logging::{debug, warn};
use deskwatch_core::records::SubjectId;
use deskwatch_storage::ActivityStore;
use std::collections::HashMap;

/// Outcome of one identity lookup.
#[derive(Debug)]
pub enum Resolution {
    Known(SubjectId),
    /// The store answered and has no such subject.
    Unknown,
    /// The store could not answer this time.
    Failed(anyhow::Error),
}

impl Resolution {
    pub fn subject_id(&self) -> Option<SubjectId> {
        match self {
            Resolution::Known(id) => Some(*id),
            Resolution::Unknown | Resolution::Failed(_) => None,
        }
    }
}

/// Memoized subject-name to identity lookups.
///
/// The first successful answer for a name, found or not found, is kept for the
/// lifetime of the resolver. Later changes in the store (renames, deletions,
/// late registration) are not observed. Store errors are not memoized, so the
/// next call asks again.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: HashMap<String, Option<SubjectId>>,
    lookups: u64,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, store: &mut dyn ActivityStore, subject: &str) -> Resolution {
        if let Some(cached) = self.cache.get(subject) {
            return match cached {
                Some(id) => Resolution::Known(*id),
                None => Resolution::Unknown,
            };
        }

        self.lookups += 1;
        match store.find_subject_id(subject) {
            Ok(found) => {
                self.cache.insert(subject.to_string(), found);
                match found {
                    Some(id) => {
                        debug!("Resolved subject '{}' to identity {}", subject, id);
                        Resolution::Known(id)
                    }
                    None => {
                        warn!(
                            "Subject '{}' is not registered; its activity will not be recorded",
                            subject
                        );
                        Resolution::Unknown
                    }
                }
            }
            Err(e) => Resolution::Failed(e.context(format!("identity lookup for '{subject}'"))),
        }
    }

    /// Store queries issued so far.
    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    pub fn cached(&self, subject: &str) -> Option<Option<SubjectId>> {
        self.cache.get(subject).copied()
    }
}
