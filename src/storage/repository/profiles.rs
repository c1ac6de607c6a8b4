// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity profile repository.
//!
//! One record per enrolled person, keyed by the canonical authority identity
//! number. Upsert merges: a non-empty incoming field wins, an empty incoming
//! field never erases a stored value.

use std::sync::PoisonError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::super::{Store, StoreError, StoreResult};

/// Strip grouping hyphens from an identity number.
pub fn canonical_abha(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-').collect()
}

/// Validate an identity number: 14 digits, optionally grouped
/// `XX-XXXX-XXXX-XXXX`.
pub fn is_valid_abha(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.len() == 17 {
        let bytes = trimmed.as_bytes();
        if bytes[2] != b'-' || bytes[7] != b'-' || bytes[12] != b'-' {
            return false;
        }
    } else if trimmed.len() != 14 {
        return false;
    }
    let digits = canonical_abha(trimmed);
    digits.len() == 14 && digits.chars().all(|c| c.is_ascii_digit())
}

/// One enrolled person's external identity record.
///
/// String fields use the empty string for "absent" so merge semantics mirror
/// the store contract: non-empty wins, empty never overwrites.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IdentityProfile {
    /// Generated correlation id, stable across updates.
    pub external_id: String,
    /// Authority-issued identity number (natural key).
    pub abha_number: String,
    /// Human-readable alias (health-id / PHR address).
    pub health_id: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub name: String,
    pub gender: String,
    pub date_of_birth: String,
    pub address: String,
    pub district: String,
    pub state: String,
    pub pincode: String,
    pub mobile: String,
    pub email: String,
    pub profile_photo: String,
    /// Short-lived user access token issued by the authority.
    pub access_token: String,
    /// Longer-lived user refresh token.
    pub refresh_token: String,
    pub created_by: String,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// First-time enrollment marker.
    pub new: bool,
    pub deleted: bool,
}

impl IdentityProfile {
    /// Merge `incoming` into `self`: non-empty incoming fields win, empty
    /// incoming fields keep the stored value. Audit fields always update.
    pub fn merge_from(&mut self, incoming: &IdentityProfile) {
        fn take(existing: &mut String, incoming: &str) {
            if !incoming.trim().is_empty() {
                *existing = incoming.to_string();
            }
        }

        take(&mut self.external_id, &incoming.external_id);
        take(&mut self.health_id, &incoming.health_id);
        take(&mut self.first_name, &incoming.first_name);
        take(&mut self.middle_name, &incoming.middle_name);
        take(&mut self.last_name, &incoming.last_name);
        take(&mut self.name, &incoming.name);
        take(&mut self.gender, &incoming.gender);
        take(&mut self.date_of_birth, &incoming.date_of_birth);
        take(&mut self.address, &incoming.address);
        take(&mut self.district, &incoming.district);
        take(&mut self.state, &incoming.state);
        take(&mut self.pincode, &incoming.pincode);
        take(&mut self.mobile, &incoming.mobile);
        take(&mut self.email, &incoming.email);
        take(&mut self.profile_photo, &incoming.profile_photo);
        take(&mut self.access_token, &incoming.access_token);
        take(&mut self.refresh_token, &incoming.refresh_token);
        take(&mut self.last_modified_by, &incoming.last_modified_by);
        self.updated_at = Utc::now();
    }
}

/// Repository for identity profiles.
pub struct ProfileRepository<'a> {
    store: &'a Store,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Get a profile by identity number (any grouping format).
    pub fn get(&self, abha_number: &str) -> StoreResult<IdentityProfile> {
        let key = canonical_abha(abha_number);
        let path = self.store.paths().profile(&key);
        if !self.store.exists(&path) {
            return Err(StoreError::NotFound(format!("profile {abha_number}")));
        }
        self.store.read_json(path)
    }

    /// Insert or merge-update a profile, keyed by its identity number.
    ///
    /// Missing `external_id` is filled with a fresh UUID on first insert.
    /// Returns the stored record after the merge.
    pub fn upsert(&self, mut incoming: IdentityProfile) -> StoreResult<IdentityProfile> {
        let key = canonical_abha(&incoming.abha_number);
        if key.is_empty() {
            return Err(StoreError::NotFound("profile without identity number".into()));
        }
        let path = self.store.paths().profile(&key);

        let lock = self.store.key_lock(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = if self.store.exists(&path) {
            let mut existing: IdentityProfile = self.store.read_json(&path)?;
            existing.merge_from(&incoming);
            existing
        } else {
            if incoming.external_id.trim().is_empty() {
                incoming.external_id = Uuid::new_v4().to_string();
            }
            let now = Utc::now();
            incoming.created_at = now;
            incoming.updated_at = now;
            incoming
        };

        self.store.write_json(&path, &stored)?;
        Ok(stored)
    }

    /// Fetch the stored token pair for an identity, skipping deleted rows.
    pub fn tokens(&self, abha_number: &str) -> StoreResult<(String, String)> {
        let profile = self.get(abha_number)?;
        if profile.deleted {
            return Err(StoreError::NotFound(format!("profile {abha_number}")));
        }
        Ok((profile.access_token, profile.refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorePaths;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StorePaths::new(temp.path())).unwrap();
        (temp, store)
    }

    fn sample_profile(abha: &str) -> IdentityProfile {
        IdentityProfile {
            abha_number: abha.to_string(),
            health_id: "asha@sbx".to_string(),
            first_name: "Asha".to_string(),
            gender: "FEMALE".to_string(),
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            created_by: "system".to_string(),
            last_modified_by: "system".to_string(),
            new: true,
            ..Default::default()
        }
    }

    #[test]
    fn canonical_strips_hyphens() {
        assert_eq!(canonical_abha("91-1234-1234-1234"), "91123412341234");
        assert_eq!(canonical_abha("91123412341234"), "91123412341234");
    }

    #[test]
    fn abha_validation_accepts_both_formats() {
        assert!(is_valid_abha("91123412341234"));
        assert!(is_valid_abha("91-1234-1234-1234"));
        assert!(!is_valid_abha("9112341234123"));
        assert!(!is_valid_abha("91-1234-12341-234"));
        assert!(!is_valid_abha("9112341234123x"));
        assert!(!is_valid_abha(""));
    }

    #[test]
    fn first_upsert_assigns_external_id() {
        let (_temp, store) = test_store();
        let repo = ProfileRepository::new(&store);

        let stored = repo.upsert(sample_profile("91123412341234")).unwrap();
        assert!(!stored.external_id.is_empty());
        assert!(stored.new);
    }

    #[test]
    fn re_enrollment_merges_rather_than_duplicates() {
        let (_temp, store) = test_store();
        let repo = ProfileRepository::new(&store);

        let first = repo.upsert(sample_profile("91123412341234")).unwrap();

        let mut second = IdentityProfile {
            abha_number: "91-1234-1234-1234".to_string(),
            first_name: "Asha Devi".to_string(),
            mobile: "9999900000".to_string(),
            last_modified_by: "system".to_string(),
            ..Default::default()
        };
        second.access_token = String::new();

        let merged = repo.upsert(second).unwrap();

        // Non-empty incoming values win.
        assert_eq!(merged.first_name, "Asha Devi");
        assert_eq!(merged.mobile, "9999900000");
        // Empty incoming values never erase stored ones.
        assert_eq!(merged.health_id, "asha@sbx");
        assert_eq!(merged.access_token, "access-1");
        // The correlation id is stable across updates.
        assert_eq!(merged.external_id, first.external_id);

        // Both grouping formats resolve to the same single record.
        let loaded = repo.get("91123412341234").unwrap();
        assert_eq!(loaded.first_name, "Asha Devi");
    }

    #[test]
    fn tokens_skip_deleted_profiles() {
        let (_temp, store) = test_store();
        let repo = ProfileRepository::new(&store);

        let mut profile = sample_profile("91123412341234");
        profile.deleted = true;
        repo.upsert(profile).unwrap();

        assert!(matches!(
            repo.tokens("91123412341234"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn tokens_return_stored_pair() {
        let (_temp, store) = test_store();
        let repo = ProfileRepository::new(&store);
        repo.upsert(sample_profile("91123412341234")).unwrap();

        let (access, refresh) = repo.tokens("91-1234-1234-1234").unwrap();
        assert_eq!(access, "access-1");
        assert_eq!(refresh, "refresh-1");
    }

    #[test]
    fn concurrent_upserts_of_disjoint_fields_both_survive() {
        let (_temp, store) = test_store();
        ProfileRepository::new(&store)
            .upsert(sample_profile("91123412341234"))
            .unwrap();

        let barrier = std::sync::Barrier::new(2);
        let store = &store;
        let barrier = &barrier;

        for round in 0..300 {
            let mobile = format!("99999{round:05}");
            let email = format!("asha{round}@sbx");

            let with_mobile = IdentityProfile {
                abha_number: "91123412341234".to_string(),
                mobile: mobile.clone(),
                last_modified_by: "system".to_string(),
                ..Default::default()
            };
            let with_email = IdentityProfile {
                abha_number: "91-1234-1234-1234".to_string(),
                email: email.clone(),
                last_modified_by: "system".to_string(),
                ..Default::default()
            };

            std::thread::scope(|s| {
                s.spawn(move || {
                    barrier.wait();
                    ProfileRepository::new(store).upsert(with_mobile).unwrap();
                });
                s.spawn(move || {
                    barrier.wait();
                    ProfileRepository::new(store).upsert(with_email).unwrap();
                });
            });

            // Neither writer may clobber the other's field.
            let loaded = ProfileRepository::new(store).get("91123412341234").unwrap();
            assert_eq!(loaded.mobile, mobile);
            assert_eq!(loaded.email, email);
        }
    }

    #[test]
    fn get_missing_profile_is_not_found() {
        let (_temp, store) = test_store();
        let repo = ProfileRepository::new(&store);
        assert!(matches!(
            repo.get("91000000000000"),
            Err(StoreError::NotFound(_))
        ));
    }
}
