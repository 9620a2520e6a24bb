use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use folio_db::{Collection, KvStore, keys};
use folio_types::api::ProfileUpdate;
use folio_types::models::{Credential, Profile, UserType};
use folio_types::new_id;

use crate::error::{FolioError, FolioResult};

/// Accounts, profiles and the signed-in session.
pub struct IdentityStore {
    store: Arc<dyn KvStore>,
    ttl: Option<Duration>,
    credentials: Collection<Credential>,
    profiles: Collection<Profile>,
    current: Option<Profile>,
}

impl IdentityStore {
    /// Restores the persisted session, if any. A corrupt session entry is
    /// dropped and the store starts signed out.
    pub fn open(store: Arc<dyn KvStore>, ttl: Option<Duration>) -> FolioResult<Self> {
        let current = load_session(store.as_ref())?;
        if let Some(user) = &current {
            info!("Restored session for {} ({})", user.email, user.id);
        }

        Ok(Self {
            credentials: Collection::new(store.clone(), keys::CREDENTIALS, ttl),
            profiles: Collection::new(store.clone(), keys::PROFILES, ttl),
            store,
            ttl,
            current,
        })
    }

    pub fn current_user(&self) -> Option<&Profile> {
        self.current.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// Create an account and sign in as it.
    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        user_type: UserType,
    ) -> FolioResult<Profile> {
        let profile = Profile {
            id: new_id(),
            name: name.to_string(),
            email: email.to_string(),
            user_type,
            specialty: None,
            bio: None,
            avatar: None,
            skills: None,
            created_at: Utc::now(),
        };

        // Check and insert in one update so two registrations can't both pass
        let inserted = self.credentials.update(|creds| {
            if creds.iter().any(|c| c.email == email) {
                return false;
            }
            creds.push(Credential {
                email: email.to_string(),
                password: password.to_string(),
                user_id: Some(profile.id.clone()),
            });
            true
        })?;

        if !inserted {
            return Err(FolioError::DuplicateEmail);
        }

        self.profiles.push(profile.clone())?;
        self.start_session(profile.clone())?;

        info!("Registered {:?} {} ({})", user_type, email, profile.id);
        Ok(profile)
    }

    pub fn login(&mut self, email: &str, password: &str) -> FolioResult<Profile> {
        let credential = self
            .credentials
            .load()?
            .into_iter()
            .find(|c| c.email == email && c.password == password)
            .ok_or(FolioError::InvalidCredentials)?;

        let profiles = self.profiles.load()?;
        let profile = match &credential.user_id {
            Some(id) => profiles.into_iter().find(|p| &p.id == id),
            None => profiles.into_iter().find(|p| p.email == credential.email),
        };

        let Some(profile) = profile else {
            warn!("Credentials for {} have no matching profile", email);
            return Err(FolioError::ProfileNotFound);
        };

        self.start_session(profile.clone())?;
        info!("{} ({}) logged in", profile.email, profile.id);
        Ok(profile)
    }

    /// Ends the session. Accounts and profiles are untouched.
    pub fn logout(&mut self) -> FolioResult<()> {
        self.store.remove(keys::CURRENT_SESSION)?;
        if let Some(user) = self.current.take() {
            info!("{} ({}) logged out", user.email, user.id);
        }
        Ok(())
    }

    /// Merge `update` into the signed-in profile and persist it to both the
    /// session and the profile list. An empty update writes nothing.
    pub fn update_profile(&mut self, update: ProfileUpdate) -> FolioResult<Profile> {
        let mut profile = self.current.clone().ok_or(FolioError::NotAuthenticated)?;
        if update.is_empty() {
            return Ok(profile);
        }
        update.apply_to(&mut profile);

        self.write_session(&profile)?;

        let listed = self.profiles.update(|all| {
            match all.iter_mut().find(|p| p.id == profile.id) {
                Some(slot) => {
                    *slot = profile.clone();
                    true
                }
                None => false,
            }
        })?;
        if !listed {
            debug!("Profile {} missing from profile list, session updated only", profile.id);
        }

        self.current = Some(profile.clone());
        Ok(profile)
    }

    pub fn profile(&self, id: &str) -> FolioResult<Option<Profile>> {
        Ok(self.profiles.load()?.into_iter().find(|p| p.id == id))
    }

    /// Providers whose name or specialty contains `query`, ignoring case.
    /// An empty query lists every provider.
    pub fn providers(&self, query: &str) -> FolioResult<Vec<Profile>> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .profiles
            .load()?
            .into_iter()
            .filter(Profile::is_provider)
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.specialty
                        .as_deref()
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
            .collect())
    }

    fn start_session(&mut self, profile: Profile) -> FolioResult<()> {
        self.write_session(&profile)?;
        self.current = Some(profile);
        Ok(())
    }

    fn write_session(&self, profile: &Profile) -> FolioResult<()> {
        let raw = serde_json::to_string(profile)?;
        self.store.set(keys::CURRENT_SESSION, &raw, self.ttl)?;
        Ok(())
    }
}

fn load_session(store: &dyn KvStore) -> FolioResult<Option<Profile>> {
    let Some(raw) = store.get(keys::CURRENT_SESSION)? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(profile) => Ok(Some(profile)),
        Err(e) => {
            warn!("Failed to parse stored session: {}", e);
            store.remove(keys::CURRENT_SESSION)?;
            Ok(None)
        }
    }
}
